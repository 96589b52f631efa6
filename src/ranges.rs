use crate::options::{GenomicRange, OverlapOptions, Strand};
use crate::reader::gtf::TxStruct;
use crate::txmeta_utils::VALIDSTRANDS;
use anyhow::{bail, Context};
use lazy_static::lazy_static;
use polars::{lazy::prelude::*, prelude::*};
use rust_lapper::{Interval, Lapper};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

// we give each ranges table a unique
// program identifier which is the order in
// which it was created.
lazy_static! {
    static ref RANGES_COUNTER: AtomicU32 = AtomicU32::new(0);
}

/// A rust-lapper over the features of one `(seqname, strand)` pair.
/// The value of each interval is the row of the feature.
pub type LapperType = Lapper<u64, usize>;

/// The coordinate columns of a ranges table.
pub const RANGE_FIELDS: [&str; 4] = ["seqname", "start", "end", "strand"];

/// The genomic location and annotation of the features (transcripts or genes)
/// of an experiment, i.e. its *row ranges*.
///
/// ### Fields
///
/// * `df`: the underlying [DataFrame], one row per feature. The `id_column`
///   holds unique, non-null feature ids. If the features are located, the
///   `seqname`, `start`, `end` and `strand` columns hold their coordinates as
///   1-based closed intervals. Any other column is a feature attribute
///   (`gene_id`, `gene_name`, ...).
/// * `id_column`: the name of the feature id column, `tx_name` for transcripts
///   or `gene_id` for genes.
/// * `signature`: a process-unique signature. The upper 32 bits number the
///   tables in order of construction, the lower 32 bits are a version
///   incremented by every mutating operation.
///
/// A table built with [FeatureRanges::ids_only] has no coordinates; it is used
/// when the reference transcriptome of a quantification could not be identified.
#[derive(Clone, Debug)]
pub struct FeatureRanges {
    df: DataFrame,
    id_column: String,
    has_ranges: bool,
    signature: u64,
}

impl FeatureRanges {
    #[inline(always)]
    fn inc_signature(&mut self) {
        self.signature += 1;
    }

    /// Creates a ranges table from a data frame, after validation.
    ///
    /// ### Arguments
    ///
    /// * `df`: the table, one row per feature.
    /// * `id_column`: the column holding the feature ids.
    ///
    /// ### Returns
    ///
    /// Returns an error if
    /// * the id column is missing, has nulls or duplicates;
    /// * only some of the coordinate columns are present;
    /// * a coordinate is missing, a start position is not positive, a start
    ///   position is larger than its end position or a strand is not one of `+`, `-` or `*`.
    ///
    /// ### Example
    ///
    /// ```rust
    /// use polars::prelude::*;
    /// use txmeta::ranges::FeatureRanges;
    ///
    /// let df = df!(
    ///     "tx_name" => ["t1", "t2"],
    ///     "seqname" => ["chr1", "chr2"],
    ///     "start" => [1i64, 101],
    ///     "end" => [50i64, 150],
    ///     "strand" => ["+", "-"],
    /// )
    /// .unwrap();
    /// let fr = FeatureRanges::new(df, "tx_name").unwrap();
    /// assert!(fr.has_ranges());
    /// ```
    pub fn new(mut df: DataFrame, id_column: &str) -> anyhow::Result<FeatureRanges> {
        let names = df.get_column_names();
        if !names.contains(&id_column) {
            bail!(
                "The feature id column {:?} is missing; found {:?}",
                id_column,
                names
            )
        }
        let n_present = RANGE_FIELDS.iter().filter(|f| names.contains(*f)).count();
        if n_present != 0 && n_present != RANGE_FIELDS.len() {
            bail!(
                "The ranges table must have all of {:?} or none of them; found {:?}",
                RANGE_FIELDS,
                names
            )
        }

        let ids = df.column(id_column)?.cast(&DataType::String)?;
        if ids.null_count() > 0 {
            bail!("The feature id column {:?} contains missing values.", id_column)
        }
        if ids.n_unique()? != ids.len() {
            bail!("The feature id column {:?} contains duplicated ids.", id_column)
        }
        df.with_column(ids)?;

        let has_ranges = n_present == RANGE_FIELDS.len();
        if has_ranges {
            for c in ["seqname", "strand"] {
                let s = df.column(c)?.cast(&DataType::String)?;
                df.with_column(s)?;
            }
            for c in ["start", "end"] {
                let s = df
                    .column(c)?
                    .strict_cast(&DataType::Int64)
                    .with_context(|| format!("The {:?} column must hold integers", c))?;
                df.with_column(s)?;
            }
            FeatureRanges::validate_ranges(&df)?;
        }

        let gid = RANGES_COUNTER.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(FeatureRanges {
            df,
            id_column: id_column.to_string(),
            has_ranges,
            signature: (gid << 32),
        })
    }

    fn validate_ranges(df: &DataFrame) -> anyhow::Result<()> {
        for c in RANGE_FIELDS {
            let n = df.column(c)?.null_count();
            if n > 0 {
                bail!("The {:?} column contains {} missing value(s).", c, n)
            }
        }

        let invalid = df
            .select(["start", "end", "strand"])?
            .lazy()
            .select([
                col("start").lt_eq(lit(0)).alias("bad_start"),
                col("start").gt(col("end")).alias("bad_order"),
                col("strand")
                    .is_in(lit(Series::new("strands", VALIDSTRANDS)))
                    .not()
                    .alias("bad_strand"),
            ])
            .select([
                col("bad_start").sum(),
                col("bad_order").sum(),
                col("bad_strand").sum(),
            ])
            .collect()?;

        let count = |c: &str| -> anyhow::Result<u64> {
            Ok(invalid
                .column(c)?
                .cast(&DataType::UInt64)?
                .u64()?
                .get(0)
                .unwrap_or(0))
        };
        if count("bad_start")? > 0 {
            bail!("Found features with a non-positive start position.")
        }
        if count("bad_order")? > 0 {
            bail!("Found features whose start position is larger than their end position.")
        }
        if count("bad_strand")? > 0 {
            bail!("Found features with a strand other than {:?}.", VALIDSTRANDS)
        }
        Ok(())
    }

    /// Creates a table holding only feature ids, without coordinates.
    pub fn ids_only<T: AsRef<str>>(ids: &[T], id_column: &str) -> anyhow::Result<FeatureRanges> {
        let s = Series::new(
            id_column,
            ids.iter().map(|i| i.as_ref()).collect::<Vec<&str>>(),
        );
        FeatureRanges::new(DataFrame::new(vec![s])?, id_column)
    }

    /// Creates a transcript ranges table (id column `tx_name`) from the
    /// transcripts read from an annotation.
    pub fn from_txstruct(txs: TxStruct) -> anyhow::Result<FeatureRanges> {
        let mut df_vec = vec![
            Series::new("tx_name", txs.tx_name),
            Series::new("seqname", txs.seqname),
            Series::new("start", txs.start),
            Series::new("end", txs.end),
            Series::new("strand", txs.strand),
            Series::new("gene_id", txs.gene_id),
        ];

        let mut attributes: Vec<(String, Vec<Option<String>>)> =
            txs.attributes.into_iter().collect();
        attributes.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in attributes {
            df_vec.push(Series::new(k.as_str(), v));
        }

        FeatureRanges::new(DataFrame::new(df_vec)?, "tx_name")
    }

    /// Reads the transcript ranges of a (possibly gzipped) GTF file.
    pub fn from_gtf<T: AsRef<Path>>(file_path: T) -> anyhow::Result<FeatureRanges> {
        let start = std::time::Instant::now();
        let fr = FeatureRanges::from_txstruct(TxStruct::from_gtf(file_path.as_ref())?)?;
        debug!(
            "built the transcript ranges of {:?} in {:?}",
            file_path.as_ref(),
            start.elapsed()
        );
        Ok(fr)
    }
}

// accessors
impl FeatureRanges {
    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// `true` if the features carry genomic coordinates.
    pub fn has_ranges(&self) -> bool {
        self.has_ranges
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn get_signature(&self) -> u64 {
        self.signature
    }

    pub fn column<T: AsRef<str>>(&self, name: T) -> anyhow::Result<&Series> {
        self.df.column(name.as_ref()).with_context(|| {
            format!(
                "The row ranges have no column {:?}; found {:?}",
                name.as_ref(),
                self.df.get_column_names()
            )
        })
    }

    pub fn is_column<T: AsRef<str>>(&self, name: T) -> bool {
        self.df.get_column_names().contains(&name.as_ref())
    }

    /// The feature ids, in row order.
    pub fn ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .column(&self.id_column)?
            .str()?
            .into_no_null_iter()
            .map(|s| s.to_string())
            .collect())
    }

    /// The values of a string column; nulls are kept as `None`.
    pub fn str_values<T: AsRef<str>>(&self, name: T) -> anyhow::Result<Vec<Option<String>>> {
        Ok(self
            .column(name)?
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect())
    }

    /// Adds or replaces a feature attribute column. The feature ids and the
    /// coordinate columns cannot be replaced this way.
    pub fn update_column(&mut self, column: Series) -> anyhow::Result<()> {
        if column.name() == self.id_column || RANGE_FIELDS.contains(&column.name()) {
            bail!(
                "The {:?} column of the row ranges cannot be replaced.",
                column.name()
            )
        }
        if column.len() != self.len() {
            bail!(
                "The column {:?} has {} values but there are {} features.",
                column.name(),
                column.len(),
                self.len()
            )
        }
        if column.null_count() > 0 {
            warn!(
                "The column {:?} contains {} missing value(s).",
                column.name(),
                column.null_count()
            );
        }
        let name = column.name().to_owned();
        self.df.with_column(column).with_context(|| {
            format!(
                "Could not update the row ranges with the column {:?}",
                name
            )
        })?;
        self.inc_signature();
        Ok(())
    }
}

// subsetting
impl FeatureRanges {
    /// Keeps the features at the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> anyhow::Result<FeatureRanges> {
        let idx = IdxCa::from_vec("rows", rows.iter().map(|&r| r as IdxSize).collect());
        let df = self.df.take(&idx)?;
        Ok(FeatureRanges {
            df,
            id_column: self.id_column.clone(),
            has_ranges: self.has_ranges,
            signature: self.signature + 1,
        })
    }

    /// For every query id, the row of the feature with the same key, where the key
    /// of an id is computed by `key` on both sides. When several features share a
    /// key, the first one is used.
    pub fn match_ids<T: AsRef<str>, F>(
        &self,
        query: &[T],
        key: F,
    ) -> anyhow::Result<Vec<Option<usize>>>
    where
        F: Fn(&str) -> String,
    {
        let ids = self.ids()?;
        let mut index: HashMap<String, usize> = HashMap::with_capacity(ids.len());
        for (row, id) in ids.iter().enumerate() {
            index.entry(key(id.as_str())).or_insert(row);
        }
        Ok(query
            .iter()
            .map(|q| index.get(&key(q.as_ref())).copied())
            .collect())
    }

    /// The rows whose `column` value is one of `values`.
    pub fn rows_in<T: AsRef<str>>(&self, column: &str, values: &[T]) -> anyhow::Result<Vec<usize>> {
        let s = self.column(column)?.cast(&DataType::String)?;
        let mask = is_in(
            &s,
            &Series::new(
                "values",
                values.iter().map(|v| v.as_ref()).collect::<Vec<&str>>(),
            ),
        )?;
        Ok(mask
            .into_iter()
            .enumerate()
            .filter_map(|(i, b)| b.unwrap_or(false).then_some(i))
            .collect())
    }

    /// Keeps the features whose `column` value is one of `values`.
    pub fn filter_in<T: AsRef<str>>(
        &self,
        column: &str,
        values: &[T],
    ) -> anyhow::Result<FeatureRanges> {
        let rows = self.rows_in(column, values)?;
        if rows.is_empty() {
            warn!("The filtered row ranges are empty.")
        }
        self.take(&rows)
    }
}

// genes
impl FeatureRanges {
    /// Builds gene ranges from transcript ranges.
    ///
    /// The range of a gene spans all of its transcripts. Genes whose transcripts
    /// lie on more than one reference sequence or strand have no well defined
    /// range; they are dropped with a warning. Transcripts without a gene are
    /// ignored. Gene level attributes (`gene_name`, `gene_type`, `gene_biotype`)
    /// are carried over from the first transcript of each gene.
    ///
    /// ### Arguments
    ///
    /// * `gene_column`: the column holding the gene of each transcript. It
    ///   becomes the id column of the result.
    ///
    /// ### Returns
    ///
    /// The gene ranges, sorted by gene id.
    pub fn genes(&self, gene_column: &str) -> anyhow::Result<FeatureRanges> {
        if !self.has_ranges {
            bail!("The features have no coordinates; cannot build gene ranges.")
        }
        self.column(gene_column)?;

        let mut aggs = vec![
            col("seqname").n_unique().alias("n_seqname"),
            col("strand").n_unique().alias("n_strand"),
            col("seqname").first(),
            col("start").min(),
            col("end").max(),
            col("strand").first(),
        ];
        let mut keep = vec![
            col(gene_column),
            col("seqname"),
            col("start"),
            col("end"),
            col("strand"),
        ];
        for attr in ["gene_name", "gene_type", "gene_biotype"] {
            if self.is_column(attr) && attr != gene_column {
                aggs.push(col(attr).first());
                keep.push(col(attr));
            }
        }

        let grouped = self
            .df
            .clone()
            .lazy()
            .filter(col(gene_column).is_not_null())
            .group_by([col(gene_column)])
            .agg(aggs)
            .sort(gene_column, SortOptions::default())
            .collect()?;

        let df = grouped
            .clone()
            .lazy()
            .filter(col("n_seqname").eq(lit(1)).and(col("n_strand").eq(lit(1))))
            .select(keep)
            .collect()?;

        let n_dropped = grouped.height() - df.height();
        if n_dropped > 0 {
            warn!(
                "Dropped {} gene(s) whose transcripts lie on more than one seqname or strand.",
                n_dropped
            );
        }
        info!("Built the ranges of {} gene(s).", df.height());

        FeatureRanges::new(df, gene_column)
    }
}

// overlaps
impl FeatureRanges {
    /// Constructs rust-lappers (interval trees) over the features, one per
    /// `(seqname, strand)` pair, for fast overlap queries.
    ///
    /// ### Arguments
    ///
    /// * `ignore_strand`: if `true`, the features of a reference sequence share a single
    ///   lapper, keyed with the strand `"."`.
    ///
    /// ### Returns
    ///
    /// The lappers keyed by `[seqname, strand]`. The value of every interval is the
    /// row of its feature. As rust-lapper uses right-exclusive intervals, the stop of
    /// every interval is the (inclusive) end of its feature plus one.
    pub fn build_lappers(
        &self,
        ignore_strand: bool,
    ) -> anyhow::Result<HashMap<[String; 2], LapperType>> {
        if !self.has_ranges {
            bail!("The features have no coordinates; cannot search for overlaps.")
        }
        let start_time = std::time::Instant::now();

        type Iv = Interval<u64, usize>;
        let seqnames = self.df.column("seqname")?.str()?;
        let strands = self.df.column("strand")?.str()?;
        let starts = self.df.column("start")?.i64()?;
        let ends = self.df.column("end")?.i64()?;

        let mut lapper_tree_vec_hm: HashMap<[String; 2], Vec<Iv>> = HashMap::new();
        for (rid, (((seqn, strd), s), e)) in seqnames
            .into_no_null_iter()
            .zip(strands.into_no_null_iter())
            .zip(starts.into_no_null_iter())
            .zip(ends.into_no_null_iter())
            .enumerate()
        {
            let strd = if ignore_strand { "." } else { strd };
            lapper_tree_vec_hm
                .entry([seqn.to_string(), strd.to_string()])
                .or_default()
                .push(Iv {
                    start: s as u64,
                    stop: (e as u64).saturating_add(1),
                    val: rid,
                });
        }

        let lappers: HashMap<[String; 2], LapperType> = lapper_tree_vec_hm
            .into_iter()
            .map(|(k, v)| (k, Lapper::new(v)))
            .collect();

        debug!("build rust-lappers in {:?}", start_time.elapsed());
        Ok(lappers)
    }

    /// Finds the features overlapping a query range.
    ///
    /// A feature overlaps the query if they share at least one position on the same
    /// reference sequence and their strands are compatible: an unstranded (`*`)
    /// query or feature is compatible with both strands, and strands are not
    /// compared at all if `options.ignore_strand` is set.
    ///
    /// ### Returns
    ///
    /// The rows of the overlapping features, in increasing order.
    pub fn find_overlaps(
        &self,
        range: &GenomicRange,
        options: &OverlapOptions,
    ) -> anyhow::Result<Vec<usize>> {
        let lappers = self.build_lappers(options.ignore_strand)?;
        Ok(FeatureRanges::query_lappers(&lappers, range, options))
    }

    pub(crate) fn query_lappers(
        lappers: &HashMap<[String; 2], LapperType>,
        range: &GenomicRange,
        options: &OverlapOptions,
    ) -> Vec<usize> {
        let strands: Vec<&str> = if options.ignore_strand {
            vec!["."]
        } else {
            match range.strand {
                Strand::Unstranded => vec!["+", "-", "*"],
                Strand::Positive => vec!["+", "*"],
                Strand::Negative => vec!["-", "*"],
            }
        };

        let mut rows: HashSet<usize> = HashSet::new();
        for strd in strands {
            if let Some(lapper) = lappers.get(&[range.seqname.clone(), strd.to_string()]) {
                // rust-lapper queries are right-exclusive as well
                let stop = range.end.saturating_add(1);
                rows.extend(lapper.find(range.start, stop).map(|iv| iv.val));
            }
        }
        let mut rows: Vec<usize> = rows.into_iter().collect();
        rows.sort_unstable();
        rows
    }
}

impl std::fmt::Display for FeatureRanges {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_tx_ranges() -> FeatureRanges {
        let df = df!(
            "tx_name" => ["t1", "t2", "t3", "t4", "t5", "t6"],
            "seqname" => ["chr1", "chr1", "chr1", "chr2", "chr2", "chr3"],
            "start" => [1i64, 21, 101, 1, 51, 10],
            "end" => [30i64, 50, 150, 100, 150, 20],
            "strand" => ["+", "+", "-", "+", "-", "*"],
            "gene_id" => [Some("g1"), Some("g1"), Some("g2"), Some("g3"), Some("g3"), None],
            "gene_name" => ["A", "A", "B", "C", "C", "D"],
        )
        .unwrap();
        FeatureRanges::new(df, "tx_name").unwrap()
    }

    #[test]
    fn test_new() {
        let fr = toy_tx_ranges();
        assert_eq!(fr.len(), 6);
        assert!(fr.has_ranges());
        assert_eq!(fr.ids().unwrap()[..2], [String::from("t1"), String::from("t2")]);

        // partial coordinates
        let df = df!("tx_name" => ["t1"], "seqname" => ["chr1"]).unwrap();
        assert!(FeatureRanges::new(df, "tx_name").is_err());

        // start larger than end
        let df = df!(
            "tx_name" => ["t1"],
            "seqname" => ["chr1"],
            "start" => [10i64],
            "end" => [5i64],
            "strand" => ["+"],
        )
        .unwrap();
        assert!(FeatureRanges::new(df, "tx_name").is_err());

        // invalid strand
        let df = df!(
            "tx_name" => ["t1"],
            "seqname" => ["chr1"],
            "start" => [1i64],
            "end" => [5i64],
            "strand" => ["x"],
        )
        .unwrap();
        assert!(FeatureRanges::new(df, "tx_name").is_err());

        // duplicated ids
        assert!(FeatureRanges::ids_only(&["t1", "t1"], "tx_name").is_err());
        let fr = FeatureRanges::ids_only(&["t1", "t2"], "tx_name").unwrap();
        assert!(!fr.has_ranges());
        assert!(fr.genes("gene_id").is_err());
        assert!(fr.build_lappers(false).is_err());
    }

    #[test]
    fn test_build_lappers() {
        let fr = toy_tx_ranges();
        let lappers = fr.build_lappers(false).unwrap();
        assert_eq!(lappers.len(), 5);

        let chr1p = lappers.get(&["chr1".to_string(), "+".to_string()]).unwrap();
        assert_eq!(chr1p.find(31, 40).count(), 1);
        assert_eq!(chr1p.find(25, 26).count(), 2);
        // right exclusive: [51, 52) is past the end of t2
        assert_eq!(chr1p.find(51, 52).count(), 0);

        let lappers = fr.build_lappers(true).unwrap();
        assert_eq!(lappers.len(), 3);
        assert!(lappers.contains_key(&["chr1".to_string(), ".".to_string()]));
    }

    #[test]
    fn test_find_overlaps() {
        let fr = toy_tx_ranges();
        let any = OverlapOptions::default();

        let r: GenomicRange = "chr1:30-110".parse().unwrap();
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![0, 1, 2]);

        let r: GenomicRange = "chr1:30-110:+".parse().unwrap();
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![0, 1]);

        // the end position is inclusive
        let r: GenomicRange = "chr1:150-200:-".parse().unwrap();
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![2]);
        let r: GenomicRange = "chr1:151-200".parse().unwrap();
        assert!(fr.find_overlaps(&r, &any).unwrap().is_empty());

        // unstranded features match stranded queries
        let r: GenomicRange = "chr3:1-10:-".parse().unwrap();
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![5]);

        let r: GenomicRange = "chr2:60-70:+".parse().unwrap();
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![3]);
        assert_eq!(
            fr.find_overlaps(&r, &OverlapOptions::new(true)).unwrap(),
            vec![3, 4]
        );

        let r: GenomicRange = "chrY:1-1000".parse().unwrap();
        assert!(fr.find_overlaps(&r, &any).unwrap().is_empty());

        // ranges up to the largest coordinate
        let r = GenomicRange::new("chr1", 1, i64::MAX as u64, Strand::Unstranded).unwrap();
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![0, 1, 2]);
        let r = GenomicRange {
            seqname: String::from("chr1"),
            start: 50,
            end: u64::MAX,
            strand: Strand::Unstranded,
        };
        assert_eq!(fr.find_overlaps(&r, &any).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_genes() {
        let fr = toy_tx_ranges();
        let genes = fr.genes("gene_id").unwrap();
        // g3 spans both strands of chr2 and the transcript of chr3 has no gene
        assert_eq!(genes.ids().unwrap(), vec!["g1", "g2"]);
        assert_eq!(genes.id_column(), "gene_id");
        assert_eq!(
            genes.df().column("start").unwrap().i64().unwrap().get(0),
            Some(1)
        );
        assert_eq!(
            genes.df().column("end").unwrap().i64().unwrap().get(0),
            Some(50)
        );
        assert_eq!(
            genes.str_values("gene_name").unwrap(),
            vec![Some(String::from("A")), Some(String::from("B"))]
        );
    }

    #[test]
    fn test_subsetting() {
        let fr = toy_tx_ranges();
        let sub = fr.take(&[4, 0]).unwrap();
        assert_eq!(sub.ids().unwrap(), vec!["t5", "t1"]);
        assert!(sub.get_signature() > fr.get_signature());

        let g1 = fr.filter_in("gene_id", &["g1"]).unwrap();
        assert_eq!(g1.ids().unwrap(), vec!["t1", "t2"]);

        let m = fr
            .match_ids(&["t2.1", "t9.1", "t1.3"], |id| {
                crate::txmeta_utils::strip_version(id).to_string()
            })
            .unwrap();
        assert_eq!(m, vec![Some(1), None, Some(0)]);
    }

    #[test]
    fn test_update_column() {
        let mut fr = toy_tx_ranges();
        let sig = fr.get_signature();
        fr.update_column(Series::new("symbol", &["a", "a", "b", "c", "c", "d"]))
            .unwrap();
        assert!(fr.is_column("symbol"));
        assert_eq!(fr.get_signature(), sig + 1);

        assert!(fr
            .update_column(Series::new("start", &[1i64, 1, 1, 1, 1, 1]))
            .is_err());
        assert!(fr.update_column(Series::new("symbol", &["a"])).is_err());
    }
}
