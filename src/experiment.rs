use crate::coldata::ColData;
use crate::options::{CountsFromAbundance, GenomicRange, OverlapOptions};
use crate::ranges::FeatureRanges;
use crate::reader::{IdMap, MetaInfo};
use crate::txmeta_utils::{read_delimited, strip_version as strip, QuantType};
use crate::txome::TxomeInfo;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use polars::{lazy::prelude::*, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{info, warn};

pub const COUNTS: &str = "counts";
pub const ABUNDANCE: &str = "abundance";
pub const LENGTH: &str = "length";

/// The file holding the level order of the sample factors in a written experiment.
pub const COL_DATA_LEVELS: &str = "col_data_levels.json";

/// Whether the rows of an experiment are transcripts or genes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureLevel {
    Transcript,
    Gene,
}

impl std::fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FeatureLevel::Transcript => write!(f, "transcript"),
            FeatureLevel::Gene => write!(f, "gene"),
        }
    }
}

/// The quantification of one sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    pub name: String,
    pub file: String,
    pub meta_info: Option<MetaInfo>,
}

/// The provenance of an experiment.
///
/// * `quant_type`: the tool that produced the quantifications.
/// * `txome_info`: the identified reference transcriptome, if any.
/// * `quant_info`: one entry per sample, aligned with the samples of the experiment.
/// * `counts_from_abundance`: how the `counts` assay was derived.
/// * `level`: whether the rows are transcripts or genes.
/// * `import_time`: when the quantifications were imported.
/// * `version`: the version of this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub quant_type: String,
    pub txome_info: Option<TxomeInfo>,
    pub quant_info: Vec<SampleInfo>,
    pub counts_from_abundance: String,
    pub level: FeatureLevel,
    pub import_time: DateTime<Utc>,
    pub version: String,
}

impl Metadata {
    pub fn new(
        quant_type: QuantType,
        counts_from_abundance: CountsFromAbundance,
        level: FeatureLevel,
    ) -> Metadata {
        Metadata {
            quant_type: quant_type.to_string(),
            txome_info: None,
            quant_info: Vec::new(),
            counts_from_abundance: counts_from_abundance.to_string(),
            level,
            import_time: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// An annotated feature-by-sample matrix.
///
/// An experiment bundles one or more numeric matrices (*assays*) sharing the same
/// rows and columns with
/// * the *row ranges*: the id, genomic location and attributes of every row (feature);
/// * the *column data*: the attributes of every column (sample);
/// * the *metadata*: where the quantifications come from.
///
/// Each assay is a [DataFrame] with one `Float64` column per sample, named after
/// the sample. The imported assays are `counts`, `abundance` and `length`, in that order.
///
/// All parts are kept aligned: every subsetting operation returns a new experiment
/// whose assays, row ranges, column data and per-sample metadata were subset together.
#[derive(Clone, Debug)]
pub struct RangedExperiment {
    assays: Vec<(String, DataFrame)>,
    row_ranges: FeatureRanges,
    col_data: ColData,
    metadata: Metadata,
}

impl RangedExperiment {
    /// Bundles the parts of an experiment, after checking that they are aligned.
    ///
    /// ### Arguments
    ///
    /// * `assays`: the named matrices, in display order. Names must be unique.
    /// * `row_ranges`: one row per assay row.
    /// * `col_data`: one row per assay column; the sample names must equal the
    ///   assay column names, in the same order.
    /// * `metadata`: the provenance; it must describe every sample if it describes any.
    ///
    /// ### Returns
    ///
    /// Returns an error if there is no assay, if an assay has a non-float column or if
    /// any dimension does not line up.
    pub fn new(
        assays: Vec<(String, DataFrame)>,
        row_ranges: FeatureRanges,
        col_data: ColData,
        metadata: Metadata,
    ) -> anyhow::Result<RangedExperiment> {
        if assays.is_empty() {
            bail!("An experiment needs at least one assay.")
        }
        let names = col_data.names()?;
        let mut seen = HashSet::new();
        for (name, df) in assays.iter() {
            if !seen.insert(name.as_str()) {
                bail!("The assay {:?} is given more than once.", name)
            }
            // a frame without columns has no height
            if df.width() > 0 && df.height() != row_ranges.len() {
                bail!(
                    "The assay {:?} has {} rows but there are {} features.",
                    name,
                    df.height(),
                    row_ranges.len()
                )
            }
            if df.get_column_names() != names {
                bail!(
                    "The columns of the assay {:?} ({:?}) do not match the samples ({:?}).",
                    name,
                    df.get_column_names(),
                    names
                )
            }
            if let Some(s) = df
                .get_columns()
                .iter()
                .find(|s| s.dtype() != &DataType::Float64)
            {
                bail!(
                    "The column {:?} of the assay {:?} is {} instead of f64.",
                    s.name(),
                    name,
                    s.dtype()
                )
            }
        }
        if !metadata.quant_info.is_empty() {
            let qnames: Vec<&str> = metadata.quant_info.iter().map(|q| q.name.as_str()).collect();
            if qnames != names {
                bail!("The per-sample metadata does not match the samples of the experiment.")
            }
        }

        Ok(RangedExperiment {
            assays,
            row_ranges,
            col_data,
            metadata,
        })
    }

    /// `(number of features, number of samples)`
    pub fn dim(&self) -> (usize, usize) {
        (self.row_ranges.len(), self.col_data.len())
    }

    pub fn assay(&self, name: &str) -> anyhow::Result<&DataFrame> {
        match self.assays.iter().find(|(n, _)| n == name) {
            Some((_, df)) => Ok(df),
            None => bail!(
                "There is no assay {:?}; found {:?}",
                name,
                self.assay_names()
            ),
        }
    }

    pub fn assay_names(&self) -> Vec<&str> {
        self.assays.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// An assay as one vector of values per sample.
    pub fn assay_columns(&self, name: &str) -> anyhow::Result<Vec<Vec<f64>>> {
        self.assay(name)?
            .get_columns()
            .iter()
            .map(|s| -> anyhow::Result<Vec<f64>> {
                Ok(s.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            })
            .collect()
    }

    pub fn row_ranges(&self) -> &FeatureRanges {
        &self.row_ranges
    }

    pub fn col_data(&self) -> &ColData {
        &self.col_data
    }

    pub fn col_data_mut(&mut self) -> &mut ColData {
        &mut self.col_data
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The feature ids.
    pub fn row_names(&self) -> anyhow::Result<Vec<String>> {
        self.row_ranges.ids()
    }

    /// The sample names.
    pub fn col_names(&self) -> anyhow::Result<Vec<String>> {
        self.col_data.names()
    }
}

// subsetting
impl RangedExperiment {
    /// Keeps the features at the given rows, in the given order.
    pub fn subset_rows(&self, rows: &[usize]) -> anyhow::Result<RangedExperiment> {
        let idx = IdxCa::from_vec("rows", rows.iter().map(|&r| r as IdxSize).collect());
        let assays = self
            .assays
            .iter()
            .map(|(n, df)| -> anyhow::Result<(String, DataFrame)> {
                Ok((n.clone(), df.take(&idx)?))
            })
            .collect::<anyhow::Result<Vec<(String, DataFrame)>>>()?;

        RangedExperiment::new(
            assays,
            self.row_ranges.take(rows)?,
            self.col_data.clone(),
            self.metadata.clone(),
        )
    }

    /// Keeps the features overlapping a genomic range.
    ///
    /// ### Arguments
    ///
    /// * `range`: the query range, 1-based and inclusive.
    /// * `options`: whether to ignore the strand of the features.
    ///
    /// ### Returns
    ///
    /// The subset experiment. Features keep their relative order, so subsetting twice by
    /// the same range gives back the same experiment. An empty result is not an error,
    /// but raises a warning. It is an error if the features have no genomic coordinates.
    ///
    /// ### Example
    ///
    /// ```no_run
    /// # fn run(se: txmeta::experiment::RangedExperiment) -> anyhow::Result<()> {
    /// use txmeta::options::{GenomicRange, OverlapOptions};
    ///
    /// let region: GenomicRange = "chr1:10000000-11000000".parse()?;
    /// let sub = se.subset_by_overlaps(&region, &OverlapOptions::default())?;
    /// println!("{}", sub);
    /// # Ok(())
    /// # }
    /// ```
    pub fn subset_by_overlaps(
        &self,
        range: &GenomicRange,
        options: &OverlapOptions,
    ) -> anyhow::Result<RangedExperiment> {
        let rows = self
            .row_ranges
            .find_overlaps(range, options)
            .with_context(|| format!("Could not subset the experiment by {}", range))?;
        if rows.is_empty() {
            warn!("No feature overlaps {}.", range)
        } else {
            info!("{} feature(s) overlap {}.", rows.len(), range)
        }
        self.subset_rows(&rows)
    }

    /// Keeps the features overlapping any of the `ranges`, in their original order.
    /// A feature overlapping several ranges is kept once. No range keeps every feature.
    pub fn subset_by_any_overlap(
        &self,
        ranges: &[GenomicRange],
        options: &OverlapOptions,
    ) -> anyhow::Result<RangedExperiment> {
        match ranges {
            [] => Ok(self.clone()),
            [range] => self.subset_by_overlaps(range, options),
            _ => {
                let lappers = self.row_ranges.build_lappers(options.ignore_strand)?;
                let mut rows: Vec<usize> = ranges
                    .iter()
                    .flat_map(|r| FeatureRanges::query_lappers(&lappers, r, options))
                    .collect();
                rows.sort_unstable();
                rows.dedup();
                if rows.is_empty() {
                    warn!("No feature overlaps any of the {} ranges.", ranges.len())
                } else {
                    info!(
                        "{} feature(s) overlap the {} ranges.",
                        rows.len(),
                        ranges.len()
                    )
                }
                self.subset_rows(&rows)
            }
        }
    }

    /// Keeps the samples whose entry in `mask` is `true`.
    pub fn subset_samples(&self, mask: &[bool]) -> anyhow::Result<RangedExperiment> {
        let col_data = self.col_data.filter(mask)?;
        let keep = col_data.names()?;

        let assays = self
            .assays
            .iter()
            .map(|(n, df)| -> anyhow::Result<(String, DataFrame)> {
                Ok((n.clone(), df.select(&keep)?))
            })
            .collect::<anyhow::Result<Vec<(String, DataFrame)>>>()?;

        let mut metadata = self.metadata.clone();
        if !metadata.quant_info.is_empty() {
            metadata.quant_info = metadata
                .quant_info
                .into_iter()
                .zip(mask.iter())
                .filter_map(|(q, &k)| k.then_some(q))
                .collect();
        }

        RangedExperiment::new(assays, self.row_ranges.clone(), col_data, metadata)
    }

    /// Keeps the samples whose `column` value is one of `values`.
    pub fn filter_samples<T: AsRef<str>>(
        &self,
        column: &str,
        values: &[T],
    ) -> anyhow::Result<RangedExperiment> {
        self.subset_samples(&self.col_data.mask_in(column, values)?)
    }

    /// Keeps the samples matching every `(column, value)` filter. Values given for
    /// the same column are alternatives; different columns must all match.
    pub fn filter_samples_by<K: AsRef<str>, V: AsRef<str>>(
        &self,
        filters: &[(K, V)],
    ) -> anyhow::Result<RangedExperiment> {
        let mut by_column: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (column, value) in filters.iter() {
            by_column
                .entry(column.as_ref())
                .or_default()
                .push(value.as_ref());
        }

        let mut mask = vec![true; self.col_data.len()];
        for (column, values) in by_column {
            let m = self.col_data.mask_in(column, &values)?;
            mask.iter_mut().zip(m).for_each(|(k, b)| *k &= b);
        }
        if !mask.iter().any(|&k| k) {
            let shown: Vec<String> = filters
                .iter()
                .map(|(c, v)| format!("{}={}", c.as_ref(), v.as_ref()))
                .collect();
            warn!("No sample matches the filters {:?}.", shown);
        }
        self.subset_samples(&mask)
    }

    /// Keeps the samples for which a polars predicate over the column data holds,
    /// e.g. `col("condition").eq(lit("trt"))`.
    pub fn filter_samples_expr(&self, predicate: Expr) -> anyhow::Result<RangedExperiment> {
        self.subset_samples(&self.col_data.mask_expr(predicate)?)
    }
}

// annotation and output
impl RangedExperiment {
    /// Attaches an alternate identifier to every feature as the row metadata column `column`.
    ///
    /// ### Arguments
    ///
    /// * `id_map`: the mapping from the current identifiers to the new ones. When a key maps
    ///   to several values, the first one is used.
    /// * `column`: the name of the new column.
    /// * `gene`: if `true`, the features are looked up by their `gene_id` column, otherwise by
    ///   their feature id. At the gene level both are the same.
    /// * `strip_version`: look up identifiers without their version suffix
    ///   (`ENSG00000141510.18` is looked up as `ENSG00000141510`).
    ///
    /// Features without a mapping get a missing value.
    pub fn add_ids(
        &mut self,
        id_map: &IdMap,
        column: &str,
        gene: bool,
        strip_version: bool,
    ) -> anyhow::Result<()> {
        let keys = if gene && self.metadata.level == FeatureLevel::Transcript {
            self.row_ranges
                .str_values("gene_id")
                .context("Looking up alternate identifiers by gene requires a gene_id column")?
        } else {
            self.row_ranges.ids()?.into_iter().map(Some).collect()
        };

        let values: Vec<Option<&str>> = keys
            .iter()
            .map(|k| {
                k.as_deref().and_then(|k| {
                    let k = if strip_version { strip(k) } else { k };
                    id_map.get(k)
                })
            })
            .collect();

        let n_missing = values.iter().filter(|v| v.is_none()).count();
        if n_missing == values.len() && !values.is_empty() {
            warn!(
                "None of the {} feature(s) could be mapped to {:?}; check the key type and `strip_version`.",
                values.len(),
                column
            );
        } else {
            info!(
                "Mapped {} of {} feature(s) to {:?}.",
                values.len() - n_missing,
                values.len(),
                column
            );
        }

        // a null-only column is still written as strings
        let s = Series::new(column, values).cast(&DataType::String)?;
        self.row_ranges.update_column(s)
    }

    /// Writes the experiment into `dir`:
    /// * `<assay>.tsv` for every assay, with the feature ids as first column;
    /// * `row_data.tsv`, `col_data.tsv`;
    /// * `col_data_levels.json`, the level order of every sample factor;
    /// * `metadata.json`.
    pub fn write<T: AsRef<Path>>(&self, dir: T) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create the output directory {:?}", dir))?;

        let id_df = self
            .row_ranges
            .df()
            .select([self.row_ranges.id_column()])?;
        for (name, df) in self.assays.iter() {
            let mut out_df = id_df.hstack(df.get_columns())?;
            write_tsv(&mut out_df, dir.join(format!("{}.tsv", name)))?;
        }
        write_tsv(&mut self.row_ranges.df().clone(), dir.join("row_data.tsv"))?;
        write_tsv(&mut self.col_data.df().clone(), dir.join("col_data.tsv"))?;

        let file = fs::File::create(dir.join(COL_DATA_LEVELS))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.col_data.factor_levels())?;

        let file = fs::File::create(dir.join("metadata.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.metadata)?;

        info!("Wrote the experiment to {:?}", dir);
        Ok(())
    }
}

/// Reads back the column data of an experiment written by
/// [write](RangedExperiment::write), with its factors and their level order.
pub fn read_col_data<T: AsRef<Path>>(dir: T) -> anyhow::Result<ColData> {
    let dir = dir.as_ref();
    let mut col_data = ColData::new(read_delimited(dir.join("col_data.tsv"))?)?;
    let levels_path = dir.join(COL_DATA_LEVELS);
    if levels_path.exists() {
        let file = fs::File::open(&levels_path)
            .with_context(|| format!("Could not open {:?}", levels_path))?;
        let levels: BTreeMap<String, Vec<String>> =
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Could not parse {:?}", levels_path))?;
        col_data.set_factor_levels(&levels)?;
    }
    Ok(col_data)
}

/// Builds an assay frame from one vector of values per sample.
pub(crate) fn assay_frame(samples: &[String], columns: Vec<Vec<f64>>) -> anyhow::Result<DataFrame> {
    if samples.len() != columns.len() {
        bail!(
            "Got {} assay columns for {} samples.",
            columns.len(),
            samples.len()
        )
    }
    let series: Vec<Series> = samples
        .iter()
        .zip(columns)
        .map(|(n, c)| Series::new(n.as_str(), c))
        .collect();
    Ok(DataFrame::new(series)?)
}

fn write_tsv<T: AsRef<Path>>(df: &mut DataFrame, file_path: T) -> anyhow::Result<()> {
    let file = fs::File::create(file_path.as_ref())
        .with_context(|| format!("Could not create {:?}", file_path.as_ref()))?;
    let mut file = BufWriter::with_capacity(4194304, file);
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .with_null_value("NA".to_string())
        .finish(df)?;
    Ok(())
}

// a few names from both ends of a long list
fn abbreviate(names: &[String]) -> String {
    if names.len() <= 6 {
        names.join(" ")
    } else {
        format!(
            "{} ... {}",
            names[..3].join(" "),
            names[names.len() - 2..].join(" ")
        )
    }
}

impl std::fmt::Display for RangedExperiment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (nrow, ncol) = self.dim();
        let row_names = self.row_names().unwrap_or_default();
        let col_names = self.col_names().unwrap_or_default();
        let row_data: Vec<String> = self
            .row_ranges
            .df()
            .get_column_names()
            .into_iter()
            .filter(|c| *c != self.row_ranges.id_column())
            .map(|c| c.to_string())
            .collect();
        let col_data: Vec<String> = self
            .col_data
            .df()
            .get_column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();

        writeln!(f, "class: RangedExperiment")?;
        writeln!(f, "dim: {} {}", nrow, ncol)?;
        write!(
            f,
            "metadata: level={} quant_type={} counts_from_abundance={}",
            self.metadata.level, self.metadata.quant_type, self.metadata.counts_from_abundance
        )?;
        match &self.metadata.txome_info {
            Some(t) => writeln!(
                f,
                " txome={} {} {} ({})",
                t.source, t.organism, t.release, t.genome
            )?,
            None => writeln!(f, " txome=NA")?,
        }
        writeln!(
            f,
            "assays({}): {}",
            self.assays.len(),
            self.assay_names().join(" ")
        )?;
        writeln!(f, "rownames({}): {}", nrow, abbreviate(&row_names))?;
        writeln!(
            f,
            "rowData names({}): {}",
            row_data.len(),
            abbreviate(&row_data)
        )?;
        writeln!(f, "colnames({}): {}", ncol, abbreviate(&col_names))?;
        write!(
            f,
            "colData names({}): {}",
            col_data.len(),
            abbreviate(&col_data)
        )?;
        for (column, levels) in self.col_data.factor_levels() {
            write!(f, "\nfactor {}: Levels: {}", column, levels.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn toy_experiment() -> RangedExperiment {
        let row_ranges = FeatureRanges::new(
            df!(
                "tx_name" => ["t1.1", "t2.1", "t3.2", "t4.1"],
                "seqname" => ["chr1", "chr1", "chr1", "chr2"],
                "start" => [1i64, 21, 101, 1],
                "end" => [30i64, 50, 150, 100],
                "strand" => ["+", "+", "-", "+"],
                "gene_id" => ["g1.3", "g1.3", "g2.1", "g3.1"],
            )
            .unwrap(),
            "tx_name",
        )
        .unwrap();
        let col_data = ColData::new(
            df!(
                "names" => ["s1", "s2", "s3"],
                "condition" => ["untrt", "trt", "trt"],
            )
            .unwrap(),
        )
        .unwrap();
        let counts = df!(
            "s1" => [10.0, 0.0, 5.0, 1.0],
            "s2" => [20.0, 2.0, 0.0, 3.0],
            "s3" => [30.0, 4.0, 1.0, 0.0],
        )
        .unwrap();
        let abundance = df!(
            "s1" => [100.0, 0.0, 50.0, 10.0],
            "s2" => [200.0, 20.0, 0.0, 30.0],
            "s3" => [300.0, 40.0, 10.0, 0.0],
        )
        .unwrap();
        let mut metadata = Metadata::new(
            QuantType::Salmon,
            CountsFromAbundance::No,
            FeatureLevel::Transcript,
        );
        metadata.quant_info = ["s1", "s2", "s3"]
            .iter()
            .map(|n| SampleInfo {
                name: n.to_string(),
                file: format!("quants/{}/quant.sf.gz", n),
                meta_info: None,
            })
            .collect();

        RangedExperiment::new(
            vec![
                (COUNTS.to_string(), counts),
                (ABUNDANCE.to_string(), abundance),
            ],
            row_ranges,
            col_data,
            metadata,
        )
        .unwrap()
    }

    fn same(a: &RangedExperiment, b: &RangedExperiment) -> bool {
        a.row_names().unwrap() == b.row_names().unwrap()
            && a.col_names().unwrap() == b.col_names().unwrap()
            && a.assay(COUNTS).unwrap().equals(b.assay(COUNTS).unwrap())
            && a.metadata() == b.metadata()
    }

    #[test]
    fn test_new() {
        let se = toy_experiment();
        assert_eq!(se.dim(), (4, 3));
        assert_eq!(se.assay_names(), vec!["counts", "abundance"]);
        assert_eq!(se.assay_columns(COUNTS).unwrap()[1], vec![20.0, 2.0, 0.0, 3.0]);
        assert!(se.assay(LENGTH).is_err());

        let ok = RangedExperiment::new(
            vec![(COUNTS.to_string(), df!("s2" => [1.0, 1.0, 1.0, 1.0]).unwrap())],
            se.row_ranges().clone(),
            se.col_data().filter(&[false, true, false]).unwrap(),
            Metadata::new(QuantType::Salmon, CountsFromAbundance::No, FeatureLevel::Transcript),
        );
        assert!(ok.is_ok());
        // misaligned columns
        let bad = RangedExperiment::new(
            vec![(COUNTS.to_string(), df!("s1" => [1.0, 1.0, 1.0, 1.0]).unwrap())],
            se.row_ranges().clone(),
            se.col_data().filter(&[false, true, false]).unwrap(),
            Metadata::new(QuantType::Salmon, CountsFromAbundance::No, FeatureLevel::Transcript),
        );
        assert!(bad.is_err());
        // misaligned rows
        let bad = RangedExperiment::new(
            vec![(COUNTS.to_string(), df!("s2" => [1.0]).unwrap())],
            se.row_ranges().clone(),
            se.col_data().filter(&[false, true, false]).unwrap(),
            Metadata::new(QuantType::Salmon, CountsFromAbundance::No, FeatureLevel::Transcript),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_subset_by_overlaps() {
        let se = toy_experiment();
        let region: GenomicRange = "chr1:25-120".parse().unwrap();
        let opts = OverlapOptions::default();

        let sub = se.subset_by_overlaps(&region, &opts).unwrap();
        assert_eq!(sub.row_names().unwrap(), vec!["t1.1", "t2.1", "t3.2"]);
        assert_eq!(sub.dim(), (3, 3));
        assert_eq!(sub.assay_columns(ABUNDANCE).unwrap()[0], vec![100.0, 0.0, 50.0]);

        // idempotent
        let again = sub.subset_by_overlaps(&region, &opts).unwrap();
        assert!(same(&sub, &again));

        let none = se
            .subset_by_overlaps(&"chrM:1-10".parse().unwrap(), &opts)
            .unwrap();
        assert_eq!(none.dim(), (0, 3));
    }

    #[test]
    fn test_subset_samples() {
        let se = toy_experiment();
        let trt = se.filter_samples("condition", &["trt"]).unwrap();
        assert_eq!(trt.col_names().unwrap(), vec!["s2", "s3"]);
        assert_eq!(trt.metadata().quant_info.len(), 2);
        assert_eq!(trt.metadata().quant_info[0].name, "s2");
        assert_eq!(trt.assay_columns(COUNTS).unwrap()[0], vec![20.0, 2.0, 0.0, 3.0]);

        // idempotent
        let again = trt.filter_samples("condition", &["trt"]).unwrap();
        assert!(same(&trt, &again));

        let by_expr = se
            .filter_samples_expr(col("condition").eq(lit("trt")))
            .unwrap();
        assert!(same(&trt, &by_expr));

        assert!(se.subset_samples(&[true, false]).is_err());
    }

    #[test]
    fn test_subsets_commute() {
        let se = toy_experiment();
        let region: GenomicRange = "chr1:1-60:+".parse().unwrap();
        let opts = OverlapOptions::default();

        let a = se
            .subset_by_overlaps(&region, &opts)
            .unwrap()
            .filter_samples("condition", &["trt"])
            .unwrap();
        let b = se
            .filter_samples("condition", &["trt"])
            .unwrap()
            .subset_by_overlaps(&region, &opts)
            .unwrap();
        assert!(same(&a, &b));
        assert_eq!(a.dim(), (2, 2));
    }

    #[test]
    fn test_subset_by_any_overlap() {
        let se = toy_experiment();
        let opts = OverlapOptions::default();
        let regions: Vec<GenomicRange> = vec![
            "chr2:50-60".parse().unwrap(),
            "chr1:40-120".parse().unwrap(),
            "chr1:25-45:+".parse().unwrap(),
        ];

        // overlapping regions keep each feature once, in row order
        let sub = se.subset_by_any_overlap(&regions, &opts).unwrap();
        assert_eq!(sub.row_names().unwrap(), vec!["t1.1", "t2.1", "t3.2", "t4.1"]);

        let sub = se.subset_by_any_overlap(&regions[1..], &opts).unwrap();
        assert_eq!(sub.row_names().unwrap(), vec!["t1.1", "t2.1", "t3.2"]);
        assert_eq!(sub.assay_columns(COUNTS).unwrap()[0], vec![10.0, 0.0, 5.0]);

        let single = se.subset_by_any_overlap(&regions[..1], &opts).unwrap();
        assert!(same(
            &single,
            &se.subset_by_overlaps(&regions[0], &opts).unwrap()
        ));
        assert!(same(&se.subset_by_any_overlap(&[], &opts).unwrap(), &se));

        let none: Vec<GenomicRange> =
            vec!["chrM:1-10".parse().unwrap(), "chr1:200-300".parse().unwrap()];
        assert_eq!(se.subset_by_any_overlap(&none, &opts).unwrap().dim(), (0, 3));
    }

    #[test]
    fn test_filter_samples_by() {
        let mut se = toy_experiment();
        let batch = Series::new("batch", ["b1", "b2", "b2"]);
        let col_data = ColData::new(se.col_data().df().hstack(&[batch]).unwrap()).unwrap();
        *se.col_data_mut() = col_data;

        // alternatives within a column
        let both = se
            .filter_samples_by(&[("condition", "trt"), ("condition", "untrt")])
            .unwrap();
        assert_eq!(both.col_names().unwrap(), vec!["s1", "s2", "s3"]);

        // and across columns
        let sub = se
            .filter_samples_by(&[("condition", "untrt"), ("batch", "b2"), ("condition", "trt")])
            .unwrap();
        assert_eq!(sub.col_names().unwrap(), vec!["s2", "s3"]);
        let sub = se
            .filter_samples_by(&[("condition", "untrt"), ("batch", "b2")])
            .unwrap();
        assert_eq!(sub.dim(), (4, 0));

        let no_filter: [(&str, &str); 0] = [];
        assert!(same(&se.filter_samples_by(&no_filter).unwrap(), &se));
        assert!(se.filter_samples_by(&[("dex", "trt")]).is_err());
    }

    #[test]
    fn test_add_ids() {
        let mut se = toy_experiment();
        let idm = IdMap::from_pairs(&[("g1", "TP53"), ("g2", "BRCA1"), ("g1", "P53")]);

        se.add_ids(&idm, "symbol", true, true).unwrap();
        assert_eq!(
            se.row_ranges().str_values("symbol").unwrap(),
            vec![
                Some(String::from("TP53")),
                Some(String::from("TP53")),
                Some(String::from("BRCA1")),
                None
            ]
        );

        // versions kept: nothing maps
        se.add_ids(&idm, "symbol2", true, false).unwrap();
        assert_eq!(se.row_ranges().column("symbol2").unwrap().null_count(), 4);

        let txm = IdMap::from_pairs(&[("t4", "ENST4")]);
        se.add_ids(&txm, "tx_alias", false, true).unwrap();
        assert_eq!(
            se.row_ranges().str_values("tx_alias").unwrap()[3].as_deref(),
            Some("ENST4")
        );
    }

    #[test]
    fn test_display_and_write() {
        let mut se = toy_experiment();
        se.col_data_mut().relevel("condition", "untrt").unwrap();
        let s = se.to_string();
        assert!(s.contains("dim: 4 3"));
        assert!(s.contains("assays(2): counts abundance"));
        assert!(s.contains("colnames(3): s1 s2 s3"));
        assert!(s.ends_with("factor condition: Levels: untrt trt"));

        let dir = std::env::temp_dir().join(format!("txmeta-exp-write-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        se.write(&dir).unwrap();
        for f in [
            "counts.tsv",
            "abundance.tsv",
            "row_data.tsv",
            "col_data.tsv",
            COL_DATA_LEVELS,
            "metadata.json",
        ] {
            assert!(dir.join(f).exists(), "{} is missing", f);
        }
        let counts = fs::read_to_string(dir.join("counts.tsv")).unwrap();
        assert!(counts.starts_with("tx_name\ts1\ts2\ts3\n"));

        let md: Metadata =
            serde_json::from_reader(fs::File::open(dir.join("metadata.json")).unwrap()).unwrap();
        assert_eq!(&md, se.metadata());

        // the reference level set before writing is read back
        let cd = read_col_data(&dir).unwrap();
        assert_eq!(cd.names().unwrap(), vec!["s1", "s2", "s3"]);
        assert_eq!(cd.factor("condition").unwrap().levels(), &["untrt", "trt"]);
        assert_eq!(cd.factor("condition").unwrap().reference(), Some("untrt"));
        fs::remove_dir_all(&dir).unwrap();
    }
}
