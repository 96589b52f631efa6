use crate::txmeta_utils::QuantType;
use anyhow::{bail, Context};
use polars::prelude::DataFrame;
use std::path::PathBuf;
use tracing::warn;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// The strand of a genomic feature or query range.
///
/// `Unstranded` (`*`) is used for features without strand information and
/// for queries that should match features on either strand.
pub enum Strand {
    Positive,
    Negative,
    Unstranded,
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Strand::Positive => write!(f, "+"),
            Strand::Negative => write!(f, "-"),
            Strand::Unstranded => write!(f, "*"),
        }
    }
}

impl std::str::FromStr for Strand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Strand> {
        match s {
            "+" => Ok(Strand::Positive),
            "-" => Ok(Strand::Negative),
            "*" | "." => Ok(Strand::Unstranded),
            _ => bail!("Cannot parse {:?} as a strand; use one of +, - or *.", s),
        }
    }
}

/// An inclusive, 1-based genomic interval on a named reference sequence,
/// used to query the row ranges of an experiment.
///
/// # Fields
///
/// * `seqname`: the reference sequence (chromosome) name.
/// * `start`: the first position included in the range (1-based).
/// * `end`: the last position included in the range (1-based).
/// * `strand`: the strand of the query; [Strand::Unstranded] matches features on both strands.
///
/// A range can be parsed from the `seqname:start-end[:strand]` notation:
///
/// ```rust
/// use txmeta::options::{GenomicRange, Strand};
///
/// let r: GenomicRange = "chr1:10000-20000".parse().unwrap();
/// assert_eq!(r.seqname, "chr1");
/// assert_eq!((r.start, r.end), (10000, 20000));
/// assert_eq!(r.strand, Strand::Unstranded);
///
/// let r: GenomicRange = "chrX:1,000-2,000:-".parse().unwrap();
/// assert_eq!((r.start, r.end, r.strand), (1000, 2000, Strand::Negative));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenomicRange {
    pub seqname: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
}

impl GenomicRange {
    pub fn new<T: ToString>(
        seqname: T,
        start: u64,
        end: u64,
        strand: Strand,
    ) -> anyhow::Result<GenomicRange> {
        if start == 0 {
            bail!("Genomic ranges are 1-based; the start position cannot be 0.")
        }
        if start > end {
            bail!(
                "The start position ({}) of a range cannot be larger than its end position ({}).",
                start,
                end
            )
        }
        // feature coordinates are stored as i64
        if end > i64::MAX as u64 {
            bail!("The end position ({}) of a range is out of bounds.", end)
        }
        Ok(GenomicRange {
            seqname: seqname.to_string(),
            start,
            end,
            strand,
        })
    }
}

impl std::str::FromStr for GenomicRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<GenomicRange> {
        let mut parts = s.trim().split(':');
        let seqname = match parts.next() {
            Some(n) if !n.is_empty() => n,
            _ => bail!("Cannot parse {:?} as a genomic range: missing seqname.", s),
        };
        let Some(span) = parts.next() else {
            bail!(
                "Cannot parse {:?} as a genomic range; expected seqname:start-end[:strand].",
                s
            )
        };
        let strand = match parts.next() {
            Some(st) => st.parse::<Strand>()?,
            None => Strand::Unstranded,
        };
        if parts.next().is_some() {
            bail!("Cannot parse {:?} as a genomic range: too many fields.", s)
        }

        let Some((start, end)) = span.split_once('-') else {
            bail!("Cannot parse {:?} as a genomic range: missing end position.", s)
        };
        let start = start
            .replace(',', "")
            .parse::<u64>()
            .with_context(|| format!("Invalid start position in {:?}", s))?;
        let end = end
            .replace(',', "")
            .parse::<u64>()
            .with_context(|| format!("Invalid end position in {:?}", s))?;

        GenomicRange::new(seqname, start, end, strand)
    }
}

impl std::fmt::Display for GenomicRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.seqname, self.start, self.end, self.strand
        )
    }
}

#[derive(Copy, Clone, Debug, Default)]
/// Options for overlap queries against feature ranges.
///
/// * `ignore_strand`: if `true`, features on any strand overlap the query,
///   regardless of the strand of the query range. A query with
///   [Strand::Unstranded] always matches both strands.
pub struct OverlapOptions {
    pub ignore_strand: bool,
}

impl OverlapOptions {
    pub fn new(ignore_strand: bool) -> OverlapOptions {
        OverlapOptions { ignore_strand }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
/// Whether, and how, to derive the `counts` assay from the abundance
/// estimates instead of using the estimated read counts directly.
///
/// # Variants
///
/// * `No`: keep the estimated counts.
/// * `ScaledTpm`: abundances (TPM) scaled up to the library size of each sample.
/// * `LengthScaledTpm`: abundances multiplied by the average feature length across
///   samples, then scaled up to the library size of each sample.
pub enum CountsFromAbundance {
    #[default]
    No,
    ScaledTpm,
    LengthScaledTpm,
}

impl std::str::FromStr for CountsFromAbundance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<CountsFromAbundance> {
        let cfa = match s.to_lowercase().replace('_', "-").as_str() {
            "no" => CountsFromAbundance::No,
            "scaled-tpm" | "scaledtpm" => CountsFromAbundance::ScaledTpm,
            "length-scaled-tpm" | "lengthscaledtpm" => CountsFromAbundance::LengthScaledTpm,
            _ => bail!(
                "Cannot parse {:?}; use one of no, scaled-tpm or length-scaled-tpm.",
                s
            ),
        };
        Ok(cfa)
    }
}

impl std::fmt::Display for CountsFromAbundance {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CountsFromAbundance::No => write!(f, "no"),
            CountsFromAbundance::ScaledTpm => write!(f, "scaledTPM"),
            CountsFromAbundance::LengthScaledTpm => write!(f, "lengthScaledTPM"),
        }
    }
}

/// The names of the columns of a quantification file.
///
/// The defaults are the column names written by salmon (and piscem) to `quant.sf`.
/// They can be changed for tables following the same layout with other names.
///
/// # Examples
///
/// ```rust
/// use txmeta::options::QuantColumns;
///
/// let mut qc = QuantColumns::default();
/// assert_eq!(qc.counts, "NumReads");
/// qc.counts = String::from("est_counts");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QuantColumns {
    /// the transcript name column
    pub name: String,
    /// the transcript length column
    pub length: String,
    /// the effective (bias corrected) length column, imported as the `length` assay
    pub effective_length: String,
    /// the abundance column, imported as the `abundance` assay
    pub abundance: String,
    /// the estimated count column, imported as the `counts` assay
    pub counts: String,
}

impl Default for QuantColumns {
    fn default() -> QuantColumns {
        QuantColumns {
            name: String::from("Name"),
            length: String::from("Length"),
            effective_length: String::from("EffectiveLength"),
            abundance: String::from("TPM"),
            counts: String::from("NumReads"),
        }
    }
}

impl QuantColumns {
    /// All column names, the transcript name first.
    pub fn all(&self) -> [&str; 5] {
        [
            self.name.as_str(),
            self.length.as_str(),
            self.effective_length.as_str(),
            self.abundance.as_str(),
            self.counts.as_str(),
        ]
    }

    /// Checks that every column named here exists in `df`.
    /// If `is_bail` is set, a missing column is an error, otherwise
    /// the result is returned as a boolean, with a warning if `is_warn` is set.
    pub fn is_valid(&self, df: &DataFrame, is_warn: bool, is_bail: bool) -> anyhow::Result<bool> {
        let names = df.get_column_names();
        let missing: Vec<&str> = self
            .all()
            .into_iter()
            .filter(|c| !names.contains(c))
            .collect();

        if missing.is_empty() {
            return Ok(true);
        }
        if is_bail {
            bail!(
                "The quantification table is missing the column(s) {:?}; found {:?}.",
                missing,
                names
            )
        }
        if is_warn {
            warn!(
                "The quantification table is missing the column(s) {:?}.",
                missing
            )
        }
        Ok(false)
    }
}

/// Configuration of [import_quants](crate::import::import_quants).
///
/// # Fields
///
/// * `quant_type`: the tool that produced the quantification files.
/// * `quant_columns`: the column names of the quantification files.
/// * `counts_from_abundance`: how to populate the `counts` assay.
/// * `registry`: the directory of linked transcriptomes used to identify the
///   reference transcriptome from the index hash. Without it, no ranges are attached.
/// * `skip_meta`: skip reading `meta_info.json` and the transcriptome lookup entirely.
/// * `ignore_tx_version`: match quantified transcripts to the annotation ignoring version suffixes.
/// * `ignore_after_bar`: keep only the text before the first `|` of quantified transcript names.
#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    pub quant_type: QuantType,
    pub quant_columns: QuantColumns,
    pub counts_from_abundance: CountsFromAbundance,
    pub registry: Option<PathBuf>,
    pub skip_meta: bool,
    pub ignore_tx_version: bool,
    pub ignore_after_bar: bool,
}

impl ImportOptions {
    pub fn with_registry<P: Into<PathBuf>>(mut self, registry: P) -> ImportOptions {
        self.registry = Some(registry.into());
        self
    }
}

/// Configuration of [summarize_to_gene](crate::summarize::summarize_to_gene).
///
/// * `counts_from_abundance`: how to populate the gene-level `counts` assay.
/// * `gene_column`: the row metadata column holding the gene of each transcript,
///   used when no explicit transcript-to-gene table is given.
#[derive(Clone, Debug)]
pub struct SummarizeOptions {
    pub counts_from_abundance: CountsFromAbundance,
    pub gene_column: String,
}

impl Default for SummarizeOptions {
    fn default() -> SummarizeOptions {
        SummarizeOptions {
            counts_from_abundance: CountsFromAbundance::No,
            gene_column: String::from("gene_id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_parse_range() {
        let r: GenomicRange = "chr1:100-200:+".parse().unwrap();
        assert_eq!(r, GenomicRange::new("chr1", 100, 200, Strand::Positive).unwrap());
        assert_eq!(r.to_string(), "chr1:100-200:+");

        assert!("chr1".parse::<GenomicRange>().is_err());
        assert!("chr1:200-100".parse::<GenomicRange>().is_err());
        assert!("chr1:0-100".parse::<GenomicRange>().is_err());
        assert!("chr1:1-100:x".parse::<GenomicRange>().is_err());
        assert!("chr1:a-100".parse::<GenomicRange>().is_err());
        assert!("chr1:1-18446744073709551615".parse::<GenomicRange>().is_err());
        assert!(GenomicRange::new("chr1", 1, i64::MAX as u64, Strand::Unstranded).is_ok());
    }

    #[test]
    fn test_counts_from_abundance() {
        assert_eq!(
            "lengthScaledTPM".parse::<CountsFromAbundance>().unwrap(),
            CountsFromAbundance::LengthScaledTpm
        );
        assert_eq!(
            "scaled_tpm".parse::<CountsFromAbundance>().unwrap(),
            CountsFromAbundance::ScaledTpm
        );
        assert_eq!(CountsFromAbundance::default(), CountsFromAbundance::No);
        assert!("dtuScaledTPM".parse::<CountsFromAbundance>().is_err());
    }

    #[test]
    fn test_quant_columns() {
        let df = df!(
            "Name" => ["t1"],
            "Length" => [100i64],
            "EffectiveLength" => [80.0],
            "TPM" => [1.0],
            "NumReads" => [3.0],
        )
        .unwrap();
        let qc = QuantColumns::default();
        assert!(qc.is_valid(&df, false, true).unwrap());

        let df = df.drop("TPM").unwrap();
        assert!(!qc.is_valid(&df, false, false).unwrap());
        assert!(qc.is_valid(&df, false, true).is_err());
    }
}
