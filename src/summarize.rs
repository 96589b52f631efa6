use crate::coldata::ColData;
use crate::experiment::{assay_frame, FeatureLevel, RangedExperiment, ABUNDANCE, COUNTS, LENGTH};
use crate::import::{counts_from_abundance, import_quants};
use crate::options::{CountsFromAbundance, ImportOptions, SummarizeOptions};
use crate::ranges::FeatureRanges;
use crate::txmeta_utils::read_delimited;
use anyhow::{bail, Context};
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// An explicit transcript-to-gene table.
#[derive(Clone, Debug, Default)]
pub struct Tx2Gene {
    map: HashMap<String, String>,
}

impl Tx2Gene {
    /// Builds the table from `(transcript, gene)` pairs. A transcript listed twice
    /// keeps its first gene.
    pub fn from_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Tx2Gene {
        let mut map = HashMap::with_capacity(pairs.len());
        for (t, g) in pairs {
            map.entry(t.as_ref().to_string())
                .or_insert_with(|| g.as_ref().to_string());
        }
        Tx2Gene { map }
    }

    /// Reads a table whose first column holds transcript ids and whose second
    /// column holds gene ids, whatever their names.
    pub fn from_path<T: AsRef<Path>>(path: T) -> anyhow::Result<Tx2Gene> {
        let df = read_delimited(path.as_ref())?;
        if df.width() < 2 {
            bail!(
                "The transcript-to-gene table {:?} needs two columns; found {:?}",
                path.as_ref(),
                df.get_column_names()
            )
        }
        let tx = df.get_columns()[0].cast(&DataType::String)?;
        let gene = df.get_columns()[1].cast(&DataType::String)?;
        let pairs: Vec<(&str, &str)> = tx
            .str()?
            .into_iter()
            .zip(gene.str()?.into_iter())
            .filter_map(|(t, g)| Some((t?, g?)))
            .collect();

        let t2g = Tx2Gene::from_pairs(&pairs);
        info!(
            "Read the gene of {} transcript(s) from {:?}",
            t2g.len(),
            path.as_ref()
        );
        Ok(t2g)
    }

    pub fn get(&self, tx: &str) -> Option<&str> {
        self.map.get(tx).map(|g| g.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Summarizes a transcript-level experiment to the gene level, using the gene of every
/// transcript given by the `options.gene_column` column of the row ranges.
///
/// ### Returns
///
/// A gene-level experiment, with genes sorted by id:
/// * `counts` and `abundance` are summed over the transcripts of a gene;
/// * `length` is the average of the transcript lengths weighted by their abundance. A gene
///   with no abundance in a sample gets the geometric mean of its lengths in the other
///   samples, or, if it has no abundance in any sample, the mean length of its transcripts;
/// * the counts are then derived from the abundances if `options.counts_from_abundance`
///   asks for it.
///
/// If the transcripts have ranges, the rows are gene ranges spanning their transcripts, and genes
/// without a well defined range are dropped (see [FeatureRanges::genes]). Transcripts without a
/// gene are dropped with a warning.
///
/// It is an error to summarize an experiment that is already at the gene level.
///
/// ### Example
///
/// ```no_run
/// # fn run(se: txmeta::experiment::RangedExperiment) -> anyhow::Result<()> {
/// use txmeta::options::SummarizeOptions;
/// use txmeta::summarize::summarize_to_gene;
///
/// let gse = summarize_to_gene(&se, &SummarizeOptions::default())?;
/// println!("{}", gse);
/// # Ok(())
/// # }
/// ```
pub fn summarize_to_gene(
    se: &RangedExperiment,
    options: &SummarizeOptions,
) -> anyhow::Result<RangedExperiment> {
    let genes = se
        .row_ranges()
        .str_values(&options.gene_column)
        .with_context(|| {
            format!(
                "Summarizing to genes requires the {:?} column in the row ranges, or a transcript-to-gene table",
                options.gene_column
            )
        })?;
    summarize(se, genes, options)
}

/// Summarizes a transcript-level experiment to the gene level, using an explicit
/// transcript-to-gene table. See [summarize_to_gene].
pub fn summarize_with_tx2gene(
    se: &RangedExperiment,
    tx2gene: &Tx2Gene,
    options: &SummarizeOptions,
) -> anyhow::Result<RangedExperiment> {
    let genes = se
        .row_names()?
        .iter()
        .map(|t| tx2gene.get(t).map(|g| g.to_string()))
        .collect();
    summarize(se, genes, options)
}

/// Imports the quantifications of `col_data` and summarizes them to genes, with the
/// genes of the annotation or of `tx2gene` if given.
///
/// `options.counts_from_abundance` is applied to the gene-level abundances and lengths
/// after summarizing, not to the transcripts at import.
pub fn import_to_gene(
    col_data: &ColData,
    options: &ImportOptions,
    tx2gene: Option<&Tx2Gene>,
) -> anyhow::Result<RangedExperiment> {
    let tx_options = ImportOptions {
        counts_from_abundance: CountsFromAbundance::No,
        ..options.clone()
    };
    let se = import_quants(col_data, &tx_options)?;

    let opts = SummarizeOptions {
        counts_from_abundance: options.counts_from_abundance,
        ..Default::default()
    };
    match tx2gene {
        Some(t2g) => summarize_with_tx2gene(&se, t2g, &opts),
        None => summarize_to_gene(&se, &opts),
    }
}

fn summarize(
    se: &RangedExperiment,
    genes: Vec<Option<String>>,
    options: &SummarizeOptions,
) -> anyhow::Result<RangedExperiment> {
    if se.metadata().level == FeatureLevel::Gene {
        bail!("The experiment is already at the gene level.")
    }
    let start = std::time::Instant::now();

    let n_no_gene = genes.iter().filter(|g| g.is_none()).count();
    if n_no_gene == genes.len() {
        bail!("None of the transcripts could be assigned to a gene.")
    }
    if n_no_gene > 0 {
        warn!(
            "{} transcript(s) have no gene and were dropped.",
            n_no_gene
        );
    }

    let gene_column = options.gene_column.as_str();
    let row_ranges = if se.row_ranges().has_ranges() {
        let mut tx_ranges = se.row_ranges().clone();
        if tx_ranges.id_column() != gene_column {
            tx_ranges.update_column(Series::new(gene_column, &genes))?;
        }
        tx_ranges.genes(gene_column)?
    } else {
        let ids: BTreeSet<&str> = genes.iter().filter_map(|g| g.as_deref()).collect();
        FeatureRanges::ids_only(&ids.into_iter().collect::<Vec<&str>>(), gene_column)?
    };

    let gene_ids = row_ranges.ids()?;
    let gene_index: HashMap<&str, usize> = gene_ids
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();
    // the gene row of every transcript row
    let tx_gene: Vec<Option<usize>> = genes
        .iter()
        .map(|g| g.as_deref().and_then(|g| gene_index.get(g).copied()))
        .collect();

    let counts = se.assay_columns(COUNTS)?;
    let abundance = se.assay_columns(ABUNDANCE)?;
    let length = se.assay_columns(LENGTH)?;

    let gene_counts = sum_by_gene(&counts, &tx_gene, gene_ids.len());
    let gene_abundance = sum_by_gene(&abundance, &tx_gene, gene_ids.len());
    let gene_length = weighted_length(
        &abundance,
        &length,
        &gene_abundance,
        &tx_gene,
        gene_ids.len(),
    );

    let gene_counts = if options.counts_from_abundance != CountsFromAbundance::No {
        counts_from_abundance(
            &gene_counts,
            &gene_abundance,
            &gene_length,
            options.counts_from_abundance,
        )
    } else {
        gene_counts
    };

    let mut metadata = se.metadata().clone();
    metadata.level = FeatureLevel::Gene;
    if options.counts_from_abundance != CountsFromAbundance::No {
        if metadata.counts_from_abundance != CountsFromAbundance::No.to_string() {
            warn!(
                "The counts were already derived from the abundances ({}) at import.",
                metadata.counts_from_abundance
            );
        }
        metadata.counts_from_abundance = options.counts_from_abundance.to_string();
    }

    let samples = se.col_names()?;
    let assays = vec![
        (COUNTS.to_string(), assay_frame(&samples, gene_counts)?),
        (ABUNDANCE.to_string(), assay_frame(&samples, gene_abundance)?),
        (LENGTH.to_string(), assay_frame(&samples, gene_length)?),
    ];

    let gse = RangedExperiment::new(assays, row_ranges, se.col_data().clone(), metadata)?;
    info!(
        "Summarized {} transcript(s) to {} gene(s) in {:?}",
        se.dim().0,
        gse.dim().0,
        start.elapsed()
    );
    Ok(gse)
}

fn sum_by_gene(values: &[Vec<f64>], tx_gene: &[Option<usize>], n_genes: usize) -> Vec<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            let mut sums = vec![0.0; n_genes];
            for (x, g) in v.iter().zip(tx_gene.iter()) {
                if let Some(g) = g {
                    sums[*g] += x;
                }
            }
            sums
        })
        .collect()
}

// abundance-weighted mean length per gene and sample
fn weighted_length(
    abundance: &[Vec<f64>],
    length: &[Vec<f64>],
    gene_abundance: &[Vec<f64>],
    tx_gene: &[Option<usize>],
    n_genes: usize,
) -> Vec<Vec<f64>> {
    let mut lengths: Vec<Vec<f64>> = abundance
        .iter()
        .zip(length.iter())
        .zip(gene_abundance.iter())
        .map(|((a, l), ga)| {
            let mut weighted = vec![0.0; n_genes];
            for ((a, l), g) in a.iter().zip(l.iter()).zip(tx_gene.iter()) {
                if let Some(g) = g {
                    weighted[*g] += a * l;
                }
            }
            weighted
                .iter()
                .zip(ga.iter())
                .map(|(w, ga)| if *ga > 0.0 { w / ga } else { f64::NAN })
                .collect()
        })
        .collect();

    // the mean over the transcripts of a gene of their mean length across samples
    let mut ave_sum = vec![0.0; n_genes];
    let mut ave_n = vec![0usize; n_genes];
    let n_samples = length.len() as f64;
    for (i, g) in tx_gene.iter().enumerate() {
        if let Some(g) = g {
            ave_sum[*g] += length.iter().map(|l| l[i]).sum::<f64>() / n_samples;
            ave_n[*g] += 1;
        }
    }

    for g in 0..n_genes {
        let known: Vec<f64> = lengths
            .iter()
            .map(|l| l[g])
            .filter(|v| !v.is_nan())
            .collect();
        if known.len() == lengths.len() {
            continue;
        }
        let fill = if known.is_empty() {
            ave_sum[g] / ave_n[g].max(1) as f64
        } else {
            (known.iter().map(|v| v.ln()).sum::<f64>() / known.len() as f64).exp()
        };
        for l in lengths.iter_mut() {
            if l[g].is_nan() {
                l[g] = fill;
            }
        }
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::tests::toy_experiment;
    use crate::experiment::{Metadata, SampleInfo};
    use crate::txmeta_utils::QuantType;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // three transcripts of g1 and g2, two samples; g2 has no abundance in s2
    fn tx_experiment(with_ranges: bool) -> RangedExperiment {
        let row_ranges = if with_ranges {
            FeatureRanges::new(
                df!(
                    "tx_name" => ["t1", "t2", "t3", "t4"],
                    "seqname" => ["chr1", "chr1", "chr2", "chr2"],
                    "start" => [100i64, 150, 10, 500],
                    "end" => [200i64, 400, 50, 900],
                    "strand" => ["+", "+", "-", "-"],
                    "gene_id" => [Some("g1"), Some("g1"), Some("g2"), None],
                    "gene_name" => ["A", "A", "B", "C"],
                )
                .unwrap(),
                "tx_name",
            )
            .unwrap()
        } else {
            FeatureRanges::ids_only(&["t1", "t2", "t3", "t4"], "tx_name").unwrap()
        };
        let col_data = ColData::new(df!("names" => ["s1", "s2"]).unwrap()).unwrap();
        let samples = vec![String::from("s1"), String::from("s2")];
        let counts = assay_frame(
            &samples,
            vec![vec![10.0, 30.0, 5.0, 1.0], vec![20.0, 20.0, 0.0, 2.0]],
        )
        .unwrap();
        let abundance = assay_frame(
            &samples,
            vec![vec![1.0, 3.0, 2.0, 1.0], vec![1.0, 1.0, 0.0, 1.0]],
        )
        .unwrap();
        let length = assay_frame(
            &samples,
            vec![vec![100.0, 200.0, 50.0, 10.0], vec![100.0, 300.0, 70.0, 10.0]],
        )
        .unwrap();
        let mut metadata = Metadata::new(
            QuantType::Salmon,
            CountsFromAbundance::No,
            FeatureLevel::Transcript,
        );
        metadata.quant_info = samples
            .iter()
            .map(|n| SampleInfo {
                name: n.clone(),
                file: String::new(),
                meta_info: None,
            })
            .collect();
        RangedExperiment::new(
            vec![
                (COUNTS.to_string(), counts),
                (ABUNDANCE.to_string(), abundance),
                (LENGTH.to_string(), length),
            ],
            row_ranges,
            col_data,
            metadata,
        )
        .unwrap()
    }

    #[test]
    fn test_summarize_to_gene() {
        let se = tx_experiment(true);
        let gse = summarize_to_gene(&se, &SummarizeOptions::default()).unwrap();

        assert_eq!(gse.metadata().level, FeatureLevel::Gene);
        assert_eq!(gse.row_names().unwrap(), vec!["g1", "g2"]);
        assert_eq!(gse.row_ranges().id_column(), "gene_id");
        assert_eq!(
            gse.row_ranges().df().column("end").unwrap().i64().unwrap().get(0),
            Some(400)
        );

        let counts = gse.assay_columns(COUNTS).unwrap();
        assert_eq!(counts, vec![vec![40.0, 5.0], vec![40.0, 0.0]]);
        let abundance = gse.assay_columns(ABUNDANCE).unwrap();
        assert_eq!(abundance, vec![vec![4.0, 2.0], vec![2.0, 0.0]]);

        let length = gse.assay_columns(LENGTH).unwrap();
        // (1 * 100 + 3 * 200) / 4
        assert!(close(length[0][0], 175.0));
        // (1 * 100 + 1 * 300) / 2
        assert!(close(length[1][0], 200.0));
        assert!(close(length[0][1], 50.0));
        // no abundance of g2 in s2: the length of g2 in s1
        assert!(close(length[1][1], 50.0));

        // already at the gene level
        assert!(summarize_to_gene(&gse, &SummarizeOptions::default()).is_err());
    }

    #[test]
    fn test_zero_abundance_everywhere() {
        let a = vec![vec![0.0], vec![0.0]];
        let l = vec![vec![80.0], vec![120.0]];
        let ga = vec![vec![0.0], vec![0.0]];
        let lengths = weighted_length(&a, &l, &ga, &[Some(0)], 1);
        assert_eq!(lengths, vec![vec![100.0], vec![100.0]]);
    }

    #[test]
    fn test_counts_from_abundance_after_summary() {
        let se = tx_experiment(false);
        let opts = SummarizeOptions {
            counts_from_abundance: CountsFromAbundance::ScaledTpm,
            ..Default::default()
        };
        let t2g = Tx2Gene::from_pairs(&[("t1", "g1"), ("t2", "g1"), ("t3", "g2"), ("t4", "g2")]);
        let gse = summarize_with_tx2gene(&se, &t2g, &opts).unwrap();
        assert!(!gse.row_ranges().has_ranges());
        assert_eq!(gse.row_names().unwrap(), vec!["g1", "g2"]);
        assert_eq!(gse.metadata().counts_from_abundance, "scaledTPM");

        let counts = gse.assay_columns(COUNTS).unwrap();
        // library size 46 split 4:3 in s1
        assert!(close(counts[0][0], 46.0 * 4.0 / 7.0));
        assert!(close(counts[0][1], 46.0 * 3.0 / 7.0));
        let total: f64 = counts[1].iter().sum();
        assert!(close(total, 42.0));
    }

    #[test]
    fn test_missing_gene_column() {
        let se = tx_experiment(false);
        assert!(summarize_to_gene(&se, &SummarizeOptions::default()).is_err());

        // no length assay
        let se = toy_experiment();
        let gse = summarize_to_gene(&se, &SummarizeOptions::default());
        assert!(gse.is_err());
    }
}
