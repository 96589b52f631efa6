use crate::coldata::ColData;
use crate::experiment::{
    assay_frame, FeatureLevel, Metadata, RangedExperiment, SampleInfo, ABUNDANCE, COUNTS, LENGTH,
};
use crate::options::{CountsFromAbundance, ImportOptions};
use crate::ranges::FeatureRanges;
use crate::reader::{MetaInfo, QuantRecords};
use crate::txmeta_utils::{before_bar, strip_version};
use crate::txome::{TxomeInfo, TxomeRegistry};
use anyhow::{bail, Context};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Imports the quantification of every sample into a transcript-level [RangedExperiment].
///
/// ### Arguments
///
/// * `col_data`: the sample table. Its `files` column (see
///   [ColData::add_files]) points to the quantification file of every sample.
/// * `options`: how to read the files, how to derive counts and where to look up the
///   reference transcriptome.
///
/// ### Returns
///
/// An experiment with the `counts`, `abundance` and `length` assays. The `length` assay holds
/// the effective transcript lengths.
///
/// If every sample reports the same index hash and the hash is linked in the registry, the
/// annotation of the transcriptome is read and the rows carry the transcript ranges.
/// Quantified transcripts absent from the annotation are dropped with a warning. If the
/// transcriptome cannot be identified, the rows carry the transcript ids only.
///
/// It is an error if a quantification file is missing, if the samples do not report the same
/// transcripts in the same order, or if the samples were quantified against different indices.
pub fn import_quants(
    col_data: &ColData,
    options: &ImportOptions,
) -> anyhow::Result<RangedExperiment> {
    let start = std::time::Instant::now();

    let missing = col_data.missing_files()?;
    if !missing.is_empty() {
        bail!(
            "Could not find the quantification file(s) {:?}",
            missing
        )
    }
    let samples = col_data.names()?;
    let files = col_data.files()?;

    let mut records: Vec<QuantRecords> = Vec::with_capacity(files.len());
    for (sample, file) in samples.iter().zip(files.iter()) {
        info!("reading in files for {}", sample);
        let qr = QuantRecords::from_path(file, &options.quant_columns)?;
        if let Some(first) = records.first() {
            if first.names != qr.names {
                bail!(
                    "The transcripts of sample {:?} differ from those of sample {:?}; all samples must be quantified against the same index.",
                    sample,
                    samples[0]
                )
            }
        }
        records.push(qr);
    }
    let Some(first) = records.first() else {
        bail!("The sample table is empty; there is nothing to import.")
    };

    let tx_names: Vec<String> = first
        .names
        .iter()
        .map(|n| tx_key(n, options.ignore_after_bar, options.ignore_tx_version))
        .collect();

    let abundance: Vec<Vec<f64>> = records.iter().map(|r| r.abundance.clone()).collect();
    let length: Vec<Vec<f64>> = records.iter().map(|r| r.effective_length.clone()).collect();
    let mut counts: Vec<Vec<f64>> = records.iter().map(|r| r.counts.clone()).collect();
    if options.counts_from_abundance != CountsFromAbundance::No {
        counts = counts_from_abundance(&counts, &abundance, &length, options.counts_from_abundance);
    }

    let mut metadata = Metadata::new(
        options.quant_type,
        options.counts_from_abundance,
        FeatureLevel::Transcript,
    );
    for (sample, file) in samples.iter().zip(files.iter()) {
        let meta_info = if options.skip_meta {
            None
        } else {
            MetaInfo::from_quant_file(file)?
        };
        metadata.quant_info.push(SampleInfo {
            name: sample.clone(),
            file: file.to_string_lossy().into_owned(),
            meta_info,
        });
    }
    if !options.skip_meta {
        metadata.txome_info = find_txome(&metadata.quant_info, options)?;
    }

    // transcript ranges, and the assay rows they cover
    let (row_ranges, rows) = match &metadata.txome_info {
        Some(txome) => match_ranges(txome, &first.names, &tx_names, options)?,
        None => (FeatureRanges::ids_only(&tx_names, "tx_name")?, None),
    };

    let mut assays = vec![
        (COUNTS.to_string(), counts),
        (ABUNDANCE.to_string(), abundance),
        (LENGTH.to_string(), length),
    ];
    if let Some(rows) = rows {
        for (_, columns) in assays.iter_mut() {
            for c in columns.iter_mut() {
                *c = rows.iter().map(|&r| c[r]).collect();
            }
        }
    }
    let assays = assays
        .into_iter()
        .map(|(n, columns)| -> anyhow::Result<(String, DataFrame)> {
            Ok((n, assay_frame(&samples, columns)?))
        })
        .collect::<anyhow::Result<Vec<(String, DataFrame)>>>()?;

    let se = RangedExperiment::new(assays, row_ranges, col_data.clone(), metadata)?;
    info!(
        "Imported {} transcript(s) of {} sample(s) in {:?}",
        se.dim().0,
        se.dim().1,
        start.elapsed()
    );
    Ok(se)
}

fn tx_key(id: &str, ignore_after_bar: bool, ignore_version: bool) -> String {
    let id = if ignore_after_bar { before_bar(id) } else { id };
    let id = if ignore_version { strip_version(id) } else { id };
    id.to_string()
}

// the linked transcriptome shared by all samples, if any
fn find_txome(
    quant_info: &[SampleInfo],
    options: &ImportOptions,
) -> anyhow::Result<Option<TxomeInfo>> {
    let hashes: BTreeSet<String> = quant_info
        .iter()
        .filter_map(|q| q.meta_info.as_ref())
        .filter_map(|m| m.index_seq_hash.as_ref())
        .map(|h| h.trim().to_lowercase())
        .collect();

    if hashes.len() > 1 {
        bail!(
            "The samples were quantified against {} different indices ({:?}); import them separately.",
            hashes.len(),
            hashes
        )
    }
    let Some(hash) = hashes.into_iter().next() else {
        warn!("No index sequence hash was found; the row ranges will not be available.");
        return Ok(None);
    };
    let Some(registry) = options.registry.as_ref() else {
        warn!(
            "No transcriptome registry was given to identify the index {}; the row ranges will not be available.",
            hash
        );
        return Ok(None);
    };

    let registry = TxomeRegistry::open(registry)?;
    match registry.lookup(&hash) {
        Some(txome) => {
            info!(
                "found matching linked transcriptome:\n[ {} - {} - release {} ]",
                txome.source, txome.organism, txome.release
            );
            Ok(Some(txome.clone()))
        }
        None => {
            warn!(
                "The index {} does not match any linked transcriptome in {:?}; the row ranges will not be available.",
                hash,
                registry.dir()
            );
            Ok(None)
        }
    }
}

// The transcript ranges of the quantified transcripts, named after the quantified
// transcripts, and the quantified rows they cover when some are not annotated.
fn match_ranges(
    txome: &TxomeInfo,
    quant_names: &[String],
    tx_names: &[String],
    options: &ImportOptions,
) -> anyhow::Result<(FeatureRanges, Option<Vec<usize>>)> {
    info!("loading existing transcript ranges from {:?}", txome.gtf);
    let tx_ranges = FeatureRanges::from_gtf(txome.gtf_path())
        .with_context(|| format!("Could not read the annotation of {}", txome.index_seq_hash))?;

    // GENCODE transcript names carry extra fields after a bar
    let after_bar = options.ignore_after_bar || txome.is_gencode();
    let matched = tx_ranges.match_ids(quant_names, |id| {
        tx_key(id, after_bar, options.ignore_tx_version)
    })?;

    let (rows, gtf_rows): (Vec<usize>, Vec<usize>) = matched
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.map(|r| (i, r)))
        .unzip();

    if rows.is_empty() {
        warn!(
            "None of the {} quantified transcript(s) are in the annotation; the row ranges will not be available.",
            quant_names.len()
        );
        return Ok((FeatureRanges::ids_only(tx_names, "tx_name")?, None));
    }
    let n_missing = quant_names.len() - rows.len();
    if n_missing > 0 {
        let example: Vec<&str> = matched
            .iter()
            .zip(quant_names.iter())
            .filter(|(m, _)| m.is_none())
            .take(5)
            .map(|(_, n)| n.as_str())
            .collect();
        warn!(
            "{} transcript(s) are missing from the annotation and were dropped, e.g. {:?}",
            n_missing,
            example
        );
    }
    debug!("{} quantified transcripts matched the annotation", rows.len());

    let mut df = tx_ranges.take(&gtf_rows)?.df().clone();
    df.with_column(Series::new(
        "tx_name",
        rows.iter()
            .map(|&i| tx_key(&quant_names[i], after_bar, options.ignore_tx_version))
            .collect::<Vec<String>>(),
    ))?;
    let row_ranges = FeatureRanges::new(df, "tx_name")?;

    let rows = if n_missing > 0 { Some(rows) } else { None };
    Ok((row_ranges, rows))
}

/// Derives counts from abundances, one vector per sample.
///
/// With [CountsFromAbundance::ScaledTpm] the abundances are scaled up to the library size
/// (the total count) of each sample. With [CountsFromAbundance::LengthScaledTpm] the
/// abundances are first multiplied by the average length of each feature across samples.
/// [CountsFromAbundance::No] returns the counts unchanged.
pub fn counts_from_abundance(
    counts: &[Vec<f64>],
    abundance: &[Vec<f64>],
    length: &[Vec<f64>],
    method: CountsFromAbundance,
) -> Vec<Vec<f64>> {
    if method == CountsFromAbundance::No {
        return counts.to_vec();
    }
    let n_features = abundance.first().map(|a| a.len()).unwrap_or(0);
    let mean_length: Vec<f64> = (0..n_features)
        .map(|i| length.iter().map(|l| l[i]).sum::<f64>() / length.len() as f64)
        .collect();

    counts
        .iter()
        .zip(abundance.iter())
        .map(|(c, a)| {
            let lib_size: f64 = c.iter().sum();
            let scaled: Vec<f64> = match method {
                CountsFromAbundance::LengthScaledTpm => a
                    .iter()
                    .zip(mean_length.iter())
                    .map(|(a, l)| a * l)
                    .collect(),
                _ => a.clone(),
            };
            let total: f64 = scaled.iter().sum();
            if total > 0.0 {
                scaled.iter().map(|v| v * lib_size / total).collect()
            } else {
                vec![0.0; scaled.len()]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_tpm() {
        let counts = vec![vec![10.0, 30.0], vec![5.0, 5.0]];
        let abundance = vec![vec![1.0, 1.0], vec![3.0, 1.0]];
        let length = vec![vec![100.0, 300.0], vec![100.0, 100.0]];

        let c = counts_from_abundance(&counts, &abundance, &length, CountsFromAbundance::ScaledTpm);
        assert_eq!(c, vec![vec![20.0, 20.0], vec![7.5, 2.5]]);

        // mean lengths are 100 and 200
        let c = counts_from_abundance(
            &counts,
            &abundance,
            &length,
            CountsFromAbundance::LengthScaledTpm,
        );
        let expected = [vec![40.0 / 3.0, 80.0 / 3.0], vec![6.0, 4.0]];
        for (got, want) in c.iter().zip(expected.iter()) {
            for (g, w) in got.iter().zip(want.iter()) {
                assert!((g - w).abs() < 1e-9);
            }
        }

        assert_eq!(
            counts_from_abundance(&counts, &abundance, &length, CountsFromAbundance::No),
            counts
        );

        // a sample without any abundance keeps zero counts
        let c = counts_from_abundance(
            &[vec![0.0, 0.0]],
            &[vec![0.0, 0.0]],
            &[vec![1.0, 1.0]],
            CountsFromAbundance::ScaledTpm,
        );
        assert_eq!(c, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn test_tx_key() {
        let gencode = "ENST00000456328.2|ENSG00000290825.1|-|-|DDX11L2-202|DDX11L2|1657|lncRNA|";
        assert_eq!(tx_key(gencode, true, false), "ENST00000456328.2");
        assert_eq!(tx_key(gencode, true, true), "ENST00000456328");
        assert_eq!(tx_key("ENST00000456328.2", false, false), "ENST00000456328.2");
    }

    #[test]
    fn test_missing_files() {
        let mut cd = ColData::new(df!("names" => ["s1", "s2"]).unwrap()).unwrap();
        cd.add_files("/no/such/dir").unwrap();
        let err = import_quants(&cd, &ImportOptions::default()).unwrap_err();
        assert!(err.to_string().contains("s2"));
    }
}
