use crate::options::QuantColumns;
use crate::txmeta_utils::read_to_bytes;
use anyhow::{bail, Context};
use polars::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// The content of one sample's quantification file.
///
/// All vectors are aligned with `names`, in file order.
///
/// # Fields
///
/// * `names`: the transcript names.
/// * `length`: the transcript lengths.
/// * `effective_length`: the bias-adjusted effective lengths, imported as the `length` assay.
/// * `abundance`: the abundance estimates (TPM).
/// * `counts`: the estimated number of fragments.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantRecords {
    pub names: Vec<String>,
    pub length: Vec<f64>,
    pub effective_length: Vec<f64>,
    pub abundance: Vec<f64>,
    pub counts: Vec<f64>,
}

impl QuantRecords {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Reads a (possibly gzipped) quantification file.
    pub fn from_path<T: AsRef<Path>>(
        path: T,
        columns: &QuantColumns,
    ) -> anyhow::Result<QuantRecords> {
        let path = path.as_ref();
        let bytes = read_to_bytes(path)
            .with_context(|| format!("Could not read the quantification file {:?}", path))?;
        let qr = QuantRecords::from_bytes(bytes, columns)
            .with_context(|| format!("Could not parse the quantification file {:?}", path))?;
        debug!("Read {} records from {:?}", qr.len(), path);
        Ok(qr)
    }

    /// Parses the (decompressed) content of a tab-separated quantification file.
    pub fn from_bytes(bytes: Vec<u8>, columns: &QuantColumns) -> anyhow::Result<QuantRecords> {
        let df = CsvReader::new(Cursor::new(bytes))
            .has_header(true)
            .with_separator(b'\t')
            .finish()?;
        QuantRecords::from_df(&df, columns)
    }

    /// Extracts the records from a quantification table.
    ///
    /// It is an error if a column is missing, if a numeric column contains
    /// missing or non-numeric values, if a transcript name is duplicated or if
    /// the table is empty.
    pub fn from_df(df: &DataFrame, columns: &QuantColumns) -> anyhow::Result<QuantRecords> {
        columns.is_valid(df, false, true)?;
        if df.height() == 0 {
            bail!("The quantification table contains no records.")
        }

        let names_s = df.column(&columns.name)?.cast(&DataType::String)?;
        if names_s.null_count() > 0 {
            bail!("The {:?} column contains missing values.", columns.name)
        }
        let names: Vec<String> = names_s
            .str()?
            .into_no_null_iter()
            .map(|s| s.to_string())
            .collect();

        let mut seen = HashSet::with_capacity(names.len());
        for n in names.iter() {
            if !seen.insert(n.as_str()) {
                bail!("The transcript {:?} appears more than once.", n)
            }
        }

        Ok(QuantRecords {
            length: float_column(df, &columns.length)?,
            effective_length: float_column(df, &columns.effective_length)?,
            abundance: float_column(df, &columns.abundance)?,
            counts: float_column(df, &columns.counts)?,
            names,
        })
    }
}

// a numeric column as f64s, rejecting nulls and values that do not parse
fn float_column(df: &DataFrame, name: &str) -> anyhow::Result<Vec<f64>> {
    let s = df.column(name)?;
    let nulls_before = s.null_count();
    // strict casting turns non-numeric strings into an error
    let s = s
        .strict_cast(&DataType::Float64)
        .with_context(|| format!("The {:?} column contains non-numeric values", name))?;
    if s.null_count() > 0 || nulls_before > 0 {
        bail!("The {:?} column contains missing values.", name)
    }
    Ok(s.f64()?.into_no_null_iter().collect())
}
