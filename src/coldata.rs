use crate::factor::Factor;
use crate::txmeta_utils::{quant_path, FILES_COLUMN, NAMES_COLUMN};
use anyhow::{bail, Context};
use polars::{lazy::prelude::*, prelude::*};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The per-sample metadata of an experiment (the *column data*).
///
/// Each row describes one sample. The `names` column holds unique sample names
/// and is required. The `files` column, added by [ColData::add_files], points to
/// the quantification file of each sample. Any other column is an experimental
/// attribute (cell line, treatment condition, ...). Attribute columns can be
/// declared as [Factor]s to fix the order of their levels.
///
/// ### Fields
///
/// * `df`: the underlying [DataFrame], one row per sample.
/// * `factors`: the factor columns, keyed by column name. The frame keeps the
///   string values of those columns; the [Factor] adds the level order.
#[derive(Clone, Debug)]
pub struct ColData {
    df: DataFrame,
    factors: HashMap<String, Factor>,
}

impl ColData {
    /// Wraps a sample table, validating its `names` column.
    ///
    /// The `names` column is cast to strings, so numeric sample names are accepted.
    /// It is an error if the column is missing, contains nulls or has duplicates.
    pub fn new(mut df: DataFrame) -> anyhow::Result<ColData> {
        let names = df
            .column(NAMES_COLUMN)
            .with_context(|| {
                format!(
                    "The sample table must have a {:?} column; found {:?}",
                    NAMES_COLUMN,
                    df.get_column_names()
                )
            })?
            .cast(&DataType::String)?;

        if names.null_count() > 0 {
            bail!(
                "The {:?} column of the sample table contains {} missing value(s).",
                NAMES_COLUMN,
                names.null_count()
            )
        }
        if names.n_unique()? != names.len() {
            bail!(
                "The {:?} column of the sample table contains duplicated sample names.",
                NAMES_COLUMN
            )
        }
        df.with_column(names)?;

        Ok(ColData {
            df,
            factors: HashMap::new(),
        })
    }

    /// Reads a comma-separated sample table with a header line.
    pub fn from_csv<T: AsRef<Path>>(path: T) -> anyhow::Result<ColData> {
        let df = CsvReader::from_path(path.as_ref())
            .with_context(|| format!("Could not open the sample table {:?}", path.as_ref()))?
            .has_header(true)
            .finish()
            .with_context(|| format!("Could not parse the sample table {:?}", path.as_ref()))?;
        info!(
            "Read {} sample(s) with column(s) {:?} from {:?}",
            df.height(),
            df.get_column_names(),
            path.as_ref()
        );
        ColData::new(df)
    }

    /// Reads a comma-separated sample table held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<ColData> {
        let df = CsvReader::new(std::io::Cursor::new(bytes))
            .has_header(true)
            .finish()?;
        ColData::new(df)
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    /// The number of samples.
    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn column<T: AsRef<str>>(&self, name: T) -> anyhow::Result<&Series> {
        self.df.column(name.as_ref()).with_context(|| {
            format!(
                "The sample table has no column {:?}; found {:?}",
                name.as_ref(),
                self.df.get_column_names()
            )
        })
    }

    pub fn is_column<T: AsRef<str>>(&self, name: T) -> bool {
        self.df.get_column_names().contains(&name.as_ref())
    }

    /// The sample names, in row order.
    pub fn names(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .column(NAMES_COLUMN)?
            .str()?
            .into_no_null_iter()
            .map(|s| s.to_string())
            .collect())
    }

    /// Adds (or replaces) the `files` column with the conventional location of
    /// each sample's quantification file, `<dir>/quants/<names>/quant.sf.gz`.
    pub fn add_files<T: AsRef<Path>>(&mut self, dir: T) -> anyhow::Result<()> {
        let files: Vec<String> = self
            .names()?
            .iter()
            .map(|n| quant_path(dir.as_ref(), n).to_string_lossy().into_owned())
            .collect();

        if self.is_column(FILES_COLUMN) {
            warn!("Replacing the existing {:?} column of the sample table.", FILES_COLUMN)
        }
        self.df.with_column(Series::new(FILES_COLUMN, files))?;
        Ok(())
    }

    /// The quantification file of every sample, in row order.
    pub fn files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let files = self
            .column(FILES_COLUMN)
            .context("Call `add_files()` to point the samples to their quantification files")?
            .cast(&DataType::String)?;
        if files.null_count() > 0 {
            bail!(
                "The {:?} column of the sample table contains missing values.",
                FILES_COLUMN
            )
        }
        let files = files
            .str()?
            .into_no_null_iter()
            .map(PathBuf::from)
            .collect();
        Ok(files)
    }

    /// Returns `true` if the quantification file of every sample exists.
    pub fn all_files_exist(&self) -> anyhow::Result<bool> {
        Ok(self.files()?.iter().all(|f| f.exists()))
    }

    /// The quantification files that do not exist.
    pub fn missing_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|f| !f.exists())
            .collect())
    }

    /// Declares `column` a factor. Without `levels`, the levels are the sorted distinct values.
    pub fn set_factor<T: AsRef<str>>(
        &mut self,
        column: &str,
        levels: Option<&[T]>,
    ) -> anyhow::Result<()> {
        if column == NAMES_COLUMN || column == FILES_COLUMN {
            bail!("The {:?} column cannot be a factor.", column)
        }
        let s = self.column(column)?;
        let levels: Option<Vec<String>> =
            levels.map(|l| l.iter().map(|v| v.as_ref().to_string()).collect());
        let factor = Factor::from_series(s, levels.as_deref())?;
        self.factors.insert(column.to_string(), factor);
        Ok(())
    }

    /// Makes `reference` the reference level of the factor `column`. A column that
    /// is not yet a factor is turned into one first, with sorted levels.
    pub fn relevel(&mut self, column: &str, reference: &str) -> anyhow::Result<()> {
        if !self.factors.contains_key(column) {
            self.set_factor::<&str>(column, None)?;
        }
        match self.factors.get_mut(column) {
            Some(f) => f.relevel(reference),
            None => bail!("Could not find the factor {:?}", column),
        }
    }

    pub fn factor(&self, column: &str) -> Option<&Factor> {
        self.factors.get(column)
    }

    /// The level order of every factor, keyed by column.
    pub fn factor_levels(&self) -> BTreeMap<String, Vec<String>> {
        self.factors
            .iter()
            .map(|(k, f)| (k.clone(), f.levels().to_vec()))
            .collect()
    }

    /// Declares a factor for every `column -> levels` entry, as returned by
    /// [factor_levels](ColData::factor_levels).
    pub fn set_factor_levels(
        &mut self,
        levels: &BTreeMap<String, Vec<String>>,
    ) -> anyhow::Result<()> {
        for (column, lv) in levels.iter() {
            self.set_factor(column, Some(lv.as_slice()))
                .with_context(|| format!("Could not restore the levels of {:?}", column))?;
        }
        Ok(())
    }

    /// Keeps the samples whose entry in `mask` is `true`.
    pub fn filter(&self, mask: &[bool]) -> anyhow::Result<ColData> {
        if mask.len() != self.len() {
            bail!(
                "The mask has {} entries but there are {} samples.",
                mask.len(),
                self.len()
            )
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();

        let df = self.df.filter(&BooleanChunked::new("mask", mask))?;
        if df.height() == 0 {
            warn!("The filtered sample table is empty.")
        }

        Ok(ColData {
            df,
            factors: self
                .factors
                .iter()
                .map(|(k, f)| (k.clone(), f.take(&rows)))
                .collect(),
        })
    }

    /// Evaluates a boolean polars expression over the sample table, e.g.
    /// `col("condition").eq(lit("trt"))`. Null results count as `false`.
    pub fn mask_expr(&self, predicate: Expr) -> anyhow::Result<Vec<bool>> {
        let mask_df = self
            .df
            .clone()
            .lazy()
            .select([predicate.alias("mask")])
            .collect()?;
        let mask = mask_df
            .column("mask")?
            .bool()
            .context("The sample predicate must evaluate to a boolean column")?;
        if mask.len() != self.len() {
            bail!("The sample predicate must evaluate to one value per sample.")
        }
        Ok(mask.into_iter().map(|b| b.unwrap_or(false)).collect())
    }

    /// Computes the mask of samples whose `column` value is one of `values`.
    pub fn mask_in<T: AsRef<str>>(&self, column: &str, values: &[T]) -> anyhow::Result<Vec<bool>> {
        let s = self.column(column)?.cast(&DataType::String)?;
        let mask = is_in(
            &s,
            &Series::new(
                "values",
                values.iter().map(|v| v.as_ref()).collect::<Vec<&str>>(),
            ),
        )?;
        Ok(mask.into_iter().map(|b| b.unwrap_or(false)).collect())
    }

    /// Keeps the samples whose `column` value is one of `values`.
    pub fn filter_in<T: AsRef<str>>(&self, column: &str, values: &[T]) -> anyhow::Result<ColData> {
        self.filter(&self.mask_in(column, values)?)
    }

    /// Keeps the samples for which `predicate` evaluates to `true`.
    pub fn filter_expr(&self, predicate: Expr) -> anyhow::Result<ColData> {
        self.filter(&self.mask_expr(predicate)?)
    }
}

impl std::fmt::Display for ColData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "{}", self.df)?;
        let mut factors: Vec<&Factor> = self.factors.values().collect();
        factors.sort_by(|a, b| a.name().cmp(b.name()));
        for fct in factors {
            writeln!(f, "{}", fct)?;
        }
        Ok(())
    }
}
