use crate::txmeta_utils::read_delimited;
use anyhow::bail;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// A mapping from one kind of gene (or transcript) identifier to another,
/// e.g. from Ensembl gene ids to gene symbols.
///
/// A key can map to several values (a gene id with several symbols); the
/// first value listed for a key is the one returned by [IdMap::get].
#[derive(Clone, Debug, Default)]
pub struct IdMap {
    map: HashMap<String, Vec<String>>,
}

impl IdMap {
    /// Builds a mapping from `(key, value)` pairs, keeping the pair order.
    pub fn from_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> IdMap {
        let mut map: HashMap<String, Vec<String>> = HashMap::with_capacity(pairs.len());
        for (k, v) in pairs {
            map.entry(k.as_ref().to_string())
                .or_default()
                .push(v.as_ref().to_string());
        }
        IdMap { map }
    }

    /// Reads a mapping table with a header line (see [read_delimited]).
    /// Rows with a missing key or value are skipped.
    pub fn from_path<T: AsRef<Path>>(
        path: T,
        key_column: &str,
        value_column: &str,
    ) -> anyhow::Result<IdMap> {
        let p = path.as_ref();
        let df = read_delimited(p)?;

        let idm = IdMap::from_df(&df, key_column, value_column)?;
        info!(
            "Read {} identifier mappings for {} keys from {:?}",
            df.height(),
            idm.len(),
            p
        );
        Ok(idm)
    }

    /// Builds a mapping from two columns of a data frame.
    pub fn from_df(df: &DataFrame, key_column: &str, value_column: &str) -> anyhow::Result<IdMap> {
        for c in [key_column, value_column] {
            if !df.get_column_names().contains(&c) {
                bail!(
                    "The identifier table has no column {:?}; found {:?}",
                    c,
                    df.get_column_names()
                )
            }
        }
        let keys = df.column(key_column)?.cast(&DataType::String)?;
        let values = df.column(value_column)?.cast(&DataType::String)?;

        let pairs: Vec<(&str, &str)> = keys
            .str()?
            .into_iter()
            .zip(values.str()?.into_iter())
            .filter_map(|(k, v)| Some((k?, v?)))
            .collect();

        Ok(IdMap::from_pairs(&pairs))
    }

    /// The first value mapped to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map
            .get(key)
            .and_then(|v| v.first())
            .map(|v| v.as_str())
    }

    /// All values mapped to `key`.
    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.map.get(key).map(|v| v.as_slice())
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_wins() {
        let idm = IdMap::from_pairs(&[
            ("ENSG00000141510", "TP53"),
            ("ENSG00000012048", "BRCA1"),
            ("ENSG00000141510", "P53"),
        ]);
        assert_eq!(idm.len(), 2);
        assert_eq!(idm.get("ENSG00000141510"), Some("TP53"));
        assert_eq!(idm.get_all("ENSG00000141510").unwrap().len(), 2);
        assert_eq!(idm.get("ENSG00000000003"), None);
    }

    #[test]
    fn test_from_df() {
        let df = df!(
            "ENSEMBL" => [Some("ENSG00000141510"), Some("ENSG00000012048"), None],
            "SYMBOL" => [Some("TP53"), None, Some("XIST")],
        )
        .unwrap();
        let idm = IdMap::from_df(&df, "ENSEMBL", "SYMBOL").unwrap();
        assert_eq!(idm.len(), 1);
        assert_eq!(idm.get("ENSG00000141510"), Some("TP53"));
        assert!(IdMap::from_df(&df, "ENSEMBL", "ENTREZID").is_err());
    }
}
