use crate::txmeta_utils::meta_info_path;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

/// The run summary salmon writes to `aux_info/meta_info.json`.
///
/// Only the fields used to identify the reference transcriptome and to
/// describe the run are kept; unknown fields are ignored and every field is
/// optional, as the content differs between salmon versions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    #[serde(default)]
    pub salmon_version: Option<String>,
    /// the hash of the indexed transcript sequences
    #[serde(default, alias = "sha256")]
    pub index_seq_hash: Option<String>,
    #[serde(default)]
    pub index_name_hash: Option<String>,
    #[serde(default)]
    pub num_processed: Option<u64>,
    #[serde(default)]
    pub num_mapped: Option<u64>,
    #[serde(default)]
    pub percent_mapped: Option<f64>,
    #[serde(default)]
    pub library_types: Option<Vec<String>>,
    #[serde(default)]
    pub start_time: Option<String>,
}

impl MetaInfo {
    pub fn from_path<T: AsRef<Path>>(path: T) -> anyhow::Result<MetaInfo> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Could not open {:?}", path.as_ref()))?;
        let mi: MetaInfo = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Could not parse {:?}", path.as_ref()))?;
        Ok(mi)
    }

    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<MetaInfo> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Reads the run summary stored alongside a quantification file.
    /// Returns `Ok(None)`, with a warning, if there is none.
    pub fn from_quant_file<T: AsRef<Path>>(quant_file: T) -> anyhow::Result<Option<MetaInfo>> {
        let Some(p) = meta_info_path(quant_file.as_ref()) else {
            return Ok(None);
        };
        if !p.exists() {
            warn!(
                "Could not find {:?}; the run information of {:?} is not available.",
                p,
                quant_file.as_ref()
            );
            return Ok(None);
        }
        MetaInfo::from_path(p).map(Some)
    }
}
