use anyhow::{anyhow, bail, Context};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, Hash, AsRef, Display)
)]
/// The hash of the transcript sequences of a quantification index, as
/// reported by salmon. It identifies the reference transcriptome a sample
/// was quantified against.
pub struct IndexSeqHash(String);

impl IndexSeqHash {
    pub fn parse<T: AsRef<str>>(s: T) -> anyhow::Result<IndexSeqHash> {
        IndexSeqHash::new(s.as_ref().to_string())
            .map_err(|e| anyhow!("Invalid index sequence hash {:?}: {:?}", s.as_ref(), e))
    }
}

/// The identity of a reference transcriptome.
///
/// A record links the hash of the indexed transcript sequences to where
/// the transcripts come from and to the annotation describing their
/// genomic location.
///
/// # Fields
///
/// * `index_seq_hash`: the hash of the indexed transcript sequences.
/// * `source`: the annotation source, e.g. `GENCODE`, `Ensembl`, `RefSeq` or `LocalGENCODE`.
/// * `organism`: e.g. `Homo sapiens`.
/// * `release`: the annotation release, e.g. `44`.
/// * `genome`: the genome assembly, e.g. `GRCh38`.
/// * `fasta`: the location of the transcript sequences.
/// * `gtf`: the location of the annotation, read to build the transcript ranges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxomeInfo {
    pub index_seq_hash: String,
    pub source: String,
    pub organism: String,
    pub release: String,
    pub genome: String,
    pub fasta: Vec<String>,
    pub gtf: String,
}

impl TxomeInfo {
    /// `true` if the annotation source uses GENCODE style identifiers,
    /// with version suffixes and `|`-packed transcript names.
    pub fn is_gencode(&self) -> bool {
        self.source.to_lowercase().contains("gencode")
    }

    pub fn gtf_path(&self) -> PathBuf {
        PathBuf::from(&self.gtf)
    }
}

/// A local directory of linked transcriptomes.
///
/// Each `*.json` file in the directory holds one [TxomeInfo]. The registry is
/// how the reference transcriptome of a quantification is identified from
/// its index hash without any network access.
pub struct TxomeRegistry {
    dir: PathBuf,
    records: HashMap<IndexSeqHash, TxomeInfo>,
}

impl TxomeRegistry {
    /// Opens the registry directory and loads every record in it. Records that cannot
    /// be parsed or that carry no hash are skipped with a warning. A directory that
    /// does not exist yet gives an empty registry; the first
    /// [link](TxomeRegistry::link) creates it.
    pub fn open<T: AsRef<Path>>(dir: T) -> anyhow::Result<TxomeRegistry> {
        let dir = dir.as_ref().to_path_buf();
        let mut records = HashMap::new();
        if !dir.exists() {
            warn!("The registry directory {:?} does not exist.", dir);
            return Ok(TxomeRegistry { dir, records });
        }

        let entries = fs::read_dir(&dir)
            .with_context(|| format!("Could not read the registry directory {:?}", dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::File::open(&path)
                .map_err(anyhow::Error::from)
                .and_then(|f| {
                    serde_json::from_reader::<_, TxomeInfo>(BufReader::new(f))
                        .map_err(anyhow::Error::from)
                });
            let info = match parsed {
                Ok(info) => info,
                Err(e) => {
                    warn!("Skipping the unreadable registry record {:?}: {}", path, e);
                    continue;
                }
            };
            match IndexSeqHash::parse(&info.index_seq_hash) {
                Ok(hash) => {
                    debug!("Registry record {:?} links {}", path, hash);
                    records.insert(hash, info);
                }
                Err(e) => warn!("Skipping the registry record {:?}: {}", path, e),
            }
        }
        info!(
            "Found {} linked transcriptome(s) in {:?}",
            records.len(),
            dir
        );
        Ok(TxomeRegistry { dir, records })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds the transcriptome whose sequences hash to `hash` (case-insensitive).
    pub fn lookup<T: AsRef<str>>(&self, hash: T) -> Option<&TxomeInfo> {
        let hash = IndexSeqHash::parse(hash).ok()?;
        self.records.get(&hash)
    }

    /// Links a transcriptome: writes its record as `<hash>.json` into the
    /// registry and makes it available for lookups. An existing record with the
    /// same hash is replaced.
    pub fn link(&mut self, mut info: TxomeInfo) -> anyhow::Result<PathBuf> {
        let hash = IndexSeqHash::parse(&info.index_seq_hash)?;
        if info.gtf.is_empty() {
            bail!("A linked transcriptome needs the location of its GTF annotation.")
        }
        info.index_seq_hash = hash.to_string();

        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Could not create the registry directory {:?}", self.dir)
        })?;
        let path = self.dir.join(format!("{}.json", hash));
        if self.records.contains_key(&hash) {
            warn!("Replacing the linked transcriptome for {}", hash);
        }
        let file = fs::File::create(&path)
            .with_context(|| format!("Could not write the registry record {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &info)?;

        info!(
            "Linked {} {} {} ({}) to {}",
            info.source, info.organism, info.release, info.genome, hash
        );
        self.records.insert(hash, info);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let d = std::env::temp_dir().join(format!("txmeta-txome-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&d);
        d
    }

    fn toy_info(hash: &str) -> TxomeInfo {
        TxomeInfo {
            index_seq_hash: hash.to_string(),
            source: String::from("LocalGENCODE"),
            organism: String::from("Homo sapiens"),
            release: String::from("44"),
            genome: String::from("GRCh38"),
            fasta: vec![String::from("gencode.v44.transcripts.fa.gz")],
            gtf: String::from("gencode.v44.annotation.gtf.gz"),
        }
    }

    #[test]
    fn test_index_seq_hash() {
        let h = IndexSeqHash::parse("  ABCdef01 ").unwrap();
        assert_eq!(h.as_ref(), "abcdef01");
        assert!(IndexSeqHash::parse("   ").is_err());
    }

    #[test]
    fn test_link_and_lookup() {
        let dir = scratch_dir("link");
        let mut reg = TxomeRegistry::open(&dir).unwrap();
        assert!(reg.is_empty());
        // opening does not create the directory, linking does
        assert!(!dir.exists());

        let path = reg.link(toy_info("ABC123")).unwrap();
        assert!(path.ends_with("abc123.json"));
        assert!(reg.lookup("abc123").unwrap().is_gencode());

        // a new registry on the same directory sees the record
        let reg = TxomeRegistry::open(&dir).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("ABC123").unwrap().release, "44");
        assert!(reg.lookup("def456").is_none());

        let mut reg = reg;
        let mut no_gtf = toy_info("def456");
        no_gtf.gtf = String::new();
        assert!(reg.link(no_gtf).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_open_skips_bad_records() {
        let dir = scratch_dir("bad");
        let mut reg = TxomeRegistry::open(&dir).unwrap();
        reg.link(toy_info("abc123")).unwrap();

        let mut blank = toy_info("abc123");
        blank.index_seq_hash = String::from("  ");
        fs::write(dir.join("blank.json"), serde_json::to_string(&blank).unwrap()).unwrap();
        fs::write(dir.join("broken.json"), "{\"index_seq_hash\": ").unwrap();
        fs::write(dir.join("notes.txt"), "not a record").unwrap();

        let reg = TxomeRegistry::open(&dir).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.lookup("abc123").is_some());

        fs::remove_dir_all(&dir).unwrap();
    }
}
