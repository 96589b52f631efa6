use anyhow::Context;
use flate2::read::MultiGzDecoder;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

/// The directory (relative to a data directory) holding one
/// sub-directory of quantification output per sample.
pub const QUANTS_DIR: &str = "quants";

/// The per-sample quantification file name.
pub const QUANT_FILE: &str = "quant.sf.gz";

/// The path of the salmon run information, relative to a sample's
/// quantification directory.
pub const META_INFO_FILE: [&str; 2] = ["aux_info", "meta_info.json"];

/// The column of the sample table naming the samples.
pub const NAMES_COLUMN: &str = "names";

/// The column of the sample table pointing to the quantification files.
pub const FILES_COLUMN: &str = "files";

pub(crate) const VALIDSTRANDS: [&str; 3] = ["+", "-", "*"];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The tools whose quantification output can be imported.
///
/// Both write the `quant.sf` layout (`Name`, `Length`, `EffectiveLength`,
/// `TPM`, `NumReads`) and an `aux_info/meta_info.json` run summary, so they are
/// read the same way. The variant is recorded in the experiment metadata.
pub enum QuantType {
    Salmon,
    Piscem,
}

impl Default for QuantType {
    fn default() -> Self {
        QuantType::Salmon
    }
}

impl std::str::FromStr for QuantType {
    type Err = anyhow::Error;

    /// Converts from a [&str] to a [QuantType]. Returns an error
    /// if there is no corresponding type for `s`.
    fn from_str(s: &str) -> anyhow::Result<QuantType> {
        let qt = match s.to_lowercase().as_str() {
            "salmon" => QuantType::Salmon,
            "piscem" => QuantType::Piscem,
            _ => anyhow::bail!("Cannot parse the quantification type {:?}.", s),
        };
        Ok(qt)
    }
}

impl std::fmt::Display for QuantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantType::Salmon => write!(f, "salmon"),
            QuantType::Piscem => write!(f, "piscem"),
        }
    }
}

/// Builds the conventional location of a sample's quantification file,
/// `<dir>/quants/<sample>/quant.sf.gz`.
///
/// ```rust
/// use std::path::PathBuf;
/// use txmeta::txmeta_utils::quant_path;
///
/// let p = quant_path("data", "SRR1039508");
/// assert_eq!(p, PathBuf::from("data/quants/SRR1039508/quant.sf.gz"));
/// ```
pub fn quant_path<P: AsRef<Path>, S: AsRef<str>>(dir: P, sample: S) -> PathBuf {
    dir.as_ref()
        .join(QUANTS_DIR)
        .join(sample.as_ref())
        .join(QUANT_FILE)
}

/// Returns the location of the `meta_info.json` that salmon writes alongside
/// the given quantification file.
pub fn meta_info_path<P: AsRef<Path>>(quant_file: P) -> Option<PathBuf> {
    quant_file.as_ref().parent().map(|d| {
        META_INFO_FILE
            .iter()
            .fold(d.to_path_buf(), |acc, part| acc.join(part))
    })
}

/// Tests if the stream underlying the [BufReader] `reader` is gzipped or not by examining the
/// first 2 bytes for the magic header.  This function *requires*, but does not check, that
/// none of the stream has yet been consumed (i.e. that no read calls have yet been issued
/// to `reader`). It will fill the buffer to examine the first two bytes, but will not consume
/// them.
///
/// If the first 2 bytes could be succesfully read, this returns
/// [Ok]`(true)` if the file is a gzipped file
/// [Ok]`(false)` if it is not a gzipped file
///
/// If the first 2 bytes could not be succesfully read, then this
/// returns the relevant [std::io::Error].
pub fn is_gzipped<T: BufRead>(reader: &mut T) -> std::io::Result<bool> {
    const GZIP_MAGIC_NUMBER: [u8; 2] = [0x1f, 0x8b];

    let src = reader.fill_buf()?;
    if src.get(..2) == Some(&GZIP_MAGIC_NUMBER) {
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Opens the file at `p` for buffered reading, decompressing it on the fly
/// if it starts with the gzip magic bytes. The file extension is not consulted,
/// so a plain-text `quant.sf.gz` is read as well.
pub fn open_maybe_gzipped<T: AsRef<Path>>(p: T) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(p.as_ref())?;
    let mut inner_rdr = BufReader::new(file);
    if is_gzipped(&mut inner_rdr)? {
        trace!(
            "auto-detected gzipped file {:?} - reading via decompression",
            p.as_ref()
        );
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(inner_rdr))))
    } else {
        Ok(Box::new(inner_rdr))
    }
}

/// Reads the whole (decompressed) content of the file at `p`.
pub fn read_to_bytes<T: AsRef<Path>>(p: T) -> anyhow::Result<Vec<u8>> {
    let mut rdr = open_maybe_gzipped(p)?;
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Reads a (possibly gzipped) delimited table with a header line. Files whose name ends
/// in `.tsv` or `.txt`, optionally followed by `.gz`, are tab-separated; all others are
/// comma-separated.
pub fn read_delimited<T: AsRef<Path>>(p: T) -> anyhow::Result<DataFrame> {
    let p = p.as_ref();
    let name = p
        .to_string_lossy()
        .trim_end_matches(".gz")
        .to_lowercase();
    let separator = if name.ends_with(".tsv") || name.ends_with(".txt") {
        b'\t'
    } else {
        b','
    };

    let bytes = read_to_bytes(p).with_context(|| format!("Could not read {:?}", p))?;
    let df = CsvReader::new(std::io::Cursor::new(bytes))
        .has_header(true)
        .with_separator(separator)
        .finish()
        .with_context(|| format!("Could not parse the table {:?}", p))?;
    Ok(df)
}

/// Removes a trailing version suffix (`.N`) from an Ensembl/GENCODE style
/// identifier, e.g. `ENSG00000141510.18` becomes `ENSG00000141510`.
/// Identifiers whose suffix is not numeric are returned unchanged.
pub fn strip_version(id: &str) -> &str {
    match id.rsplit_once('.') {
        Some((stem, v))
            if !stem.is_empty() && !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => id,
    }
}

/// Keeps only the text before the first `|`. GENCODE transcript FASTA headers
/// pack several identifiers into the name, separated by bars.
pub fn before_bar(id: &str) -> &str {
    match id.split_once('|') {
        Some((head, _)) => head,
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_is_gzipped() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"Name\tLength\n").unwrap();
        let gz = enc.finish().unwrap();

        let mut rdr = BufReader::new(std::io::Cursor::new(gz));
        assert!(is_gzipped(&mut rdr).unwrap());
        // the magic bytes must not be consumed
        assert_eq!(rdr.fill_buf().unwrap()[..2], [0x1f, 0x8b]);

        let mut rdr = BufReader::new(std::io::Cursor::new(b"Name\tLength\n".to_vec()));
        assert!(!is_gzipped(&mut rdr).unwrap());
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("ENSG00000141510.18"), "ENSG00000141510");
        assert_eq!(strip_version("ENST00000269305.9_PAR_Y"), "ENST00000269305.9_PAR_Y");
        assert_eq!(strip_version("TP53"), "TP53");
        assert_eq!(strip_version(".1"), ".1");
        assert_eq!(
            before_bar("ENST00000456328.2|ENSG00000290825.1|-|-|DDX11L2-202|"),
            "ENST00000456328.2"
        );
    }

    #[test]
    fn test_paths() {
        let p = quant_path("/data", "s1");
        assert_eq!(p, PathBuf::from("/data/quants/s1/quant.sf.gz"));
        assert_eq!(
            meta_info_path(&p).unwrap(),
            PathBuf::from("/data/quants/s1/aux_info/meta_info.json")
        );
        assert_eq!("SALMON".parse::<QuantType>().unwrap(), QuantType::Salmon);
        assert!("kallisto".parse::<QuantType>().is_err());
    }
}
