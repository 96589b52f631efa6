//! txmeta imports transcript quantifications, as written by
//! [salmon](https://github.com/COMBINE-lab/salmon), into an annotated feature-by-sample
//! experiment, in the spirit of the Bioconductor package
//! [tximeta](https://bioconductor.org/packages/release/bioc/html/tximeta.html).
//! The per-sample tables are gathered into [Polars](https://pola.rs/) data frames, the reference
//! transcriptome is identified from the hash of the quantification index, and the transcripts are
//! located on the genome from its annotation, so that the experiment can be summarized to genes and
//! subset by genomic region or by sample attribute.
//!
//! A typical session:
//!
//! ```no_run
//! use txmeta::{import_quants, summarize_to_gene, ColData, ImportOptions, SummarizeOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut coldata = ColData::from_csv("data/coldata.csv")?;
//! coldata.add_files("data")?;
//! assert!(coldata.all_files_exist()?);
//! coldata.relevel("condition", "untrt")?;
//!
//! let options = ImportOptions::default().with_registry("data/registry");
//! let se = import_quants(&coldata, &options)?;
//! let gse = summarize_to_gene(&se, &SummarizeOptions::default())?;
//! println!("{}", gse);
//! # Ok(())
//! # }
//! ```

pub mod coldata;
pub mod experiment;
pub mod factor;
pub mod import;
pub mod options;
pub mod ranges;
pub mod reader;
pub mod summarize;
pub mod txmeta_utils;
pub mod txome;

pub use coldata::ColData;
pub use experiment::{read_col_data, FeatureLevel, Metadata, RangedExperiment};
pub use factor::Factor;
pub use import::import_quants;
pub use options::{
    CountsFromAbundance, GenomicRange, ImportOptions, OverlapOptions, QuantColumns, Strand,
    SummarizeOptions,
};
pub use ranges::FeatureRanges;
pub use reader::IdMap;
pub use summarize::{import_to_gene, summarize_to_gene, summarize_with_tx2gene, Tx2Gene};
pub use txmeta_utils::QuantType;
pub use txome::{TxomeInfo, TxomeRegistry};
