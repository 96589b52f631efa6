use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use peak_alloc::PeakAlloc;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};
use txmeta::{
    import_quants, import_to_gene, ColData, CountsFromAbundance, GenomicRange, IdMap,
    ImportOptions, OverlapOptions, QuantType, Tx2Gene, TxomeInfo, TxomeRegistry,
};

#[global_allocator]
static PEAK_ALLOC: PeakAlloc = PeakAlloc;

/// Import salmon quantifications into an annotated feature-by-sample experiment.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// import the quantifications of a sample table, optionally summarize and subset them
    Import(ImportArgs),
    /// link a reference transcriptome to the hash of its index
    LinkTxome(LinkTxomeArgs),
    /// check that the quantification file of every sample exists
    Check(CheckArgs),
}

/// The identifiers an alternate identifier table is keyed on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum IdsBy {
    /// the `gene_id` of every feature
    Gene,
    /// the feature ids, i.e. the row names
    Feature,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// the sample table (CSV) with a `names` column
    #[arg(short, long, value_name = "FILE")]
    coldata: PathBuf,
    /// the data directory holding `quants/<names>/quant.sf.gz`
    #[arg(short, long, value_name = "DIR")]
    dir: PathBuf,
    /// the directory of linked transcriptomes
    #[arg(short, long, value_name = "DIR", env = "TXMETA_REGISTRY")]
    registry: Option<PathBuf>,
    /// the tool that produced the quantifications
    #[arg(long, default_value = "salmon")]
    quant_type: QuantType,
    /// summarize the transcripts to genes
    #[arg(long)]
    gene: bool,
    /// a transcript-to-gene table (first column transcripts, second column genes)
    #[arg(long, value_name = "FILE", requires = "gene")]
    tx2gene: Option<PathBuf>,
    /// how to derive the counts: no, scaled-tpm or length-scaled-tpm
    #[arg(long, default_value = "no")]
    counts_from_abundance: CountsFromAbundance,
    /// match transcripts to the annotation ignoring version suffixes
    #[arg(long)]
    ignore_tx_version: bool,
    /// keep only the text before the first `|` of the transcript names
    #[arg(long)]
    ignore_after_bar: bool,
    /// skip reading the run information and identifying the transcriptome
    #[arg(long)]
    skip_meta: bool,
    /// set the reference level of a sample column, as `column=level`
    #[arg(long, value_name = "COLUMN=LEVEL", value_parser = parse_key_val)]
    relevel: Vec<(String, String)>,
    /// keep the features overlapping a region `seqname:start-end[:strand]`;
    /// repeat for several regions
    #[arg(long, value_name = "REGION")]
    region: Vec<GenomicRange>,
    /// ignore the strand of the features when subsetting by region
    #[arg(long)]
    ignore_strand: bool,
    /// keep the samples whose column has the given value, as `column=value`;
    /// values given for the same column are alternatives
    #[arg(long, value_name = "COLUMN=VALUE", value_parser = parse_key_val)]
    filter: Vec<(String, String)>,
    /// a table mapping identifiers to alternate identifiers
    #[arg(long, value_name = "FILE", requires_all = ["ids_key", "ids_value"])]
    ids: Option<PathBuf>,
    /// the key column of the identifier table
    #[arg(long)]
    ids_key: Option<String>,
    /// the value column of the identifier table
    #[arg(long)]
    ids_value: Option<String>,
    /// whether the identifier table is keyed on gene ids or on the feature ids
    #[arg(long, value_enum, default_value_t = IdsBy::Gene)]
    ids_by: IdsBy,
    /// the name of the new row metadata column
    #[arg(long, default_value = "symbol")]
    ids_column: String,
    /// look up identifiers with their version suffix
    #[arg(long)]
    keep_id_version: bool,
    /// the output directory
    #[arg(short, long, value_name = "DIR")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct LinkTxomeArgs {
    /// the directory of linked transcriptomes
    #[arg(short, long, value_name = "DIR", env = "TXMETA_REGISTRY")]
    registry: PathBuf,
    /// the index sequence hash reported in `aux_info/meta_info.json`
    #[arg(long)]
    hash: String,
    /// the annotation source, e.g. LocalGENCODE
    #[arg(long)]
    source: String,
    #[arg(long)]
    organism: String,
    #[arg(long)]
    release: String,
    #[arg(long)]
    genome: String,
    /// the transcript sequences the index was built from
    #[arg(long, value_name = "FILE")]
    fasta: Vec<String>,
    /// the GTF annotation of the transcripts
    #[arg(long, value_name = "FILE")]
    gtf: PathBuf,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(short, long, value_name = "FILE")]
    coldata: PathBuf,
    #[arg(short, long, value_name = "DIR")]
    dir: PathBuf,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() && !v.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected COLUMN=VALUE, got {:?}", s)),
    }
}

fn run_import(args: ImportArgs) -> anyhow::Result<()> {
    let mut col_data = ColData::from_csv(&args.coldata)?;
    col_data.add_files(&args.dir)?;
    for (column, level) in args.relevel.iter() {
        col_data.relevel(column, level)?;
        if let Some(f) = col_data.factor(column) {
            info!("{}", f);
        }
    }

    let options = ImportOptions {
        quant_type: args.quant_type,
        counts_from_abundance: args.counts_from_abundance,
        registry: args.registry.clone(),
        skip_meta: args.skip_meta,
        ignore_tx_version: args.ignore_tx_version,
        ignore_after_bar: args.ignore_after_bar,
        ..Default::default()
    };

    let mut se = if args.gene {
        let tx2gene = args.tx2gene.as_ref().map(Tx2Gene::from_path).transpose()?;
        import_to_gene(&col_data, &options, tx2gene.as_ref())?
    } else {
        import_quants(&col_data, &options)?
    };

    se = se.subset_by_any_overlap(&args.region, &OverlapOptions::new(args.ignore_strand))?;
    se = se.filter_samples_by(&args.filter)?;

    if let (Some(path), Some(key), Some(value)) = (&args.ids, &args.ids_key, &args.ids_value) {
        let id_map = IdMap::from_path(path, key, value)?;
        se.add_ids(
            &id_map,
            &args.ids_column,
            args.ids_by == IdsBy::Gene,
            !args.keep_id_version,
        )?;
    }

    println!("{}", se);
    se.write(&args.out)
}

fn run_link_txome(args: LinkTxomeArgs) -> anyhow::Result<()> {
    if !args.gtf.exists() {
        warn!("The annotation {:?} does not exist (yet).", args.gtf);
    }
    let mut registry = TxomeRegistry::open(&args.registry)?;
    let path = registry.link(TxomeInfo {
        index_seq_hash: args.hash,
        source: args.source,
        organism: args.organism,
        release: args.release,
        genome: args.genome,
        fasta: args.fasta,
        gtf: args.gtf.to_string_lossy().into_owned(),
    })?;
    info!("Wrote {:?}", path);
    Ok(())
}

fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    let mut col_data = ColData::from_csv(&args.coldata)?;
    col_data.add_files(&args.dir)?;
    let missing = col_data.missing_files()?;
    for f in missing.iter() {
        println!("missing\t{}", f.display());
    }
    if !missing.is_empty() {
        bail!(
            "{} of {} quantification file(s) are missing.",
            missing.len(),
            col_data.len()
        )
    }
    info!("All {} quantification file(s) exist.", col_data.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let start = Instant::now();
    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => run_import(args)?,
        Commands::LinkTxome(args) => run_link_txome(args)?,
        Commands::Check(args) => run_check(args)?,
    }

    debug!(
        "done in {:?}, peak memory usage {:.1} MB",
        start.elapsed(),
        PEAK_ALLOC.peak_usage_as_mb()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();

        let base = ["txmeta", "import", "-c", "coldata.csv", "-d", "data", "-o", "out"];
        let parse = |extra: &[&str]| {
            Cli::try_parse_from(base.iter().chain(extra.iter())).map(|cli| match cli.command {
                Commands::Import(args) => args,
                _ => panic!("not an import"),
            })
        };

        let args = parse(&[]).unwrap();
        assert_eq!(args.ids_by, IdsBy::Gene);

        let args = parse(&[
            "--ids", "ids.tsv", "--ids-key", "TXNAME", "--ids-value", "SYMBOL", "--ids-by",
            "feature", "--filter", "condition=trt", "--filter", "batch=b2",
        ])
        .unwrap();
        assert_eq!(args.ids_by, IdsBy::Feature);
        assert_eq!(args.filter.len(), 2);

        assert!(parse(&["--ids-by", "exon"]).is_err());
        assert!(parse(&["--ids", "ids.tsv"]).is_err());
        assert!(parse(&["--region", "chr1:1-18446744073709551615"]).is_err());
    }
}
