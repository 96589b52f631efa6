use crate::txmeta_utils::is_gzipped;
use anyhow::{self, bail, Context};
use flate2::bufread::MultiGzDecoder;
use noodles::gtf;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// The optional transcript attributes kept as extra columns of the
/// transcript ranges, when the annotation provides them.
pub const TX_ATTRIBUTES: [&str; 6] = [
    "gene_name",
    "transcript_name",
    "gene_type",
    "gene_biotype",
    "transcript_type",
    "transcript_biotype",
];

// exon bounds of a transcript, used when the transcript has no record of its own
struct ExonSpan {
    seqname: String,
    strand: String,
    start: i64,
    end: i64,
    gene_id: Option<String>,
    attributes: HashMap<String, String>,
}

/// The transcripts of a GTF annotation, stored column-wise.
///
/// # Fields
///
/// * `seqname`: the reference sequence of each transcript.
/// * `start`, `end`: the 1-based inclusive bounds of each transcript.
/// * `strand`: `+`, `-` or `*` when the annotation gives no strand.
/// * `tx_name`: the `transcript_id` attribute.
/// * `gene_id`: the `gene_id` attribute, if present.
/// * `attributes`: the [TX_ATTRIBUTES] present in the annotation, aligned with the transcripts.
/// * `misc`: other information, such as the comment lines of the file.
///
/// Only `transcript` records are read. A transcript described only by its
/// `exon` records gets the span of its exons as its range.
pub struct TxStruct {
    pub seqname: Vec<String>,
    pub start: Vec<i64>,
    pub end: Vec<i64>,
    pub strand: Vec<String>,
    pub tx_name: Vec<String>,
    pub gene_id: Vec<Option<String>>,
    pub attributes: HashMap<String, Vec<Option<String>>>,
    pub misc: HashMap<String, Vec<String>>,
}

impl TxStruct {
    pub fn new() -> TxStruct {
        TxStruct {
            seqname: Vec::with_capacity(1_0000),
            start: Vec::with_capacity(1_0000),
            end: Vec::with_capacity(1_0000),
            strand: Vec::with_capacity(1_0000),
            tx_name: Vec::with_capacity(1_0000),
            gene_id: Vec::with_capacity(1_0000),
            attributes: HashMap::new(),
            misc: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tx_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx_name.is_empty()
    }

    /// Reads the transcripts of a (possibly gzipped) GTF file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use txmeta::reader::gtf::TxStruct;
    ///
    /// let txs = TxStruct::from_gtf("gencode.v44.annotation.gtf.gz").unwrap();
    /// println!("{} transcripts", txs.len());
    /// ```
    pub fn from_gtf<T: AsRef<Path>>(file_path: T) -> anyhow::Result<TxStruct> {
        let mut txs = TxStruct::new();
        txs.misc
            .insert(String::from("file_type"), vec![String::from("GTF")]);

        let file = File::open(file_path.as_ref())
            .with_context(|| format!("Could not open the annotation {:?}", file_path.as_ref()))?;
        let mut inner_rdr = BufReader::new(file);
        if is_gzipped(&mut inner_rdr)? {
            info!("auto-detected gzipped file - reading via decompression");
            let mut rdr = gtf::Reader::new(BufReader::new(MultiGzDecoder::new(inner_rdr)));
            txs._from_gtf(&mut rdr)?;
        } else {
            let mut rdr = gtf::Reader::new(inner_rdr);
            txs._from_gtf(&mut rdr)?;
        }

        Ok(txs)
    }

    fn _from_gtf<T: BufRead>(&mut self, rdr: &mut gtf::Reader<T>) -> anyhow::Result<()> {
        let mut rec_attr_hm: HashMap<String, String> = HashMap::with_capacity(100);
        let mut exon_spans: HashMap<String, ExonSpan> = HashMap::new();
        let mut n_comments = 0usize;
        let mut n_records = 0usize;

        for l in rdr.lines() {
            let line = l?;
            match line {
                gtf::Line::Record(r) => {
                    n_records += 1;
                    let ty = r.ty();
                    if ty != "transcript" && ty != "exon" {
                        continue;
                    }

                    rec_attr_hm.clear();
                    for attr in r.attributes().iter() {
                        rec_attr_hm.insert(attr.key().to_string(), attr.value().to_string());
                    }
                    let Some(tx_id) = rec_attr_hm.remove("transcript_id") else {
                        bail!(
                            "Found a {} record without a transcript_id attribute (record {}).",
                            ty,
                            n_records
                        )
                    };

                    let seqname = r.reference_sequence_name().to_string();
                    let strand = r
                        .strand()
                        .map(|st| st.as_ref().to_owned())
                        .unwrap_or_else(|| String::from("*"));
                    let start = r.start().get() as i64;
                    let end = r.end().get() as i64;

                    if ty == "transcript" {
                        let gene_id = rec_attr_hm.remove("gene_id");
                        self.push(seqname, start, end, strand, tx_id, gene_id, &rec_attr_hm);
                    } else {
                        exon_spans
                            .entry(tx_id)
                            .and_modify(|span| {
                                span.start = span.start.min(start);
                                span.end = span.end.max(end);
                            })
                            .or_insert_with(|| ExonSpan {
                                seqname,
                                strand,
                                start,
                                end,
                                gene_id: rec_attr_hm.remove("gene_id"),
                                attributes: rec_attr_hm.clone(),
                            });
                    }
                }
                gtf::Line::Comment(c) => {
                    n_comments += 1;
                    self.misc
                        .entry(String::from("comments"))
                        .and_modify(|v| v.push(c.clone()))
                        .or_insert(vec![c]);
                    continue;
                }
            }
        }

        // transcripts only described by their exons
        for tx in self.tx_name.iter() {
            exon_spans.remove(tx);
        }
        if !exon_spans.is_empty() {
            warn!(
                "{} transcript(s) have no transcript record; their ranges were imputed from their exons.",
                exon_spans.len()
            );
            let mut imputed: Vec<(String, ExonSpan)> = exon_spans.into_iter().collect();
            imputed.sort_by(|a, b| a.0.cmp(&b.0));
            for (tx_id, span) in imputed {
                self.push(
                    span.seqname,
                    span.start,
                    span.end,
                    span.strand,
                    tx_id,
                    span.gene_id,
                    &span.attributes,
                );
            }
        }

        info!(
            "Finished parsing the input file. Found {} comments, {} records and {} transcripts.",
            n_comments,
            n_records,
            self.len()
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        seqname: String,
        start: i64,
        end: i64,
        strand: String,
        tx_id: String,
        gene_id: Option<String>,
        attributes: &HashMap<String, String>,
    ) {
        let tally = self.len();
        for &a in TX_ATTRIBUTES.iter() {
            match attributes.get(a) {
                Some(v) => {
                    // the first time an attribute is seen, the earlier transcripts lack it
                    self.attributes
                        .entry(a.to_string())
                        .or_insert_with(|| vec![None; tally])
                        .push(Some(v.clone()));
                }
                None => {
                    if let Some(vec) = self.attributes.get_mut(a) {
                        vec.push(None);
                    }
                }
            }
        }
        self.seqname.push(seqname);
        self.start.push(start);
        self.end.push(end);
        self.strand.push(strand);
        self.tx_name.push(tx_id);
        self.gene_id.push(gene_id);
    }
}

impl Default for TxStruct {
    fn default() -> Self {
        TxStruct::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GTF: &[u8] = b"#!genome-build GRCh38.p14\n\
chr1\tHAVANA\tgene\t11869\t14409\t.\t+\t.\tgene_id \"ENSG00000290825.1\"; gene_type \"lncRNA\"; gene_name \"DDX11L2\";\n\
chr1\tHAVANA\ttranscript\t11869\t14409\t.\t+\t.\tgene_id \"ENSG00000290825.1\"; transcript_id \"ENST00000456328.2\"; gene_type \"lncRNA\"; gene_name \"DDX11L2\"; transcript_name \"DDX11L2-202\";\n\
chr1\tHAVANA\texon\t11869\t12227\t.\t+\t.\tgene_id \"ENSG00000290825.1\"; transcript_id \"ENST00000456328.2\"; gene_name \"DDX11L2\"; exon_number 1;\n\
chr1\tHAVANA\texon\t12613\t12721\t.\t+\t.\tgene_id \"ENSG00000290825.1\"; transcript_id \"ENST00000456328.2\"; gene_name \"DDX11L2\"; exon_number 2;\n\
chr1\tENSEMBL\texon\t17369\t17436\t.\t-\t.\tgene_id \"ENSG00000278267.1\"; transcript_id \"ENST00000619216.1\"; exon_number 1;\n\
chr1\tENSEMBL\texon\t17500\t17600\t.\t-\t.\tgene_id \"ENSG00000278267.1\"; transcript_id \"ENST00000619216.1\"; exon_number 2;\n";

    #[test]
    fn test_from_gtf() {
        let mut rdr = gtf::Reader::new(GTF);
        let mut txs = TxStruct::new();
        txs._from_gtf(&mut rdr).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs.tx_name, vec!["ENST00000456328.2", "ENST00000619216.1"]);
        assert_eq!(txs.seqname, vec!["chr1", "chr1"]);
        assert_eq!(txs.start, vec![11869, 17369]);
        // imputed from the exon bounds
        assert_eq!(txs.end, vec![14409, 17600]);
        assert_eq!(txs.strand, vec!["+", "-"]);
        assert_eq!(
            txs.gene_id,
            vec![
                Some(String::from("ENSG00000290825.1")),
                Some(String::from("ENSG00000278267.1"))
            ]
        );
        assert_eq!(
            txs.attributes.get("gene_name").unwrap(),
            &vec![Some(String::from("DDX11L2")), None]
        );
        assert_eq!(
            txs.attributes.get("transcript_name").unwrap(),
            &vec![Some(String::from("DDX11L2-202")), None]
        );
        assert!(!txs.attributes.contains_key("transcript_biotype"));
        assert_eq!(txs.misc.get("comments").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_transcript_id() {
        let bad: &[u8] = b"chr1\tHAVANA\ttranscript\t1\t10\t.\t+\t.\tgene_id \"g1\";\n";
        let mut rdr = gtf::Reader::new(bad);
        let mut txs = TxStruct::new();
        assert!(txs._from_gtf(&mut rdr).is_err());
    }
}
