// ==============================================================================
// parsers/vcf.rs - Joint Caller Output Parser
// ==============================================================================
// Description: Parses multi-sample VCF text from the joint caller using noodles-vcf
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// - noodles-vcf: https://docs.rs/noodles-vcf/0.81.0/noodles_vcf/
// ==============================================================================

use crate::genotype::zygosity_for_allele;
use crate::models::{
    strip_ref_name, GeneLocus, ResultMap, SampleId, VariantKey, VariantOrigin, VariantRecord, VariantSet,
};
use noodles_vcf as vcf;
use noodles_vcf::variant::record::AlternateBases;
use thiserror::Error;
use tracing::warn;

/// Joint caller output parsing errors
#[derive(Error, Debug)]
pub enum CalledVcfParseError {
    #[error("Failed to read VCF header: {0}")]
    HeaderError(String),

    #[error("Failed to parse VCF record at line {line}: {message}")]
    RecordError { line: usize, message: String },

    #[error("No genotype column for sample {0}")]
    MissingColumn(SampleId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Where to find one sample's genotypes in the caller output
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeColumn {
    pub sample_id: SampleId,
    /// Header name to look for first
    pub sample_name: Option<String>,
    /// Column position used when the name is absent from the header
    pub position: usize,
}

/// One VCF site with its raw per-sample fields
struct Site {
    chrom: String,
    start: u64,
    ref_allele: String,
    alt_alleles: Vec<String>,
    format_keys: Vec<String>,
    samples: Vec<String>,
}

/// Parser for joint-caller VCF text
#[derive(Debug, Default)]
pub struct CalledVcfParser {
    /// Chromosome naming used by the gene (caller output is renamed to match)
    pub ref_name: Option<String>,

    pub gene_name: Option<String>,

    /// Count of skipped sample calls (for reporting)
    pub skipped_count: usize,
}

impl CalledVcfParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name records after the gene's chromosome convention and gene name
    pub fn with_locus(mut self, locus: &GeneLocus) -> Self {
        self.ref_name = Some(locus.chrom.clone());
        self.gene_name = Some(locus.gene_name.clone());
        self
    }

    /// Parse caller output into one called variant set per requested sample
    ///
    /// Homozygous-reference and missing genotypes are not reported. Every
    /// requested sample gets an entry, even when it carries no variants.
    /// A malformed genotype fails the whole parse.
    pub fn parse(&mut self, raw: &str, columns: &[GenotypeColumn]) -> Result<ResultMap, CalledVcfParseError> {
        let mut reader = vcf::io::Reader::new(raw.as_bytes());

        let header = reader
            .read_header()
            .map_err(|e| CalledVcfParseError::HeaderError(format!("{}", e)))?;

        let header_names: Vec<String> = header.sample_names().iter().cloned().collect();
        let indices = resolve_columns(&header_names, columns)?;

        let mut results: ResultMap = columns
            .iter()
            .map(|column| {
                let mut set = VariantSet::default();
                set.load_state.called = true;
                (column.sample_id.clone(), set)
            })
            .collect();

        self.skipped_count = 0;

        for (line_num, result) in reader.records().enumerate() {
            let record = result.map_err(|e| CalledVcfParseError::RecordError {
                line: line_num + 1,
                message: e.to_string(),
            })?;

            let site = self.parse_site(&record).map_err(|message| CalledVcfParseError::RecordError {
                line: line_num + 1,
                message,
            })?;

            let Some(gt_index) = site.format_keys.iter().position(|k| k == "GT") else {
                warn!("Line {}: no GT in FORMAT, skipping site", line_num + 1);
                self.skipped_count += 1;
                continue;
            };
            let dp_index = site.format_keys.iter().position(|k| k == "DP");

            for (sample_id, column) in &indices {
                let Some(values) = site.samples.get(*column) else {
                    continue;
                };
                let values: Vec<&str> = values.split(':').collect();
                let Some(genotype) = values.get(gt_index) else {
                    continue;
                };
                let depth = dp_index
                    .and_then(|i| values.get(i))
                    .and_then(|dp| dp.parse::<u32>().ok());

                for (alt_index, alt) in site.alt_alleles.iter().enumerate() {
                    let zygosity = zygosity_for_allele(genotype, alt_index as u32 + 1).map_err(|e| {
                        CalledVcfParseError::RecordError {
                            line: line_num + 1,
                            message: format!("sample {}: {}", sample_id, e),
                        }
                    })?;
                    if zygosity.is_hom_ref_like() {
                        continue;
                    }

                    let mut variant = VariantRecord::new(
                        VariantKey::point(site.chrom.clone(), site.start, site.ref_allele.clone(), alt.clone()),
                        zygosity,
                    );
                    variant.genotype = Some(genotype.to_string());
                    variant.depth = depth;
                    variant.origin = VariantOrigin::Called;
                    variant.gene_name = self.gene_name.clone();

                    if let Some(set) = results.get_mut(sample_id) {
                        set.features.push(variant);
                    }
                }
            }
        }

        Ok(results)
    }

    fn parse_site(&self, record: &vcf::Record) -> Result<Site, String> {
        let chrom = self.translate_ref_name(record.reference_sequence_name());

        let start = match record.variant_start() {
            Some(Ok(pos)) => usize::from(pos.get()) as u64,
            Some(Err(e)) => return Err(format!("Failed to get position: {}", e)),
            None => return Err("Missing position".to_string()),
        };

        let ref_allele = record.reference_bases().to_string();

        let mut alt_alleles = Vec::new();
        for alt in record.alternate_bases().iter() {
            let alt = alt.map_err(|e| format!("Failed to get ALT allele: {}", e))?;
            // Spanning deletions belong to another site
            if alt != "*" {
                alt_alleles.push(alt.to_string());
            }
        }

        // FORMAT followed by one tab-separated column per sample
        let samples = record.samples();
        let raw: &str = samples.as_ref();
        let mut fields = raw.split('\t');
        let format_keys = fields
            .next()
            .map(|format| format.split(':').map(str::to_string).collect())
            .unwrap_or_default();
        let samples = fields.map(str::to_string).collect();

        Ok(Site {
            chrom,
            start,
            ref_allele,
            alt_alleles,
            format_keys,
            samples,
        })
    }

    /// "1" becomes "chr1" when the gene is named with a prefix, and vice versa
    fn translate_ref_name(&self, chrom: &str) -> String {
        match &self.ref_name {
            Some(ref_name) if strip_ref_name(ref_name) == strip_ref_name(chrom) => ref_name.clone(),
            _ => chrom.to_string(),
        }
    }
}

fn resolve_columns(
    header_names: &[String],
    columns: &[GenotypeColumn],
) -> Result<Vec<(SampleId, usize)>, CalledVcfParseError> {
    columns
        .iter()
        .map(|column| {
            let by_name = column
                .sample_name
                .as_ref()
                .and_then(|name| header_names.iter().position(|n| n == name));

            match by_name {
                Some(index) => Ok((column.sample_id.clone(), index)),
                None if column.position < header_names.len() => Ok((column.sample_id.clone(), column.position)),
                None => Err(CalledVcfParseError::MissingColumn(column.sample_id.clone())),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Zygosity;

    const CALLED: &str = "##fileformat=VCFv4.2
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNORMAL\tTUMOR
1\t100\t.\tA\tG\t50\t.\t.\tGT:DP\t0/1:30\t0/1:25
1\t200\t.\tC\tT\t50\t.\t.\tGT:DP\t0/0:30\t0/1:18
1\t300\t.\tG\tA,C\t50\t.\t.\tGT:DP\t1/2:40\t./.:0
";

    fn column(id: &str, name: Option<&str>, position: usize) -> GenotypeColumn {
        GenotypeColumn {
            sample_id: SampleId::new(id),
            sample_name: name.map(str::to_string),
            position,
        }
    }

    fn locus() -> GeneLocus {
        GeneLocus {
            gene_name: "GENE1".to_string(),
            chrom: "chr1".to_string(),
            start: 1,
            end: 1000,
            gene_source: Default::default(),
            transcripts: Vec::new(),
        }
    }

    #[test]
    fn test_parse_by_sample_name() {
        let mut parser = CalledVcfParser::new().with_locus(&locus());
        let columns = [column("s1", Some("TUMOR"), 0), column("s0", Some("NORMAL"), 1)];

        let results = parser.parse(CALLED, &columns).unwrap();

        let normal = &results[&SampleId::new("s0")];
        let starts: Vec<u64> = normal.features.iter().map(|v| v.key.start).collect();
        assert_eq!(starts, vec![100, 300, 300]);
        assert!(normal.load_state.called);
        assert!(normal.features.iter().all(|v| v.is_called() && v.key.chrom == "chr1"));

        let tumor = &results[&SampleId::new("s1")];
        assert_eq!(tumor.features.len(), 2);
        assert_eq!(tumor.features[1].key, VariantKey::point("chr1", 200, "C", "T"));
        assert_eq!(tumor.features[1].depth, Some(18));
        assert_eq!(tumor.features[1].gene_name.as_deref(), Some("GENE1"));
    }

    #[test]
    fn test_multi_allelic_split() {
        let mut parser = CalledVcfParser::new();
        let results = parser.parse(CALLED, &[column("s0", Some("NORMAL"), 0)]).unwrap();

        let site: Vec<&VariantRecord> = results[&SampleId::new("s0")]
            .features
            .iter()
            .filter(|v| v.key.start == 300)
            .collect();
        assert_eq!(site.len(), 2);
        assert_eq!(site[0].key.alt_allele, "A");
        assert_eq!(site[1].key.alt_allele, "C");
        assert!(site.iter().all(|v| v.zygosity == Zygosity::Het));
        assert_eq!(site[0].key.chrom, "1");
    }

    #[test]
    fn test_positional_fallback() {
        let mut parser = CalledVcfParser::new();
        let results = parser
            .parse(CALLED, &[column("s0", None, 0), column("s1", Some("UNKNOWN"), 1)])
            .unwrap();

        assert_eq!(results[&SampleId::new("s0")].features.len(), 3);
        assert_eq!(results[&SampleId::new("s1")].features.len(), 2);
    }

    #[test]
    fn test_missing_column() {
        let mut parser = CalledVcfParser::new();
        let result = parser.parse(CALLED, &[column("s5", None, 5)]);
        assert!(matches!(result, Err(CalledVcfParseError::MissingColumn(_))));
    }

    #[test]
    fn test_malformed_genotype_fails_parse() {
        let malformed = CALLED.replace("0/1:30\t0/1:25", "0/x:30\t0/1:25");
        let mut parser = CalledVcfParser::new();
        let result = parser.parse(&malformed, &[column("s0", Some("NORMAL"), 0), column("s1", Some("TUMOR"), 1)]);

        assert!(matches!(result, Err(CalledVcfParseError::RecordError { line: 1, .. })));
    }

    #[test]
    fn test_no_records() {
        let header_only = CALLED.lines().take(4).collect::<Vec<_>>().join("\n") + "\n";
        let mut parser = CalledVcfParser::new();
        let results = parser.parse(&header_only, &[column("s0", None, 0)]).unwrap();
        assert!(results[&SampleId::new("s0")].is_empty());
    }
}
