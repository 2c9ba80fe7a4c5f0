// ==============================================================================
// parsers/bookmarks.rs - Flagged Variant Import/Export
// ==============================================================================
// Description: CSV and JSON bookmark records plus the default exporter
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Format: CSV with header (JSON uses the same field names)
// Example:
//   gene,transcript,chrom,start,end,ref,alt,filtersPassed,isUserFlagged,freebayesCalled
//   TP53,ENST00000269305,chr17,7577120,7577120,C,T,userFlagged,Y,
//   BRCA2,,chr13,32914438,32914438,T,C,"pathogenic,denovo",,Y
// ==============================================================================

use crate::flagged::FlaggedVariant;
use crate::models::{FlagKey, USER_FLAGGED};
use crate::services::VariantExporter;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during bookmark parsing and export
#[derive(Error, Debug)]
pub enum BookmarkParseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported bookmark format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write bookmarks: {0}")]
    WriteError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkFormat {
    Csv,
    Json,
}

impl BookmarkFormat {
    /// Infer the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, BookmarkParseError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(BookmarkFormat::Csv),
            "json" => Ok(BookmarkFormat::Json),
            other => Err(BookmarkParseError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One imported bookmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub gene: String,

    /// Empty means the gene's canonical transcript
    #[serde(default)]
    pub transcript: Option<String>,

    pub chrom: String,

    pub start: u64,

    #[serde(default)]
    pub end: Option<u64>,

    #[serde(rename = "ref")]
    pub ref_allele: String,

    #[serde(rename = "alt")]
    pub alt_allele: String,

    /// Comma-separated filter names
    #[serde(rename = "filtersPassed", default)]
    pub filters_passed: Option<String>,

    /// "Y" when the user bookmarked the variant
    #[serde(rename = "isUserFlagged", default)]
    pub is_user_flagged: Option<String>,

    /// "Y" when the variant came from the joint caller
    #[serde(rename = "freebayesCalled", default)]
    pub freebayes_called: Option<String>,
}

impl BookmarkRecord {
    pub fn filters(&self) -> BTreeSet<String> {
        self.filters_passed
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn user_flagged(&self) -> bool {
        self.is_user_flagged.as_deref() == Some("Y")
    }

    pub fn called(&self) -> bool {
        self.freebayes_called.as_deref() == Some("Y")
    }

    pub fn transcript_id(&self) -> Option<&str> {
        self.transcript.as_deref().filter(|t| !t.is_empty())
    }

    pub fn flag_key(&self) -> FlagKey {
        FlagKey::new(&self.chrom, self.start, &self.ref_allele, &self.alt_allele)
    }
}

/// Parse bookmark records
///
/// # Arguments
/// * `format` - CSV (with header) or JSON (array of records)
/// * `data` - File contents
///
/// # Example
/// ```
/// use cohort_orchestrator::parsers::bookmarks::{parse_bookmarks, BookmarkFormat};
///
/// let csv = "gene,chrom,start,ref,alt,isUserFlagged\nTP53,chr17,7577120,C,T,Y\n";
/// let records = parse_bookmarks(BookmarkFormat::Csv, csv).unwrap();
/// assert!(records[0].user_flagged());
/// ```
pub fn parse_bookmarks(format: BookmarkFormat, data: &str) -> Result<Vec<BookmarkRecord>, BookmarkParseError> {
    match format {
        BookmarkFormat::Json => Ok(serde_json::from_str(data)?),
        BookmarkFormat::Csv => {
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .trim(csv::Trim::All)
                .from_reader(data.as_bytes());

            let mut records = Vec::new();
            for result in reader.deserialize() {
                let record: BookmarkRecord = result?;
                records.push(record);
            }
            Ok(records)
        }
    }
}

/// Flattened export row; import ignores the extra columns
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    gene: &'a str,
    transcript: &'a str,
    chrom: &'a str,
    start: u64,
    end: u64,
    #[serde(rename = "ref")]
    ref_allele: &'a str,
    #[serde(rename = "alt")]
    alt_allele: &'a str,
    zygosity: &'a str,
    impact: &'a str,
    #[serde(rename = "clinvarClinicalSignificance")]
    clinvar: &'a str,
    #[serde(rename = "filtersPassed")]
    filters_passed: String,
    #[serde(rename = "isUserFlagged")]
    is_user_flagged: &'a str,
    #[serde(rename = "freebayesCalled")]
    freebayes_called: &'a str,
    #[serde(rename = "sampleNames")]
    sample_names: String,
}

impl<'a> ExportRow<'a> {
    fn from_flagged(flagged: &'a FlaggedVariant, sample_names: Option<&[String]>) -> Self {
        let record = &flagged.record;

        Self {
            gene: &flagged.gene_name,
            transcript: flagged.transcript_id.as_deref().unwrap_or_default(),
            chrom: &record.key.chrom,
            start: record.key.start,
            end: record.key.end,
            ref_allele: &record.key.ref_allele,
            alt_allele: &record.key.alt_allele,
            zygosity: record.zygosity.as_str(),
            impact: record.impact.map(|i| i.as_str()).unwrap_or_default(),
            clinvar: record
                .clinvar
                .as_ref()
                .map(|c| c.clinical_significance.as_str())
                .unwrap_or_default(),
            filters_passed: record.filters_passed.iter().cloned().collect::<Vec<_>>().join(","),
            is_user_flagged: if record.is_user_flagged || record.filters_passed.contains(USER_FLAGGED) {
                "Y"
            } else {
                ""
            },
            freebayes_called: if record.is_called() { "Y" } else { "" },
            sample_names: sample_names.map(|names| names.join(",")).unwrap_or_default(),
        }
    }
}

/// Default exporter: CSV with header, or a JSON array
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedExporter;

impl VariantExporter for DelimitedExporter {
    fn export(
        &self,
        variants: &[FlaggedVariant],
        format: BookmarkFormat,
        sample_names: Option<&[String]>,
    ) -> Result<String, BookmarkParseError> {
        let rows: Vec<ExportRow<'_>> = variants
            .iter()
            .map(|v| ExportRow::from_flagged(v, sample_names))
            .collect();

        match format {
            BookmarkFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
            BookmarkFormat::Csv => {
                let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
                for row in &rows {
                    writer.serialize(row)?;
                }
                let bytes = writer
                    .into_inner()
                    .map_err(|e| BookmarkParseError::WriteError(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| BookmarkParseError::WriteError(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VariantKey, VariantRecord, Zygosity};
    use chrono::Utc;

    const CSV: &str = "gene,transcript,chrom,start,end,ref,alt,filtersPassed,isUserFlagged,freebayesCalled
TP53,ENST00000269305,chr17,7577120,7577120,C,T,userFlagged,Y,
BRCA2,,chr13,32914438,,T,C,\"pathogenic, denovo\",,Y
";

    #[test]
    fn test_parse_csv() {
        let records = parse_bookmarks(BookmarkFormat::Csv, CSV).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].transcript_id(), Some("ENST00000269305"));
        assert!(records[0].user_flagged());
        assert!(!records[0].called());
        assert_eq!(records[0].end, Some(7_577_120));

        assert_eq!(records[1].transcript_id(), None);
        assert!(records[1].called());
        assert_eq!(records[1].end, None);
        let filters: Vec<String> = records[1].filters().into_iter().collect();
        assert_eq!(filters, vec!["denovo", "pathogenic"]);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"[{"gene": "TP53", "chrom": "17", "start": 7577120, "ref": "C", "alt": "T",
                        "filtersPassed": "userFlagged", "isUserFlagged": "Y"}]"#;
        let records = parse_bookmarks(BookmarkFormat::Json, json).unwrap();
        assert_eq!(records[0].flag_key(), FlagKey::new("chr17", 7_577_120, "C", "T"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(BookmarkFormat::from_path(Path::new("a/b.CSV")).unwrap(), BookmarkFormat::Csv);
        assert!(BookmarkFormat::from_path(Path::new("bookmarks.xlsx")).is_err());
    }

    #[test]
    fn test_export_reimports() {
        let mut record = VariantRecord::new(VariantKey::point("chr17", 7_577_120, "C", "T"), Zygosity::Het);
        record.is_user_flagged = true;
        record.filters_passed.insert(USER_FLAGGED.to_string());
        let flagged = FlaggedVariant {
            record,
            gene_name: "TP53".to_string(),
            transcript_id: Some("ENST00000269305".to_string()),
            flagged_at: Utc::now(),
        };

        let names = vec!["normal".to_string(), "tumor".to_string()];
        let csv = DelimitedExporter
            .export(&[flagged], BookmarkFormat::Csv, Some(&names))
            .unwrap();
        assert!(csv.starts_with("gene,transcript,chrom,start,end,ref,alt"));
        assert!(csv.contains("\"normal,tumor\""));

        let records = parse_bookmarks(BookmarkFormat::Csv, &csv).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].user_flagged());
        assert_eq!(records[0].gene, "TP53");
    }
}
