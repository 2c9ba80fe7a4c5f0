// ==============================================================================
// models.rs - Cohort Data Models
// ==============================================================================
// Description: Variant, locus, coverage and request types shared by the pipelines
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Reserved id of the known-pathogenic (ClinVar) reference track
pub const KNOWN_VARIANTS_ID: &str = "known-variants";

/// Reserved id of the known-cancer (COSMIC) reference track
pub const COSMIC_VARIANTS_ID: &str = "cosmic-variants";

/// Filter name recorded when a user bookmarks a variant
pub const USER_FLAGGED: &str = "userFlagged";

/// Sample identifier (unique within a cohort)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn known_variants() -> Self {
        Self::new(KNOWN_VARIANTS_ID)
    }

    pub fn cosmic_variants() -> Self {
        Self::new(COSMIC_VARIANTS_ID)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the two curated pseudo-samples that always lead the cohort
    pub fn is_reference_track(&self) -> bool {
        self.0 == KNOWN_VARIANTS_ID || self.0 == COSMIC_VARIANTS_ID
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SampleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Remove a leading "chr" prefix so "chr17" and "17" compare equal
pub fn strip_ref_name(chrom: &str) -> &str {
    match chrom.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") && chrom.len() > 3 => &chrom[3..],
        _ => chrom,
    }
}

/// Genomic identity of a variant, used for every de-duplication and match
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    /// Reference sequence name as reported by the source (e.g., "chr17")
    pub chrom: String,

    /// 1-based start position
    pub start: u64,

    /// 1-based inclusive end position
    pub end: u64,

    /// Reference allele
    #[serde(rename = "ref")]
    pub ref_allele: String,

    /// Alternate allele
    #[serde(rename = "alt")]
    pub alt_allele: String,
}

impl VariantKey {
    pub fn new(
        chrom: impl Into<String>,
        start: u64,
        end: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            ref_allele: ref_allele.into(),
            alt_allele: alt_allele.into(),
        }
    }

    /// Key for a simple variant whose end is implied by the reference allele length
    pub fn point(
        chrom: impl Into<String>,
        start: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        let ref_allele = ref_allele.into();
        let end = start + (ref_allele.len().max(1) as u64) - 1;
        Self::new(chrom, start, end, ref_allele, alt_allele)
    }

    pub fn flag_key(&self) -> FlagKey {
        FlagKey::new(&self.chrom, self.start, &self.ref_allele, &self.alt_allele)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{} {}>{}",
            self.chrom, self.start, self.end, self.ref_allele, self.alt_allele
        )
    }
}

/// Bookmark identity: normalized chromosome, start, REF and ALT (no end)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlagKey {
    pub chrom: String,
    pub start: u64,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl FlagKey {
    pub fn new(chrom: &str, start: u64, ref_allele: &str, alt_allele: &str) -> Self {
        Self {
            chrom: strip_ref_name(chrom).to_string(),
            start,
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
        }
    }
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}>{}", self.chrom, self.start, self.ref_allele, self.alt_allele)
    }
}

/// Zygosity of a sample at a variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zygosity {
    #[serde(rename = "HOMREF")]
    HomRef,
    #[serde(rename = "HET")]
    Het,
    #[serde(rename = "HOMALT")]
    HomAlt,
    /// Missing or unknown genotype
    #[default]
    #[serde(rename = "NONE")]
    NoCall,
}

impl Zygosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zygosity::HomRef => "HOMREF",
            Zygosity::Het => "HET",
            Zygosity::HomAlt => "HOMALT",
            Zygosity::NoCall => "NONE",
        }
    }

    /// Homozygous-reference and missing genotypes never reach a display view
    pub fn is_hom_ref_like(&self) -> bool {
        matches!(self, Zygosity::HomRef | Zygosity::NoCall)
    }
}

/// Predicted functional impact (VEP convention)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    High,
    Moderate,
    Low,
    Modifier,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::High => "HIGH",
            Impact::Moderate => "MODERATE",
            Impact::Low => "LOW",
            Impact::Modifier => "MODIFIER",
        }
    }
}

/// Cross-reference annotation copied onto a variant by the ClinVar batch lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinvarAnnotation {
    /// Clinical significance as reported (e.g., "Pathogenic", "Likely_benign")
    pub clinical_significance: String,

    /// ClinVar accession (e.g., "RCV000013711")
    #[serde(default)]
    pub accession: Option<String>,

    /// Submitted phenotype(s)
    #[serde(default)]
    pub phenotype: Option<String>,

    /// Review status (e.g., "criteria_provided,_single_submitter")
    #[serde(default)]
    pub review_status: Option<String>,
}

/// Where a variant record came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantOrigin {
    /// Loaded from a pre-called variant file
    #[default]
    Loaded,
    /// Produced by the joint caller during this session
    Called,
}

/// One variant as observed in one sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantRecord {
    #[serde(flatten)]
    pub key: VariantKey,

    pub gene_name: Option<String>,

    pub zygosity: Zygosity,

    /// Raw genotype string (e.g., "0/1")
    pub genotype: Option<String>,

    /// Read depth at the site for this sample
    pub depth: Option<u32>,

    pub impact: Option<Impact>,

    /// Highest population allele frequency
    pub allele_frequency: Option<f64>,

    /// None until the ClinVar batch lookup has run
    pub clinvar: Option<ClinvarAnnotation>,

    /// Tumor variants only; None means untagged
    pub is_inherited: Option<bool>,

    pub is_flagged: bool,

    pub is_user_flagged: bool,

    pub filters_passed: BTreeSet<String>,

    pub origin: VariantOrigin,

    /// Pileup stacking level assigned by the view layout
    pub level: usize,

    /// Imported bookmark not yet matched to loaded data
    pub is_proxy: bool,

    /// Additional annotation fields passed through from the annotation service
    pub annotations: BTreeMap<String, String>,
}

impl VariantRecord {
    pub fn new(key: VariantKey, zygosity: Zygosity) -> Self {
        Self {
            key,
            zygosity,
            ..Self::default()
        }
    }

    pub fn is_called(&self) -> bool {
        self.origin == VariantOrigin::Called
    }

    pub fn flag_key(&self) -> FlagKey {
        self.key.flag_key()
    }

    /// Start/REF/ALT match used when reconciling imported bookmarks
    pub fn matches_position(&self, start: u64, ref_allele: &str, alt_allele: &str) -> bool {
        self.key.start == start && self.key.ref_allele == ref_allele && self.key.alt_allele == alt_allele
    }
}

/// Which annotation stages have already run over a variant set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadState {
    pub clinvar: bool,
    pub called: bool,
    pub inheritance: bool,
}

/// Variant set for one sample plus its load state and pileup metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantSet {
    pub features: Vec<VariantRecord>,
    pub load_state: LoadState,
    pub max_level: usize,
    pub feature_width: f64,
}

impl Default for VariantSet {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            load_state: LoadState::default(),
            max_level: 1,
            feature_width: 0.0,
        }
    }
}

impl VariantSet {
    pub fn new(features: Vec<VariantRecord>) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn keys(&self) -> HashSet<VariantKey> {
        self.features.iter().map(|v| v.key.clone()).collect()
    }

    pub fn find(&self, key: &VariantKey) -> Option<&VariantRecord> {
        self.features.iter().find(|v| &v.key == key)
    }

    pub fn find_flagged(&self, key: &FlagKey) -> Option<&VariantRecord> {
        self.features.iter().find(|v| &v.flag_key() == key)
    }
}

/// Per-sample results of one pipeline stage
pub type ResultMap = BTreeMap<SampleId, VariantSet>;

/// Exon/CDS/UTR feature of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFeature {
    pub feature_type: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript_id: String,

    #[serde(default)]
    pub transcript_type: Option<String>,

    #[serde(default)]
    pub gene_type: Option<String>,

    /// RefSeq annotation source (e.g., "BestRefSeq")
    #[serde(default)]
    pub annotation_source: Option<String>,

    #[serde(default)]
    pub features: Vec<TranscriptFeature>,
}

impl Transcript {
    pub fn new(transcript_id: impl Into<String>) -> Self {
        Self {
            transcript_id: transcript_id.into(),
            transcript_type: None,
            gene_type: None,
            annotation_source: None,
            features: Vec::new(),
        }
    }

    pub fn cds_length(&self) -> u64 {
        self.features
            .iter()
            .filter(|f| f.feature_type.eq_ignore_ascii_case("CDS"))
            .map(|f| f.end.abs_diff(f.start))
            .sum()
    }

    fn is_protein_coding(&self) -> bool {
        self.transcript_type.as_deref() == Some("protein_coding")
            || self.gene_type.as_deref() == Some("gene")
    }
}

/// Gene model annotation source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneSource {
    #[default]
    Gencode,
    Refseq,
}

/// A gene and its transcripts: the unit of analysis scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneLocus {
    pub gene_name: String,
    pub chrom: String,
    pub start: u64,
    pub end: u64,

    #[serde(default)]
    pub gene_source: GeneSource,

    #[serde(default)]
    pub transcripts: Vec<Transcript>,
}

impl GeneLocus {
    pub fn transcript(&self, transcript_id: &str) -> Option<&Transcript> {
        self.transcripts.iter().find(|t| t.transcript_id == transcript_id)
    }

    /// Pick the canonical transcript
    ///
    /// Ranking, first difference wins:
    /// 1. protein-coding transcripts
    /// 2. (RefSeq only) NM_ accessions
    /// 3. (RefSeq only) BestRefSeq annotation source
    /// 4. longest coding sequence
    /// 5. listing order
    pub fn canonical_transcript(&self) -> Option<&Transcript> {
        let refseq = self.gene_source == GeneSource::Refseq;

        self.transcripts
            .iter()
            .enumerate()
            .min_by_key(|(order, t)| {
                let type_rank = if t.is_protein_coding() { 0 } else { 1 };
                let level_rank = if refseq && t.transcript_id.starts_with("NM_") { 0 } else { 2 };
                let source_rank = if refseq && t.annotation_source.as_deref() == Some("BestRefSeq") {
                    0
                } else {
                    2
                };
                (type_rank, level_rank, source_rank, Reverse(t.cds_length()), *order)
            })
            .map(|(_, t)| t)
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position <= self.end
    }
}

/// Read depth at one position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthPoint {
    pub pos: u64,
    pub depth: u32,
}

/// Coverage statistics over one region (typically an exon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageBin {
    pub start: u64,
    pub end: u64,
    pub min: u32,
    pub median: f64,
    pub mean: f64,
    pub max: u32,
}

/// Coverage results for one sample over one gene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleCoverage {
    pub depth: Vec<DepthPoint>,
    pub regions: Vec<CoverageBin>,
}

impl SampleCoverage {
    pub fn max_depth(&self) -> u32 {
        self.depth.iter().map(|d| d.depth).max().unwrap_or(0)
    }

    pub fn depth_in(&self, start: u64, end: u64) -> Vec<DepthPoint> {
        self.depth
            .iter()
            .filter(|d| d.pos >= start && d.pos <= end)
            .copied()
            .collect()
    }
}

pub type CoverageMap = BTreeMap<SampleId, SampleCoverage>;

/// Whether computed artifacts are written back to the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    WriteThrough,
    Skip,
}

/// Options accepted by the gene-scoped pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Compute and cache, but leave sample state and progress flags untouched
    pub background: bool,

    pub cache_policy: CachePolicy,

    /// Consult cached artifacts before recomputing
    pub check_cache: bool,

    /// Variant whose refreshed record a joint call should return
    pub source_variant: Option<VariantKey>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            background: false,
            cache_policy: CachePolicy::WriteThrough,
            check_cache: true,
            source_variant: None,
        }
    }
}

impl AnalysisOptions {
    pub fn background() -> Self {
        Self {
            background: true,
            ..Self::default()
        }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_check_cache(mut self, check_cache: bool) -> Self {
        self.check_cache = check_cache;
        self
    }

    pub fn with_source_variant(mut self, key: VariantKey) -> Self {
        self.source_variant = Some(key);
        self
    }
}

/// One gene-scoped unit of work
///
/// The multi-sample batching hint is derived by the orchestrator from the
/// cohort's VCF sources rather than supplied here.
#[derive(Debug, Clone)]
pub struct GeneAnalysisRequest {
    pub locus: GeneLocus,
    pub transcript: Transcript,
    pub options: AnalysisOptions,
}

impl GeneAnalysisRequest {
    pub fn new(locus: GeneLocus, transcript: Transcript) -> Self {
        Self {
            locus,
            transcript,
            options: AnalysisOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(id: &str, kind: &str, cds: &[(u64, u64)]) -> Transcript {
        Transcript {
            transcript_id: id.to_string(),
            transcript_type: Some(kind.to_string()),
            gene_type: None,
            annotation_source: None,
            features: cds
                .iter()
                .map(|(start, end)| TranscriptFeature {
                    feature_type: "CDS".to_string(),
                    start: *start,
                    end: *end,
                })
                .collect(),
        }
    }

    #[test]
    fn test_strip_ref_name() {
        assert_eq!(strip_ref_name("chr17"), "17");
        assert_eq!(strip_ref_name("CHRX"), "X");
        assert_eq!(strip_ref_name("17"), "17");
        assert_eq!(strip_ref_name("chr"), "chr");
    }

    #[test]
    fn test_flag_key_ignores_end_and_prefix() {
        let a = VariantKey::new("chr1", 100, 100, "A", "G");
        let b = VariantKey::new("1", 100, 105, "A", "G");
        assert_ne!(a, b);
        assert_eq!(a.flag_key(), b.flag_key());
    }

    #[test]
    fn test_point_key_end() {
        let snv = VariantKey::point("chr1", 100, "A", "G");
        assert_eq!(snv.end, 100);

        let deletion = VariantKey::point("chr1", 100, "ACGT", "A");
        assert_eq!(deletion.end, 103);
    }

    #[test]
    fn test_canonical_transcript_prefers_coding_then_longest() {
        let gene = GeneLocus {
            gene_name: "TP53".to_string(),
            chrom: "chr17".to_string(),
            start: 7_565_097,
            end: 7_590_856,
            gene_source: GeneSource::Gencode,
            transcripts: vec![
                transcript("ENST01", "processed_transcript", &[(1, 5000)]),
                transcript("ENST02", "protein_coding", &[(1, 100)]),
                transcript("ENST03", "protein_coding", &[(1, 300)]),
                transcript("ENST04", "protein_coding", &[(1, 300)]),
            ],
        };

        let canonical = gene.canonical_transcript().unwrap();
        assert_eq!(canonical.transcript_id, "ENST03");
    }

    #[test]
    fn test_canonical_transcript_refseq_prefers_nm() {
        let gene = GeneLocus {
            gene_name: "BRCA2".to_string(),
            chrom: "chr13".to_string(),
            start: 1,
            end: 10_000,
            gene_source: GeneSource::Refseq,
            transcripts: vec![
                transcript("XM_0001", "protein_coding", &[(1, 900)]),
                transcript("NM_0002", "protein_coding", &[(1, 100)]),
            ],
        };

        assert_eq!(gene.canonical_transcript().unwrap().transcript_id, "NM_0002");
    }

    #[test]
    fn test_zygosity_serde() {
        let json = serde_json::to_string(&Zygosity::HomAlt).unwrap();
        assert_eq!(json, "\"HOMALT\"");
        assert!(Zygosity::NoCall.is_hom_ref_like());
        assert!(!Zygosity::Het.is_hom_ref_like());
    }

    #[test]
    fn test_variant_record_round_trip_flattens_key() {
        let record = VariantRecord::new(VariantKey::point("chr1", 100, "A", "G"), Zygosity::Het);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["chrom"], "chr1");
        assert_eq!(json["ref"], "A");

        let parsed: VariantRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.key, record.key);
    }
}
