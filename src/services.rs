// ==============================================================================
// services.rs - External Collaborator Interfaces
// ==============================================================================
// Description: Traits for the remote services the orchestrator drives
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::cache::CacheStore;
use crate::danger::DangerSummary;
use crate::flagged::FlaggedVariant;
use crate::models::{
    ClinvarAnnotation, CoverageBin, CoverageMap, GeneLocus, ResultMap, SampleCoverage, SampleId,
    Transcript, VariantKey, VariantRecord,
};
use crate::parsers::bookmarks::{BookmarkFormat, BookmarkParseError};
use crate::sample::{AlignmentHandle, SampleUnit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by external services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{service} request failed: {message}")]
    Failed { service: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid service payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn failed(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Failed {
            service,
            message: message.into(),
        }
    }
}

/// Header-level facts about a resolved variant file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcfMetadata {
    pub sample_names: Vec<String>,
    pub ref_names: Vec<String>,
}

/// Header-level facts about a resolved alignment file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentMetadata {
    /// Read-group sample name, used to locate the sample's genotype column
    pub sample_name: Option<String>,
    pub ref_names: Vec<String>,
}

/// Variant-file access and annotation
#[async_trait]
pub trait VcfSource: Send + Sync {
    async fn resolve(&self, url: &str, index_url: Option<&str>) -> Result<VcfMetadata, ServiceError>;

    /// Annotated variants for the gene, keyed by sample id
    ///
    /// `multi_sample` is set when every patient sample reads from the same file.
    async fn annotate(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        samples: &[&SampleUnit],
        multi_sample: bool,
    ) -> Result<ResultMap, ServiceError>;
}

/// Alignment-file access, coverage and joint calling
#[async_trait]
pub trait AlignmentSource: Send + Sync {
    async fn resolve(&self, url: &str, index_url: Option<&str>) -> Result<AlignmentMetadata, ServiceError>;

    async fn coverage(
        &self,
        sample: &SampleUnit,
        locus: &GeneLocus,
        transcript: &Transcript,
    ) -> Result<SampleCoverage, ServiceError>;

    /// Run the joint caller over the alignments and return raw VCF text
    async fn joint_call(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        alignments: &[AlignmentHandle],
        args: &[String],
    ) -> Result<String, ServiceError>;
}

/// Batched ClinVar annotation lookup
#[async_trait]
pub trait ClinvarLookup: Send + Sync {
    async fn batch_query(
        &self,
        keys: &[VariantKey],
        locus: &GeneLocus,
    ) -> Result<HashMap<VariantKey, ClinvarAnnotation>, ServiceError>;
}

/// Gene model lookup
#[async_trait]
pub trait GeneCatalog: Send + Sync {
    async fn fetch_gene(&self, gene_name: &str) -> Result<GeneLocus, ServiceError>;
}

/// Active user filters
pub trait FilterConfig: Send + Sync {
    fn passes(&self, sample_id: &SampleId, variant: &VariantRecord) -> bool;

    fn is_low_coverage(&self, bin: &CoverageBin) -> bool;

    /// Optional display region narrower than the gene
    fn region(&self) -> Option<(u64, u64)> {
        None
    }
}

/// Gene-level badge computation
pub trait DangerClassifier: Send + Sync {
    fn classify(
        &self,
        gene_name: &str,
        variants: &[VariantRecord],
        coverage: &CoverageMap,
        filters: &dyn FilterConfig,
    ) -> DangerSummary;
}

/// Bookmark serialization
pub trait VariantExporter: Send + Sync {
    fn export(
        &self,
        variants: &[FlaggedVariant],
        format: BookmarkFormat,
        sample_names: Option<&[String]>,
    ) -> Result<String, BookmarkParseError>;
}

/// Every collaborator the orchestrator needs, shared behind `Arc`
#[derive(Clone)]
pub struct CohortServices {
    pub vcf: Arc<dyn VcfSource>,
    pub alignments: Arc<dyn AlignmentSource>,
    pub clinvar: Arc<dyn ClinvarLookup>,
    pub genes: Arc<dyn GeneCatalog>,
    pub filters: Arc<dyn FilterConfig>,
    pub classifier: Arc<dyn DangerClassifier>,
    pub cache: Arc<dyn CacheStore>,
    pub exporter: Arc<dyn VariantExporter>,
}
