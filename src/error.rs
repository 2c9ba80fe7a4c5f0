// ==============================================================================
// error.rs - Orchestrator Error Types
// ==============================================================================
// Description: Error taxonomy surfaced by cohort-level operations
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::models::{SampleId, VariantKey};
use crate::parsers::bookmarks::BookmarkParseError;
use crate::parsers::vcf::CalledVcfParseError;
use crate::services::ServiceError;
use std::fmt;
use thiserror::Error;

/// Kind of data source attached to a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Vcf,
    Alignment,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Vcf => f.write_str("VCF"),
            SourceKind::Alignment => f.write_str("alignment"),
        }
    }
}

/// Errors surfaced by the orchestrator
///
/// Cache failures never appear here; the cache gateway logs them and degrades
/// to a miss or a skipped write.
#[derive(Error, Debug)]
pub enum CohortError {
    #[error("Failed to resolve {kind} source for sample {sample}: {source}")]
    SourceResolution {
        sample: SampleId,
        kind: SourceKind,
        #[source]
        source: ServiceError,
    },

    #[error("{operation} failed for gene {gene}: {source}")]
    Service {
        operation: &'static str,
        gene: String,
        #[source]
        source: ServiceError,
    },

    #[error("Variant {0} is not present in the unique variant matrix")]
    VariantNotInMatrix(VariantKey),

    #[error("Unknown sample: {0}")]
    UnknownSample(SampleId),

    #[error("Cohort has not been initialized")]
    NotInitialized,

    #[error("Sample id '{0}' is reserved for a reference track")]
    ReservedSampleId(SampleId),

    #[error("Duplicate sample id: {0}")]
    DuplicateSample(SampleId),

    #[error("Sample order index {index} is out of range ({len} patient samples)")]
    InvalidOrder { index: usize, len: usize },

    #[error("No alignments available to joint call gene {0}")]
    NoAlignments(String),

    #[error("Failed to parse joint caller output: {0}")]
    CallerOutput(#[from] CalledVcfParseError),

    #[error("Bookmark error: {0}")]
    Bookmarks(#[from] BookmarkParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CohortError {
    pub fn service(operation: &'static str, gene: &str, source: ServiceError) -> Self {
        CohortError::Service {
            operation,
            gene: gene.to_string(),
            source,
        }
    }

    /// Referenced entity is missing from the in-memory cohort state
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            CohortError::VariantNotInMatrix(_) | CohortError::UnknownSample(_)
        )
    }
}
