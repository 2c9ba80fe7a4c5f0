// ==============================================================================
// pipeline/coverage.rs - Coverage Load Pipeline
// ==============================================================================
// Description: Per-sample coverage retrieval and depth views
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::cache::{CacheKey, DataKind};
use crate::error::CohortError;
use crate::models::{AnalysisOptions, CoverageMap, GeneLocus, SampleCoverage, SampleId, Transcript};
use crate::orchestrator::CohortOrchestrator;
use crate::sample::SampleUnit;
use futures::future::try_join_all;
use tracing::debug;

impl CohortOrchestrator {
    /// Coverage for every sample with alignments
    pub(crate) async fn coverage_join(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        options: &AnalysisOptions,
    ) -> Result<CoverageMap, CohortError> {
        let tasks = self
            .roster
            .iter()
            .filter(|unit| unit.is_bam_loaded())
            .map(|unit| self.load_sample_coverage(unit, locus, transcript, options));

        let results = try_join_all(tasks).await?;
        Ok(results.into_iter().collect())
    }

    async fn load_sample_coverage(
        &self,
        unit: &SampleUnit,
        locus: &GeneLocus,
        transcript: &Transcript,
        options: &AnalysisOptions,
    ) -> Result<(SampleId, SampleCoverage), CohortError> {
        if options.check_cache {
            let key = CacheKey::new(&unit.id, &locus.gene_name, &transcript.transcript_id, DataKind::Coverage);
            if let Some(cached) = self.cache.read::<SampleCoverage>(&key).await {
                return Ok((unit.id.clone(), cached));
            }
        }

        let coverage = self
            .services
            .alignments
            .coverage(unit, locus, transcript)
            .await
            .map_err(|e| CohortError::service("Coverage", &locus.gene_name, e))?;

        Ok((unit.id.clone(), coverage))
    }

    /// Clip each sample's depth points to the displayed region and track the peak depth
    pub(crate) fn set_coverage_views(&mut self, locus: &GeneLocus) {
        let (start, end) = self.services.filters.region().unwrap_or((locus.start, locus.end));
        let mut max_depth = self.max_depth;

        for unit in self.roster.units_mut() {
            match &unit.bam_data {
                Some(coverage) => {
                    unit.coverage = coverage.depth_in(start, end);
                    max_depth = max_depth.max(coverage.max_depth());
                }
                None => unit.coverage.clear(),
            }
        }

        if max_depth > self.max_depth {
            debug!("Max depth for {} raised to {}", locus.gene_name, max_depth);
        }
        self.max_depth = max_depth;
    }
}
