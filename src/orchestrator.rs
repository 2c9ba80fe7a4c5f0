// ==============================================================================
// orchestrator.rs - Cohort Analysis Orchestrator
// ==============================================================================
// Description: Owns the cohort and drives the per-gene analysis pipelines
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Gene load:
//   1. Reset state of samples that hold another gene's data
//   2. Variant join and coverage join, concurrently
//   3. Write results through to the cache
//   4. Publish results onto sample units (foreground only)
//   5. Recompute the gene's danger summary from the normal sample
//   6. Rebuild views and the unique variant matrix (foreground only)
// ==============================================================================

use crate::cache::{CacheGateway, CacheKey, DataKind};
use crate::config::OrchestratorConfig;
use crate::danger::{compare_summaries, danger_inputs, DangerSummary};
use crate::error::CohortError;
use crate::flagged::FlaggedVariantStore;
use crate::models::{
    CachePolicy, CoverageMap, GeneAnalysisRequest, GeneLocus, ResultMap, SampleCoverage, SampleId,
    Transcript, VariantSet,
};
use crate::pipeline::view::{UniqueVariantMatrix, ViewScope};
use crate::reference_tracks::ReferenceTrackManager;
use crate::sample::{SampleDescriptor, SampleRoster, SampleUnit};
use crate::services::CohortServices;
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tumor/normal status of a patient sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TumorInfo {
    pub id: SampleId,
    pub display_name: String,
    pub status: &'static str,
}

/// Cohort state and per-gene analysis driver
pub struct CohortOrchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) services: CohortServices,
    pub(crate) cache: CacheGateway,
    pub(crate) reference_tracks: ReferenceTrackManager,
    pub(crate) roster: SampleRoster,
    pub(crate) matrix: UniqueVariantMatrix,
    pub(crate) flagged: FlaggedVariantStore,
    pub(crate) genes_in_progress: Vec<String>,
    /// Keyed by upper-cased gene name
    pub(crate) danger_summaries: HashMap<String, DangerSummary>,
    /// Gene models resolved so far
    pub(crate) genes: HashMap<String, GeneLocus>,
    pub(crate) max_depth: u32,
    pub(crate) is_loaded: bool,
}

impl CohortOrchestrator {
    pub fn new(config: OrchestratorConfig, services: CohortServices) -> Self {
        let cache = CacheGateway::new(services.cache.clone());
        let reference_tracks = ReferenceTrackManager::from_config(&config);

        Self {
            config,
            services,
            cache,
            reference_tracks,
            roster: SampleRoster::default(),
            matrix: UniqueVariantMatrix::default(),
            flagged: FlaggedVariantStore::default(),
            genes_in_progress: Vec::new(),
            danger_summaries: HashMap::new(),
            genes: HashMap::new(),
            max_depth: 0,
            is_loaded: false,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ==========================================================================
    // COHORT MANAGEMENT
    // ==========================================================================

    /// Replace the cohort with the described samples plus the reference tracks
    pub async fn init_cohort(&mut self, descriptors: &[SampleDescriptor]) -> Result<(), CohortError> {
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if descriptor.id.is_reference_track() {
                return Err(CohortError::ReservedSampleId(descriptor.id.clone()));
            }
            if !seen.insert(descriptor.id.clone()) {
                return Err(CohortError::DuplicateSample(descriptor.id.clone()));
            }
        }

        self.is_loaded = false;
        self.roster.clear();
        self.matrix.clear();
        self.flagged.clear();
        self.genes_in_progress.clear();
        self.danger_summaries.clear();
        self.max_depth = 0;

        let services = &self.services;
        let units = try_join_all(descriptors.iter().map(|d| SampleUnit::resolve(d, services))).await?;
        for unit in units {
            self.roster.insert(unit, None);
        }

        let added = self.reference_tracks.ensure_tracks(&mut self.roster);
        self.is_loaded = true;

        info!(
            "Cohort initialized with {} samples and {} reference tracks",
            descriptors.len(),
            added
        );
        Ok(())
    }

    /// Add (or replace) one sample; `position` is among patient samples
    pub async fn add_sample(
        &mut self,
        descriptor: &SampleDescriptor,
        position: Option<usize>,
    ) -> Result<(), CohortError> {
        if descriptor.id.is_reference_track() {
            return Err(CohortError::ReservedSampleId(descriptor.id.clone()));
        }

        let unit = SampleUnit::resolve(descriptor, &self.services).await?;
        let offset = self.reference_tracks.present_count(&self.roster);
        if self.roster.insert(unit, position.map(|p| p + offset)).is_some() {
            debug!("Replaced sample {}", descriptor.id);
        }

        self.reference_tracks.ensure_tracks(&mut self.roster);
        Ok(())
    }

    /// Remove a patient sample; reference tracks cannot be removed
    pub fn remove_sample(&mut self, id: &SampleId) -> Result<SampleUnit, CohortError> {
        if id.is_reference_track() {
            return Err(CohortError::ReservedSampleId(id.clone()));
        }
        self.roster
            .remove(id)
            .ok_or_else(|| CohortError::UnknownSample(id.clone()))
    }

    /// Drop patient samples not in `keep`; returns how many were removed
    pub fn remove_extra_samples(&mut self, keep: &[SampleId]) -> usize {
        let extra: Vec<SampleId> = self
            .roster
            .patients()
            .map(|unit| unit.id.clone())
            .filter(|id| !keep.contains(id))
            .collect();

        for id in &extra {
            self.roster.remove(id);
        }
        extra.len()
    }

    /// Move a patient sample from one display position to another
    pub fn update_sample_order(&mut self, old_index: usize, new_index: usize) -> Result<(), CohortError> {
        let mut patients: Vec<SampleId> = self.roster.patients().map(|unit| unit.id.clone()).collect();
        let len = patients.len();
        for index in [old_index, new_index] {
            if index >= len {
                return Err(CohortError::InvalidOrder { index, len });
            }
        }

        let moved = patients.remove(old_index);
        patients.insert(new_index, moved);

        let mut order: Vec<SampleId> = self
            .roster
            .iter()
            .filter(|unit| unit.is_reference)
            .map(|unit| unit.id.clone())
            .collect();
        order.extend(patients);
        self.roster.set_order(order);
        Ok(())
    }

    /// Reference tracks first, patients in their current order
    pub fn sort_samples(&mut self) {
        self.reference_tracks.sort_tracks_first(&mut self.roster);
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub fn samples(&self) -> impl Iterator<Item = &SampleUnit> + '_ {
        self.roster.iter()
    }

    pub fn sample(&self, id: &SampleId) -> Option<&SampleUnit> {
        self.roster.get(id)
    }

    /// First non-tumor patient sample in display order
    pub fn normal_sample_id(&self) -> Option<SampleId> {
        self.roster
            .patients()
            .find(|unit| !unit.is_tumor)
            .map(|unit| unit.id.clone())
    }

    pub fn normal_sample(&self) -> Option<&SampleUnit> {
        self.roster.patients().find(|unit| !unit.is_tumor)
    }

    pub(crate) fn tumor_ids(&self) -> HashSet<SampleId> {
        self.roster
            .patients()
            .filter(|unit| unit.is_tumor)
            .map(|unit| unit.id.clone())
            .collect()
    }

    /// Patient sample ids in display order
    pub fn canonical_ids(&self) -> Vec<SampleId> {
        self.roster.patients().map(|unit| unit.id.clone()).collect()
    }

    /// Every patient sample with a VCF reads from the same file
    pub fn samples_in_single_vcf(&self) -> bool {
        let sources: BTreeSet<&str> = self
            .roster
            .patients()
            .filter_map(|unit| unit.vcf.as_ref().map(|vcf| vcf.url.as_str()))
            .collect();
        sources.len() == 1
    }

    pub fn is_alignments_only(&self) -> bool {
        let mut patients = self.roster.patients().peekable();
        patients.peek().is_some() && patients.all(SampleUnit::is_alignments_only)
    }

    pub fn has_alignments(&self) -> bool {
        self.roster.patients().any(SampleUnit::is_bam_loaded)
    }

    pub fn is_multi_sample(&self) -> bool {
        self.roster.patients().count() > 1
    }

    pub fn tumor_info(&self) -> Vec<TumorInfo> {
        self.roster
            .patients()
            .map(|unit| TumorInfo {
                id: unit.id.clone(),
                display_name: unit.display_name.clone(),
                status: unit.tumor_status(),
            })
            .collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn genes_in_progress(&self) -> &[String] {
        &self.genes_in_progress
    }

    /// Forget every gene marked in progress
    pub fn stop_analysis(&mut self) {
        if !self.genes_in_progress.is_empty() {
            info!("Stopping analysis of {} genes", self.genes_in_progress.len());
        }
        self.genes_in_progress.clear();
    }

    /// Drop called variants from every sample
    pub fn clear_called_variants(&mut self) {
        for unit in self.roster.units_mut() {
            unit.clear_called_variants();
        }
    }

    pub fn unique_variants(&self) -> &UniqueVariantMatrix {
        &self.matrix
    }

    pub fn danger_summary(&self, gene_name: &str) -> Option<&DangerSummary> {
        self.danger_summaries.get(&gene_name.to_uppercase())
    }

    /// Gene names ordered most dangerous first; genes without a summary last
    pub fn genes_by_priority(&self, gene_names: &[String]) -> Vec<String> {
        let mut names = gene_names.to_vec();
        names.sort_by(|a, b| {
            compare_summaries(self.danger_summary(a), self.danger_summary(b)).then_with(|| a.cmp(b))
        });
        names
    }

    /// Gene model by name, fetched once and then kept
    pub async fn resolve_gene(&mut self, gene_name: &str) -> Result<GeneLocus, CohortError> {
        if let Some(locus) = self.genes.get(gene_name) {
            return Ok(locus.clone());
        }

        let locus = self
            .services
            .genes
            .fetch_gene(gene_name)
            .await
            .map_err(|e| CohortError::service("Gene lookup", gene_name, e))?;
        self.genes.insert(gene_name.to_string(), locus.clone());
        Ok(locus)
    }

    // ==========================================================================
    // GENE LOAD
    // ==========================================================================

    /// Load variants and coverage for one gene across the cohort
    ///
    /// In background mode results are computed, cached and summarized but
    /// sample units, views and progress flags are left untouched.
    pub async fn load_gene(&mut self, request: &GeneAnalysisRequest) -> Result<ResultMap, CohortError> {
        if !self.is_loaded {
            return Err(CohortError::NotInitialized);
        }

        let gene_name = request.locus.gene_name.clone();
        let run_id = Uuid::new_v4();
        info!(
            "Gene load {} started for {} ({}{})",
            run_id,
            gene_name,
            request.transcript.transcript_id,
            if request.options.background { ", background" } else { "" }
        );

        self.start_gene_progress(&gene_name);
        let result = self.run_gene_load(request).await;
        self.end_gene_progress(&gene_name);

        match &result {
            Ok(result_map) => info!(
                "Gene load {} finished for {}: {} samples",
                run_id,
                gene_name,
                result_map.len()
            ),
            Err(e) => warn!("Gene load {} failed for {}: {}", run_id, gene_name, e),
        }
        result
    }

    async fn run_gene_load(&mut self, request: &GeneAnalysisRequest) -> Result<ResultMap, CohortError> {
        let GeneAnalysisRequest {
            locus,
            transcript,
            options,
        } = request;

        // 1. Reset
        if !options.background {
            self.clear_loaded_data(&locus.gene_name);
            self.reference_tracks.sort_tracks_first(&mut self.roster);
            self.mark_loading(true);
        }

        // 2. Variant and coverage joins
        let joined = {
            let this = &*self;
            tokio::try_join!(
                this.variant_join(locus, transcript, options),
                this.coverage_join(locus, transcript, options)
            )
        };
        if !options.background {
            self.mark_loading(false);
        }
        let (result_map, coverage_map) = joined?;

        // 3. Cache
        self.cache_result_map(locus, transcript, DataKind::Variants, &result_map, options.cache_policy)
            .await;
        self.cache_coverage_map(locus, transcript, &coverage_map, options.cache_policy)
            .await;

        // 4. Publish
        if !options.background {
            for (id, set) in &result_map {
                if let Some(unit) = self.roster.get_mut(id) {
                    unit.vcf_data = Some(set.clone());
                    unit.last_gene_loaded = Some(locus.gene_name.clone());
                }
            }
            for (id, coverage) in &coverage_map {
                if let Some(unit) = self.roster.get_mut(id) {
                    unit.bam_data = Some(coverage.clone());
                    unit.last_gene_loaded = Some(locus.gene_name.clone());
                }
            }
            self.set_coverage_views(locus);
        }

        // 5. Danger summary
        let summary = {
            let normal_id = self.normal_sample_id();
            let normal = normal_id
                .as_ref()
                .and_then(|id| result_map.get(id).map(|set| (id, set)));
            self.compute_danger(locus, normal, &coverage_map)
        };
        self.store_danger_summary(summary);

        // 6. Views
        if !options.background {
            self.refresh_views(locus, &ViewScope::Full);
        }

        Ok(result_map)
    }

    /// Drop data held for a different gene
    pub(crate) fn clear_loaded_data(&mut self, gene_name: &str) {
        let mut cleared = false;
        for unit in self.roster.units_mut() {
            if unit.last_gene_loaded.as_deref() != Some(gene_name) {
                unit.clear_loaded_data();
                unit.last_gene_loaded = None;
                cleared = true;
            }
        }

        if cleared {
            self.max_depth = 0;
        }
    }

    fn mark_loading(&mut self, loading: bool) {
        let load_reference_tracks = self.config.load_reference_tracks;

        for unit in self.roster.units_mut() {
            let loads_variants =
                (unit.is_vcf_ready() || unit.is_loaded()) && (!unit.is_reference || load_reference_tracks);
            unit.in_progress.loading_variants = loading && loads_variants;
            unit.in_progress.loading_coverage = loading && unit.is_bam_loaded();
        }
    }

    pub(crate) fn start_gene_progress(&mut self, gene_name: &str) {
        if !self.genes_in_progress.iter().any(|g| g == gene_name) {
            self.genes_in_progress.push(gene_name.to_string());
        }
    }

    pub(crate) fn end_gene_progress(&mut self, gene_name: &str) {
        self.genes_in_progress.retain(|g| g != gene_name);
    }

    // ==========================================================================
    // CACHE AND DANGER HELPERS
    // ==========================================================================

    pub(crate) async fn cache_result_map(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        kind: DataKind,
        result_map: &ResultMap,
        policy: CachePolicy,
    ) {
        if policy == CachePolicy::Skip {
            return;
        }

        let writes = result_map.iter().map(|(id, set)| {
            let key = CacheKey::new(id, &locus.gene_name, &transcript.transcript_id, kind);
            self.cache.write(key, set, policy)
        });
        let written = join_all(writes).await.into_iter().filter(|ok| *ok).count();
        debug!("Cached {} {} sets for {}", written, kind.as_str(), locus.gene_name);
    }

    async fn cache_coverage_map(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        coverage_map: &CoverageMap,
        policy: CachePolicy,
    ) {
        if policy == CachePolicy::Skip {
            return;
        }

        let writes = coverage_map.iter().map(|(id, coverage)| {
            let key = CacheKey::new(id, &locus.gene_name, &transcript.transcript_id, DataKind::Coverage);
            self.cache.write(key, coverage, policy)
        });
        let written = join_all(writes).await.into_iter().filter(|ok| *ok).count();
        debug!("Cached {} {} sets for {}", written, DataKind::Coverage.as_str(), locus.gene_name);
    }

    /// Coverage for a gene: in-memory data when it belongs to this gene, else cached
    pub(crate) async fn danger_coverage(&self, locus: &GeneLocus, transcript: &Transcript) -> CoverageMap {
        let reads = self.roster.patients().map(|unit| async move {
            if unit.last_gene_loaded.as_deref() == Some(locus.gene_name.as_str()) {
                if let Some(coverage) = &unit.bam_data {
                    return Some((unit.id.clone(), coverage.clone()));
                }
            }
            let key = CacheKey::new(&unit.id, &locus.gene_name, &transcript.transcript_id, DataKind::Coverage);
            self.cache
                .read::<SampleCoverage>(&key)
                .await
                .map(|coverage| (unit.id.clone(), coverage))
        });

        join_all(reads).await.into_iter().flatten().collect()
    }

    pub(crate) fn compute_danger(
        &self,
        locus: &GeneLocus,
        normal: Option<(&SampleId, &VariantSet)>,
        coverage: &CoverageMap,
    ) -> DangerSummary {
        let filters = self.services.filters.as_ref();
        let (variants, called) = match normal {
            Some((id, set)) => danger_inputs(locus, id, set, filters),
            None => (Vec::new(), false),
        };

        let mut summary = self
            .services
            .classifier
            .classify(&locus.gene_name, &variants, coverage, filters);
        summary.called = called;
        summary
    }

    pub(crate) fn store_danger_summary(&mut self, summary: DangerSummary) {
        debug!(
            "Danger summary for {}: {} badge categories",
            summary.gene_name,
            summary.badges.len()
        );
        self.danger_summaries
            .insert(summary.gene_name.to_uppercase(), summary);
    }
}
