// ==============================================================================
// pipeline/joint_call.rs - Joint Variant Calling Pipeline
// ==============================================================================
// Description: Joint calling across all alignments and merge into loaded sets
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Pipeline:
//   1. Reuse cached calls when every patient sample has them
//   2. Otherwise run the joint caller over every alignment in one request
//   3. Keep calls absent from each sample's pre-existing set
//   4. ClinVar-annotate the new calls, merge, re-tag inheritance
//   5. Cache combined and called sets, recompute the danger summary
// ==============================================================================

use crate::cache::{CacheKey, DataKind};
use crate::error::CohortError;
use crate::models::{
    AnalysisOptions, GeneLocus, LoadState, ResultMap, SampleId, Transcript, VariantRecord, VariantSet,
};
use crate::orchestrator::CohortOrchestrator;
use crate::parsers::vcf::{CalledVcfParser, GenotypeColumn};
use crate::pipeline::variants::{annotate_with_clinvar, retain_unique_calls, tag_inheritance};
use crate::pipeline::view::ViewScope;
use crate::sample::AlignmentHandle;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Results of one joint-calling run
#[derive(Debug, Clone, Default)]
pub struct JointCallOutcome {
    /// Calls not present in each sample's pre-existing set
    pub called: ResultMap,
    /// Pre-existing sets with the new calls merged in
    pub combined: ResultMap,
    /// The normal sample's record for the requested source variant, if found
    pub source_variant: Option<VariantRecord>,
    /// Calls came from the cache; the caller was not invoked
    pub from_cache: bool,
}

impl CohortOrchestrator {
    /// Jointly call variants from every patient alignment for one gene
    ///
    /// `prior` supplies the pre-existing variant sets (for example from a
    /// background load); otherwise each sample's loaded set is used.
    pub async fn joint_call(
        &mut self,
        locus: &GeneLocus,
        transcript: &Transcript,
        prior: Option<ResultMap>,
        options: &AnalysisOptions,
    ) -> Result<JointCallOutcome, CohortError> {
        if !self.is_loaded {
            return Err(CohortError::NotInitialized);
        }

        let run_id = Uuid::new_v4();
        let canonical = self.canonical_ids();
        info!(
            "Joint call {} started for {} across {} samples",
            run_id,
            locus.gene_name,
            canonical.len()
        );

        self.start_gene_progress(&locus.gene_name);
        if !options.background {
            for id in &canonical {
                if let Some(unit) = self.roster.get_mut(id) {
                    unit.in_progress.calling_variants = true;
                }
            }
        }

        let result = {
            let this = &*self;
            this.run_joint_call(locus, transcript, prior, options, &canonical).await
        };

        self.end_gene_progress(&locus.gene_name);
        if !options.background {
            for unit in self.roster.units_mut() {
                unit.in_progress.calling_variants = false;
            }
        }

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Joint call {} failed for {}: {}", run_id, locus.gene_name, e);
                return Err(e);
            }
        };

        // Badges from the normal sample's merged set
        let coverage = self.danger_coverage(locus, transcript).await;
        let normal_id = self.normal_sample_id();
        let summary = {
            let normal = normal_id
                .as_ref()
                .and_then(|id| outcome.combined.get(id).map(|set| (id, set)));
            self.compute_danger(locus, normal, &coverage)
        };
        self.store_danger_summary(summary);

        if !options.background {
            self.clear_called_variants();
            for (id, set) in &outcome.combined {
                if let Some(unit) = self.roster.get_mut(id) {
                    unit.vcf_data = Some(set.clone());
                    unit.last_gene_loaded = Some(locus.gene_name.clone());
                }
            }
            for (id, set) in &outcome.called {
                if let Some(unit) = self.roster.get_mut(id) {
                    unit.fb_data = Some(set.clone());
                }
            }
            self.refresh_views(locus, &ViewScope::Full);
        }

        if let (Some(source), Some(normal_id)) = (&options.source_variant, &normal_id) {
            let flag_key = source.flag_key();
            outcome.source_variant = outcome
                .combined
                .get(normal_id)
                .and_then(|set| set.find_flagged(&flag_key))
                .cloned();
            if outcome.source_variant.is_none() {
                debug!("Source variant {} not present after joint call", source);
            }
        }

        info!(
            "Joint call {} finished for {}: {} new calls{}",
            run_id,
            locus.gene_name,
            outcome.called.values().map(VariantSet::len).sum::<usize>(),
            if outcome.from_cache { " (cached)" } else { "" }
        );
        Ok(outcome)
    }

    async fn run_joint_call(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        prior: Option<ResultMap>,
        options: &AnalysisOptions,
        canonical: &[SampleId],
    ) -> Result<JointCallOutcome, CohortError> {
        // 1. Cached calls
        if options.check_cache && self.has_cached_called_variants(locus, transcript).await {
            return Ok(self.reuse_cached_calls(locus, transcript, prior, options, canonical).await);
        }

        // 2. Joint caller
        let alignments: Vec<AlignmentHandle> = canonical
            .iter()
            .filter_map(|id| self.roster.get(id))
            .filter_map(|unit| unit.alignment.clone())
            .collect();
        if alignments.is_empty() {
            return Err(CohortError::NoAlignments(locus.gene_name.clone()));
        }

        let raw = self
            .services
            .alignments
            .joint_call(locus, transcript, &alignments, &self.config.joint_call_args)
            .await
            .map_err(|e| CohortError::service("Joint calling", &locus.gene_name, e))?;

        // One genotype column per submitted alignment, in submission order
        let columns: Vec<GenotypeColumn> = alignments
            .iter()
            .enumerate()
            .map(|(position, handle)| GenotypeColumn {
                sample_id: handle.sample_id.clone(),
                sample_name: self
                    .roster
                    .get(&handle.sample_id)
                    .and_then(|unit| unit.genotype_sample_name())
                    .map(str::to_string),
                position,
            })
            .collect();

        let mut parser = CalledVcfParser::new().with_locus(locus);
        let mut parsed = parser.parse(&raw, &columns)?;
        if parser.skipped_count > 0 {
            debug!("Skipped {} unusable genotype calls", parser.skipped_count);
        }

        // 3. Unique calls per sample
        let mut prior = prior.unwrap_or_default();
        let mut existing = ResultMap::new();
        let mut called = ResultMap::new();
        for id in canonical {
            let mut base = prior
                .remove(id)
                .or_else(|| self.roster.get(id).and_then(|unit| unit.vcf_data.clone()))
                .unwrap_or_default();
            // Calls from an earlier run are replaced by this one
            base.features.retain(|v| !v.is_called());

            let mut calls = parsed.remove(id).unwrap_or_default();
            retain_unique_calls(&base, &mut calls);
            calls.load_state.called = true;

            existing.insert(id.clone(), base);
            called.insert(id.clone(), calls);
        }

        // 4. Annotate, merge and tag
        annotate_with_clinvar(self.services.clinvar.as_ref(), &mut called, locus)
            .await
            .map_err(|e| CohortError::service("ClinVar lookup", &locus.gene_name, e))?;
        for set in called.values_mut() {
            self.flagged.apply_flags(set);
        }

        let mut combined = ResultMap::new();
        for (id, mut base) in existing {
            if let Some(calls) = called.get(&id) {
                base.features.extend(calls.features.iter().cloned());
            }
            base.load_state.called = true;
            combined.insert(id, base);
        }
        tag_inheritance(&mut combined, &self.tumor_ids(), self.config.inheritance_rule);

        // Called sets carry the same inheritance tags as their merged copies
        for (id, calls) in called.iter_mut() {
            let Some(merged) = combined.get(id) else {
                continue;
            };
            for variant in calls.features.iter_mut() {
                if let Some(tagged) = merged.find(&variant.key) {
                    variant.is_inherited = tagged.is_inherited;
                }
            }
            calls.load_state.inheritance = merged.load_state.inheritance;
        }

        // 5. Cache
        self.cache_result_map(locus, transcript, DataKind::Variants, &combined, options.cache_policy)
            .await;
        self.cache_result_map(locus, transcript, DataKind::CalledVariants, &called, options.cache_policy)
            .await;

        Ok(JointCallOutcome {
            called,
            combined,
            source_variant: None,
            from_cache: false,
        })
    }

    /// Whether every patient sample has cached called variants for the gene
    pub async fn has_cached_called_variants(&self, locus: &GeneLocus, transcript: &Transcript) -> bool {
        let canonical = self.canonical_ids();
        if canonical.is_empty() {
            return false;
        }

        let checks = canonical.iter().map(|id| {
            let key = CacheKey::new(id, &locus.gene_name, &transcript.transcript_id, DataKind::CalledVariants);
            async move { self.cache.contains(&key).await }
        });
        join_all(checks).await.into_iter().all(|hit| hit)
    }

    async fn reuse_cached_calls(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        prior: Option<ResultMap>,
        options: &AnalysisOptions,
        canonical: &[SampleId],
    ) -> JointCallOutcome {
        let mut prior = prior.unwrap_or_default();
        let mut outcome = JointCallOutcome {
            from_cache: true,
            ..JointCallOutcome::default()
        };

        for id in canonical {
            let called_key = CacheKey::new(id, &locus.gene_name, &transcript.transcript_id, DataKind::CalledVariants);
            let variants_key = CacheKey::new(id, &locus.gene_name, &transcript.transcript_id, DataKind::Variants);

            let calls: VariantSet = self.cache.read(&called_key).await.unwrap_or_default();
            let existing = match prior.remove(id) {
                Some(set) => Some(set),
                None => self.cache.read::<VariantSet>(&variants_key).await,
            };

            let mut merged = match existing {
                Some(set) => set,
                None => {
                    let dummy = VariantSet {
                        load_state: LoadState {
                            clinvar: true,
                            called: true,
                            inheritance: false,
                        },
                        ..VariantSet::default()
                    };
                    // Alignments-only samples have no pre-called data of their own
                    let alignments_only = self.roster.get(id).is_some_and(|unit| unit.is_alignments_only());
                    if alignments_only && !calls.is_empty() {
                        self.cache.write(variants_key, &dummy, options.cache_policy).await;
                    }
                    dummy
                }
            };

            let merged_keys = merged.keys();
            merged
                .features
                .extend(calls.features.iter().filter(|v| !merged_keys.contains(&v.key)).cloned());
            merged.load_state.called = true;

            outcome.called.insert(id.clone(), calls);
            outcome.combined.insert(id.clone(), merged);
        }

        debug!("Reused cached calls for {} samples in {}", canonical.len(), locus.gene_name);
        outcome
    }
}

