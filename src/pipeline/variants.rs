// ==============================================================================
// pipeline/variants.rs - Variant Load Pipeline
// ==============================================================================
// Description: Per-sample variant loading, ClinVar batching and inheritance tagging
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::cache::{CacheKey, DataKind};
use crate::config::InheritanceRule;
use crate::error::CohortError;
use crate::models::{
    AnalysisOptions, GeneLocus, ResultMap, SampleId, Transcript, VariantKey, VariantSet, KNOWN_VARIANTS_ID,
};
use crate::orchestrator::CohortOrchestrator;
use crate::sample::SampleUnit;
use crate::services::{ClinvarLookup, ServiceError};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Annotate every not-yet-annotated set with a single batched ClinVar lookup
///
/// Sets already marked as ClinVar-annotated are skipped, and the known-variants
/// track never contributes keys. Returns the number of lookups issued (0 or 1).
pub async fn annotate_with_clinvar(
    clinvar: &dyn ClinvarLookup,
    result_map: &mut ResultMap,
    locus: &GeneLocus,
) -> Result<usize, ServiceError> {
    let keys: BTreeSet<VariantKey> = result_map
        .iter()
        .filter(|(id, set)| !set.load_state.clinvar && id.as_str() != KNOWN_VARIANTS_ID)
        .flat_map(|(_, set)| set.features.iter().map(|v| v.key.clone()))
        .collect();

    if keys.is_empty() {
        return Ok(0);
    }

    let keys: Vec<VariantKey> = keys.into_iter().collect();
    let annotations = clinvar.batch_query(&keys, locus).await?;
    debug!(
        "ClinVar lookup for {}: {} of {} variants annotated",
        locus.gene_name,
        annotations.len(),
        keys.len()
    );

    for set in result_map.values_mut().filter(|set| !set.load_state.clinvar) {
        for variant in &mut set.features {
            if let Some(annotation) = annotations.get(&variant.key) {
                variant.clinvar = Some(annotation.clone());
            }
        }
        set.load_state.clinvar = true;
    }

    Ok(1)
}

/// Tag tumor variants by their presence in the normal samples' sets
///
/// Tags are reset before tagging, so the result depends only on the
/// current sets and the rule.
pub fn tag_inheritance(result_map: &mut ResultMap, tumor_ids: &HashSet<SampleId>, rule: InheritanceRule) {
    let normal_keys: HashSet<VariantKey> = result_map
        .iter()
        .filter(|(id, _)| !id.is_reference_track() && !tumor_ids.contains(*id))
        .flat_map(|(_, set)| set.features.iter().map(|v| v.key.clone()))
        .collect();

    for (_, set) in result_map.iter_mut().filter(|(id, _)| tumor_ids.contains(*id)) {
        for variant in &mut set.features {
            let in_normal = normal_keys.contains(&variant.key);
            variant.is_inherited = match (rule, in_normal) {
                (InheritanceRule::AbsenceImpliesSomatic, false) => Some(false),
                (InheritanceRule::PresenceImpliesInherited, true) => Some(true),
                _ => None,
            };
        }
        set.load_state.inheritance = true;
    }
}

/// Called variants not already present (by identity) in the pre-existing set
pub fn retain_unique_calls(existing: &VariantSet, called: &mut VariantSet) {
    let existing_keys = existing.keys();
    called.features.retain(|v| !existing_keys.contains(&v.key));
}

impl CohortOrchestrator {
    /// Load, annotate and tag variants for every eligible sample
    pub(crate) async fn variant_join(
        &self,
        locus: &GeneLocus,
        transcript: &Transcript,
        options: &AnalysisOptions,
    ) -> Result<ResultMap, CohortError> {
        let multi_sample = self.samples_in_single_vcf();
        let load_reference_tracks = self.config.load_reference_tracks;

        // 1. Fan out per sample
        let tasks = self
            .roster
            .iter()
            .filter(|unit| unit.is_vcf_ready() || unit.is_loaded())
            .filter(|unit| !unit.is_reference || load_reference_tracks)
            .map(|unit| self.load_sample_variants(unit, locus, transcript, options, multi_sample));
        let partials = try_join_all(tasks).await?;

        let mut result_map = ResultMap::new();
        for partial in partials {
            result_map.extend(partial);
        }

        // 2. One ClinVar lookup for everything not yet annotated
        annotate_with_clinvar(self.services.clinvar.as_ref(), &mut result_map, locus)
            .await
            .map_err(|e| CohortError::service("ClinVar lookup", &locus.gene_name, e))?;

        // 3. Flags and inheritance
        for (id, set) in result_map.iter_mut() {
            if !id.is_reference_track() {
                self.flagged.apply_flags(set);
            }
        }
        tag_inheritance(&mut result_map, &self.tumor_ids(), self.config.inheritance_rule);

        Ok(result_map)
    }

    async fn load_sample_variants(
        &self,
        unit: &SampleUnit,
        locus: &GeneLocus,
        transcript: &Transcript,
        options: &AnalysisOptions,
        multi_sample: bool,
    ) -> Result<ResultMap, CohortError> {
        if options.check_cache {
            let key = CacheKey::new(&unit.id, &locus.gene_name, &transcript.transcript_id, DataKind::Variants);
            if let Some(cached) = self.cache.read::<VariantSet>(&key).await {
                return Ok(ResultMap::from([(unit.id.clone(), cached)]));
            }
        }

        // Alignments-only samples keep whatever was called for them earlier
        if !unit.is_vcf_ready() {
            let existing = unit.vcf_data.clone().unwrap_or_default();
            return Ok(ResultMap::from([(unit.id.clone(), existing)]));
        }

        let mut annotated = self
            .services
            .vcf
            .annotate(locus, transcript, &[unit], multi_sample)
            .await
            .map_err(|e| CohortError::service("Variant annotation", &locus.gene_name, e))?;

        // Only this sample's set is used from a per-sample request
        let set = annotated.remove(&unit.id).unwrap_or_default();
        Ok(ResultMap::from([(unit.id.clone(), set)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClinvarAnnotation, VariantRecord, Zygosity};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        known: VariantKey,
    }

    #[async_trait]
    impl ClinvarLookup for CountingLookup {
        async fn batch_query(
            &self,
            keys: &[VariantKey],
            _locus: &GeneLocus,
        ) -> Result<HashMap<VariantKey, ClinvarAnnotation>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(keys
                .iter()
                .filter(|k| **k == self.known)
                .map(|k| {
                    (
                        k.clone(),
                        ClinvarAnnotation {
                            clinical_significance: "Pathogenic".to_string(),
                            ..ClinvarAnnotation::default()
                        },
                    )
                })
                .collect())
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

    fn set(starts: &[u64]) -> VariantSet {
        VariantSet::new(
            starts
                .iter()
                .map(|s| VariantRecord::new(VariantKey::point("chr1", *s, "A", "G"), Zygosity::Het))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_clinvar_batch_is_single_and_idempotent() {
        let lookup = CountingLookup {
            calls: AtomicUsize::new(0),
            known: VariantKey::point("chr1", 100, "A", "G"),
        };
        let mut map = ResultMap::from([
            (SampleId::new("s0"), set(&[100, 200])),
            (SampleId::new("s1"), set(&[100, 300])),
            (SampleId::known_variants(), set(&[100])),
        ]);

        assert_eq!(annotate_with_clinvar(&lookup, &mut map, &locus()).await.unwrap(), 1);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert!(map.values().all(|s| s.load_state.clinvar));
        assert!(map[&SampleId::new("s1")].features[0].clinvar.is_some());
        assert!(map[&SampleId::new("s1")].features[1].clinvar.is_none());

        assert_eq!(annotate_with_clinvar(&lookup, &mut map, &locus()).await.unwrap(), 0);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clinvar_skips_known_variants_only_map() {
        let lookup = CountingLookup {
            calls: AtomicUsize::new(0),
            known: VariantKey::point("chr1", 100, "A", "G"),
        };
        let mut map = ResultMap::from([(SampleId::known_variants(), set(&[100]))]);

        assert_eq!(annotate_with_clinvar(&lookup, &mut map, &locus()).await.unwrap(), 0);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    fn inheritance_map() -> ResultMap {
        ResultMap::from([
            (SampleId::new("s0"), set(&[100, 200])),
            (SampleId::new("s1"), set(&[100, 300])),
        ])
    }

    #[test]
    fn test_absence_implies_somatic() {
        let tumors = HashSet::from([SampleId::new("s1")]);
        let mut map = inheritance_map();
        tag_inheritance(&mut map, &tumors, InheritanceRule::AbsenceImpliesSomatic);

        let tumor = &map[&SampleId::new("s1")];
        assert_eq!(tumor.features[0].is_inherited, None);
        assert_eq!(tumor.features[1].is_inherited, Some(false));
        assert!(tumor.load_state.inheritance);
        assert!(map[&SampleId::new("s0")].features.iter().all(|v| v.is_inherited.is_none()));
    }

    #[test]
    fn test_presence_implies_inherited() {
        let tumors = HashSet::from([SampleId::new("s1")]);
        let mut map = inheritance_map();
        tag_inheritance(&mut map, &tumors, InheritanceRule::PresenceImpliesInherited);

        let tumor = &map[&SampleId::new("s1")];
        assert_eq!(tumor.features[0].is_inherited, Some(true));
        assert_eq!(tumor.features[1].is_inherited, None);
    }

    #[test]
    fn test_tagging_is_deterministic_across_runs() {
        let tumors = HashSet::from([SampleId::new("s1")]);
        let mut map = inheritance_map();

        tag_inheritance(&mut map, &tumors, InheritanceRule::PresenceImpliesInherited);
        tag_inheritance(&mut map, &tumors, InheritanceRule::AbsenceImpliesSomatic);

        let mut fresh = inheritance_map();
        tag_inheritance(&mut fresh, &tumors, InheritanceRule::AbsenceImpliesSomatic);
        assert_eq!(map, fresh);
    }

    #[test]
    fn test_retain_unique_calls() {
        let existing = set(&[100, 200]);
        let mut called = set(&[100, 300]);
        retain_unique_calls(&existing, &mut called);

        let starts: Vec<u64> = called.features.iter().map(|v| v.key.start).collect();
        assert_eq!(starts, vec![300]);
    }
}
