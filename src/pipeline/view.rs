// ==============================================================================
// pipeline/view.rs - Display Views and Unique Variant Matrix
// ==============================================================================
// Description: Filtering, interval-stacking pileup and cross-sample de-duplication
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Pileup: variants sorted by start are assigned the lowest level whose last
// occupant ends (in pixels, plus padding) before the new variant begins.
// ==============================================================================

use crate::config::PileupConfig;
use crate::models::{GeneLocus, SampleId, VariantKey, VariantOrigin, VariantRecord, VariantSet};
use crate::orchestrator::CohortOrchestrator;
use crate::services::FilterConfig;
use std::collections::HashMap;
use tracing::debug;

/// Which records of a sample's full set a view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTarget {
    Loaded,
    Called,
}

impl ViewTarget {
    fn accepts(&self, record: &VariantRecord) -> bool {
        match self {
            ViewTarget::Loaded => record.origin == VariantOrigin::Loaded,
            ViewTarget::Called => record.origin == VariantOrigin::Called,
        }
    }
}

/// Which views to rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewScope {
    /// Every sample; the matrix is rebuilt from scratch
    Full,
    /// One sample; the matrix is only extended
    Sample(SampleId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PileupResult {
    pub max_level: usize,
    pub feature_width: f64,
}

/// Assign stacking levels in place
///
/// # Arguments
/// * `features` - Variants to lay out (sorted by start as a side effect)
/// * `start`, `end` - Displayed region
/// * `layout` - Pixel width, minimum feature width and padding
pub fn pileup_variants(features: &mut [VariantRecord], start: u64, end: u64, layout: &PileupConfig) -> PileupResult {
    features.sort_by(|a, b| a.key.start.cmp(&b.key.start).then(a.key.end.cmp(&b.key.end)));

    let span = end.saturating_sub(start).max(1) as f64;
    let scale = layout.width_px / span;

    // Right edge (px) of the last variant placed on each level
    let mut level_ends: Vec<f64> = Vec::new();

    for variant in features.iter_mut() {
        let x_start = variant.key.start.saturating_sub(start) as f64 * scale;
        let x_end = variant.key.end.max(variant.key.start).saturating_sub(start) as f64 * scale;
        let x_end = x_end.max(x_start + layout.feature_width);

        let level = match level_ends.iter().position(|&edge| edge + layout.padding <= x_start) {
            Some(level) => {
                level_ends[level] = level_ends[level].max(x_end);
                level
            }
            None => {
                level_ends.push(x_end);
                level_ends.len() - 1
            }
        };
        variant.level = level;
    }

    PileupResult {
        max_level: level_ends.len().max(1),
        feature_width: layout.feature_width,
    }
}

/// Build one display view from a sample's full variant set
///
/// Keeps records of the target origin that are not homozygous-reference or
/// missing, start inside [start, end] and pass the active filters.
pub fn filter_and_pileup(
    set: &VariantSet,
    sample_id: &SampleId,
    region: (u64, u64),
    target: ViewTarget,
    filters: &dyn FilterConfig,
    layout: &PileupConfig,
) -> VariantSet {
    let (start, end) = region;

    let mut features: Vec<VariantRecord> = set
        .features
        .iter()
        .filter(|v| target.accepts(v))
        .filter(|v| !v.zygosity.is_hom_ref_like())
        .filter(|v| v.key.start >= start && v.key.start <= end)
        .filter(|v| filters.passes(sample_id, v))
        .cloned()
        .collect();

    let layout_result = pileup_variants(&mut features, start, end, layout);

    VariantSet {
        features,
        load_state: set.load_state,
        max_level: layout_result.max_level,
        feature_width: layout_result.feature_width,
    }
}

/// Cross-sample de-duplicated variants in first-seen order
#[derive(Debug, Clone, Default)]
pub struct UniqueVariantMatrix {
    order: Vec<VariantKey>,
    records: HashMap<VariantKey, VariantRecord>,
}

impl UniqueVariantMatrix {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.records.clear();
    }

    pub fn contains(&self, key: &VariantKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &VariantKey) -> Option<&VariantRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &VariantKey) -> Option<&mut VariantRecord> {
        self.records.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantRecord> + '_ {
        self.order.iter().filter_map(move |key| self.records.get(key))
    }

    /// Add records whose identity is not yet present; returns how many were added
    pub fn extend_from<'a>(&mut self, records: impl IntoIterator<Item = &'a VariantRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.records.contains_key(&record.key) {
                continue;
            }
            self.order.push(record.key.clone());
            self.records.insert(record.key.clone(), record.clone());
            added += 1;
        }
        added
    }
}

impl CohortOrchestrator {
    /// Rebuild display views from each sample's full set and update the matrix
    pub(crate) fn refresh_views(&mut self, locus: &GeneLocus, scope: &ViewScope) {
        let region = self.services.filters.region().unwrap_or((locus.start, locus.end));
        let filters = self.services.filters.clone();
        let layout = self.config.pileup;

        let mut collected: Vec<VariantRecord> = Vec::new();

        for id in self.roster.ids() {
            if let ViewScope::Sample(only) = scope {
                if only != &id {
                    continue;
                }
            }
            let Some(unit) = self.roster.get_mut(&id) else {
                continue;
            };

            match &unit.vcf_data {
                Some(data) => {
                    unit.loaded_variants =
                        filter_and_pileup(data, &id, region, ViewTarget::Loaded, filters.as_ref(), &layout);
                    unit.called_variants =
                        filter_and_pileup(data, &id, region, ViewTarget::Called, filters.as_ref(), &layout);
                }
                None => {
                    unit.loaded_variants = VariantSet::default();
                    unit.called_variants = VariantSet::default();
                }
            }

            if !unit.is_reference {
                collected.extend(unit.loaded_variants.features.iter().cloned());
                collected.extend(unit.called_variants.features.iter().cloned());
            }
        }

        if *scope == ViewScope::Full {
            self.matrix.clear();
        }
        let added = self.matrix.extend_from(&collected);
        debug!(
            "Refreshed views for {} ({} unique variants, {} new)",
            locus.gene_name,
            self.matrix.len(),
            added
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ActiveFilters;
    use crate::models::{VariantKey, Zygosity};

    fn variant(start: u64, end: u64) -> VariantRecord {
        VariantRecord::new(VariantKey::new("chr1", start, end, "A", "G"), Zygosity::Het)
    }

    #[test]
    fn test_disjoint_variants_share_level_zero() {
        let mut features = vec![variant(100, 100), variant(500, 500), variant(900, 900)];
        let result = pileup_variants(&mut features, 0, 1000, &PileupConfig::default());

        assert!(features.iter().all(|v| v.level == 0));
        assert_eq!(result.max_level, 1);
    }

    #[test]
    fn test_identical_intervals_stack() {
        let mut features = vec![variant(100, 100), variant(100, 100), variant(100, 100)];
        let result = pileup_variants(&mut features, 0, 1000, &PileupConfig::default());

        let levels: Vec<usize> = features.iter().map(|v| v.level).collect();
        assert_eq!(levels, vec![0, 1, 2]);
        assert_eq!(result.max_level, 3);
    }

    #[test]
    fn test_long_deletion_blocks_level() {
        let mut features = vec![variant(100, 400), variant(200, 200), variant(600, 600)];
        pileup_variants(&mut features, 0, 1000, &PileupConfig::default());

        assert_eq!(features[0].level, 0);
        assert_eq!(features[1].level, 1);
        assert_eq!(features[2].level, 0);
    }

    #[test]
    fn test_empty_pileup() {
        let result = pileup_variants(&mut [], 0, 1000, &PileupConfig::default());
        assert_eq!(result.max_level, 1);
    }

    #[test]
    fn test_filter_and_pileup_selection() {
        let mut called = variant(300, 300);
        called.origin = VariantOrigin::Called;
        let mut hom_ref = variant(400, 400);
        hom_ref.zygosity = Zygosity::HomRef;
        let mut no_call = variant(450, 450);
        no_call.zygosity = Zygosity::NoCall;

        let set = VariantSet::new(vec![variant(100, 100), variant(2000, 2000), called, hom_ref, no_call]);
        let filters = ActiveFilters::default();
        let layout = PileupConfig::default();
        let sample = SampleId::new("s0");

        let loaded = filter_and_pileup(&set, &sample, (1, 1000), ViewTarget::Loaded, &filters, &layout);
        assert_eq!(loaded.features.len(), 1);
        assert_eq!(loaded.features[0].key.start, 100);

        let called = filter_and_pileup(&set, &sample, (1, 1000), ViewTarget::Called, &filters, &layout);
        assert_eq!(called.features.len(), 1);
        assert_eq!(called.features[0].key.start, 300);
    }

    #[test]
    fn test_matrix_extend_is_idempotent() {
        let mut matrix = UniqueVariantMatrix::default();
        let records = vec![variant(100, 100), variant(200, 200), variant(100, 100)];

        assert_eq!(matrix.extend_from(&records), 2);
        assert_eq!(matrix.extend_from(&records), 0);

        let starts: Vec<u64> = matrix.iter().map(|v| v.key.start).collect();
        assert_eq!(starts, vec![100, 200]);
    }
}
