// ==============================================================================
// flagged.rs - Flagged Variant Store
// ==============================================================================
// Description: User bookmarks: flag/unflag, import, export and capture
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::cache::{CacheKey, DataKind};
use crate::danger::DangerSummary;
use crate::error::CohortError;
use crate::models::{
    AnalysisOptions, CachePolicy, CoverageMap, FlagKey, GeneAnalysisRequest, GeneLocus, ResultMap, Transcript,
    VariantKey, VariantOrigin, VariantRecord, VariantSet, USER_FLAGGED,
};
use crate::orchestrator::CohortOrchestrator;
use crate::parsers::bookmarks::{parse_bookmarks, BookmarkFormat, BookmarkRecord};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// A bookmarked variant and the gene context it was flagged in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedVariant {
    pub record: VariantRecord,
    pub gene_name: String,
    pub transcript_id: Option<String>,
    pub flagged_at: DateTime<Utc>,
}

impl FlaggedVariant {
    pub fn new(record: VariantRecord, gene_name: &str, transcript_id: Option<&str>) -> Self {
        Self {
            record,
            gene_name: gene_name.to_string(),
            transcript_id: transcript_id.map(str::to_string),
            flagged_at: Utc::now(),
        }
    }

    pub fn key(&self) -> FlagKey {
        self.record.flag_key()
    }

    /// Placeholder built from an imported bookmark, not yet matched to loaded data
    fn proxy(bookmark: &BookmarkRecord, locus: &GeneLocus, transcript: &Transcript) -> Self {
        let end = bookmark
            .end
            .unwrap_or(bookmark.start + bookmark.ref_allele.len().max(1) as u64 - 1);
        let key = VariantKey::new(
            bookmark.chrom.clone(),
            bookmark.start,
            end,
            bookmark.ref_allele.clone(),
            bookmark.alt_allele.clone(),
        );

        let mut record = VariantRecord::new(key, Default::default());
        record.gene_name = Some(locus.gene_name.clone());
        record.is_proxy = true;
        record.is_flagged = true;
        record.filters_passed = bookmark.filters();
        record.is_user_flagged = bookmark.user_flagged() || record.filters_passed.contains(USER_FLAGGED);
        if record.is_user_flagged {
            record.filters_passed.insert(USER_FLAGGED.to_string());
        }
        if bookmark.called() {
            record.origin = VariantOrigin::Called;
        }

        Self::new(record, &locus.gene_name, Some(&transcript.transcript_id))
    }
}

/// Ordered list of flagged variants, unique by FlagKey
#[derive(Debug, Clone, Default)]
pub struct FlaggedVariantStore {
    variants: Vec<FlaggedVariant>,
}

impl FlaggedVariantStore {
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn as_slice(&self) -> &[FlaggedVariant] {
        &self.variants
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlaggedVariant> {
        self.variants.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FlaggedVariant> {
        self.variants.iter_mut()
    }

    pub fn clear(&mut self) {
        self.variants.clear();
    }

    pub fn find(&self, key: &FlagKey) -> Option<&FlaggedVariant> {
        self.variants.iter().find(|v| &v.key() == key)
    }

    pub fn contains(&self, record: &VariantRecord) -> bool {
        self.find(&record.flag_key()).is_some()
    }

    /// Append unless already present; returns whether it was added
    pub fn add(&mut self, variant: FlaggedVariant) -> bool {
        if self.find(&variant.key()).is_some() {
            return false;
        }
        self.variants.push(variant);
        true
    }

    /// Remove the first entry with this key
    pub fn remove(&mut self, key: &FlagKey) -> Option<FlaggedVariant> {
        let index = self.variants.iter().position(|v| &v.key() == key)?;
        Some(self.variants.remove(index))
    }

    pub fn for_gene(&self, gene_name: &str) -> Vec<&FlaggedVariant> {
        self.variants
            .iter()
            .filter(|v| v.gene_name.eq_ignore_ascii_case(gene_name))
            .collect()
    }

    pub fn remove_for_gene(&mut self, gene_name: &str) -> usize {
        let before = self.variants.len();
        self.variants.retain(|v| !v.gene_name.eq_ignore_ascii_case(gene_name));
        before - self.variants.len()
    }

    /// Group by filter name, "userFlagged" first then by name
    ///
    /// User-flagged variants appear only in the "userFlagged" group.
    pub fn by_filter(&self, gene_name: Option<&str>) -> Vec<(String, Vec<&FlaggedVariant>)> {
        let mut user_flagged = Vec::new();
        let mut groups: BTreeMap<String, Vec<&FlaggedVariant>> = BTreeMap::new();

        for variant in &self.variants {
            if let Some(gene) = gene_name {
                if !variant.gene_name.eq_ignore_ascii_case(gene) {
                    continue;
                }
            }

            if variant.record.is_user_flagged {
                user_flagged.push(variant);
            } else {
                for filter in variant.record.filters_passed.iter().filter(|f| *f != USER_FLAGGED) {
                    groups.entry(filter.clone()).or_default().push(variant);
                }
            }
        }

        let mut ordered = Vec::with_capacity(groups.len() + 1);
        if !user_flagged.is_empty() {
            ordered.push((USER_FLAGGED.to_string(), user_flagged));
        }
        ordered.extend(groups);
        ordered
    }

    /// Bring every record's flag state in line with the list
    ///
    /// Records absent from the list lose any flag they carried from an
    /// earlier (possibly cached) result.
    pub fn apply_flags(&self, set: &mut VariantSet) {
        for record in &mut set.features {
            let user_flagged = match self.find(&record.flag_key()) {
                Some(flagged) => {
                    record.is_flagged = true;
                    flagged.record.is_user_flagged
                }
                None => {
                    record.is_flagged = false;
                    false
                }
            };

            record.is_user_flagged = user_flagged;
            if user_flagged {
                record.filters_passed.insert(USER_FLAGGED.to_string());
            } else {
                record.filters_passed.remove(USER_FLAGGED);
            }
        }
    }
}

/// Outcome of a bookmark import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Records accepted into the flagged list
    pub imported: usize,
    /// Records matched to live variants
    pub matched: usize,
    /// Bookmarks left unresolved, described as "GENE chrom:start ref>alt"
    pub unresolved: Vec<String>,
}

struct ImportGroup {
    locus: GeneLocus,
    transcript: Transcript,
    needs_call: bool,
}

fn copy_flag_state(target: &mut VariantRecord, source: &VariantRecord) {
    target.is_flagged = source.is_flagged;
    target.is_user_flagged = source.is_user_flagged;
    if source.is_user_flagged {
        target.filters_passed.insert(USER_FLAGGED.to_string());
    } else {
        target.filters_passed.remove(USER_FLAGGED);
    }
}

impl CohortOrchestrator {
    /// Bookmark a variant present in the unique variant matrix
    pub async fn flag_variant(
        &mut self,
        locus: &GeneLocus,
        transcript: &Transcript,
        key: &VariantKey,
    ) -> Result<VariantRecord, CohortError> {
        let record = {
            let variant = self
                .matrix
                .get_mut(key)
                .ok_or_else(|| CohortError::VariantNotInMatrix(key.clone()))?;
            variant.is_flagged = true;
            variant.is_user_flagged = true;
            variant.filters_passed.insert(USER_FLAGGED.to_string());
            variant.clone()
        };

        self.sync_flag_state(&record);
        let flagged = FlaggedVariant::new(record.clone(), &locus.gene_name, Some(&transcript.transcript_id));
        if self.flagged.add(flagged) {
            info!("Flagged {} in {}", key, locus.gene_name);
        }

        self.recache_flag_state(locus, transcript, &record).await;
        self.refresh_danger_from_state(locus);
        Ok(record)
    }

    /// Undo a bookmark; the matrix record returns to its unflagged state
    pub async fn unflag_variant(
        &mut self,
        locus: &GeneLocus,
        transcript: &Transcript,
        key: &VariantKey,
    ) -> Result<VariantRecord, CohortError> {
        let record = {
            let variant = self
                .matrix
                .get_mut(key)
                .ok_or_else(|| CohortError::VariantNotInMatrix(key.clone()))?;
            variant.is_flagged = false;
            variant.is_user_flagged = false;
            variant.filters_passed.remove(USER_FLAGGED);
            variant.clone()
        };

        self.sync_flag_state(&record);
        match self.flagged.remove(&record.flag_key()) {
            Some(_) => info!("Unflagged {} in {}", key, locus.gene_name),
            None => debug!("{} was not in the flagged list", key),
        }

        self.recache_flag_state(locus, transcript, &record).await;
        self.refresh_danger_from_state(locus);
        Ok(record)
    }

    /// Copy a matrix record's flag state onto every per-sample copy
    fn sync_flag_state(&mut self, source: &VariantRecord) {
        for unit in self.roster.units_mut() {
            let sets = [
                unit.vcf_data.as_mut(),
                unit.fb_data.as_mut(),
                Some(&mut unit.loaded_variants),
                Some(&mut unit.called_variants),
            ];
            for set in sets.into_iter().flatten() {
                for record in set.features.iter_mut().filter(|r| r.key == source.key) {
                    copy_flag_state(record, source);
                }
            }
        }
    }

    /// Rewrite every patient sample's cached variants with the new flag state
    async fn recache_flag_state(&self, locus: &GeneLocus, transcript: &Transcript, source: &VariantRecord) {
        let flag_key = source.flag_key();
        let rewrites = self.canonical_ids().into_iter().map(|id| {
            let flag_key = &flag_key;
            async move {
                let key = CacheKey::new(&id, &locus.gene_name, &transcript.transcript_id, DataKind::Variants);
                let Some(mut cached) = self.cache.read::<VariantSet>(&key).await else {
                    return false;
                };

                let mut changed = false;
                for record in cached.features.iter_mut().filter(|r| &r.flag_key() == flag_key) {
                    copy_flag_state(record, source);
                    changed = true;
                }

                changed && self.cache.write(key, &cached, CachePolicy::WriteThrough).await
            }
        });

        let rewritten = join_all(rewrites).await.into_iter().filter(|ok| *ok).count();
        debug!("Rewrote flag state of {} in {} cached sets", flag_key, rewritten);
    }

    /// Recompute the gene's summary from in-memory normal and coverage data
    fn refresh_danger_from_state(&mut self, locus: &GeneLocus) {
        let coverage: CoverageMap = self
            .roster
            .iter()
            .filter_map(|unit| unit.bam_data.clone().map(|c| (unit.id.clone(), c)))
            .collect();

        let summary = {
            let normal = self
                .normal_sample_id()
                .and_then(|id| self.roster.get(&id))
                .and_then(|unit| unit.vcf_data.as_ref().map(|set| (&unit.id, set)));
            self.compute_danger(locus, normal, &coverage)
        };
        self.store_danger_summary(summary);
    }

    /// Replace the flagged list with imported bookmarks and materialize them
    ///
    /// Each (gene, transcript) group is analyzed in background mode, joint
    /// called first when any of its records came from the caller. Records that
    /// cannot be matched stay as proxies and are listed in the report.
    pub async fn import_flagged(&mut self, format: BookmarkFormat, data: &str) -> Result<ImportReport, CohortError> {
        self.flagged.clear();
        let mut report = ImportReport::default();

        // 1. Parse and cap the record count
        let mut bookmarks = parse_bookmarks(format, data)?;
        if let Some(max) = self.config.max_import_records {
            if bookmarks.len() > max {
                warn!("Importing only the first {} of {} bookmarks", max, bookmarks.len());
                bookmarks.truncate(max);
            }
        }

        // 2. Resolve every referenced gene not already known
        let missing: BTreeSet<String> = bookmarks
            .iter()
            .map(|b| b.gene.clone())
            .filter(|gene| !self.genes.contains_key(gene))
            .collect();
        let catalog = &self.services.genes;
        let fetched = join_all(missing.into_iter().map(|gene| async move {
            let result = catalog.fetch_gene(&gene).await;
            (gene, result)
        }))
        .await;
        for (gene, result) in fetched {
            match result {
                Ok(locus) => {
                    self.genes.insert(gene, locus);
                }
                Err(e) => warn!("Unable to resolve gene {} for imported bookmarks: {}", gene, e),
            }
        }

        // 3. Build proxies and group them by gene and transcript
        let mut groups: BTreeMap<(String, String), ImportGroup> = BTreeMap::new();
        for bookmark in &bookmarks {
            let describe = || format!("{} {}", bookmark.gene, bookmark.flag_key());

            let Some(locus) = self.genes.get(&bookmark.gene) else {
                report.unresolved.push(describe());
                continue;
            };

            let requested = bookmark.transcript_id().and_then(|id| {
                let found = locus.transcript(id);
                if found.is_none() {
                    warn!("Transcript {} not found in {}, using canonical", id, locus.gene_name);
                }
                found
            });
            let Some(transcript) = requested.or_else(|| locus.canonical_transcript()) else {
                warn!("Gene {} has no transcripts", locus.gene_name);
                report.unresolved.push(describe());
                continue;
            };

            let proxy = FlaggedVariant::proxy(bookmark, locus, transcript);
            let group = groups
                .entry((locus.gene_name.clone(), transcript.transcript_id.clone()))
                .or_insert_with(|| ImportGroup {
                    locus: locus.clone(),
                    transcript: transcript.clone(),
                    needs_call: false,
                });
            group.needs_call |= bookmark.called();

            if self.flagged.add(proxy) {
                report.imported += 1;
            }
        }

        info!(
            "Imported {} bookmarks across {} genes",
            report.imported,
            groups.len()
        );

        // 4. Analyze each group in the background and match proxies to live records
        for group in groups.values() {
            report.matched += self.materialize_group(group, &mut report.unresolved).await?;
        }

        Ok(report)
    }

    async fn materialize_group(&mut self, group: &ImportGroup, unresolved: &mut Vec<String>) -> Result<usize, CohortError> {
        let ImportGroup {
            locus,
            transcript,
            needs_call,
        } = group;
        let options = AnalysisOptions::background();

        let request = GeneAnalysisRequest::new(locus.clone(), transcript.clone()).with_options(options.clone());
        let mut live = self.load_gene(&request).await?;
        if *needs_call {
            live = self.joint_call(locus, transcript, Some(live), &options).await?.combined;
        }

        let Some(normal_id) = self.normal_sample_id() else {
            warn!("No normal sample; bookmarks in {} stay unresolved", locus.gene_name);
            return Ok(0);
        };
        let mut normal_set = live.remove(&normal_id).unwrap_or_default();

        let mut matched = 0;
        for flagged in self.flagged.iter_mut() {
            let in_group = flagged.gene_name == locus.gene_name
                && flagged.transcript_id.as_deref() == Some(transcript.transcript_id.as_str());
            if !in_group || !flagged.record.is_proxy {
                continue;
            }

            let proxy = &flagged.record;
            let live_record = normal_set
                .features
                .iter()
                .find(|v| v.matches_position(proxy.key.start, &proxy.key.ref_allele, &proxy.key.alt_allele));

            match live_record {
                Some(live_record) => {
                    let mut record = live_record.clone();
                    record.is_flagged = true;
                    record.is_user_flagged = proxy.is_user_flagged;
                    record.filters_passed.extend(proxy.filters_passed.iter().cloned());
                    record.is_proxy = false;
                    flagged.record = record;
                    matched += 1;
                }
                None => {
                    warn!(
                        "Unable to match imported variant {} in {} to loaded data",
                        proxy.key, locus.gene_name
                    );
                    unresolved.push(format!("{} {}", locus.gene_name, proxy.flag_key()));
                }
            }
        }

        // Persist the established flags and refresh the gene's badges
        self.flagged.apply_flags(&mut normal_set);
        let key = CacheKey::new(&normal_id, &locus.gene_name, &transcript.transcript_id, DataKind::Variants);
        self.cache.write(key, &normal_set, CachePolicy::WriteThrough).await;

        let coverage = self.danger_coverage(locus, transcript).await;
        let summary = self.compute_danger(locus, Some((&normal_id, &normal_set)), &coverage);
        self.store_danger_summary(summary);

        Ok(matched)
    }

    /// Serialize the flagged list; sample names are included for multi-sample cohorts
    pub fn export_flagged(&self, format: BookmarkFormat) -> Result<String, CohortError> {
        let sample_names: Option<Vec<String>> = self.is_multi_sample().then(|| {
            self.roster
                .patients()
                .map(|unit| unit.genotype_sample_name().unwrap_or(&unit.display_name).to_string())
                .collect()
        });

        Ok(self
            .services
            .exporter
            .export(self.flagged.as_slice(), format, sample_names.as_deref())?)
    }

    /// Add every badge-worthy variant of the gene's summary to the flagged list
    pub fn capture_flagged_variants(&mut self, gene_name: &str) -> usize {
        let Some(summary) = self.danger_summaries.get(&gene_name.to_uppercase()) else {
            return 0;
        };

        let mut captured = Vec::new();
        for (category, variants) in &summary.badges {
            for variant in variants {
                let mut record = variant.clone();
                record.is_flagged = true;
                record.filters_passed.insert(category.as_str().to_string());
                captured.push(FlaggedVariant::new(record, &summary.gene_name, None));
            }
        }

        let mut added = 0;
        for variant in captured {
            if self.flagged.add(variant) {
                added += 1;
            }
        }
        debug!("Captured {} flagged variants for {}", added, gene_name);
        added
    }

    /// Summary computed over the gene's flagged variants only
    pub fn summarize_danger_for_flagged(&self, gene_name: &str) -> DangerSummary {
        let records: Vec<VariantRecord> = self
            .flagged
            .for_gene(gene_name)
            .into_iter()
            .map(|v| v.record.clone())
            .collect();

        self.services
            .classifier
            .classify(gene_name, &records, &CoverageMap::new(), self.services.filters.as_ref())
    }

    pub fn flagged_variants(&self) -> &FlaggedVariantStore {
        &self.flagged
    }

    pub fn flagged_variant(&self, key: &FlagKey) -> Option<&FlaggedVariant> {
        self.flagged.find(key)
    }

    pub fn is_flagged_variant(&self, record: &VariantRecord) -> bool {
        self.flagged.contains(record)
    }

    /// Mark bookmarked records in every set of a result map
    pub fn set_variant_flags(&self, result_map: &mut ResultMap) {
        for set in result_map.values_mut() {
            self.flagged.apply_flags(set);
        }
    }

    pub fn flagged_variants_for_gene(&self, gene_name: &str) -> Vec<&FlaggedVariant> {
        self.flagged.for_gene(gene_name)
    }

    pub fn flagged_variants_by_filter(&self, gene_name: Option<&str>) -> Vec<(String, Vec<&FlaggedVariant>)> {
        self.flagged.by_filter(gene_name)
    }

    pub fn remove_flagged_variants_for_gene(&mut self, gene_name: &str) -> usize {
        self.flagged.remove_for_gene(gene_name)
    }

    pub fn clear_flagged_variants(&mut self) {
        self.flagged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Zygosity;

    fn flagged(gene: &str, start: u64, user: bool, filters: &[&str]) -> FlaggedVariant {
        let mut record = VariantRecord::new(VariantKey::point("chr1", start, "A", "G"), Zygosity::Het);
        record.is_flagged = true;
        record.is_user_flagged = user;
        record.filters_passed = filters.iter().map(|f| f.to_string()).collect();
        FlaggedVariant::new(record, gene, None)
    }

    #[test]
    fn test_add_is_unique_by_flag_key() {
        let mut store = FlaggedVariantStore::default();
        assert!(store.add(flagged("GENE1", 100, true, &[])));
        assert!(!store.add(flagged("GENE1", 100, false, &["pathogenic"])));

        let mut other_chrom_naming = flagged("GENE1", 100, true, &[]);
        other_chrom_naming.record.key.chrom = "1".to_string();
        assert!(!store.add(other_chrom_naming));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_and_gene_scoping() {
        let mut store = FlaggedVariantStore::default();
        store.add(flagged("GENE1", 100, true, &[]));
        store.add(flagged("GENE1", 200, false, &["denovo"]));
        store.add(flagged("GENE2", 300, false, &["pathogenic"]));

        assert_eq!(store.for_gene("gene1").len(), 2);
        assert!(store.remove(&FlagKey::new("chr1", 100, "A", "G")).is_some());
        assert!(store.remove(&FlagKey::new("chr1", 100, "A", "G")).is_none());
        assert_eq!(store.remove_for_gene("GENE2"), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_by_filter_groups() {
        let mut store = FlaggedVariantStore::default();
        store.add(flagged("GENE1", 100, true, &[USER_FLAGGED, "pathogenic"]));
        store.add(flagged("GENE1", 200, false, &["pathogenic", "denovo"]));
        store.add(flagged("GENE2", 300, false, &["denovo"]));

        let groups = store.by_filter(Some("GENE1"));
        let names: Vec<&str> = groups.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec![USER_FLAGGED, "denovo", "pathogenic"]);
        assert!(groups.iter().all(|(_, variants)| variants.len() == 1));

        let all = store.by_filter(None);
        let denovo = all.iter().find(|(name, _)| name == "denovo").unwrap();
        assert_eq!(denovo.1.len(), 2);
    }

    #[test]
    fn test_apply_flags() {
        let mut store = FlaggedVariantStore::default();
        store.add(flagged("GENE1", 100, true, &[USER_FLAGGED]));

        let mut set = VariantSet::new(vec![
            VariantRecord::new(VariantKey::point("chr1", 100, "A", "G"), Zygosity::Het),
            VariantRecord::new(VariantKey::point("chr1", 200, "A", "G"), Zygosity::Het),
        ]);
        set.features[1].is_flagged = true;
        set.features[1].is_user_flagged = true;
        set.features[1].filters_passed.insert(USER_FLAGGED.to_string());

        store.apply_flags(&mut set);
        assert!(set.features[0].is_flagged && set.features[0].is_user_flagged);
        assert!(set.features[0].filters_passed.contains(USER_FLAGGED));
        assert!(!set.features[1].is_flagged && !set.features[1].is_user_flagged);
        assert!(set.features[1].filters_passed.is_empty());
    }

    #[test]
    fn test_empty_list_clears_stale_flags() {
        let store = FlaggedVariantStore::default();
        let mut record = VariantRecord::new(VariantKey::point("chr1", 100, "A", "G"), Zygosity::Het);
        record.is_flagged = true;
        record.is_user_flagged = true;
        record.filters_passed.insert(USER_FLAGGED.to_string());
        record.filters_passed.insert("pathogenic".to_string());
        let mut set = VariantSet::new(vec![record]);

        store.apply_flags(&mut set);
        let record = &set.features[0];
        assert!(!record.is_flagged && !record.is_user_flagged);
        assert_eq!(record.filters_passed.len(), 1);
        assert!(record.filters_passed.contains("pathogenic"));
    }
}
