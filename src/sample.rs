// ==============================================================================
// sample.rs - Sample Units and Cohort Roster
// ==============================================================================
// Description: Per-sample data sources, loaded data and the ordered cohort roster
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::error::{CohortError, SourceKind};
use crate::models::{DepthPoint, SampleCoverage, SampleId, VariantSet};
use crate::services::{AlignmentMetadata, CohortServices, VcfMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How a sample is described when a cohort is initialized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleDescriptor {
    pub id: SampleId,

    #[serde(rename = "isTumor")]
    pub is_tumor: bool,

    pub vcf: Option<String>,
    pub tbi: Option<String>,
    pub bam: Option<String>,
    pub bai: Option<String>,

    #[serde(rename = "displayName")]
    pub display_name: Option<String>,

    /// Genotype column to read from a multi-sample VCF
    #[serde(rename = "selectedSample")]
    pub selected_sample: Option<String>,
}

impl SampleDescriptor {
    /// Display name falls back from the explicit name to the selected sample to the id
    pub fn resolved_display_name(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.selected_sample.as_deref().filter(|name| !name.is_empty()))
            .unwrap_or_else(|| self.id.as_str())
            .to_string()
    }
}

/// Resolved pre-called variant file
#[derive(Debug, Clone, PartialEq)]
pub struct VcfHandle {
    pub url: String,
    pub index_url: Option<String>,
    pub metadata: VcfMetadata,
}

/// Resolved alignment file
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentHandle {
    pub sample_id: SampleId,
    pub url: String,
    pub index_url: Option<String>,
    pub metadata: AlignmentMetadata,
}

/// Which operations are currently running for a sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InProgress {
    pub loading_variants: bool,
    pub loading_coverage: bool,
    pub calling_variants: bool,
}

/// One sample (or reference track) and its loaded state
#[derive(Debug, Clone)]
pub struct SampleUnit {
    pub id: SampleId,
    pub display_name: String,
    pub is_tumor: bool,
    pub is_reference: bool,
    pub selected_sample: Option<String>,

    pub vcf: Option<VcfHandle>,
    pub alignment: Option<AlignmentHandle>,

    /// Full annotated variant set for the current gene (loaded plus called)
    pub vcf_data: Option<VariantSet>,
    /// Variants produced by the joint caller and absent from `vcf_data`'s source
    pub fb_data: Option<VariantSet>,

    /// Display view of loaded variants after filtering and pileup
    pub loaded_variants: VariantSet,
    /// Display view of called variants after filtering and pileup
    pub called_variants: VariantSet,

    pub bam_data: Option<SampleCoverage>,
    /// Depth points clipped to the current gene
    pub coverage: Vec<DepthPoint>,

    pub in_progress: InProgress,
    pub last_gene_loaded: Option<String>,
}

impl SampleUnit {
    fn empty(id: SampleId, display_name: String) -> Self {
        Self {
            id,
            display_name,
            is_tumor: false,
            is_reference: false,
            selected_sample: None,
            vcf: None,
            alignment: None,
            vcf_data: None,
            fb_data: None,
            loaded_variants: VariantSet::default(),
            called_variants: VariantSet::default(),
            bam_data: None,
            coverage: Vec::new(),
            in_progress: InProgress::default(),
            last_gene_loaded: None,
        }
    }

    /// Resolve a descriptor's VCF and alignment sources concurrently
    pub async fn resolve(descriptor: &SampleDescriptor, services: &CohortServices) -> Result<Self, CohortError> {
        let (vcf, alignment) = tokio::try_join!(
            resolve_vcf(descriptor, services),
            resolve_alignment(descriptor, services)
        )?;

        let mut unit = Self::empty(descriptor.id.clone(), descriptor.resolved_display_name());
        unit.is_tumor = descriptor.is_tumor;
        unit.selected_sample = descriptor.selected_sample.clone();
        unit.vcf = vcf;
        unit.alignment = alignment;

        debug!(
            "Resolved sample {} (vcf: {}, alignments: {})",
            unit.id,
            unit.vcf.is_some(),
            unit.alignment.is_some()
        );
        Ok(unit)
    }

    /// Reference track backed by a curated VCF; no alignments
    pub fn reference_track(id: SampleId, display_name: &str, vcf_url: &str, index_url: Option<&str>) -> Self {
        let mut unit = Self::empty(id, display_name.to_string());
        unit.is_reference = true;
        unit.vcf = Some(VcfHandle {
            url: vcf_url.to_string(),
            index_url: index_url.map(str::to_string),
            metadata: VcfMetadata::default(),
        });
        unit
    }

    pub fn is_vcf_ready(&self) -> bool {
        self.vcf.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.vcf_data.is_some()
    }

    pub fn is_bam_loaded(&self) -> bool {
        self.alignment.is_some()
    }

    pub fn is_alignments_only(&self) -> bool {
        self.vcf.is_none() && self.alignment.is_some()
    }

    pub fn tumor_status(&self) -> &'static str {
        if self.is_tumor {
            "Tumor"
        } else {
            "Normal"
        }
    }

    /// Column name to look for in joint-caller output
    pub fn genotype_sample_name(&self) -> Option<&str> {
        self.alignment
            .as_ref()
            .and_then(|a| a.metadata.sample_name.as_deref())
            .or(self.selected_sample.as_deref())
    }

    /// Drop all gene-scoped data
    pub fn clear_loaded_data(&mut self) {
        self.vcf_data = None;
        self.fb_data = None;
        self.loaded_variants = VariantSet::default();
        self.called_variants = VariantSet::default();
        self.bam_data = None;
        self.coverage.clear();
    }

    pub fn clear_called_variants(&mut self) {
        self.fb_data = None;
        self.called_variants = VariantSet::default();
    }
}

async fn resolve_vcf(descriptor: &SampleDescriptor, services: &CohortServices) -> Result<Option<VcfHandle>, CohortError> {
    let Some(url) = descriptor.vcf.as_deref().filter(|url| !url.is_empty()) else {
        return Ok(None);
    };

    let metadata = services
        .vcf
        .resolve(url, descriptor.tbi.as_deref())
        .await
        .map_err(|source| CohortError::SourceResolution {
            sample: descriptor.id.clone(),
            kind: SourceKind::Vcf,
            source,
        })?;

    Ok(Some(VcfHandle {
        url: url.to_string(),
        index_url: descriptor.tbi.clone(),
        metadata,
    }))
}

async fn resolve_alignment(
    descriptor: &SampleDescriptor,
    services: &CohortServices,
) -> Result<Option<AlignmentHandle>, CohortError> {
    let Some(url) = descriptor.bam.as_deref().filter(|url| !url.is_empty()) else {
        return Ok(None);
    };

    let metadata = services
        .alignments
        .resolve(url, descriptor.bai.as_deref())
        .await
        .map_err(|source| CohortError::SourceResolution {
            sample: descriptor.id.clone(),
            kind: SourceKind::Alignment,
            source,
        })?;

    Ok(Some(AlignmentHandle {
        sample_id: descriptor.id.clone(),
        url: url.to_string(),
        index_url: descriptor.bai.clone(),
        metadata,
    }))
}

/// Ordered sample units with id lookup
#[derive(Debug, Default)]
pub struct SampleRoster {
    order: Vec<SampleId>,
    units: HashMap<SampleId, SampleUnit>,
}

impl SampleRoster {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &SampleId) -> bool {
        self.units.contains_key(id)
    }

    pub fn get(&self, id: &SampleId) -> Option<&SampleUnit> {
        self.units.get(id)
    }

    pub fn get_mut(&mut self, id: &SampleId) -> Option<&mut SampleUnit> {
        self.units.get_mut(id)
    }

    /// Ids in display order
    pub fn ids(&self) -> Vec<SampleId> {
        self.order.clone()
    }

    /// Units in display order
    pub fn iter(&self) -> impl Iterator<Item = &SampleUnit> + '_ {
        self.order.iter().filter_map(move |id| self.units.get(id))
    }

    /// Patient samples (reference tracks excluded) in display order
    pub fn patients(&self) -> impl Iterator<Item = &SampleUnit> + '_ {
        self.iter().filter(|unit| !unit.is_reference)
    }

    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut SampleUnit> + '_ {
        self.units.values_mut()
    }

    /// Insert at `index` (clamped), or replace in place when the id already exists
    pub fn insert(&mut self, unit: SampleUnit, index: Option<usize>) -> Option<SampleUnit> {
        let id = unit.id.clone();
        if let Some(previous) = self.units.insert(id.clone(), unit) {
            return Some(previous);
        }

        match index {
            Some(index) if index < self.order.len() => self.order.insert(index, id),
            _ => self.order.push(id),
        }
        None
    }

    pub fn remove(&mut self, id: &SampleId) -> Option<SampleUnit> {
        let unit = self.units.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(unit)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.units.clear();
    }

    /// Replace the display order; ids not in the roster are dropped, missing ids appended
    pub fn set_order(&mut self, order: Vec<SampleId>) {
        let mut next: Vec<SampleId> = order.into_iter().filter(|id| self.units.contains_key(id)).collect();
        for id in &self.order {
            if !next.contains(id) {
                next.push(id.clone());
            }
        }
        self.order = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str) -> SampleUnit {
        SampleUnit::empty(SampleId::new(id), id.to_string())
    }

    #[test]
    fn test_display_name_fallback() {
        let mut descriptor = SampleDescriptor {
            id: SampleId::new("s1"),
            ..SampleDescriptor::default()
        };
        assert_eq!(descriptor.resolved_display_name(), "s1");

        descriptor.selected_sample = Some("NA12878".to_string());
        assert_eq!(descriptor.resolved_display_name(), "NA12878");

        descriptor.display_name = Some("Proband tumor".to_string());
        assert_eq!(descriptor.resolved_display_name(), "Proband tumor");
    }

    #[test]
    fn test_descriptor_json_field_names() {
        let descriptor: SampleDescriptor = serde_json::from_str(
            r#"{"id": "s1", "isTumor": true, "bam": "s1.bam", "selectedSample": "TUMOR"}"#,
        )
        .unwrap();
        assert!(descriptor.is_tumor);
        assert_eq!(descriptor.bam.as_deref(), Some("s1.bam"));
        assert!(descriptor.vcf.is_none());
    }

    #[test]
    fn test_roster_insert_and_replace() {
        let mut roster = SampleRoster::default();
        roster.insert(unit("s0"), None);
        roster.insert(unit("s2"), None);
        roster.insert(unit("s1"), Some(1));

        let ids: Vec<String> = roster.iter().map(|u| u.id.to_string()).collect();
        assert_eq!(ids, vec!["s0", "s1", "s2"]);

        let mut replacement = unit("s1");
        replacement.is_tumor = true;
        assert!(roster.insert(replacement, Some(0)).is_some());
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.ids()[1], SampleId::new("s1"));
        assert!(roster.get(&SampleId::new("s1")).unwrap().is_tumor);
    }

    #[test]
    fn test_roster_remove_and_reorder() {
        let mut roster = SampleRoster::default();
        for id in ["s0", "s1", "s2"] {
            roster.insert(unit(id), None);
        }

        roster.set_order(vec![SampleId::new("s2"), SampleId::new("s0")]);
        assert_eq!(
            roster.ids(),
            vec![SampleId::new("s2"), SampleId::new("s0"), SampleId::new("s1")]
        );

        assert!(roster.remove(&SampleId::new("s0")).is_some());
        assert!(roster.remove(&SampleId::new("s0")).is_none());
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_clear_loaded_data() {
        let mut sample = unit("s0");
        sample.vcf_data = Some(VariantSet::default());
        sample.bam_data = Some(SampleCoverage::default());
        sample.coverage.push(DepthPoint { pos: 1, depth: 10 });

        sample.clear_loaded_data();
        assert!(!sample.is_loaded());
        assert!(sample.bam_data.is_none());
        assert!(sample.coverage.is_empty());
    }
}
