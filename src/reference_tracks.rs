// ==============================================================================
// reference_tracks.rs - Reference Track Management
// ==============================================================================
// Description: Keeps the ClinVar and COSMIC pseudo-samples present and leading
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::config::OrchestratorConfig;
use crate::models::{SampleId, COSMIC_VARIANTS_ID, KNOWN_VARIANTS_ID};
use crate::sample::{SampleRoster, SampleUnit};
use tracing::debug;

/// One curated reference track
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTrack {
    pub id: SampleId,
    pub display_name: &'static str,
    pub vcf_url: String,
    pub index_url: Option<String>,
}

/// Ensures reference tracks exist and sort ahead of patient samples
#[derive(Debug, Clone)]
pub struct ReferenceTrackManager {
    /// Fixed display order: ClinVar first, then COSMIC
    tracks: Vec<ReferenceTrack>,
}

impl ReferenceTrackManager {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let sources = config.reference_sources();

        Self {
            tracks: vec![
                ReferenceTrack {
                    id: SampleId::new(KNOWN_VARIANTS_ID),
                    display_name: "ClinVar",
                    vcf_url: sources.clinvar_vcf,
                    index_url: sources.clinvar_index,
                },
                ReferenceTrack {
                    id: SampleId::new(COSMIC_VARIANTS_ID),
                    display_name: "COSMIC",
                    vcf_url: sources.cosmic_vcf,
                    index_url: sources.cosmic_index,
                },
            ],
        }
    }

    pub fn tracks(&self) -> &[ReferenceTrack] {
        &self.tracks
    }

    /// Add any missing reference track; returns how many were added
    ///
    /// Calling this repeatedly never creates duplicates.
    pub fn ensure_tracks(&self, roster: &mut SampleRoster) -> usize {
        let mut added = 0;

        for track in &self.tracks {
            if roster.contains(&track.id) {
                continue;
            }

            let unit = SampleUnit::reference_track(
                track.id.clone(),
                track.display_name,
                &track.vcf_url,
                track.index_url.as_deref(),
            );
            roster.insert(unit, None);
            debug!("Added reference track {}", track.id);
            added += 1;
        }

        self.sort_tracks_first(roster);
        added
    }

    /// Stable reorder: tracks in their fixed order, then patients as they were
    pub fn sort_tracks_first(&self, roster: &mut SampleRoster) {
        let current = roster.ids();

        let mut order: Vec<SampleId> = self
            .tracks
            .iter()
            .filter(|track| current.contains(&track.id))
            .map(|track| track.id.clone())
            .collect();
        order.extend(current.into_iter().filter(|id| !id.is_reference_track()));

        roster.set_order(order);
    }

    /// Number of reference tracks currently in the roster
    pub fn present_count(&self, roster: &SampleRoster) -> usize {
        self.tracks.iter().filter(|track| roster.contains(&track.id)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleDescriptor;

    fn patient(id: &str) -> SampleUnit {
        let descriptor = SampleDescriptor {
            id: SampleId::new(id),
            ..SampleDescriptor::default()
        };
        let mut unit = SampleUnit::reference_track(descriptor.id.clone(), id, "patient.vcf.gz", None);
        unit.is_reference = false;
        unit
    }

    #[test]
    fn test_tracks_added_once_and_lead() {
        let manager = ReferenceTrackManager::from_config(&OrchestratorConfig::default());
        let mut roster = SampleRoster::default();
        roster.insert(patient("s0"), None);
        roster.insert(patient("s1"), None);

        assert_eq!(manager.ensure_tracks(&mut roster), 2);
        assert_eq!(manager.ensure_tracks(&mut roster), 0);
        assert_eq!(roster.len(), 4);

        let ids: Vec<String> = roster.iter().map(|u| u.id.to_string()).collect();
        assert_eq!(ids, vec![KNOWN_VARIANTS_ID, COSMIC_VARIANTS_ID, "s0", "s1"]);

        let clinvar = roster.get(&SampleId::known_variants()).unwrap();
        assert!(clinvar.is_reference);
        assert_eq!(clinvar.display_name, "ClinVar");
    }

    #[test]
    fn test_sort_keeps_patient_order() {
        let manager = ReferenceTrackManager::from_config(&OrchestratorConfig::default());
        let mut roster = SampleRoster::default();
        roster.insert(patient("s1"), None);
        manager.ensure_tracks(&mut roster);
        roster.insert(patient("s0"), Some(0));

        manager.sort_tracks_first(&mut roster);
        let ids: Vec<String> = roster.iter().map(|u| u.id.to_string()).collect();
        assert_eq!(ids, vec![KNOWN_VARIANTS_ID, COSMIC_VARIANTS_ID, "s0", "s1"]);
        assert_eq!(manager.present_count(&roster), 2);
    }
}
