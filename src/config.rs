// ==============================================================================
// config.rs - Orchestrator Configuration
// ==============================================================================
// Description: JSON configuration with COHORT_* environment overrides
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::danger::DangerRuleset;
use crate::error::CohortError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// How tumor variants are tagged against the normal sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceRule {
    /// Absent from the normal → not inherited (somatic); present → untagged
    #[default]
    AbsenceImpliesSomatic,
    /// Present in the normal → inherited; absent → untagged
    PresenceImpliesInherited,
}

impl InheritanceRule {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "absence_implies_somatic" | "somatic" => Some(InheritanceRule::AbsenceImpliesSomatic),
            "presence_implies_inherited" | "inherited" => Some(InheritanceRule::PresenceImpliesInherited),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenomeBuild {
    #[default]
    GRCh37,
    GRCh38,
}

impl GenomeBuild {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "GRCH37" | "HG19" => Some(GenomeBuild::GRCh37),
            "GRCH38" | "HG38" => Some(GenomeBuild::GRCh38),
            _ => None,
        }
    }
}

/// Source locations for the two reference tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrackSources {
    pub clinvar_vcf: String,
    pub clinvar_index: Option<String>,
    pub cosmic_vcf: String,
    pub cosmic_index: Option<String>,
}

impl ReferenceTrackSources {
    pub fn for_build(build: GenomeBuild) -> Self {
        match build {
            GenomeBuild::GRCh37 => Self {
                clinvar_vcf: "https://ftp.ncbi.nlm.nih.gov/pub/clinvar/vcf_GRCh37/clinvar.vcf.gz".to_string(),
                clinvar_index: Some(
                    "https://ftp.ncbi.nlm.nih.gov/pub/clinvar/vcf_GRCh37/clinvar.vcf.gz.tbi".to_string(),
                ),
                cosmic_vcf: "https://s3.amazonaws.com/iobio/samples/vcf/cosmic.coding.noncoding.GRCh37.final.vcf.gz".to_string(),
                cosmic_index: Some(
                    "https://s3.amazonaws.com/iobio/samples/vcf/cosmic.coding.noncoding.GRCh37.final.vcf.gz.tbi".to_string(),
                ),
            },
            GenomeBuild::GRCh38 => Self {
                clinvar_vcf: "https://ftp.ncbi.nlm.nih.gov/pub/clinvar/vcf_GRCh38/clinvar.vcf.gz".to_string(),
                clinvar_index: Some(
                    "https://ftp.ncbi.nlm.nih.gov/pub/clinvar/vcf_GRCh38/clinvar.vcf.gz.tbi".to_string(),
                ),
                cosmic_vcf: "https://s3.amazonaws.com/iobio/samples/vcf/cosmic.coding.GRCh38.vcf.gz".to_string(),
                cosmic_index: Some(
                    "https://s3.amazonaws.com/iobio/samples/vcf/cosmic.coding.GRCh38.vcf.gz.tbi".to_string(),
                ),
            },
        }
    }
}

/// Display layout used by the interval-stacking pileup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PileupConfig {
    /// Width of the rendered region in pixels
    pub width_px: f64,
    /// Minimum rendered width of one variant in pixels
    pub feature_width: f64,
    /// Horizontal gap required between variants sharing a level
    pub padding: f64,
}

impl Default for PileupConfig {
    fn default() -> Self {
        Self {
            width_px: 1000.0,
            feature_width: 4.0,
            padding: 1.0,
        }
    }
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub genome_build: GenomeBuild,

    /// Overrides the per-build reference track locations
    pub reference_tracks: Option<ReferenceTrackSources>,

    /// Whether the reference tracks take part in variant loading
    pub load_reference_tracks: bool,

    pub inheritance_rule: InheritanceRule,

    pub pileup: PileupConfig,

    /// Cap on the number of bookmark records accepted by one import
    pub max_import_records: Option<usize>,

    /// Extra arguments passed through to the joint caller
    pub joint_call_args: Vec<String>,

    pub danger_ruleset: DangerRuleset,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            genome_build: GenomeBuild::default(),
            reference_tracks: None,
            load_reference_tracks: true,
            inheritance_rule: InheritanceRule::default(),
            pileup: PileupConfig::default(),
            max_import_records: None,
            joint_call_args: Vec::new(),
            danger_ruleset: DangerRuleset::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, CohortError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CohortError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: OrchestratorConfig = serde_json::from_str(&content)
            .map_err(|e| CohortError::Config(format!("Invalid configuration in {}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply COHORT_* environment overrides on top of file/default values
    pub fn with_env_overrides(self) -> Result<Self, CohortError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, CohortError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("COHORT_GENOME_BUILD") {
            self.genome_build = GenomeBuild::parse(&value)
                .ok_or_else(|| CohortError::Config(format!("Unknown genome build '{}'", value)))?;
        }

        if let Some(value) = lookup("COHORT_INHERITANCE_RULE") {
            self.inheritance_rule = InheritanceRule::parse(&value)
                .ok_or_else(|| CohortError::Config(format!("Unknown inheritance rule '{}'", value)))?;
        }

        if let Some(value) = lookup("COHORT_MAX_IMPORT_RECORDS") {
            match value.parse::<usize>() {
                Ok(max) => self.max_import_records = Some(max),
                Err(_) => warn!("Ignoring invalid COHORT_MAX_IMPORT_RECORDS '{}'", value),
            }
        }

        if let Some(value) = lookup("COHORT_LOAD_REFERENCE_TRACKS") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.load_reference_tracks = true,
                "0" | "false" | "no" => self.load_reference_tracks = false,
                _ => warn!("Ignoring invalid COHORT_LOAD_REFERENCE_TRACKS '{}'", value),
            }
        }

        Ok(self)
    }

    /// Reference track locations for the configured build
    pub fn reference_sources(&self) -> ReferenceTrackSources {
        self.reference_tracks
            .clone()
            .unwrap_or_else(|| ReferenceTrackSources::for_build(self.genome_build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.inheritance_rule, InheritanceRule::AbsenceImpliesSomatic);
        assert!(config.load_reference_tracks);
        assert!(config.reference_sources().clinvar_vcf.contains("GRCh37"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"genome_build": "GRCh38", "inheritance_rule": "presence_implies_inherited"}}"#
        )
        .unwrap();

        let config = OrchestratorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.genome_build, GenomeBuild::GRCh38);
        assert_eq!(config.inheritance_rule, InheritanceRule::PresenceImpliesInherited);
        assert_eq!(config.pileup, PileupConfig::default());
        assert!(config.reference_sources().cosmic_vcf.contains("GRCh38"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("COHORT_INHERITANCE_RULE", "inherited"),
            ("COHORT_MAX_IMPORT_RECORDS", "25"),
            ("COHORT_LOAD_REFERENCE_TRACKS", "false"),
        ]
        .into_iter()
        .collect();

        let config = OrchestratorConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.inheritance_rule, InheritanceRule::PresenceImpliesInherited);
        assert_eq!(config.max_import_records, Some(25));
        assert!(!config.load_reference_tracks);
    }

    #[test]
    fn test_invalid_build_rejected() {
        let result = OrchestratorConfig::default()
            .with_overrides(|name| (name == "COHORT_GENOME_BUILD").then(|| "hg17".to_string()));
        assert!(matches!(result, Err(CohortError::Config(_))));
    }
}
