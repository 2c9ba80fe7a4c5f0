// ==============================================================================
// danger.rs - Gene Danger Summaries
// ==============================================================================
// Description: Badge classification, significance ranking and gene prioritization
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Priority order (first difference wins):
//   1. more pathogenic badges
//   2. more recessive badges
//   3. more de novo badges
//   4. more high-impact badges
//   5. lower (more severe) ClinVar rank, unranked = 9999
//   6. lower (more severe) impact rank, unranked = 9999
//   7. gene name
// ==============================================================================

use crate::models::{
    CoverageBin, CoverageMap, GeneLocus, Impact, SampleId, VariantRecord, VariantSet, Zygosity,
};
use crate::services::{DangerClassifier, FilterConfig};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const UNRANKED: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerCategory {
    Pathogenic,
    Recessive,
    Denovo,
    HighImpact,
    ModerateImpact,
    LowCoverage,
    UserFlagged,
}

impl DangerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DangerCategory::Pathogenic => "pathogenic",
            DangerCategory::Recessive => "recessive",
            DangerCategory::Denovo => "denovo",
            DangerCategory::HighImpact => "high_impact",
            DangerCategory::ModerateImpact => "moderate_impact",
            DangerCategory::LowCoverage => "low_coverage",
            DangerCategory::UserFlagged => "user_flagged",
        }
    }
}

/// Gene-level summary used to prioritize genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DangerSummary {
    pub gene_name: String,
    pub badges: BTreeMap<DangerCategory, Vec<VariantRecord>>,
    /// Most severe ClinVar rank among badge-worthy significances
    pub clinvar_rank: Option<u32>,
    /// Most severe impact rank among the gene's variants
    pub impact_rank: Option<u32>,
    pub low_coverage_regions: Vec<CoverageBin>,
    /// Whether called variants contributed
    pub called: bool,
}

impl DangerSummary {
    pub fn empty(gene_name: &str) -> Self {
        Self {
            gene_name: gene_name.to_string(),
            badges: BTreeMap::new(),
            clinvar_rank: None,
            impact_rank: None,
            low_coverage_regions: Vec::new(),
            called: false,
        }
    }

    pub fn badge_count(&self, category: DangerCategory) -> usize {
        self.badges.get(&category).map_or(0, Vec::len)
    }

    pub fn add_badge(&mut self, category: DangerCategory, variant: &VariantRecord) {
        self.badges.entry(category).or_default().push(variant.clone());
    }

    /// Total order used to rank genes; `Less` means more dangerous
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        let count_desc = |category: DangerCategory| other.badge_count(category).cmp(&self.badge_count(category));

        count_desc(DangerCategory::Pathogenic)
            .then_with(|| count_desc(DangerCategory::Recessive))
            .then_with(|| count_desc(DangerCategory::Denovo))
            .then_with(|| count_desc(DangerCategory::HighImpact))
            .then_with(|| {
                self.clinvar_rank
                    .unwrap_or(UNRANKED)
                    .cmp(&other.clinvar_rank.unwrap_or(UNRANKED))
            })
            .then_with(|| {
                self.impact_rank
                    .unwrap_or(UNRANKED)
                    .cmp(&other.impact_rank.unwrap_or(UNRANKED))
            })
            .then_with(|| self.gene_name.cmp(&other.gene_name))
    }
}

/// Compare optional summaries; a gene without a summary sorts last
pub fn compare_summaries(a: Option<&DangerSummary>, b: Option<&DangerSummary>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.priority_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Variants of the normal sample that feed the summary, and whether any were called
pub fn danger_inputs(
    locus: &GeneLocus,
    sample_id: &SampleId,
    set: &VariantSet,
    filters: &dyn FilterConfig,
) -> (Vec<VariantRecord>, bool) {
    let variants: Vec<VariantRecord> = set
        .features
        .iter()
        .filter(|v| locus.contains(v.key.start))
        .filter(|v| !v.zygosity.is_hom_ref_like())
        .filter(|v| filters.passes(sample_id, v))
        .cloned()
        .collect();
    let called = variants.iter().any(VariantRecord::is_called);

    (variants, called)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificanceRule {
    pub rank: u32,
    /// Whether this significance earns a pathogenic badge
    pub badge: bool,
}

/// Ranking tables for clinical significance and impact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerRuleset {
    pub clinical_significance: BTreeMap<String, SignificanceRule>,
    pub impact: BTreeMap<String, u32>,
}

impl Default for DangerRuleset {
    fn default() -> Self {
        let significance = [
            ("pathogenic", 1, true),
            ("likely_pathogenic", 2, true),
            ("uncertain_significance", 3, false),
            ("conflicting_interpretations_of_pathogenicity", 4, false),
            ("likely_benign", 5, false),
            ("benign", 6, false),
        ];
        let impact = [("HIGH", 1), ("MODERATE", 2), ("LOW", 3), ("MODIFIER", 4)];

        Self {
            clinical_significance: significance
                .into_iter()
                .map(|(name, rank, badge)| (name.to_string(), SignificanceRule { rank, badge }))
                .collect(),
            impact: impact.into_iter().map(|(name, rank)| (name.to_string(), rank)).collect(),
        }
    }
}

impl DangerRuleset {
    /// Most severe rule among the terms of a (possibly compound) significance
    ///
    /// "Pathogenic/Likely_pathogenic" and "Likely pathogenic" are both understood.
    pub fn significance(&self, raw: &str) -> Option<SignificanceRule> {
        raw.split(['/', ',', '|'])
            .map(|term| term.trim().to_lowercase().replace(' ', "_"))
            .filter_map(|term| self.clinical_significance.get(&term).copied())
            .min_by_key(|rule| rule.rank)
    }

    pub fn impact_rank(&self, impact: Impact) -> Option<u32> {
        self.impact.get(impact.as_str()).copied()
    }
}

/// Default classifier driven by a DangerRuleset
#[derive(Debug, Clone, Default)]
pub struct RulesetClassifier {
    ruleset: DangerRuleset,
}

impl RulesetClassifier {
    pub fn new(ruleset: DangerRuleset) -> Self {
        Self { ruleset }
    }
}

impl DangerClassifier for RulesetClassifier {
    fn classify(
        &self,
        gene_name: &str,
        variants: &[VariantRecord],
        coverage: &CoverageMap,
        filters: &dyn FilterConfig,
    ) -> DangerSummary {
        let mut summary = DangerSummary::empty(gene_name);

        for bin in coverage.values().flat_map(|c| c.regions.iter()) {
            let seen = summary
                .low_coverage_regions
                .iter()
                .any(|r| r.start == bin.start && r.end == bin.end);
            if !seen && filters.is_low_coverage(bin) {
                summary.low_coverage_regions.push(bin.clone());
            }
        }

        for variant in variants {
            let significance = variant
                .clinvar
                .as_ref()
                .and_then(|c| self.ruleset.significance(&c.clinical_significance))
                .filter(|rule| rule.badge);
            if let Some(rule) = significance {
                summary.add_badge(DangerCategory::Pathogenic, variant);
                summary.clinvar_rank = Some(summary.clinvar_rank.map_or(rule.rank, |r| r.min(rule.rank)));
            }

            if let Some(impact) = variant.impact {
                if let Some(rank) = self.ruleset.impact_rank(impact) {
                    summary.impact_rank = Some(summary.impact_rank.map_or(rank, |r| r.min(rank)));
                }

                match impact {
                    Impact::High => summary.add_badge(DangerCategory::HighImpact, variant),
                    Impact::Moderate => summary.add_badge(DangerCategory::ModerateImpact, variant),
                    _ => {}
                }

                if variant.zygosity == Zygosity::HomAlt && matches!(impact, Impact::High | Impact::Moderate) {
                    summary.add_badge(DangerCategory::Recessive, variant);
                }
            }

            if variant.is_inherited == Some(false) {
                summary.add_badge(DangerCategory::Denovo, variant);
            }

            if variant.is_user_flagged {
                summary.add_badge(DangerCategory::UserFlagged, variant);
            }

            let in_low_coverage = summary
                .low_coverage_regions
                .iter()
                .any(|bin| variant.key.start >= bin.start && variant.key.start <= bin.end);
            if in_low_coverage {
                summary.add_badge(DangerCategory::LowCoverage, variant);
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ActiveFilters;
    use crate::models::{ClinvarAnnotation, SampleCoverage, VariantKey};

    fn summary(name: &str, pathogenic: usize, recessive: usize, clinvar: Option<u32>, impact: Option<u32>) -> DangerSummary {
        let variant = VariantRecord::new(VariantKey::point("chr1", 1, "A", "G"), Zygosity::Het);
        let mut summary = DangerSummary::empty(name);
        for _ in 0..pathogenic {
            summary.add_badge(DangerCategory::Pathogenic, &variant);
        }
        for _ in 0..recessive {
            summary.add_badge(DangerCategory::Recessive, &variant);
        }
        summary.clinvar_rank = clinvar;
        summary.impact_rank = impact;
        summary
    }

    fn variant(start: u64, significance: Option<&str>, impact: Option<Impact>, zygosity: Zygosity) -> VariantRecord {
        let mut record = VariantRecord::new(VariantKey::point("chr1", start, "A", "G"), zygosity);
        record.clinvar = significance.map(|s| ClinvarAnnotation {
            clinical_significance: s.to_string(),
            ..ClinvarAnnotation::default()
        });
        record.impact = impact;
        record
    }

    #[test]
    fn test_priority_cascade() {
        let more_pathogenic = summary("B", 2, 0, None, None);
        let fewer_pathogenic = summary("A", 1, 5, Some(1), Some(1));
        assert_eq!(more_pathogenic.priority_cmp(&fewer_pathogenic), Ordering::Less);

        let ranked = summary("Z", 1, 5, Some(1), Some(4));
        assert_eq!(ranked.priority_cmp(&fewer_pathogenic), Ordering::Greater);

        let tie_a = summary("A", 0, 0, None, None);
        let tie_b = summary("B", 0, 0, None, None);
        assert_eq!(tie_a.priority_cmp(&tie_b), Ordering::Less);
    }

    #[test]
    fn test_unranked_sorts_after_ranked() {
        let ranked = summary("B", 0, 0, Some(6), None);
        let unranked = summary("A", 0, 0, None, None);
        assert_eq!(ranked.priority_cmp(&unranked), Ordering::Less);
    }

    #[test]
    fn test_comparator_is_antisymmetric_and_transitive() {
        let summaries = vec![
            summary("BRCA1", 2, 0, Some(1), Some(1)),
            summary("BRCA2", 2, 0, Some(2), Some(1)),
            summary("TP53", 1, 3, None, Some(1)),
            summary("KRAS", 1, 3, None, None),
            summary("EGFR", 0, 0, None, None),
            summary("APC", 0, 0, None, None),
            summary("PTEN", 0, 1, Some(2), Some(2)),
        ];

        for a in &summaries {
            assert_eq!(a.priority_cmp(a), Ordering::Equal);
            for b in &summaries {
                assert_eq!(a.priority_cmp(b), b.priority_cmp(a).reverse());
                for c in &summaries {
                    if a.priority_cmp(b) != Ordering::Greater && b.priority_cmp(c) != Ordering::Greater {
                        assert_ne!(a.priority_cmp(c), Ordering::Greater);
                    }
                }
            }
        }
    }

    #[test]
    fn test_missing_summary_sorts_last() {
        let present = summary("TP53", 0, 0, None, None);
        assert_eq!(compare_summaries(Some(&present), None), Ordering::Less);
        assert_eq!(compare_summaries(None, Some(&present)), Ordering::Greater);
        assert_eq!(compare_summaries(None, None), Ordering::Equal);
    }

    #[test]
    fn test_significance_parsing() {
        let ruleset = DangerRuleset::default();
        assert_eq!(ruleset.significance("Pathogenic/Likely_pathogenic").unwrap().rank, 1);
        assert_eq!(ruleset.significance("Likely pathogenic").unwrap().rank, 2);
        assert!(!ruleset.significance("Benign").unwrap().badge);
        assert!(ruleset.significance("not_provided").is_none());
    }

    #[test]
    fn test_classifier_badges() {
        let classifier = RulesetClassifier::default();
        let filters = ActiveFilters::default();

        let mut somatic = variant(300, None, Some(Impact::Low), Zygosity::Het);
        somatic.is_inherited = Some(false);

        let variants = vec![
            variant(100, Some("Pathogenic"), Some(Impact::High), Zygosity::Het),
            variant(200, Some("Benign"), Some(Impact::Moderate), Zygosity::HomAlt),
            somatic,
        ];

        let mut coverage = CoverageMap::new();
        coverage.insert(
            SampleId::new("s0"),
            SampleCoverage {
                depth: Vec::new(),
                regions: vec![CoverageBin {
                    start: 250,
                    end: 350,
                    min: 2,
                    median: 5.0,
                    mean: 5.0,
                    max: 9,
                }],
            },
        );

        let summary = classifier.classify("GENE1", &variants, &coverage, &filters);
        assert_eq!(summary.badge_count(DangerCategory::Pathogenic), 1);
        assert_eq!(summary.badge_count(DangerCategory::HighImpact), 1);
        assert_eq!(summary.badge_count(DangerCategory::Recessive), 1);
        assert_eq!(summary.badge_count(DangerCategory::Denovo), 1);
        assert_eq!(summary.badge_count(DangerCategory::LowCoverage), 1);
        assert_eq!(summary.clinvar_rank, Some(1));
        assert_eq!(summary.impact_rank, Some(1));
        assert_eq!(summary.low_coverage_regions.len(), 1);
    }
}
