// ==============================================================================
// filters.rs - Active Variant Filters
// ==============================================================================
// Description: Default FilterConfig: region, depth, allele frequency, coverage
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use crate::models::{CoverageBin, SampleId, VariantRecord};
use crate::services::FilterConfig;
use serde::{Deserialize, Serialize};

/// User-adjustable filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveFilters {
    /// Restrict views to [start, end] inside the gene
    pub region: Option<(u64, u64)>,

    /// Minimum read depth; variants without a depth always pass
    pub min_depth: Option<u32>,

    /// Maximum population allele frequency; variants without one always pass
    pub max_allele_frequency: Option<f64>,

    /// Regions below any of these thresholds are low coverage
    pub coverage_min: u32,
    pub coverage_median: f64,
    pub coverage_mean: f64,
}

impl Default for ActiveFilters {
    fn default() -> Self {
        Self {
            region: None,
            min_depth: None,
            max_allele_frequency: None,
            coverage_min: 10,
            coverage_median: 30.0,
            coverage_mean: 30.0,
        }
    }
}

impl FilterConfig for ActiveFilters {
    fn passes(&self, _sample_id: &SampleId, variant: &VariantRecord) -> bool {
        if let (Some(min), Some(depth)) = (self.min_depth, variant.depth) {
            if depth < min {
                return false;
            }
        }

        if let (Some(max), Some(af)) = (self.max_allele_frequency, variant.allele_frequency) {
            if af > max {
                return false;
            }
        }

        true
    }

    fn is_low_coverage(&self, bin: &CoverageBin) -> bool {
        bin.min < self.coverage_min || bin.median < self.coverage_median || bin.mean < self.coverage_mean
    }

    fn region(&self) -> Option<(u64, u64)> {
        self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VariantKey, Zygosity};

    fn variant(depth: Option<u32>, af: Option<f64>) -> VariantRecord {
        let mut record = VariantRecord::new(VariantKey::point("chr1", 100, "A", "G"), Zygosity::Het);
        record.depth = depth;
        record.allele_frequency = af;
        record
    }

    #[test]
    fn test_default_filters_pass_everything() {
        let filters = ActiveFilters::default();
        let sample = SampleId::new("s0");
        assert!(filters.passes(&sample, &variant(Some(1), Some(0.9))));
        assert!(filters.region().is_none());
    }

    #[test]
    fn test_depth_and_frequency_thresholds() {
        let filters = ActiveFilters {
            min_depth: Some(20),
            max_allele_frequency: Some(0.01),
            ..ActiveFilters::default()
        };
        let sample = SampleId::new("s0");

        assert!(filters.passes(&sample, &variant(Some(25), Some(0.001))));
        assert!(!filters.passes(&sample, &variant(Some(5), None)));
        assert!(!filters.passes(&sample, &variant(None, Some(0.2))));
        assert!(filters.passes(&sample, &variant(None, None)));
    }

    #[test]
    fn test_low_coverage_bins() {
        let filters = ActiveFilters::default();
        let good = CoverageBin {
            start: 1,
            end: 100,
            min: 40,
            median: 60.0,
            mean: 58.0,
            max: 80,
        };
        let shallow = CoverageBin { min: 3, ..good.clone() };

        assert!(!filters.is_low_coverage(&good));
        assert!(filters.is_low_coverage(&shallow));
    }
}
