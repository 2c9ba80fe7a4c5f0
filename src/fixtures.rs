// ==============================================================================
// fixtures.rs - Offline Fixture Backend
// ==============================================================================
// Description: JSON-backed implementations of the external service traits
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Serves gene models, annotated variants, coverage, ClinVar records and
// joint-caller output from a single JSON document so the orchestrator can run
// without network services. Every call is counted.
// ==============================================================================

use crate::cache::CacheStore;
use crate::danger::{DangerRuleset, RulesetClassifier};
use crate::filters::ActiveFilters;
use crate::models::{
    ClinvarAnnotation, GeneLocus, ResultMap, SampleCoverage, SampleId, Transcript, VariantKey, VariantRecord,
    VariantSet,
};
use crate::parsers::bookmarks::DelimitedExporter;
use crate::sample::{AlignmentHandle, SampleUnit};
use crate::services::{
    AlignmentMetadata, AlignmentSource, ClinvarLookup, CohortServices, GeneCatalog, ServiceError, VcfMetadata,
    VcfSource,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// ClinVar record for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinvarEntry {
    #[serde(flatten)]
    pub key: VariantKey,
    #[serde(flatten)]
    pub annotation: ClinvarAnnotation,
}

/// Everything the fixture backend serves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureSet {
    pub genes: Vec<GeneLocus>,
    /// Variant file URL -> header metadata
    pub vcf_sources: HashMap<String, VcfMetadata>,
    /// Alignment file URL -> header metadata
    pub alignment_sources: HashMap<String, AlignmentMetadata>,
    /// Gene -> sample -> annotated variants
    pub variants: HashMap<String, HashMap<SampleId, Vec<VariantRecord>>>,
    /// Gene -> sample -> coverage
    pub coverage: HashMap<String, HashMap<SampleId, SampleCoverage>>,
    pub clinvar: Vec<ClinvarEntry>,
    /// Gene -> joint-caller VCF text
    pub joint_calls: HashMap<String, String>,
    /// Samples whose annotation and coverage requests fail
    pub failing_samples: Vec<SampleId>,
}

/// Per-operation request counters
#[derive(Debug, Default)]
pub struct CallCounts {
    pub annotate: AtomicUsize,
    pub coverage: AtomicUsize,
    pub joint_call: AtomicUsize,
    pub clinvar: AtomicUsize,
    pub gene_lookup: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixtureBackend {
    fixtures: FixtureSet,
    pub counts: CallCounts,
}

impl FixtureBackend {
    pub fn new(fixtures: FixtureSet) -> Self {
        Self {
            fixtures,
            counts: CallCounts::default(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ServiceError> {
        let content = std::fs::read_to_string(path)?;
        let fixtures: FixtureSet = serde_json::from_str(&content)?;
        info!(
            "Loaded fixtures from {}: {} genes, {} ClinVar records",
            path.display(),
            fixtures.genes.len(),
            fixtures.clinvar.len()
        );
        Ok(Self::new(fixtures))
    }

    /// Bundle this backend with the default filters, classifier and exporter
    pub fn services(
        self: Arc<Self>,
        filters: ActiveFilters,
        ruleset: DangerRuleset,
        cache: Arc<dyn CacheStore>,
    ) -> CohortServices {
        CohortServices {
            vcf: self.clone(),
            alignments: self.clone(),
            clinvar: self.clone(),
            genes: self,
            filters: Arc::new(filters),
            classifier: Arc::new(RulesetClassifier::new(ruleset)),
            cache,
            exporter: Arc::new(DelimitedExporter),
        }
    }

    fn check_sample(&self, service: &'static str, id: &SampleId) -> Result<(), ServiceError> {
        if self.fixtures.failing_samples.contains(id) {
            return Err(ServiceError::failed(service, format!("sample {} is unavailable", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl VcfSource for FixtureBackend {
    async fn resolve(&self, url: &str, _index_url: Option<&str>) -> Result<VcfMetadata, ServiceError> {
        self.fixtures
            .vcf_sources
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(url.to_string()))
    }

    async fn annotate(
        &self,
        locus: &GeneLocus,
        _transcript: &Transcript,
        samples: &[&SampleUnit],
        _multi_sample: bool,
    ) -> Result<ResultMap, ServiceError> {
        CallCounts::bump(&self.counts.annotate);

        let by_sample = self.fixtures.variants.get(&locus.gene_name);
        let mut result_map = ResultMap::new();
        for sample in samples {
            self.check_sample("Variant annotation", &sample.id)?;

            let features = by_sample
                .and_then(|variants| variants.get(&sample.id))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|mut record| {
                    record.gene_name.get_or_insert_with(|| locus.gene_name.clone());
                    record
                })
                .collect();
            result_map.insert(sample.id.clone(), VariantSet::new(features));
        }

        debug!("Annotated {} samples for {}", result_map.len(), locus.gene_name);
        Ok(result_map)
    }
}

#[async_trait]
impl AlignmentSource for FixtureBackend {
    async fn resolve(&self, url: &str, _index_url: Option<&str>) -> Result<AlignmentMetadata, ServiceError> {
        self.fixtures
            .alignment_sources
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(url.to_string()))
    }

    async fn coverage(
        &self,
        sample: &SampleUnit,
        locus: &GeneLocus,
        _transcript: &Transcript,
    ) -> Result<SampleCoverage, ServiceError> {
        CallCounts::bump(&self.counts.coverage);
        self.check_sample("Coverage", &sample.id)?;

        Ok(self
            .fixtures
            .coverage
            .get(&locus.gene_name)
            .and_then(|by_sample| by_sample.get(&sample.id))
            .cloned()
            .unwrap_or_default())
    }

    async fn joint_call(
        &self,
        locus: &GeneLocus,
        _transcript: &Transcript,
        alignments: &[AlignmentHandle],
        _args: &[String],
    ) -> Result<String, ServiceError> {
        CallCounts::bump(&self.counts.joint_call);
        debug!("Joint calling {} alignments for {}", alignments.len(), locus.gene_name);

        self.fixtures
            .joint_calls
            .get(&locus.gene_name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("joint calls for {}", locus.gene_name)))
    }
}

#[async_trait]
impl ClinvarLookup for FixtureBackend {
    async fn batch_query(
        &self,
        keys: &[VariantKey],
        _locus: &GeneLocus,
    ) -> Result<HashMap<VariantKey, ClinvarAnnotation>, ServiceError> {
        CallCounts::bump(&self.counts.clinvar);

        Ok(keys
            .iter()
            .filter_map(|key| {
                let flag_key = key.flag_key();
                self.fixtures
                    .clinvar
                    .iter()
                    .find(|entry| entry.key.flag_key() == flag_key)
                    .map(|entry| (key.clone(), entry.annotation.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl GeneCatalog for FixtureBackend {
    async fn fetch_gene(&self, gene_name: &str) -> Result<GeneLocus, ServiceError> {
        CallCounts::bump(&self.counts.gene_lookup);

        self.fixtures
            .genes
            .iter()
            .find(|gene| gene.gene_name.eq_ignore_ascii_case(gene_name))
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("gene {}", gene_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_from_json_and_serve() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "genes": [{{"gene_name": "GENE1", "chrom": "chr1", "start": 1, "end": 1000}}],
                "clinvar": [{{"chrom": "1", "start": 100, "end": 100, "ref": "A", "alt": "G",
                              "clinical_significance": "Pathogenic"}}]
            }}"#
        )
        .unwrap();

        let backend = FixtureBackend::from_json_file(file.path()).unwrap();
        let locus = backend.fetch_gene("gene1").await.unwrap();
        assert_eq!(locus.chrom, "chr1");
        assert!(backend.fetch_gene("GENE9").await.is_err());
        assert_eq!(CallCounts::get(&backend.counts.gene_lookup), 2);

        let key = VariantKey::point("chr1", 100, "A", "G");
        let annotations = backend.batch_query(&[key.clone()], &locus).await.unwrap();
        assert_eq!(annotations[&key].clinical_significance, "Pathogenic");
    }
}
