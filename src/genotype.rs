// ==============================================================================
// genotype.rs - VCF Genotype to Zygosity Conversion
// ==============================================================================
// Description: Interprets GT fields from joint-caller output as zygosity
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Algorithm:
//   Given a GT field ("0/1", "1|1", "./.", "1") and an ALT allele index:
//   - every allele missing (".") → NoCall
//   - no allele equal to the index, all alleles REF → HomRef
//   - every called allele equal to the index → HomAlt
//   - index present alongside another allele → Het
// ==============================================================================

use crate::models::Zygosity;
use thiserror::Error;

/// Errors that can occur during genotype interpretation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeParseError {
    #[error("Invalid genotype format: '{0}'")]
    InvalidFormat(String),

    #[error("Genotype '{genotype}' contains non-numeric allele '{allele}'")]
    InvalidAllele { genotype: String, allele: String },
}

/// Split a GT field into allele indices (None for ".")
///
/// # Examples
/// ```
/// use cohort_orchestrator::genotype::allele_indices;
///
/// assert_eq!(allele_indices("0/1").unwrap(), vec![Some(0), Some(1)]);
/// assert_eq!(allele_indices("./.").unwrap(), vec![None, None]);
/// ```
pub fn allele_indices(genotype: &str) -> Result<Vec<Option<u32>>, GenotypeParseError> {
    let genotype = genotype.trim();
    if genotype.is_empty() {
        return Err(GenotypeParseError::InvalidFormat(genotype.to_string()));
    }

    genotype
        .split(['/', '|'])
        .map(|allele| match allele {
            "." => Ok(None),
            _ => allele
                .parse::<u32>()
                .map(Some)
                .map_err(|_| GenotypeParseError::InvalidAllele {
                    genotype: genotype.to_string(),
                    allele: allele.to_string(),
                }),
        })
        .collect()
}

/// Zygosity of a sample with respect to one ALT allele (1-based index)
///
/// # Arguments
/// * `genotype` - VCF GT value (e.g., "0/1", "1/2", "./.")
/// * `alt_index` - Index of the ALT allele being reported (1 for the first ALT)
///
/// # Returns
/// * `Ok(Zygosity::HomRef)` - The sample does not carry this allele
/// * `Ok(Zygosity::NoCall)` - Missing genotype
///
/// # Examples
/// ```
/// use cohort_orchestrator::genotype::zygosity_for_allele;
/// use cohort_orchestrator::models::Zygosity;
///
/// assert_eq!(zygosity_for_allele("0/1", 1).unwrap(), Zygosity::Het);
/// assert_eq!(zygosity_for_allele("1/2", 2).unwrap(), Zygosity::Het);
/// assert_eq!(zygosity_for_allele("2/2", 1).unwrap(), Zygosity::HomRef);
/// ```
pub fn zygosity_for_allele(genotype: &str, alt_index: u32) -> Result<Zygosity, GenotypeParseError> {
    let alleles = allele_indices(genotype)?;
    let called: Vec<u32> = alleles.iter().flatten().copied().collect();

    if called.is_empty() {
        return Ok(Zygosity::NoCall);
    }

    let carried = called.iter().filter(|&&a| a == alt_index).count();
    if carried == 0 {
        return Ok(Zygosity::HomRef);
    }

    // Haploid and fully-called diploid genotypes of only this allele
    if carried == alleles.len() {
        Ok(Zygosity::HomAlt)
    } else {
        Ok(Zygosity::Het)
    }
}

/// Zygosity with respect to any ALT allele
pub fn genotype_to_zygosity(genotype: &str) -> Result<Zygosity, GenotypeParseError> {
    let alleles = allele_indices(genotype)?;
    let called: Vec<u32> = alleles.iter().flatten().copied().collect();

    match called.first() {
        None => Ok(Zygosity::NoCall),
        Some(_) if called.iter().all(|&a| a == 0) => Ok(Zygosity::HomRef),
        Some(&first) if first != 0 && called.len() == alleles.len() && called.iter().all(|&a| a == first) => {
            Ok(Zygosity::HomAlt)
        }
        Some(_) => Ok(Zygosity::Het),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diploid_genotypes() {
        assert_eq!(genotype_to_zygosity("0/0").unwrap(), Zygosity::HomRef);
        assert_eq!(genotype_to_zygosity("0/1").unwrap(), Zygosity::Het);
        assert_eq!(genotype_to_zygosity("1|0").unwrap(), Zygosity::Het);
        assert_eq!(genotype_to_zygosity("1/1").unwrap(), Zygosity::HomAlt);
        assert_eq!(genotype_to_zygosity("1/2").unwrap(), Zygosity::Het);
    }

    #[test]
    fn test_missing_genotypes() {
        assert_eq!(genotype_to_zygosity("./.").unwrap(), Zygosity::NoCall);
        assert_eq!(genotype_to_zygosity(".").unwrap(), Zygosity::NoCall);
        assert_eq!(genotype_to_zygosity("./1").unwrap(), Zygosity::Het);
    }

    #[test]
    fn test_haploid_genotypes() {
        assert_eq!(genotype_to_zygosity("1").unwrap(), Zygosity::HomAlt);
        assert_eq!(genotype_to_zygosity("0").unwrap(), Zygosity::HomRef);
    }

    #[test]
    fn test_multi_allelic_per_allele() {
        assert_eq!(zygosity_for_allele("1/2", 1).unwrap(), Zygosity::Het);
        assert_eq!(zygosity_for_allele("2/2", 2).unwrap(), Zygosity::HomAlt);
        assert_eq!(zygosity_for_allele("2/2", 1).unwrap(), Zygosity::HomRef);
    }

    #[test]
    fn test_invalid_genotypes() {
        assert!(matches!(
            genotype_to_zygosity(""),
            Err(GenotypeParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            genotype_to_zygosity("A/G"),
            Err(GenotypeParseError::InvalidAllele { .. })
        ));
    }
}
