// ==============================================================================
// pipeline/mod.rs - Per-Gene Analysis Pipelines
// ==============================================================================
// Description: Variant, coverage and joint-calling pipelines plus display views
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod coverage;
pub mod joint_call;
pub mod variants;
pub mod view;

pub use joint_call::JointCallOutcome;
pub use variants::{annotate_with_clinvar, retain_unique_calls, tag_inheritance};
pub use view::{filter_and_pileup, pileup_variants, UniqueVariantMatrix, ViewScope, ViewTarget};
