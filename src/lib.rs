// ==============================================================================
// lib.rs - Cohort Analysis Orchestrator Library
// ==============================================================================
// Description: Library interface for the per-gene cohort analysis orchestrator
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod cache;
pub mod config;
pub mod danger;
pub mod error;
pub mod filters;
pub mod fixtures;
pub mod flagged;
pub mod genotype;
pub mod models;
pub mod orchestrator;
pub mod parsers;
pub mod pipeline;
pub mod reference_tracks;
pub mod sample;
pub mod services;

pub use error::CohortError;
pub use orchestrator::CohortOrchestrator;
