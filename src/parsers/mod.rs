// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for joint-caller output and bookmark files
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod bookmarks;
pub mod vcf;

pub use bookmarks::{parse_bookmarks, BookmarkFormat, BookmarkParseError, BookmarkRecord, DelimitedExporter};
pub use vcf::{CalledVcfParseError, CalledVcfParser, GenotypeColumn};
