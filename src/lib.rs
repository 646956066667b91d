//! kicad-outputs: manufacturing and assembly output generator for KiCad projects
//!
//! This library drives `kicad-cli` to produce the release package for a
//! board and implements the steps KiCad does not cover itself.
//!
//! # Architecture
//!
//! Exports that KiCad can already produce are delegated to it. This crate
//! handles the rest:
//!
//! - **BOM**: Parse the python-bom XML export, group fitted parts by
//!   footprint and value, write the assembly table
//! - **Renders**: Crop board renders to their opaque pixels and assemble
//!   turntable frames into a looping GIF
//! - **Packaging**: Merge PDFs through an installed backend and bundle the
//!   deliverables into a `.zip` or `.tar.gz` archive
//!
//! # Modules
//!
//! - [`bom`] - BOM extraction, grouping and CSV output
//! - [`bundle`] - Release archives
//! - [`compositor`] - Bounding-box cropping and GIF assembly
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Configuration and output-run error types
//! - [`kicad`] - `kicad-cli` and interactive BOM invocations
//! - [`outputs`] - Full output run for a board
//! - [`pdfmerge`] - PDF merge backend selection

pub mod bom;
pub mod bundle;
pub mod compositor;
pub mod config;
pub mod error;
pub mod kicad;
pub mod outputs;
pub mod pdfmerge;
