//! Bill of materials extraction from KiCad netlist exports.
//!
//! `kicad-cli sch export python-bom` writes an XML netlist listing every
//! placed component. This module turns that into the assembly BOM:
//!
//! 1. [`load_components`] parses the export into [`Component`] records
//! 2. [`select_fitted`] keeps fitted parts (or, inverted, the DNP parts)
//! 3. [`group_components`] merges parts with identical footprint and value
//! 4. [`sort_components`] orders groups by designator
//! 5. [`writer::write_csv`] serialises the table
//!
//! [`create_bom`] runs steps 2-5; [`get_dnf_list`] returns the not-fitted
//! designators used as exclusion lists by other deliverables.

pub mod error;
pub mod reader;
pub mod writer;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use atomicwrites::{AtomicFile, OverwriteBehavior};
use indexmap::IndexMap;

pub use error::{BomError, BomResult};
pub use reader::{parse_components, strip_library_prefix, Field, NetlistParser, ParseState};
pub use writer::write_csv;

/// A placed component, or a group of identical components after grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Designator (e.g. "R1"). For a group, the comma-joined designators.
    pub reference: String,

    /// Value (e.g. "10k", "LED").
    pub value: String,

    /// Footprint name, without its library prefix.
    pub footprint: String,

    /// Number of physical parts this record stands for.
    pub quantity: usize,

    /// False when the component carries a `dnp` property.
    pub fitted: bool,
}

impl Component {
    /// Creates a fitted component with quantity 1 and empty value/footprint.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            value: String::new(),
            footprint: String::new(),
            quantity: 1,
            fitted: true,
        }
    }
}

/// Reads and parses a netlist export from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, is not well-formed XML, or
/// lacks a required attribute.
pub fn load_components(path: impl AsRef<Path>) -> BomResult<Vec<Component>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| BomError::file_read(path, e))?;
    let components = parse_components(BufReader::new(file))?;
    tracing::info!(
        path = %path.display(),
        count = components.len(),
        "Loaded netlist components"
    );
    Ok(components)
}

/// Merges components that share the same `(footprint, value)` pair.
///
/// Groups appear in the order their key is first seen. Designators inside a
/// group keep their input order.
#[must_use]
pub fn group_components(components: &[Component]) -> Vec<Component> {
    let mut groups: IndexMap<(&str, &str), (Vec<&str>, usize, bool)> = IndexMap::new();

    for component in components {
        let entry = groups
            .entry((component.footprint.as_str(), component.value.as_str()))
            .or_insert_with(|| (Vec::new(), 0, true));
        entry.0.push(&component.reference);
        entry.1 += component.quantity;
        entry.2 &= component.fitted;
    }

    groups
        .into_iter()
        .map(|((footprint, value), (references, quantity, fitted))| Component {
            reference: references.join(","),
            value: value.to_string(),
            footprint: footprint.to_string(),
            quantity,
            fitted,
        })
        .collect()
}

/// Returns the components whose fitted flag equals `fitted`, in input order.
#[must_use]
pub fn select_fitted(components: &[Component], fitted: bool) -> Vec<Component> {
    components
        .iter()
        .filter(|c| c.fitted == fitted)
        .cloned()
        .collect()
}

/// Stable sort by designator, plain lexicographic ("R10" before "R2").
pub fn sort_components(components: &mut [Component]) {
    components.sort_by(|a, b| a.reference.cmp(&b.reference));
}

/// Builds the grouped assembly table from fitted components.
#[must_use]
pub fn build_bom(components: &[Component]) -> Vec<Component> {
    let fitted = select_fitted(components, true);
    let mut groups = group_components(&fitted);
    sort_components(&mut groups);
    groups
}

/// Writes the assembly BOM for `components` to `output_csv`.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// failure never leaves a partial table behind.
///
/// # Errors
///
/// Returns [`BomError::FileWrite`] if the table cannot be written.
pub fn create_bom(components: &[Component], output_csv: impl AsRef<Path>) -> BomResult<()> {
    let output_csv = output_csv.as_ref();
    let groups = build_bom(components);

    AtomicFile::new(output_csv, OverwriteBehavior::AllowOverwrite)
        .write(|file| write_csv(file, &groups))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => {
                BomError::file_write(output_csv, e)
            }
        })?;

    tracing::info!(
        path = %output_csv.display(),
        lines = groups.len(),
        "Wrote BOM"
    );
    Ok(())
}

/// Designators of not-fitted components, in parse order.
#[must_use]
pub fn get_dnf_list(components: &[Component]) -> Vec<String> {
    select_fitted(components, false)
        .into_iter()
        .map(|c| c.reference)
        .collect()
}
