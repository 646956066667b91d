//! BOM table serialisation.
//!
//! The table is a plain comma-separated file:
//!
//! ```text
//! "Id","Value","Designator","Quantity","Footprint"
//! 1,"10k","R1,R2",2,"R_0603"
//! ```
//!
//! Integer columns are bare, text columns are always double-quoted. Embedded
//! quotes are not escaped; component values in KiCad netlists do not contain
//! them in practice.

use std::fmt;
use std::io::{self, Write};

use super::Component;

/// Column headings, in output order.
pub const HEADER: [&str; 5] = ["Id", "Value", "Designator", "Quantity", "Footprint"];

/// One cell of a BOM row.
#[derive(Debug, Clone, Copy)]
enum Cell<'a> {
    Int(usize),
    Text(&'a str),
}

impl fmt::Display for Cell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

fn write_row<W: Write>(writer: &mut W, cells: &[Cell<'_>]) -> io::Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",")?;
        }
        write!(writer, "{cell}")?;
    }
    writer.write_all(b"\n")
}

/// Writes the header row followed by one row per component, numbered from 1.
///
/// # Errors
///
/// Returns any I/O error raised by `writer`.
pub fn write_csv<W: Write>(writer: &mut W, components: &[Component]) -> io::Result<()> {
    let header: Vec<Cell<'_>> = HEADER.iter().map(|h| Cell::Text(h)).collect();
    write_row(writer, &header)?;

    for (index, component) in components.iter().enumerate() {
        write_row(
            writer,
            &[
                Cell::Int(index + 1),
                Cell::Text(&component.value),
                Cell::Text(&component.reference),
                Cell::Int(component.quantity),
                Cell::Text(&component.footprint),
            ],
        )?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(components: &[Component]) -> String {
        let mut out = Vec::new();
        write_csv(&mut out, components).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn header_only_for_empty_bom() {
        assert_eq!(
            render(&[]),
            "\"Id\",\"Value\",\"Designator\",\"Quantity\",\"Footprint\"\n"
        );
    }

    #[test]
    fn grouped_row_format() {
        let mut group = Component::new("R1,R2");
        group.value = "10k".to_string();
        group.footprint = "R_0603".to_string();
        group.quantity = 2;

        let text = render(&[group]);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], r#"1,"10k","R1,R2",2,"R_0603""#);
    }

    #[test]
    fn ids_are_sequential() {
        let components = vec![Component::new("C1"), Component::new("C2"), Component::new("C3")];
        let text = render(&components);
        let ids: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|row| row.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert!(text.ends_with('\n'));
    }
}
