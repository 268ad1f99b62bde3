//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `resonance indices` | `render_indices_table()` |
//! | `resonance similar` | `render_neighbours_table()` |
//! | `resonance similar-many` | `render_neighbours_table()` (one per recording) |

use chrono::{DateTime, Utc};
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use super::format::{format_bytes, format_relative_time, format_thousands};

/// One persisted index, flattened for display.
#[derive(Debug, Clone)]
pub struct IndexRow {
    /// Index name (`<metric>_<distance>_<forest>`)
    pub name: String,
    /// Vector dimension, when the sidecar is readable
    pub dimension: Option<usize>,
    /// Total items, placeholders included
    pub items: Option<u64>,
    /// Placeholder items
    pub placeholders: Option<u64>,
    /// Index file size
    pub size_bytes: u64,
    /// Build time
    pub built_at: Option<DateTime<Utc>>,
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Render the persisted-index table for `resonance indices`.
///
/// # Example Output
///
/// ```text
/// INDEX                  DIM    ITEMS   PLACEHOLDERS   SIZE       BUILT
/// mfccs_angular_10        13   12,000             42   1.2 MB     2h ago
/// bpm_manhattan_10         1   12,000              0   96.1 KB    2h ago
/// ```
pub fn render_indices_table(indices: &[IndexRow]) -> String {
    if indices.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("INDEX"),
        Cell::new("DIM").set_alignment(CellAlignment::Right),
        Cell::new("ITEMS").set_alignment(CellAlignment::Right),
        Cell::new("PLACEHOLDERS").set_alignment(CellAlignment::Right),
        Cell::new("SIZE").set_alignment(CellAlignment::Right),
        Cell::new("BUILT"),
    ]);

    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(22)), // INDEX
        ColumnConstraint::LowerBoundary(Width::Fixed(5)),  // DIM
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // ITEMS
        ColumnConstraint::LowerBoundary(Width::Fixed(12)), // PLACEHOLDERS
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // SIZE
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // BUILT
    ]);

    for index in indices {
        table.add_row(vec![
            Cell::new(&index.name),
            Cell::new(optional(index.dimension)).set_alignment(CellAlignment::Right),
            Cell::new(optional(index.items.map(format_thousands)))
                .set_alignment(CellAlignment::Right),
            Cell::new(optional(index.placeholders.map(format_thousands)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(index.size_bytes)).set_alignment(CellAlignment::Right),
            Cell::new(optional(index.built_at.map(format_relative_time))),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render a ranked neighbour list.
///
/// # Example Output
///
/// ```text
/// RANK   RECORDING
///    1   7f27d7a9-27f0-4663-9d20-2c9c40200e6d:0
///    2   0dad432b-16cc-4bf0-8961-fd31d124b01b:1
/// ```
pub fn render_neighbours_table(neighbours: &[String]) -> String {
    if neighbours.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);

    table.set_header(vec![
        Cell::new("RANK").set_alignment(CellAlignment::Right),
        Cell::new("RECORDING"),
    ]);

    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(4)),  // RANK
        ColumnConstraint::LowerBoundary(Width::Fixed(38)), // RECORDING
    ]);

    for (rank, recording) in neighbours.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(recording),
        ]);
    }

    table.trim_fmt().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_table() {
        let rows = vec![
            IndexRow {
                name: "mfccs_angular_10".to_string(),
                dimension: Some(13),
                items: Some(12_000),
                placeholders: Some(42),
                size_bytes: 1_258_291,
                built_at: Some(Utc::now()),
            },
            IndexRow {
                name: "bpm_manhattan_10".to_string(),
                dimension: None,
                items: None,
                placeholders: None,
                size_bytes: 512,
                built_at: None,
            },
        ];

        let output = render_indices_table(&rows);
        assert!(output.contains("INDEX"));
        assert!(output.contains("PLACEHOLDERS"));
        assert!(output.contains("mfccs_angular_10"));
        assert!(output.contains("12,000"));
        assert!(output.contains("1.2 MB"));
        assert!(output.contains("just now"));
        assert!(output.contains("512 B"));
    }

    #[test]
    fn test_neighbours_table() {
        let output = render_neighbours_table(&[
            "7f27d7a9-27f0-4663-9d20-2c9c40200e6d:0".to_string(),
            "0dad432b-16cc-4bf0-8961-fd31d124b01b:1".to_string(),
        ]);
        assert!(output.contains("RANK"));
        assert!(output.contains("7f27d7a9-27f0-4663-9d20-2c9c40200e6d:0"));
        assert!(output.lines().count() >= 3);
    }

    #[test]
    fn test_empty_tables() {
        assert!(render_indices_table(&[]).is_empty());
        assert!(render_neighbours_table(&[]).is_empty());
    }
}
