//! Headerless numeric CSV parsing for the feature and label tables.
//!
//! Supported format:
//! - UTF-8, comma-separated, no header row
//! - Double-quoted fields with embedded commas are handled correctly
//! - Blank lines are skipped; cells are trimmed before parsing
//!
//! Row numbers in errors are 1-based and count data rows only.

use std::path::Path;
use std::str::FromStr;

use crate::error::DataFormatError;

/// Parses every cell of every row as `T`, requiring a rectangular table.
pub fn parse_table<T: FromStr>(text: &str, path: &Path) -> Result<Vec<Vec<T>>, DataFormatError> {
    let mut rows: Vec<Vec<T>> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let row_num = rows.len() + 1;
        let cells = parse_csv_row(line);
        if let Some(first) = rows.first() {
            if cells.len() != first.len() {
                return Err(DataFormatError::RaggedRow {
                    path: path.to_path_buf(),
                    row: row_num,
                    expected: first.len(),
                    found: cells.len(),
                });
            }
        }

        rows.push(parse_cells(&cells, path, row_num)?);
    }

    if rows.is_empty() {
        return Err(DataFormatError::Empty { path: path.to_path_buf() });
    }

    Ok(rows)
}

/// Parses a single CSV row, handling double-quoted fields.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // Escaped quote inside quoted field.
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parses a row of string cells, returning an error with row/column info on failure.
fn parse_cells<T: FromStr>(cells: &[String], path: &Path, row: usize) -> Result<Vec<T>, DataFormatError> {
    cells.iter()
        .enumerate()
        .map(|(col, c)| {
            c.trim().parse::<T>().map_err(|_| DataFormatError::Parse {
                path: path.to_path_buf(),
                row,
                column: col + 1,
                cell: c.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> &'static Path {
        Path::new("table.csv")
    }

    #[test]
    fn parses_rectangular_float_table() {
        let rows: Vec<Vec<f64>> = parse_table("1,2.5,-3\n\n 4e-1 , \"5\",6\n", path()).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.5, -3.0], vec![0.4, 5.0, 6.0]]);
    }

    #[test]
    fn reports_bad_cell_position() {
        let err = parse_table::<f64>("1,2\n3,abc\n", path()).unwrap_err();
        match err {
            DataFormatError::Parse { row, column, cell, .. } => {
                assert_eq!((row, column, cell.as_str()), (2, 2, "abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse_table::<f64>("1,2\n3\n", path()).unwrap_err();
        assert!(matches!(err, DataFormatError::RaggedRow { row: 2, expected: 2, found: 1, .. }));
    }

    #[test]
    fn rejects_empty_table() {
        let err = parse_table::<f64>("\n  \n", path()).unwrap_err();
        assert!(matches!(err, DataFormatError::Empty { .. }));
    }

    #[test]
    fn negative_label_is_a_parse_error() {
        let err = parse_table::<usize>("3\n-1\n", path()).unwrap_err();
        assert!(matches!(err, DataFormatError::Parse { row: 2, .. }));
    }

    #[test]
    fn quoted_field_keeps_embedded_comma() {
        assert_eq!(parse_csv_row("\"a,b\",c"), vec!["a,b".to_string(), "c".to_string()]);
    }
}
