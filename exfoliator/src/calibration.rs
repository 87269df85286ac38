//! Static target-to-coordinate lookup.
//!
//! A target is a row label followed by a column index (`"A1"`, `"C12"`). Its
//! stage coordinates are `origin + rows[row] + columns[column]`. Both axes of
//! each offset are configurable, so a row can move the stage along X, Y or
//! both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CalibrationError;

/// Spacing between neighbouring chip wells, in millimetres.
pub const DEFAULT_PITCH: f64 = 12.5;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    /// Coordinates of the first well (row offset and column offset both zero).
    pub origin: Point,
    /// X position of the vacuum chuck, passed to programs as `STAGE_X`.
    #[serde(default)]
    pub stage_x: Option<f64>,
    pub rows: BTreeMap<String, Offset>,
    pub columns: BTreeMap<String, Offset>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        let rows = ["A", "B", "C", "D", "E"]
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let offset = Offset {
                    dx: i as f64 * DEFAULT_PITCH,
                    dy: 0.0,
                };
                (label.to_string(), offset)
            })
            .collect();
        let columns = (1..=5)
            .map(|index| {
                let offset = Offset {
                    dx: 0.0,
                    dy: (index - 1) as f64 * DEFAULT_PITCH,
                };
                (index.to_string(), offset)
            })
            .collect();

        Self {
            origin: Point { x: 105.5, y: 4.5 },
            stage_x: Some(8.0),
            rows,
            columns,
        }
    }
}

impl CalibrationTable {
    /// Looks up the stage coordinates for a target such as `"B3"`.
    ///
    /// Row labels are matched case-insensitively; the configured labels are
    /// expected in upper case.
    pub fn resolve(&self, target: &str) -> Result<Point, CalibrationError> {
        let (row, column) = split_target(target)?;
        let row_offset = self
            .rows
            .get(&row)
            .ok_or_else(|| CalibrationError::UnknownRow {
                target: target.to_string(),
                row: row.clone(),
            })?;
        let column_offset =
            self.columns
                .get(column)
                .ok_or_else(|| CalibrationError::UnknownColumn {
                    target: target.to_string(),
                    column: column.to_string(),
                })?;

        Ok(Point {
            x: self.origin.x + row_offset.dx + column_offset.dx,
            y: self.origin.y + row_offset.dy + column_offset.dy,
        })
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.rows.is_empty() {
            return Err(CalibrationError::Empty("rows"));
        }
        if self.columns.is_empty() {
            return Err(CalibrationError::Empty("columns"));
        }
        if !self.origin.x.is_finite() || !self.origin.y.is_finite() {
            return Err(CalibrationError::NonFinite("origin".into()));
        }
        if let Some(stage_x) = self.stage_x {
            if !stage_x.is_finite() {
                return Err(CalibrationError::NonFinite("stage_x".into()));
            }
        }
        let offsets = self
            .rows
            .iter()
            .map(|(label, offset)| (format!("row {}", label), offset))
            .chain(
                self.columns
                    .iter()
                    .map(|(index, offset)| (format!("column {}", index), offset)),
            );
        for (name, offset) in offsets {
            if !offset.dx.is_finite() || !offset.dy.is_finite() {
                return Err(CalibrationError::NonFinite(name));
            }
        }
        Ok(())
    }
}

fn split_target(target: &str) -> Result<(String, &str), CalibrationError> {
    let trimmed = target.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| CalibrationError::MalformedTarget(target.to_string()))?;
    let (row, column) = trimmed.split_at(split);
    if row.is_empty()
        || !row.chars().all(|c| c.is_ascii_alphabetic())
        || !column.chars().all(|c| c.is_ascii_digit())
    {
        return Err(CalibrationError::MalformedTarget(target.to_string()));
    }
    Ok((row.to_ascii_uppercase(), column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_origin() {
        let table = CalibrationTable::default();
        assert_eq!(table.resolve("A1").unwrap(), Point { x: 105.5, y: 4.5 });
    }

    #[test]
    fn test_rows_step_x_and_columns_step_y() {
        let table = CalibrationTable::default();
        assert_eq!(table.resolve("B1").unwrap(), Point { x: 118.0, y: 4.5 });
        assert_eq!(table.resolve("A2").unwrap(), Point { x: 105.5, y: 17.0 });
        assert_eq!(table.resolve("c3").unwrap(), Point { x: 130.5, y: 29.5 });
    }

    #[test]
    fn test_unknown_row_and_column() {
        let table = CalibrationTable::default();
        assert!(matches!(
            table.resolve("Z1"),
            Err(CalibrationError::UnknownRow { .. })
        ));
        assert!(matches!(
            table.resolve("A9"),
            Err(CalibrationError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_malformed_targets() {
        let table = CalibrationTable::default();
        for target in ["", "A", "12", "A1B", "A-1"] {
            assert!(
                matches!(table.resolve(target), Err(CalibrationError::MalformedTarget(_))),
                "{:?} should be malformed",
                target
            );
        }
    }

    #[test]
    fn test_column_major_table() {
        // Rows along Y, columns along X.
        let mut table = CalibrationTable::default();
        for (i, offset) in table.rows.values_mut().enumerate() {
            *offset = Offset { dx: 0.0, dy: i as f64 * 10.0 };
        }
        for (i, offset) in table.columns.values_mut().enumerate() {
            *offset = Offset { dx: i as f64 * 10.0, dy: 0.0 };
        }
        assert_eq!(table.resolve("B2").unwrap(), Point { x: 115.5, y: 14.5 });
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        let mut table = CalibrationTable::default();
        assert!(table.validate().is_ok());

        table.rows.insert("F".into(), Offset { dx: f64::NAN, dy: 0.0 });
        assert_eq!(
            table.validate(),
            Err(CalibrationError::NonFinite("row F".into()))
        );

        table.rows.clear();
        assert_eq!(table.validate(), Err(CalibrationError::Empty("rows")));
    }
}
