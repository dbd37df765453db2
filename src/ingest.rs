//! Reduction of a table of readings into a fixed-shape [EnvelopeSummary].
//!
//! The reduction is a single pass over the rows. Each numeric field keeps a compensated running
//! sum together with its minimum and maximum, and type labels are counted in order of first
//! occurrence. The result depends only on the multiset of rows, except for the sample rows and
//! the key order of the type distribution, which follow row order.
//!
//! Rounding is to two decimal places: `x` becomes `(x * 100).round_ties_even() / 100`. The
//! product `x * 100` is itself rounded to the nearest `f64` before the tie check, so a value
//! whose scaled form lands exactly on a half rounds to the even neighbour even when the stored
//! `x` lies slightly off the tie. `0.125` rounds to `0.12` and `0.375` to `0.38`; `2.675`
//! (stored just below) scales to exactly `267.5` and rounds to `2.68`, while `1.005` scales to
//! `100.49999999999999` and rounds to `1.0`.

use crate::error::EquipStatError;
use crate::models::{EnvelopeSummary, Field, FieldStats, MeasurementRow, SampleRow, TypeDistribution};

/// Number of leading rows retained for display.
pub const SAMPLE_ROWS: usize = 5;

/// Round to two decimal places, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Running statistics for one numeric field.
#[derive(Debug, Default)]
struct Accumulator {
    /// Whether any row had the column at all
    present: bool,
    count: u64,
    sum: f64,
    /// Neumaier compensation term for `sum`
    compensation: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn observe(&mut self, row: &MeasurementRow, field: Field) {
        let Some(cell) = row.get(field) else {
            return;
        };
        self.present = true;
        let Some(value) = cell.as_f64() else {
            return;
        };
        let total = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
    }

    fn finish(self, field: Field) -> Result<FieldStats, EquipStatError> {
        if !self.present {
            return Err(EquipStatError::Schema {
                field,
                reason: "column is missing",
            });
        }
        if self.count == 0 {
            return Err(EquipStatError::Schema {
                field,
                reason: "no row has a numeric value",
            });
        }
        // Clamp so that rounding error in the mean can never place it outside [min, max].
        let avg = ((self.sum + self.compensation) / self.count as f64).clamp(self.min, self.max);
        Ok(FieldStats {
            avg: round2(avg),
            min: round2(self.min),
            max: round2(self.max),
        })
    }
}

/// Render a row for display.
fn sample_row(row: &MeasurementRow) -> SampleRow {
    row.cells()
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .collect()
}

/// Reduce a sequence of rows to an [EnvelopeSummary].
///
/// Rows whose numeric cells are missing or not numbers are left out of that field's statistics
/// but still counted in `total_count`, and in the type distribution when they carry a type.
///
/// # Errors
///
/// * [EquipStatError::EmptyInput] if `rows` is empty.
/// * [EquipStatError::Schema] if the type or a numeric column is absent from every row, or no row
///   holds a usable value for it.
#[tracing::instrument(level = "DEBUG", skip(rows), fields(rows = rows.len()))]
pub fn build(rows: &[MeasurementRow]) -> Result<EnvelopeSummary, EquipStatError> {
    if rows.is_empty() {
        return Err(EquipStatError::EmptyInput);
    }

    let mut flowrate = Accumulator::default();
    let mut pressure = Accumulator::default();
    let mut temperature = Accumulator::default();
    let mut type_present = false;
    let mut type_distribution = TypeDistribution::new();
    let mut sample_rows = Vec::with_capacity(SAMPLE_ROWS.min(rows.len()));

    for row in rows {
        flowrate.observe(row, Field::Flowrate);
        pressure.observe(row, Field::Pressure);
        temperature.observe(row, Field::Temperature);
        if let Some(cell) = row.get(Field::Type) {
            type_present = true;
            if let Some(label) = cell.as_label() {
                match type_distribution.get_mut(label) {
                    Some(count) => *count += 1,
                    None => {
                        type_distribution.insert(label.to_string(), 1);
                    }
                }
            }
        }
        if sample_rows.len() < SAMPLE_ROWS {
            sample_rows.push(sample_row(row));
        }
    }

    if !type_present {
        return Err(EquipStatError::Schema {
            field: Field::Type,
            reason: "column is missing",
        });
    }
    if type_distribution.is_empty() {
        return Err(EquipStatError::Schema {
            field: Field::Type,
            reason: "no row has a type label",
        });
    }

    Ok(EnvelopeSummary {
        total_count: u64::try_from(rows.len())?,
        flowrate: flowrate.finish(Field::Flowrate)?,
        pressure: pressure.finish(Field::Pressure)?,
        temperature: temperature.finish(Field::Temperature)?,
        type_distribution,
        sample_rows,
    })
}
