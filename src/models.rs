//! Data types and associated functions and methods

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use time::OffsetDateTime;
use validator::Validate;

/// Columns of an equipment table that the summary depends on.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Field {
    /// Name of the piece of equipment
    #[strum(serialize = "Equipment Name")]
    EquipmentName,
    /// Equipment type label
    Type,
    /// Flow rate reading
    Flowrate,
    /// Pressure reading
    Pressure,
    /// Temperature reading
    Temperature,
}

impl Field {
    /// Fields reduced to avg/min/max.
    pub const NUMERIC: [Field; 3] = [Field::Flowrate, Field::Pressure, Field::Temperature];

    /// Returns whether a table column header names this field.
    ///
    /// Headers are compared case-insensitively with anything other than letters and digits
    /// ignored, so `Flow Rate`, `flow_rate` and `Flowrate` all name [Field::Flowrate].
    pub fn matches(self, column: &str) -> bool {
        let key = match self {
            Field::EquipmentName => "equipmentname",
            Field::Type => "type",
            Field::Flowrate => "flowrate",
            Field::Pressure => "pressure",
            Field::Temperature => "temperature",
        };
        let mut normalised = column
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase());
        key.chars().all(|c| normalised.next() == Some(c)) && normalised.next().is_none()
    }
}

/// A single cell of an uploaded table.
///
/// Every non-empty cell keeps its trimmed source text, so labels such as `01` and `1` stay
/// distinct even though both also read as numbers.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    /// Text that reads as a finite number
    Number { value: f64, raw: String },
    /// Anything that does not read as a finite number
    Text(String),
    /// An empty cell
    Empty,
}

impl CellValue {
    /// Classify a raw cell.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return CellValue::Empty;
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => CellValue::Number {
                value,
                raw: raw.to_string(),
            },
            _ => CellValue::Text(raw.to_string()),
        }
    }

    /// Returns the numeric value of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Returns the source text of the cell, or `None` if it is empty.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Number { raw, .. } => Some(raw),
            CellValue::Text(text) => Some(text),
            CellValue::Empty => None,
        }
    }

    /// Returns the cell as a category label, if it is not empty.
    pub fn as_label(&self) -> Option<&str> {
        self.as_str().filter(|text| !text.trim().is_empty())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or_default())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number {
            value,
            raw: value.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::parse(value)
    }
}

/// One sensor reading: the cells of a table row, in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeasurementRow {
    cells: Vec<(String, CellValue)>,
}

impl MeasurementRow {
    /// Return an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cell and return the row, for building rows inline.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a cell.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.push((column.into(), value.into()));
    }

    /// Returns the first cell whose column names `field`.
    pub fn get(&self, field: Field) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(column, _)| field.matches(column))
            .map(|(_, value)| value)
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Occurrences of each type label, in order of first occurrence.
pub type TypeDistribution = IndexMap<String, u64>;

/// A table row retained for display, every value rendered as a string.
pub type SampleRow = IndexMap<String, String>;

/// Average, minimum and maximum of one numeric field, each rounded to two decimal places.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct FieldStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// The statistical summary of one uploaded table.
///
/// This is an [AggregateEnvelope] before the retention store has assigned its identity.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    /// Number of rows reduced
    pub total_count: u64,
    pub flowrate: FieldStats,
    pub pressure: FieldStats,
    pub temperature: FieldStats,
    /// Occurrences of each equipment type
    pub type_distribution: TypeDistribution,
    /// Up to five leading rows of the table
    pub sample_rows: Vec<SampleRow>,
}

impl EnvelopeSummary {
    /// Returns the statistics for a numeric field, or `None` for a non-numeric field.
    pub fn stats(&self, field: Field) -> Option<&FieldStats> {
        match field {
            Field::Flowrate => Some(&self.flowrate),
            Field::Pressure => Some(&self.pressure),
            Field::Temperature => Some(&self.temperature),
            Field::EquipmentName | Field::Type => None,
        }
    }
}

/// The unit persisted and served: a summary plus its identity in the retention window.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEnvelope {
    /// Strictly increasing id assigned by the retention store
    pub id: u64,
    /// Creation time
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub summary: EnvelopeSummary,
}

/// Login request data
#[derive(Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

/// Token refresh request data
#[derive(Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh must not be empty"))]
    pub refresh: String,
}

/// Access and refresh tokens as exchanged on the wire.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Query parameters for the upload history
#[derive(Debug, Default, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct HistoryQuery {
    /// Maximum number of envelopes to return
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};

    #[test]
    fn field_matches_header_variants() {
        assert!(Field::Flowrate.matches("Flowrate"));
        assert!(Field::Flowrate.matches("Flow Rate"));
        assert!(Field::Flowrate.matches("flow_rate"));
        assert!(Field::EquipmentName.matches("Equipment Name"));
        assert!(Field::Type.matches(" TYPE "));
        assert!(!Field::Type.matches("Types"));
        assert!(!Field::Pressure.matches("Press"));
    }

    #[test]
    fn field_display() {
        assert_eq!("Equipment Name", Field::EquipmentName.to_string());
        assert_eq!("Temperature", Field::Temperature.to_string());
    }

    #[test]
    fn cell_value_parse() {
        assert_eq!(
            CellValue::Number {
                value: 12.5,
                raw: "12.5".into()
            },
            CellValue::parse(" 12.5 ")
        );
        assert_eq!(CellValue::Text("Pump".into()), CellValue::parse("Pump"));
        assert_eq!(CellValue::Empty, CellValue::parse("  "));
        // Non-finite numbers are not usable readings.
        assert_eq!(CellValue::Text("NaN".into()), CellValue::parse("NaN"));
        assert_eq!(CellValue::Text("inf".into()), CellValue::parse("inf"));
    }

    #[test]
    fn cell_value_keeps_source_text() {
        for raw in ["01", "1", "1.0", "007", "1e2"] {
            let cell = CellValue::parse(raw);
            assert!(cell.as_f64().is_some(), "{raw}");
            assert_eq!(Some(raw), cell.as_label());
            assert_eq!(raw, cell.to_string());
        }
        assert_eq!(Some(100.0), CellValue::parse("1e2").as_f64());
    }

    #[test]
    fn cell_value_label() {
        assert_eq!(Some("Pump"), CellValue::parse("Pump").as_label());
        assert_eq!(Some("3"), CellValue::parse("3").as_label());
        assert_eq!(None, CellValue::Empty.as_label());
        assert_eq!("", CellValue::Empty.to_string());
    }

    #[test]
    fn measurement_row_lookup() {
        let row = MeasurementRow::new()
            .with("Equipment Name", "Pump-1")
            .with("Flow Rate", 10.0);
        assert_eq!(Some(10.0), row.get(Field::Flowrate).and_then(CellValue::as_f64));
        assert_eq!(None, row.get(Field::Pressure));
        assert_eq!(2, row.len());
    }

    #[test]
    fn type_distribution_json_keeps_insertion_order() {
        let mut map = TypeDistribution::new();
        for label in ["Valve", "Pump", "Valve"] {
            *map.entry(label.to_string()).or_insert(0) += 1;
        }
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(r#"{"Valve":2,"Pump":1}"#, json);
        let decoded: TypeDistribution = serde_json::from_str(r#"{"Zeta":1,"Alpha":2}"#).unwrap();
        assert_eq!(vec!["Zeta", "Alpha"], decoded.keys().collect::<Vec<_>>());
    }

    #[test]
    fn envelope_json_shape() {
        let envelope = test_utils::get_test_envelope(7);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(7, value["id"]);
        assert_eq!("2024-01-02T03:04:05Z", value["createdAt"]);
        assert_eq!(7, value["totalCount"]);
        assert_eq!(40.0, value["flowrate"]["avg"]);
        assert_eq!(4, value["typeDistribution"]["Pump"]);
        assert_eq!("Pump-1", value["sampleRows"][0]["Equipment Name"]);
        let decoded: AggregateEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(envelope, decoded);
        // Map equality ignores order, so check the column order explicitly.
        assert_eq!(
            vec!["Equipment Name", "Type", "Flowrate", "Pressure", "Temperature"],
            decoded.summary.sample_rows[0].keys().collect::<Vec<_>>()
        );
        assert_eq!(
            vec!["Pump", "Valve"],
            decoded.summary.type_distribution.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_login_request() {
        let request = LoginRequest {
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        assert_de_tokens(
            &request,
            &[
                Token::Struct {
                    name: "LoginRequest",
                    len: 2,
                },
                Token::Str("username"),
                Token::Str("admin"),
                Token::Str("password"),
                Token::Str("secret"),
                Token::StructEnd,
            ],
        );
        request.validate().unwrap()
    }

    #[test]
    fn test_missing_password() {
        assert_de_tokens_error::<LoginRequest>(
            &[
                Token::Struct {
                    name: "LoginRequest",
                    len: 1,
                },
                Token::Str("username"),
                Token::Str("admin"),
                Token::StructEnd,
            ],
            "missing field `password`",
        )
    }

    #[test]
    #[should_panic(expected = "username must not be empty")]
    fn test_empty_username() {
        let request = LoginRequest {
            username: "".to_string(),
            password: "secret".to_string(),
        };
        request.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "refresh must not be empty")]
    fn test_empty_refresh() {
        let request = RefreshRequest {
            refresh: "".to_string(),
        };
        request.validate().unwrap()
    }

    #[test]
    fn test_history_query_default() {
        HistoryQuery::default().validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "limit must be between 1 and 100")]
    fn test_history_query_limit_zero() {
        let query = HistoryQuery { limit: Some(0) };
        query.validate().unwrap()
    }
}
