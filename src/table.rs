//! Decoding of uploaded CSV tables into [MeasurementRow]s.

use crate::error::EquipStatError;
use crate::models::{CellValue, MeasurementRow};

/// UTF-8 byte order mark written by some spreadsheet exports.
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Parse a CSV table with a header row.
///
/// Every data row becomes a [MeasurementRow] keyed by the header names. Rows may be shorter or
/// longer than the header: missing trailing cells are absent from the row and surplus cells are
/// dropped. Blank lines are skipped.
///
/// # Arguments
///
/// * `data`: Raw bytes of the uploaded file
#[tracing::instrument(level = "DEBUG", skip(data), fields(bytes = data.len()))]
pub fn parse_csv(data: &[u8]) -> Result<Vec<MeasurementRow>, EquipStatError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = MeasurementRow::new();
        for (column, raw) in headers.iter().zip(record.iter()) {
            row.push(column, CellValue::parse(raw));
        }
        rows.push(row);
    }
    tracing::debug!("parsed {} rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;

    #[test]
    fn parse_equipment_table() {
        let data = b"Equipment Name,Type,Flowrate,Pressure,Temperature\n\
                     Pump-1,Pump,120.5,5.2,110\n\
                     Valve-1,Valve,60,4.1,105.5\n";
        let rows = parse_csv(data).unwrap();
        assert_eq!(2, rows.len());
        assert_eq!(
            Some(&CellValue::Text("Pump-1".into())),
            rows[0].get(Field::EquipmentName)
        );
        assert_eq!(Some(120.5), rows[0].get(Field::Flowrate).and_then(CellValue::as_f64));
        assert_eq!(Some(105.5), rows[1].get(Field::Temperature).and_then(CellValue::as_f64));
    }

    #[test]
    fn parse_trims_and_strips_bom() {
        let data = b"\xef\xbb\xbfType , Flowrate\n Pump , 10 \n";
        let rows = parse_csv(data).unwrap();
        assert_eq!(Some(&CellValue::Text("Pump".into())), rows[0].get(Field::Type));
        assert_eq!(
            Some(&CellValue::Number {
                value: 10.0,
                raw: "10".into()
            }),
            rows[0].get(Field::Flowrate)
        );
    }

    #[test]
    fn parse_short_and_empty_cells() {
        let data = b"Type,Flowrate,Pressure\nPump,,3\nValve\n";
        let rows = parse_csv(data).unwrap();
        assert_eq!(2, rows.len());
        assert_eq!(Some(&CellValue::Empty), rows[0].get(Field::Flowrate));
        assert_eq!(None, rows[1].get(Field::Pressure));
        assert_eq!(1, rows[1].len());
    }

    #[test]
    fn parse_header_only() {
        let rows = parse_csv(b"Type,Flowrate\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn parse_empty_file() {
        let rows = parse_csv(b"").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn parse_invalid_utf8() {
        let data = b"Type,Flowrate\n\xff\xfe,1\n";
        assert!(matches!(
            parse_csv(data).unwrap_err(),
            EquipStatError::CsvRead(_)
        ));
    }
}
