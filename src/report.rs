//! Report data projection and rendering.
//!
//! [project] flattens an envelope into the labelled values and tables a report shows.
//! A [ReportRenderer] turns that into a document; [TextReportRenderer] produces plain text.

use crate::error::EquipStatError;
use crate::models::{AggregateEnvelope, Field, FieldStats};

use std::fmt::{Debug, Write};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Everything a report document shows, in display order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportData {
    pub id: u64,
    pub created_at: OffsetDateTime,
    /// (label, value) pairs of the summary section
    pub summary: Vec<(String, String)>,
    /// (type, count) pairs in first-occurrence order
    pub type_distribution: Vec<(String, u64)>,
    /// Column names of the sample table, in first-appearance order
    pub sample_columns: Vec<String>,
    /// One cell per column for each sample row; cells absent from a row are empty
    pub sample_rows: Vec<Vec<String>>,
}

/// Map an envelope to the data a report renderer consumes.
///
/// Values are taken from the envelope as they are; nothing is recomputed.
pub fn project(envelope: &AggregateEnvelope) -> ReportData {
    let summary = &envelope.summary;
    let mut fields = vec![("Total count".to_string(), summary.total_count.to_string())];
    let statistics: [(&str, fn(&FieldStats) -> f64); 3] = [
        ("Avg", |s| s.avg),
        ("Min", |s| s.min),
        ("Max", |s| s.max),
    ];
    for (kind, select) in statistics {
        for field in Field::NUMERIC {
            if let Some(stats) = summary.stats(field) {
                fields.push((format!("{kind} {field}"), format!("{:.2}", select(stats))));
            }
        }
    }

    let type_distribution = summary
        .type_distribution
        .iter()
        .map(|(label, count)| (label.to_string(), *count))
        .collect();

    let mut sample_columns: Vec<String> = Vec::new();
    for row in &summary.sample_rows {
        for column in row.keys() {
            if !sample_columns.iter().any(|c| c == column) {
                sample_columns.push(column.to_string());
            }
        }
    }
    let sample_rows = summary
        .sample_rows
        .iter()
        .map(|row| {
            sample_columns
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    ReportData {
        id: envelope.id,
        created_at: envelope.created_at,
        summary: fields,
        type_distribution,
        sample_columns,
        sample_rows,
    }
}

/// Renders [ReportData] into a downloadable document.
pub trait ReportRenderer: Debug + Send + Sync {
    /// Media type of rendered documents.
    fn content_type(&self) -> mime::Mime;

    /// File extension of rendered documents, without the dot.
    fn extension(&self) -> &'static str;

    /// Render a report document.
    fn render(&self, data: &ReportData) -> Result<Vec<u8>, EquipStatError>;

    /// Name under which the report for dataset `id` is downloaded.
    fn file_name(&self, id: u64) -> String {
        format!("dataset_{}_report.{}", id, self.extension())
    }
}

/// Plain text report renderer.
#[derive(Debug, Default)]
pub struct TextReportRenderer;

impl TextReportRenderer {
    fn write(data: &ReportData, out: &mut String) -> Result<(), EquipStatError> {
        let created_at = data
            .created_at
            .format(&Rfc3339)
            .map_err(|err| EquipStatError::Render(err.into()))?;
        let result = (|| -> std::fmt::Result {
            writeln!(out, "Dataset Report - ID {}", data.id)?;
            writeln!(out, "Uploaded: {}", created_at)?;
            writeln!(out)?;
            writeln!(out, "Summary")?;
            for (label, value) in &data.summary {
                writeln!(out, "  {}: {}", label, value)?;
            }
            writeln!(out)?;
            writeln!(out, "Type Distribution")?;
            let width = data
                .type_distribution
                .iter()
                .map(|(label, _)| label.len())
                .chain(["Type".len()])
                .max()
                .unwrap_or_default();
            writeln!(out, "  {:width$}  Count", "Type")?;
            for (label, count) in &data.type_distribution {
                writeln!(out, "  {:width$}  {}", label, count)?;
            }
            if !data.sample_rows.is_empty() {
                writeln!(out)?;
                writeln!(out, "Sample Rows")?;
                writeln!(out, "  {}", data.sample_columns.join(" | "))?;
                for row in &data.sample_rows {
                    writeln!(out, "  {}", row.join(" | "))?;
                }
            }
            Ok(())
        })();
        result.map_err(|err| EquipStatError::Render(err.into()))
    }
}

impl ReportRenderer for TextReportRenderer {
    fn content_type(&self) -> mime::Mime {
        mime::TEXT_PLAIN_UTF_8
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    #[tracing::instrument(level = "DEBUG", skip(self, data), fields(id = data.id))]
    fn render(&self, data: &ReportData) -> Result<Vec<u8>, EquipStatError> {
        let mut out = String::new();
        Self::write(data, &mut out)?;
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleRow;
    use crate::test_utils;

    #[test]
    fn project_summary_fields() {
        let data = project(&test_utils::get_test_envelope(3));
        assert_eq!(3, data.id);
        let labels: Vec<&str> = data.summary.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            vec![
                "Total count",
                "Avg Flowrate",
                "Avg Pressure",
                "Avg Temperature",
                "Min Flowrate",
                "Min Pressure",
                "Min Temperature",
                "Max Flowrate",
                "Max Pressure",
                "Max Temperature",
            ],
            labels
        );
        assert_eq!(("Total count".to_string(), "7".to_string()), data.summary[0]);
        assert_eq!(("Avg Flowrate".to_string(), "40.00".to_string()), data.summary[1]);
        assert_eq!(("Max Temperature".to_string(), "106.00".to_string()), data.summary[9]);
    }

    #[test]
    fn project_type_distribution_in_order() {
        let data = project(&test_utils::get_test_envelope(3));
        assert_eq!(
            vec![("Pump".to_string(), 4), ("Valve".to_string(), 3)],
            data.type_distribution
        );
    }

    #[test]
    fn project_sample_rows() {
        let data = project(&test_utils::get_test_envelope(3));
        assert_eq!(
            vec!["Equipment Name", "Type", "Flowrate", "Pressure", "Temperature"],
            data.sample_columns
        );
        assert_eq!(5, data.sample_rows.len());
        assert_eq!(vec!["Pump-1", "Pump", "10", "4", "100"], data.sample_rows[0]);
        assert_eq!(vec!["Valve-1", "Valve", "50", "6", "104"], data.sample_rows[4]);
    }

    #[test]
    fn project_ragged_sample_rows() {
        let mut envelope = test_utils::get_test_envelope(1);
        let mut first = SampleRow::new();
        first.insert("Type".to_string(), "Pump".to_string());
        let mut second = SampleRow::new();
        second.insert("Note".to_string(), "spare".to_string());
        second.insert("Type".to_string(), "Valve".to_string());
        envelope.summary.sample_rows = vec![first, second];
        let data = project(&envelope);
        assert_eq!(vec!["Type", "Note"], data.sample_columns);
        assert_eq!(
            vec![vec!["Pump", ""], vec!["Valve", "spare"]],
            data.sample_rows
        );
    }

    #[test]
    fn render_text_report() {
        let renderer = TextReportRenderer;
        let data = project(&test_utils::get_test_envelope(3));
        let text = String::from_utf8(renderer.render(&data).unwrap()).unwrap();
        assert!(text.starts_with("Dataset Report - ID 3\nUploaded: 2024-01-02T03:04:05Z\n"));
        assert!(text.contains("  Avg Pressure: 5.50\n"), "{text}");
        assert!(text.contains("  Type   Count\n  Pump   4\n  Valve  3\n"), "{text}");
        assert!(text.contains("  Pump-1 | Pump | 10 | 4 | 100\n"), "{text}");
        assert_eq!("dataset_3_report.txt", renderer.file_name(3));
        assert_eq!(mime::TEXT_PLAIN_UTF_8, renderer.content_type());
    }
}
