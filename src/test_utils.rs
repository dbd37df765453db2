use crate::ingest;
use crate::models::*;

use time::OffsetDateTime;

/// Create a row with the numeric columns set and an optional type.
pub(crate) fn reading(
    kind: Option<&str>,
    flowrate: f64,
    pressure: f64,
    temperature: f64,
) -> MeasurementRow {
    let mut row = MeasurementRow::new();
    if let Some(kind) = kind {
        row.push("Type", kind);
    }
    row.with("Flowrate", flowrate)
        .with("Pressure", pressure)
        .with("Temperature", temperature)
}

/// Create the seven row table of four pumps and three valves with flowrates 10 to 70.
pub(crate) fn get_test_rows() -> Vec<MeasurementRow> {
    let kinds = ["Pump", "Pump", "Pump", "Pump", "Valve", "Valve", "Valve"];
    let mut pumps = 0;
    let mut valves = 0;
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let index = if *kind == "Pump" {
                pumps += 1;
                pumps
            } else {
                valves += 1;
                valves
            };
            let i = i as f64;
            MeasurementRow::new()
                .with("Equipment Name", format!("{}-{}", kind, index).as_str())
                .with("Type", *kind)
                .with("Flowrate", 10.0 * (i + 1.0))
                .with("Pressure", 4.0 + i / 2.0)
                .with("Temperature", 100.0 + i)
        })
        .collect()
}

/// The CSV encoding of [get_test_rows].
pub(crate) const TEST_CSV: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\n\
Pump-1,Pump,10,4,100\n\
Pump-2,Pump,20,4.5,101\n\
Pump-3,Pump,30,5,102\n\
Pump-4,Pump,40,5.5,103\n\
Valve-1,Valve,50,6,104\n\
Valve-2,Valve,60,6.5,105\n\
Valve-3,Valve,70,7,106\n";

/// Create the summary of [get_test_rows].
pub(crate) fn get_test_summary() -> EnvelopeSummary {
    ingest::build(&get_test_rows()).unwrap()
}

/// Create an envelope around [get_test_summary] created at 2024-01-02T03:04:05Z.
pub(crate) fn get_test_envelope(id: u64) -> AggregateEnvelope {
    AggregateEnvelope {
        id,
        created_at: OffsetDateTime::from_unix_timestamp(1_704_164_645).unwrap(),
        summary: get_test_summary(),
    }
}
