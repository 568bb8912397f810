//! Text tables and JSON rendering of records.

use fieldops_interchange::{Record, ResourceKind};
use serde_json::Value;

use crate::OutputFormat;

const MAX_CELL: usize = 40;

pub(crate) fn print_json(value: &Value) {
    let text = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
    println!("{}", text);
}

/// Records as wire JSON (camelCase field names).
pub(crate) fn records_json(records: &[Record]) -> Value {
    Value::Array(records.iter().map(Record::to_wire).collect())
}

fn cell(record: &Record, field: &str) -> String {
    let text = record.display_field(field).unwrap_or_else(|| "-".to_string());
    let text = text.replace(['\n', '\r'], " ");
    if text.chars().count() > MAX_CELL {
        let cut: String = text.chars().take(MAX_CELL - 1).collect();
        format!("{}…", cut)
    } else {
        text
    }
}

/// Render `records` as a table of the resource's list columns.
pub(crate) fn table(kind: ResourceKind, records: &[Record]) -> String {
    let columns = kind.spec().columns;
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| columns.iter().map(|c| cell(r, c)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(columns.iter().map(|c| c.to_ascii_uppercase()).collect());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

pub(crate) fn print_record(record: &Record, output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(&record.to_wire()),
        OutputFormat::Text => {
            let fields = record.fields();
            let width = fields.keys().map(|k| k.len()).max().unwrap_or(0);
            for name in fields.keys() {
                let value = record.display_field(name).unwrap_or_else(|| "-".to_string());
                println!("{:<width$}  {}", name, value, width = width);
            }
        }
    }
}
