use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write;
use utoipa::ToSchema;

use crate::model::attendance::AttendanceRecord;

/// Shown in the exit column while a record is still open.
pub const MISSING_EXIT: &str = "-";

const CSV_HEADER: [&str; 5] = ["Nombre", "Fecha", "Hora Entrada", "Hora Salida", "Firma"];

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReportRow {
    #[schema(example = "Juan Pérez")]
    pub name: String,
    #[schema(example = "10/01/2024")]
    pub date: String,
    #[schema(example = "09:00")]
    pub check_in: String,
    #[schema(example = "17:30")]
    pub check_out: String,
    pub complete: bool,
}

impl From<&AttendanceRecord> for ReportRow {
    fn from(r: &AttendanceRecord) -> Self {
        Self {
            name: r.name.clone(),
            date: format_date(r.date),
            check_in: r.check_in_time.to_string(),
            check_out: r
                .check_out_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| MISSING_EXIT.to_string()),
            complete: r.check_out_time.is_some(),
        }
    }
}

/// Roster for a date range, ready for a document renderer.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "title": "REPORTE DE ASISTENCIAS",
    "subtitle": "Del 10/01/2024 al 10/01/2024",
    "generated_on": "10/01/2024",
    "total": 1,
    "rows": [{
        "name": "Juan Pérez",
        "date": "10/01/2024",
        "check_in": "09:00",
        "check_out": "17:30",
        "complete": true
    }]
}))]
pub struct AttendanceReport {
    pub title: String,
    pub subtitle: String,
    pub generated_on: String,
    pub total: usize,
    pub rows: Vec<ReportRow>,
}

impl AttendanceReport {
    pub fn build(
        start: NaiveDate,
        end: NaiveDate,
        generated_on: NaiveDate,
        records: &[AttendanceRecord],
    ) -> Self {
        let rows: Vec<ReportRow> = records.iter().map(ReportRow::from).collect();

        Self {
            title: "REPORTE DE ASISTENCIAS".to_string(),
            subtitle: format!("Del {} al {}", format_date(start), format_date(end)),
            generated_on: format_date(generated_on),
            total: rows.len(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// CSV with a blank signature column, one line per row.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, &CSV_HEADER);

        for row in &self.rows {
            push_line(
                &mut out,
                &[
                    row.name.as_str(),
                    row.date.as_str(),
                    row.check_in.as_str(),
                    row.check_out.as_str(),
                    "",
                ],
            );
        }
        out
    }
}

pub fn csv_file_name(start: NaiveDate, end: NaiveDate) -> String {
    format!("asistencias_{}_{}.csv", start.format("%Y%m%d"), end.format("%Y%m%d"))
}

fn push_line(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
    } else {
        out.push_str(field);
    }
}
