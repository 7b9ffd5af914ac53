use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::LedgerError;
use crate::ledger::{AttendanceLedger, CheckInRequest, CheckOutRequest};
use crate::model::attendance::AttendanceRecord;
use crate::model::device::DeviceHint;
use crate::report::csv_file_name;

pub const CONFIRMATION_PATH: &str = "/confirmation";

#[derive(Deserialize, ToSchema)]
pub struct CheckInPayload {
    #[schema(example = "Juan Pérez")]
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct SubmissionResponse {
    #[schema(example = "Entry registered for Juan Pérez at 09:00")]
    pub message: String,
    pub record: AttendanceRecord,
    /// Where the form should send the user next
    #[schema(example = "/confirmation")]
    pub next: String,
}

#[derive(Deserialize, IntoParams)]
pub struct DateQuery {
    /// Attendance day, defaults to today
    #[param(example = "2024-01-10", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct RangeQuery {
    #[param(example = "2024-01-01", value_type = String)]
    pub start: NaiveDate,
    #[param(example = "2024-01-31", value_type = String)]
    pub end: NaiveDate,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    #[schema(example = "2024-01-10", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub total: usize,
    pub data: Vec<AttendanceRecord>,
}

/* =========================
Check-in
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(
        content = CheckInPayload,
        description = "Name as typed in the form",
        content_type = "application/json"
    ),
    params(
        ("X-Device-Id" = String, Header, description = "Browser fingerprint")
    ),
    responses(
        (status = 201, description = "Entry registered", body = SubmissionResponse),
        (status = 400, description = "Empty or overlong name", body = Object, example = json!({
            "message": "Please enter your name"
        })),
        (status = 409, description = "Device already checked in today", body = Object, example = json!({
            "message": "This device already registered an entry today"
        })),
        (status = 428, description = "Missing device identifier"),
        (status = 503, description = "Record store unavailable, retry")
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    ledger: web::Data<AttendanceLedger>,
    device: Option<DeviceHint>,
    payload: web::Json<CheckInPayload>,
) -> actix_web::Result<impl Responder> {
    let record = ledger
        .submit_check_in(CheckInRequest {
            name: payload.into_inner().name,
            device_hint: device,
        })
        .await?;

    Ok(HttpResponse::Created().json(SubmissionResponse {
        message: format!(
            "Entry registered for {} at {}",
            record.name, record.check_in_time
        ),
        record,
        next: CONFIRMATION_PATH.to_string(),
    }))
}

/* =========================
Check-out
========================= */
#[utoipa::path(
    put,
    path = "/api/attendance/{record_id}/check-out",
    params(
        ("record_id" = u64, Path, description = "Record picked from today's list"),
        ("X-Device-Id" = String, Header, description = "Browser fingerprint")
    ),
    responses(
        (status = 200, description = "Exit registered", body = SubmissionResponse),
        (status = 404, description = "No such record today", body = Object, example = json!({
            "message": "Attendance record not found for today"
        })),
        (status = 409, description = "Exit already registered", body = Object, example = json!({
            "message": "Exit already registered for this record"
        })),
        (status = 428, description = "Missing device identifier"),
        (status = 503, description = "Record store unavailable, retry")
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    ledger: web::Data<AttendanceLedger>,
    device: Option<DeviceHint>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let record = ledger
        .submit_check_out(CheckOutRequest {
            record_id: path.into_inner(),
            device_hint: device,
        })
        .await?;

    let message = match record.check_out_time {
        Some(t) => format!("Exit registered for {} at {}", record.name, t),
        None => format!("Exit registered for {}", record.name),
    };

    Ok(HttpResponse::Ok().json(SubmissionResponse {
        message,
        record,
        next: CONFIRMATION_PATH.to_string(),
    }))
}

/* =========================
Records of one day
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(DateQuery),
    responses(
        (status = 200, description = "Records ordered by entry time", body = AttendanceListResponse),
        (status = 503, description = "Record store unavailable, retry")
    ),
    tag = "Attendance"
)]
pub async fn list_attendance(
    ledger: web::Data<AttendanceLedger>,
    query: web::Query<DateQuery>,
) -> actix_web::Result<impl Responder> {
    let today = ledger.today();

    let (date, data) = match query.date {
        Some(date) if date != today => (date, ledger.list_for_date(date).await?),
        _ => (today, (*ledger.today_worklist().await?).clone()),
    };

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        date,
        total: data.len(),
        data,
    }))
}

/* =========================
Report
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(RangeQuery),
    responses(
        (status = 200, description = "Roster for the range", body = crate::report::AttendanceReport),
        (status = 400, description = "Malformed dates, or start after end"),
        (status = 503, description = "Record store unavailable, retry")
    ),
    tag = "Report"
)]
pub async fn report(
    ledger: web::Data<AttendanceLedger>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    let report = ledger.report(query.start, query.end).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/attendance/report.csv",
    params(RangeQuery),
    responses(
        (status = 200, description = "CSV roster with a blank signature column", body = String, content_type = "text/csv"),
        (status = 400, description = "Malformed dates, or start after end"),
        (status = 404, description = "Nothing to export"),
        (status = 503, description = "Record store unavailable, retry")
    ),
    tag = "Report"
)]
pub async fn export_report(
    ledger: web::Data<AttendanceLedger>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    let report = ledger.report(query.start, query.end).await?;
    if report.is_empty() {
        return Err(LedgerError::EmptyReport.into());
    }

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(csv_file_name(
                query.start,
                query.end,
            ))],
        })
        .body(report.to_csv()))
}

/* =========================
Confirmation
========================= */
#[utoipa::path(
    get,
    path = "/confirmation",
    responses(
        (status = 200, description = "Shown after a successful submission", body = Object, example = json!({
            "message": "Thank you for your attendance!",
            "detail": "Your registration is complete. You can close this window now."
        }))
    ),
    tag = "Attendance"
)]
pub async fn confirmation() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Thank you for your attendance!",
        "detail": "Your registration is complete. You can close this window now."
    }))
}
