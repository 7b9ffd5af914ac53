use actix_web::error::InternalError;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use std::fmt;
use derive_more::Display;
use serde_json::json;

use crate::model::attendance::MAX_NAME_LEN;
use crate::store::StoreError;

/// Everything a single submission or query can fail with.
///
/// None of these are retried here; the caller decides whether to ask again.
#[derive(Debug, Display, PartialEq, Eq)]
pub enum LedgerError {
    #[display(fmt = "Please enter your name")]
    EmptyName,

    #[display(fmt = "Name is too long, use at most {} characters", MAX_NAME_LEN)]
    NameTooLong,

    #[display(fmt = "Device identifier not available yet, reload the page and try again")]
    IdentityUnavailable,

    #[display(fmt = "{}", _0)]
    DuplicateSubmission(&'static str),

    #[display(fmt = "Attendance record not found for today")]
    NotFound,

    #[display(fmt = "Attendance service temporarily unavailable, please try again")]
    StoreUnavailable,

    #[display(fmt = "start date cannot be after end date")]
    InvalidRange,

    #[display(fmt = "No attendance records to export for the selected dates")]
    EmptyReport,
}

impl std::error::Error for LedgerError {}

pub const ALREADY_CHECKED_IN: &str = "This device already registered an entry today";
pub const ALREADY_CHECKED_OUT: &str = "This device already registered an exit today";
pub const RECORD_CLOSED: &str = "Exit already registered for this record";

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::EmptyName | LedgerError::NameTooLong | LedgerError::InvalidRange => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::IdentityUnavailable => StatusCode::PRECONDITION_REQUIRED,
            LedgerError::DuplicateSubmission(_) => StatusCode::CONFLICT,
            LedgerError::NotFound | LedgerError::EmptyReport => StatusCode::NOT_FOUND,
            LedgerError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.to_string()
        }))
    }
}

/// Malformed query strings and bodies get the same `{"message": ...}` shape.
pub fn bad_input<E>(err: E) -> actix_web::Error
where
    E: fmt::Debug + fmt::Display + 'static,
{
    let response = HttpResponse::BadRequest().json(json!({
        "message": err.to_string()
    }));
    InternalError::from_response(err, response).into()
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            // only reachable when the pre-check lost a race against another insert
            StoreError::UniqueViolation => LedgerError::DuplicateSubmission(ALREADY_CHECKED_IN),
            StoreError::Unavailable(_) | StoreError::Malformed(_) => {
                tracing::error!(error = %e, "Record store failure");
                LedgerError::StoreUnavailable
            }
        }
    }
}
