use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;

use crate::model::attendance::{AttendanceRecord, ClockTime, NewAttendance};
use crate::model::device::DeviceHint;

pub mod memory;
pub mod mysql;

pub use memory::MemoryRecordStore;
pub use mysql::MySqlRecordStore;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "record store unavailable: {}", _0)]
    Unavailable(String),

    /// `(fecha, device_id_entrada)` already taken.
    #[display(fmt = "unique constraint violated")]
    UniqueViolation,

    #[display(fmt = "malformed row: {}", _0)]
    Malformed(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation;
            }
        }
        StoreError::Unavailable(e.to_string())
    }
}

/// Persistence for the `asistencia` collection.
///
/// Implementations must enforce one row per `(date, check-in device)` and make
/// `close_record` a conditional write, so that the ledger's pre-checks are not
/// the only thing standing between two racing submissions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert and return the stored row with its generated id.
    async fn insert(&self, new: NewAttendance) -> Result<AttendanceRecord, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Any row on `date` whose current device hint is `device`.
    async fn device_has_entry(&self, date: NaiveDate, device: &DeviceHint) -> Result<bool, StoreError>;

    /// Any row on `date` whose current device hint is `device` and that has an exit time.
    async fn device_has_exit(&self, date: NaiveDate, device: &DeviceHint) -> Result<bool, StoreError>;

    /// Rows with `start <= date <= end`, ordered by date, check-in time, id.
    async fn list_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Set the exit time and re-bind the device hint, only while no exit time is
    /// stored. Returns whether a row changed.
    async fn close_record(&self, id: u64, check_out_time: ClockTime, device: &DeviceHint) -> Result<bool, StoreError>;
}
