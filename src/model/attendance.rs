use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display};
use utoipa::ToSchema;

use crate::error::{ALREADY_CHECKED_IN, LedgerError, RECORD_CLOSED};
use crate::model::device::DeviceHint;

/// Wall-clock time at minute resolution, stored and shown as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }
}

impl From<NaiveTime> for ClockTime {
    fn from(t: NaiveTime) -> Self {
        // seconds are dropped, not rounded
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M").map(ClockTime::from)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceState {
    NoEntry,
    CheckedIn,
    CheckedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceEvent {
    CheckIn,
    CheckOut,
}

impl AttendanceState {
    /// Next state for `event`, or the error an illegal transition reports.
    pub fn apply(self, event: AttendanceEvent) -> Result<Self, LedgerError> {
        use AttendanceEvent::*;
        use AttendanceState::*;

        match (self, event) {
            (NoEntry, CheckIn) => Ok(CheckedIn),
            (CheckedIn, CheckOut) => Ok(CheckedOut),
            (CheckedIn | CheckedOut, CheckIn) => {
                Err(LedgerError::DuplicateSubmission(ALREADY_CHECKED_IN))
            }
            (CheckedOut, CheckOut) => Err(LedgerError::DuplicateSubmission(RECORD_CLOSED)),
            (NoEntry, CheckOut) => Err(LedgerError::NotFound),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Juan Pérez",
    "date": "2024-01-10",
    "check_in_time": "09:00",
    "check_out_time": null,
    "state": "checked_in"
}))]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "Juan Pérez")]
    pub name: String,

    #[schema(example = "2024-01-10", format = "date", value_type = String)]
    pub date: NaiveDate,

    #[schema(example = "09:00", value_type = String)]
    pub check_in_time: ClockTime,

    #[schema(example = "17:30", value_type = Option<String>, nullable = true)]
    pub check_out_time: Option<ClockTime>,

    /// Last device that touched the record; rewritten at check-out.
    #[serde(skip)]
    pub device_hint: Option<String>,

    /// Device that checked in; never rewritten.
    #[serde(skip)]
    pub check_in_device: Option<String>,

    pub state: AttendanceState,
}

impl AttendanceRecord {
    pub fn derived_state(&self) -> AttendanceState {
        if self.check_out_time.is_some() {
            AttendanceState::CheckedOut
        } else {
            AttendanceState::CheckedIn
        }
    }

    /// Records the exit. The hint is re-bound to the checking-out device.
    pub fn close(&mut self, check_out_time: ClockTime, device: &DeviceHint) {
        self.check_out_time = Some(check_out_time);
        self.device_hint = Some(device.as_str().to_string());
        self.state = AttendanceState::CheckedOut;
    }
}

/// Longest name the `nombre` column holds, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Values for a fresh check-in; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub name: String,
    pub date: NaiveDate,
    pub check_in_time: ClockTime,
    pub device_hint: DeviceHint,
}

impl NewAttendance {
    pub fn into_record(self, id: u64) -> AttendanceRecord {
        let device = self.device_hint.into_inner();
        AttendanceRecord {
            id,
            name: self.name,
            date: self.date,
            check_in_time: self.check_in_time,
            check_out_time: None,
            device_hint: Some(device.clone()),
            check_in_device: Some(device),
            state: AttendanceState::CheckedIn,
        }
    }
}

/// Row shape of the `asistencia` table.
#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub nombre: String,
    pub fecha: NaiveDate,
    pub hora_entrada: String,
    pub hora_salida: Option<String>,
    pub device_id: Option<String>,
    pub device_id_entrada: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = String;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let check_in_time = row
            .hora_entrada
            .parse::<ClockTime>()
            .map_err(|e| format!("row {}: bad hora_entrada {:?}: {}", row.id, row.hora_entrada, e))?;

        let check_out_time = match row.hora_salida.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<ClockTime>()
                    .map_err(|e| format!("row {}: bad hora_salida {:?}: {}", row.id, raw, e))?,
            ),
        };

        let mut record = AttendanceRecord {
            id: row.id,
            name: row.nombre,
            date: row.fecha,
            check_in_time,
            check_out_time,
            device_hint: row.device_id,
            check_in_device: row.device_id_entrada,
            state: AttendanceState::CheckedIn,
        };
        record.state = record.derived_state();
        Ok(record)
    }
}
