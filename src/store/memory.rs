use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{Mutex, MutexGuard};

use super::{RecordStore, StoreError};
use crate::model::attendance::{AttendanceRecord, ClockTime, NewAttendance};
use crate::model::device::DeviceHint;

/// In-process store with the same constraints as the `asistencia` table.
/// Selected with `DATABASE_URL=memory://`; contents die with the process.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: u64,
    rows: Vec<AttendanceRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, new: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        let mut inner = self.lock()?;

        let taken = inner.rows.iter().any(|r| {
            r.date == new.date && r.check_in_device.as_deref() == Some(new.device_hint.as_str())
        });
        if taken {
            return Err(StoreError::UniqueViolation);
        }

        inner.last_id += 1;
        let record = new.into_record(inner.last_id);
        inner.rows.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.lock()?.rows.iter().find(|r| r.id == id).cloned())
    }

    async fn device_has_entry(&self, date: NaiveDate, device: &DeviceHint) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .rows
            .iter()
            .any(|r| r.date == date && r.device_hint.as_deref() == Some(device.as_str())))
    }

    async fn device_has_exit(&self, date: NaiveDate, device: &DeviceHint) -> Result<bool, StoreError> {
        Ok(self.lock()?.rows.iter().any(|r| {
            r.date == date
                && r.device_hint.as_deref() == Some(device.as_str())
                && r.check_out_time.is_some()
        }))
    }

    async fn list_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut rows: Vec<_> = self
            .lock()?
            .rows
            .iter()
            .filter(|r| start <= r.date && r.date <= end)
            .cloned()
            .collect();

        rows.sort_by_key(|r| (r.date, r.check_in_time, r.id));
        Ok(rows)
    }

    async fn close_record(&self, id: u64, check_out_time: ClockTime, device: &DeviceHint) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;

        match inner
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.check_out_time.is_none())
        {
            Some(record) => {
                record.close(check_out_time, device);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
