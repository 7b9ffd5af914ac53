use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;

use super::{RecordStore, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceRow, ClockTime, NewAttendance};
use crate::model::device::DeviceHint;

const SELECT_COLUMNS: &str = r#"
    SELECT id, nombre, fecha, hora_entrada, hora_salida, device_id, device_id_entrada
    FROM asistencia
"#;

/// `asistencia` table in MySQL. See `schema.sql` for the constraints relied on.
#[derive(Clone)]
pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn to_record(row: AttendanceRow) -> Result<AttendanceRecord, StoreError> {
    AttendanceRecord::try_from(row).map_err(StoreError::Malformed)
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn insert(&self, new: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO asistencia
                (nombre, fecha, hora_entrada, hora_salida, device_id, device_id_entrada)
            VALUES (?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(new.date)
        .bind(new.check_in_time.to_string())
        .bind(new.device_hint.as_str())
        .bind(new.device_hint.as_str())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id();

        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::Unavailable(format!("inserted row {id} not readable")))
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?");

        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(to_record)
            .transpose()
    }

    async fn device_has_entry(&self, date: NaiveDate, device: &DeviceHint) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM asistencia WHERE fecha = ? AND device_id = ?",
        )
        .bind(date)
        .bind(device.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn device_has_exit(&self, date: NaiveDate, device: &DeviceHint) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM asistencia
            WHERE fecha = ?
            AND device_id = ?
            AND hora_salida IS NOT NULL
            "#,
        )
        .bind(date)
        .bind(device.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn list_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE fecha BETWEEN ? AND ? ORDER BY fecha ASC, hora_entrada ASC, id ASC"
        );

        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn close_record(&self, id: u64, check_out_time: ClockTime, device: &DeviceHint) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE asistencia
            SET hora_salida = ?, device_id = ?
            WHERE id = ?
            AND hora_salida IS NULL
            "#,
        )
        .bind(check_out_time.to_string())
        .bind(device.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
