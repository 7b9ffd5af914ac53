use crate::api::attendance::{AttendanceListResponse, CheckInPayload, SubmissionResponse};
use crate::model::attendance::{AttendanceRecord, AttendanceState};
use crate::report::{AttendanceReport, ReportRow};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Asistencia API",
        version = "0.1.0",
        description = r#"
## Attendance check-in / check-out

Backs a small attendance form: people type their name to register an entry,
pick their row from today's list to register an exit, and staff pull a roster
for a date range.

### Rules
- One entry per device per day, whatever name is typed
- One exit per record, and one exit per device per day
- Times are recorded at minute resolution (`HH:MM`) in the service's local time

### Device identifier
Every submission carries the browser fingerprint in the `X-Device-Id` header.
It is only a hint for spotting repeat submissions. It is **not** authentication
and is never returned by the API.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::list_attendance,
        crate::api::attendance::report,
        crate::api::attendance::export_report,
        crate::api::attendance::confirmation
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceState,
            CheckInPayload,
            SubmissionResponse,
            AttendanceListResponse,
            AttendanceReport,
            ReportRow
        )
    ),
    tags(
        (name = "Attendance", description = "Check-in and check-out APIs"),
        (name = "Report", description = "Date range roster and export"),
    )
)]
pub struct ApiDoc;
