use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::error::LedgerError;

/// Header the form sends its browser fingerprint in.
pub const DEVICE_HEADER: &str = "X-Device-Id";

/// Matches the `device_id` column width.
const MAX_HINT_LEN: usize = 255;

/// Client-supplied browser fingerprint.
///
/// Only correlates submissions from the same browser install. Anyone can send
/// any value, so it must never gate access to data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHint(String);

impl DeviceHint {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_HINT_LEN {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromRequest for DeviceHint {
    type Error = LedgerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let hint = req
            .headers()
            .get(DEVICE_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(DeviceHint::parse);

        ready(hint.ok_or(LedgerError::IdentityUnavailable))
    }
}
