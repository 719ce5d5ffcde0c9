/// Provider timestamp encodings.
///
/// Each upstream speaks its own time dialect:
///
/// - WMIP (Hydstra) sends 14-digit `YYYYMMDDHHmmss` numbers in Queensland
///   local time, which is a fixed UTC+10 with no daylight saving.
/// - BOM (KiWIS) sends RFC 3339 strings with an explicit offset.
/// - Open-Meteo sends `YYYY-MM-DDTHH:MM` local strings and reports the
///   offset separately as `utc_offset_seconds`.
///
/// Offsets are always applied explicitly; host locale never participates.
///
/// `decode` never fails: malformed input falls back to "now" and is logged,
/// and implausible instants (older than 30 days, or more than 60 seconds in
/// the future) are flagged but still returned. Use `parse` where a hard
/// failure is wanted.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Queensland standard time, UTC+10.
pub const AEST_OFFSET_SECONDS: i32 = 10 * 3600;

/// Decoded instants older than this are flagged.
pub const MAX_PLAUSIBLE_AGE_DAYS: i64 = 30;

/// Decoded instants further ahead of "now" than this are flagged.
pub const MAX_FUTURE_SKEW_SECONDS: i64 = 60;

const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEncoding {
    /// `YYYYMMDDHHmmss` in a fixed offset.
    Compact14 { offset_seconds: i32 },
    /// RFC 3339 with its own offset.
    Iso8601,
    /// `YYYY-MM-DDTHH:MM[:SS]` in a fixed offset.
    NaiveIso { offset_seconds: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampAnomaly {
    /// Input could not be decoded; the instant is the fallback "now".
    Malformed(String),
    /// Older than `MAX_PLAUSIBLE_AGE_DAYS`.
    TooOld { age_days: i64 },
    /// More than `MAX_FUTURE_SKEW_SECONDS` ahead of now.
    InFuture { ahead_seconds: i64 },
}

/// Result of a lenient decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub instant: DateTime<Utc>,
    pub anomaly: Option<TimestampAnomaly>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("expected 14 digits, got '{0}'")]
    WrongLength(String),
    #[error("invalid timestamp '{0}'")]
    Invalid(String),
    #[error("UTC offset of {0}s is out of range")]
    InvalidOffset(i32),
    #[error("{0} is outside the encodable range")]
    OutOfRange(DateTime<Utc>),
    #[error("encoding does not support formatting")]
    Unsupported,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl TimeEncoding {
    /// The WMIP/Hydstra encoding.
    pub fn wmip() -> Self {
        TimeEncoding::Compact14 {
            offset_seconds: AEST_OFFSET_SECONDS,
        }
    }

    /// Strict parse. Returns an error for anything malformed.
    pub fn parse(&self, raw: &str) -> Result<DateTime<Utc>, CodecError> {
        let raw = raw.trim();
        match *self {
            TimeEncoding::Compact14 { offset_seconds } => {
                if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CodecError::WrongLength(raw.to_string()));
                }
                let naive = NaiveDateTime::parse_from_str(raw, COMPACT_FORMAT)
                    .map_err(|_| CodecError::Invalid(raw.to_string()))?;
                localize(naive, offset_seconds, raw)
            }
            TimeEncoding::Iso8601 => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| CodecError::Invalid(raw.to_string())),
            TimeEncoding::NaiveIso { offset_seconds } => {
                let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
                    .map_err(|_| CodecError::Invalid(raw.to_string()))?;
                localize(naive, offset_seconds, raw)
            }
        }
    }

    /// Lenient decode: never fails, flags anomalies relative to `now`.
    pub fn decode(&self, raw: &str, now: DateTime<Utc>) -> Decoded {
        match self.parse(raw) {
            Ok(instant) => {
                let anomaly = check_plausibility(instant, now);
                if let Some(a) = &anomaly {
                    warn!(raw, %instant, anomaly = ?a, "implausible provider timestamp");
                }
                Decoded { instant, anomaly }
            }
            Err(e) => {
                warn!(raw, error = %e, "malformed provider timestamp, substituting now");
                Decoded {
                    instant: now,
                    anomaly: Some(TimestampAnomaly::Malformed(raw.to_string())),
                }
            }
        }
    }

    /// Formats an instant in this encoding. Exact inverse of `parse` for
    /// `Compact14` instants whose local year lies in 1000..=9999.
    pub fn encode(&self, instant: DateTime<Utc>) -> Result<String, CodecError> {
        match *self {
            TimeEncoding::Compact14 { offset_seconds } => {
                let offset = FixedOffset::east_opt(offset_seconds)
                    .ok_or(CodecError::InvalidOffset(offset_seconds))?;
                let local = instant.with_timezone(&offset);
                if !(1000..=9999).contains(&local.year()) {
                    return Err(CodecError::OutOfRange(instant));
                }
                Ok(local.format(COMPACT_FORMAT).to_string())
            }
            TimeEncoding::Iso8601 => Ok(instant.to_rfc3339()),
            TimeEncoding::NaiveIso { .. } => Err(CodecError::Unsupported),
        }
    }
}

fn localize(naive: NaiveDateTime, offset_seconds: i32, raw: &str) -> Result<DateTime<Utc>, CodecError> {
    let offset =
        FixedOffset::east_opt(offset_seconds).ok_or(CodecError::InvalidOffset(offset_seconds))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CodecError::Invalid(raw.to_string()))
}

/// Flags instants that usually mean provider clock skew or encoding drift.
pub fn check_plausibility(instant: DateTime<Utc>, now: DateTime<Utc>) -> Option<TimestampAnomaly> {
    let age = now - instant;
    if age > Duration::days(MAX_PLAUSIBLE_AGE_DAYS) {
        return Some(TimestampAnomaly::TooOld {
            age_days: age.num_days(),
        });
    }
    let ahead = instant - now;
    if ahead > Duration::seconds(MAX_FUTURE_SKEW_SECONDS) {
        return Some(TimestampAnomaly::InFuture {
            ahead_seconds: ahead.num_seconds(),
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
