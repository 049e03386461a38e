//! Identifier and timestamp helpers.
//!
//! Kept dependency-free on purpose: a UUIDv4 is 16 random bytes hex-encoded
//! with two bits pinned, and the config/manifest timestamps only ever need
//! second-precision UTC, so neither justifies pulling in `uuid` or `chrono`.

use data_encoding::HEXLOWER;
use rand::rngs::OsRng;
use rand::RngCore;

/// Seconds per day.
const DAY_SECS: u64 = 24 * 60 * 60;

/// Generate a UUIDv4 string for a new vault identifier.
///
/// Sixteen CSPRNG bytes with the version nibble pinned to 4 and the variant
/// bits to RFC 4122, hex-encoded and dashed into the usual 8-4-4-4-12
/// groups.
#[must_use]
pub fn generate_vault_id() -> String {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    raw[6] = (raw[6] & 0x0F) | 0x40;
    raw[8] = (raw[8] & 0x3F) | 0x80;

    let hex = HEXLOWER.encode(&raw);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

/// Return the current UTC time as an ISO 8601 string
/// (`YYYY-MM-DDTHH:MM:SSZ`).
#[must_use]
pub fn now_iso8601() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_epoch_secs(secs)
}

/// Render epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Walks forward from 1970, peeling off whole years and then whole months.
/// Callers only ever pass `SystemTime`-derived values; the year walk stops
/// at 9999 so a nonsense input cannot spin.
#[allow(clippy::arithmetic_side_effects)]
fn format_epoch_secs(secs: u64) -> String {
    let mut remaining_days = secs / DAY_SECS;
    let clock = secs % DAY_SECS;
    let hour = clock / 3_600;
    let minute = (clock / 60) % 60;
    let second = clock % 60;

    let mut year: u64 = 1970;
    while year < 9999 {
        let year_days = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < year_days {
            break;
        }
        remaining_days -= year_days;
        year += 1;
    }

    let mut month: u64 = 1;
    loop {
        let month_days = days_in_month(year, month);
        if remaining_days < month_days {
            break;
        }
        remaining_days -= month_days;
        month += 1;
    }

    let day = remaining_days + 1;
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Gregorian leap-year rule: divisible by 4, except centuries unless they
/// are divisible by 400.
#[allow(clippy::arithmetic_side_effects)]
const fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Length of a month in days.
const fn days_in_month(year: u64, month: u64) -> u64 {
    match month {
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
