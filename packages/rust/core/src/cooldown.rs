//! Re-index cooldown for cities.

use chrono::{DateTime, Utc};

use expofinder_shared::{ExpoFinderError, Result};

/// Default minimum number of hours between index runs of one city.
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Reject a city index request made within `window_hours` of `last_indexed`.
///
/// The error reports whole hours elapsed (rounded down) and whole hours left
/// (rounded up), so 10h elapsed in a 24h window asks to wait 14h.
/// A timestamp in the future counts as just indexed.
pub fn evaluate(
    city: &str,
    last_indexed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_hours: u32,
) -> Result<()> {
    let Some(last) = last_indexed else {
        return Ok(());
    };

    let elapsed_secs = (now - last).num_milliseconds().max(0) as f64 / 1000.0;
    let hours_since = elapsed_secs / 3600.0;
    let window = f64::from(window_hours);

    if hours_since < window {
        return Err(ExpoFinderError::CooldownActive {
            city: city.to_string(),
            hours_since: hours_since.floor() as i64,
            wait_hours: (window - hours_since).ceil() as i64,
        });
    }
    Ok(())
}
