//! Global configuration for Hillview workers.
//!
//! Values are initialized from environment variables on first access and
//! can be overridden at runtime via setter functions.
//!
//! # Dataset configuration
//!
//! - `HILLVIEW_BUNDLE_INTERVAL`: How long a parallel dataset batches partial
//!   results from its children before emitting them as one. Accepts `250ms`,
//!   `2s`, `5m`, `2h`, or a plain number of milliseconds. `0` disables
//!   bundling. Default: 250ms.
//!
//! - `HILLVIEW_SEPARATE_THREAD`: Whether local datasets compute on a
//!   blocking worker thread (`true`) or on the polling task. Default: true.
//!
//! # Server configuration
//!
//! - `HILLVIEW_MEMOIZE`: Initial memoization state of a new server.
//!   Default: true.
//!
//! - `HILLVIEW_DATASET_EXPIRY`: Time after last access at which a worker
//!   forgets a dataset handle. Same syntax as the bundle interval.
//!   Default: 2h.
//!
//! - `HILLVIEW_HOST_NAME`: Host name reported in management statuses.
//!   Falls back to `HOSTNAME`, then `localhost`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Once, OnceLock};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_BUNDLE_INTERVAL_MS: u64 = 250;
const DEFAULT_DATASET_EXPIRY_MS: u64 = 2 * 60 * 60 * 1000; // 2 hours

// ---------------------------------------------------------------------------
// Atomic globals
// ---------------------------------------------------------------------------

static BUNDLE_INTERVAL_MS: AtomicU64 = AtomicU64::new(DEFAULT_BUNDLE_INTERVAL_MS);
static DATASET_EXPIRY_MS: AtomicU64 = AtomicU64::new(DEFAULT_DATASET_EXPIRY_MS);
static MEMOIZE: AtomicBool = AtomicBool::new(true);
static SEPARATE_THREAD: AtomicBool = AtomicBool::new(true);
static HOST_NAME: OnceLock<String> = OnceLock::new();

static INIT: Once = Once::new();

/// Ensure environment variable overrides are applied (idempotent).
fn ensure_init() {
    INIT.call_once(|| {
        if let Ok(val) = std::env::var("HILLVIEW_BUNDLE_INTERVAL") {
            if let Ok(d) = parse_duration(&val) {
                BUNDLE_INTERVAL_MS.store(d.as_millis() as u64, Ordering::Relaxed);
            }
        }
        if let Ok(val) = std::env::var("HILLVIEW_DATASET_EXPIRY") {
            if let Ok(d) = parse_duration(&val) {
                DATASET_EXPIRY_MS.store(d.as_millis() as u64, Ordering::Relaxed);
            }
        }
        if let Ok(val) = std::env::var("HILLVIEW_MEMOIZE") {
            if let Ok(b) = parse_bool(&val) {
                MEMOIZE.store(b, Ordering::Relaxed);
            }
        }
        if let Ok(val) = std::env::var("HILLVIEW_SEPARATE_THREAD") {
            if let Ok(b) = parse_bool(&val) {
                SEPARATE_THREAD.store(b, Ordering::Relaxed);
            }
        }
    });
}

/// Parse a duration string. Supports plain integers (milliseconds) and
/// the suffixes `ms`, `s`, `m`, `h` (case-insensitive).
fn parse_duration(s: &str) -> Result<Duration, ()> {
    let s = s.trim().to_ascii_lowercase();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("ms") {
        (n.trim(), 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n.trim(), 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n.trim(), 60 * 1000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n.trim(), 60 * 60 * 1000)
    } else {
        (s.as_str(), 1)
    };
    num_str
        .parse::<u64>()
        .map(|n| Duration::from_millis(n * multiplier))
        .map_err(|_| ())
}

fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(()),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Get the default bundling interval for parallel datasets.
pub fn get_bundle_interval() -> Duration {
    ensure_init();
    Duration::from_millis(BUNDLE_INTERVAL_MS.load(Ordering::Relaxed))
}

/// Set the default bundling interval for parallel datasets.
pub fn set_bundle_interval(interval: Duration) {
    ensure_init();
    BUNDLE_INTERVAL_MS.store(interval.as_millis() as u64, Ordering::Relaxed);
}

/// Get the idle time after which a worker forgets a dataset handle.
pub fn get_dataset_expiry() -> Duration {
    ensure_init();
    Duration::from_millis(DATASET_EXPIRY_MS.load(Ordering::Relaxed))
}

/// Set the idle time after which a worker forgets a dataset handle.
pub fn set_dataset_expiry(expiry: Duration) {
    ensure_init();
    DATASET_EXPIRY_MS.store(expiry.as_millis() as u64, Ordering::Relaxed);
}

/// Get the initial memoization state for new servers.
pub fn get_memoize() -> bool {
    ensure_init();
    MEMOIZE.load(Ordering::Relaxed)
}

/// Set the initial memoization state for new servers.
pub fn set_memoize(enabled: bool) {
    ensure_init();
    MEMOIZE.store(enabled, Ordering::Relaxed);
}

/// Whether local datasets run their computations on a blocking thread.
pub fn get_separate_thread() -> bool {
    ensure_init();
    SEPARATE_THREAD.load(Ordering::Relaxed)
}

pub fn set_separate_thread(enabled: bool) {
    ensure_init();
    SEPARATE_THREAD.store(enabled, Ordering::Relaxed);
}

/// Host name reported in management statuses.
pub fn get_host_name() -> &'static str {
    HOST_NAME.get_or_init(|| {
        std::env::var("HILLVIEW_HOST_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "localhost".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("2H"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration(" 0 "), Ok(Duration::ZERO));
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool("OFF"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_defaults() {
        // These may have been overridden by env vars in CI, so just check they're sane
        assert!(get_dataset_expiry() > Duration::ZERO);
        assert!(!get_host_name().is_empty());
    }

    #[test]
    fn test_set_get() {
        let original = get_dataset_expiry();
        set_dataset_expiry(Duration::from_secs(9));
        assert_eq!(get_dataset_expiry(), Duration::from_secs(9));
        set_dataset_expiry(original); // restore

        let original_memo = get_memoize();
        set_memoize(!original_memo);
        assert_eq!(get_memoize(), !original_memo);
        set_memoize(original_memo); // restore
    }
}
