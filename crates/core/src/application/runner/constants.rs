// Runner constants (no magic values)
use std::time::Duration;

/// Default pause between two runner passes in periodic mode (60s)
pub const DEFAULT_RUN_INTERVAL: Duration = Duration::from_secs(60);

/// Sleep duration after a fatal queue error before the next pass (5s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// Default age after which a job lock is considered abandoned (15 minutes)
pub const DEFAULT_STALE_LOCK_WINDOW_MS: i64 = 15 * 60 * 1000;
