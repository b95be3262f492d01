//! Hard bounds enforced by validation.

/// Maximum accepted navigation URL length.
pub const MAX_URL_LEN: usize = 2048;

/// Maximum hostname length accepted by the URL guard.
pub const MAX_HOST_LEN: usize = 253;

/// Maximum text length for a `type` action (100 KB).
pub const MAX_TYPE_TEXT_LEN: usize = 100 * 1024;

/// Maximum number of actions per batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Script length above which the validator attaches a warning.
pub const SCRIPT_WARN_LEN: usize = 10_000;

/// Viewport width bounds, inclusive.
pub const VIEWPORT_WIDTH_RANGE: (u32, u32) = (100, 7680);

/// Viewport height bounds, inclusive.
pub const VIEWPORT_HEIGHT_RANGE: (u32, u32) = (100, 4320);

/// Device scale factor bounds, inclusive.
pub const DEVICE_SCALE_RANGE: (f64, f64) = (0.1, 5.0);

/// Hard cap on any single action deadline, regardless of requested timeout.
pub const MAX_ACTION_TIMEOUT_MS: u64 = 120_000;

/// Default action timeout when the caller supplies none.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;
