pub const BUILD_TIME_LIMIT_SECS: f64 = 60.0;
pub const BUILD_MEMORY_LIMIT_KB: u64 = 256 * 1024;

pub const SUBMISSION_MOUNT_POINT: &str = "/submission";
pub const INPUT_MOUNT_POINT: &str = "/input";
pub const RUN_MOUNT_POINT: &str = "/run";

pub const SOURCE_FILE_NAME: &str = "src";
pub const INPUT_FILE_NAME: &str = "input";
pub const SCRIPT_FILE_NAME: &str = "script";
pub const META_FILE_NAME: &str = "meta";

pub const SANDBOX_PATH_ENV: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const SANDBOX_MAX_PROCESSES: u32 = 32;

/// Prefix of every scratch directory created under the scratch root.
pub const SCRATCH_PREFIX: &str = "boxrunner";

pub const SYSTEM_ERROR_MSG: &str = "System error";

pub const EVENT_TX_ERR: &str = "Failed to send pipeline event";
pub const STREAM_TX_ERR: &str = "Failed to send event to response stream";
