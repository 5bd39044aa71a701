use std::time::Duration;

/// Status code recorded for requests which never produced a response.
pub const FAILED_STATUS: u16 = 0;

/// The default pause between two iterations of a virtual user.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(1);

/// The default scheduler granularity.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_CHECK_STATUS: u16 = 200;

pub const DEFAULT_USER_AGENT: &str = concat!("stampede/", env!("CARGO_PKG_VERSION"));
