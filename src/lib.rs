//! vanguard-helper - detect and stop the Vanguard kernel driver
//!
//! Checks administrator rights, stops the `vgk` driver service when elevated,
//! or relaunches the host executable elevated to do it, and polls the service
//! until it reports stopped or the timeout elapses.

pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
pub mod platform;
pub mod vanguard;

pub use config::Config;
pub use controller::{PollPolicy, PrivilegedServiceController};
pub use error::{ControlError, ErrorKind, OperationResult};
pub use platform::ServiceState;
pub use vanguard::{VanguardServiceHelper, VanguardStatus, VANGUARD_SERVICE_NAME};
