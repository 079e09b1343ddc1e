//! Platform backends for service lookup, privilege checks and elevated launches
//!
//! The controller only talks to the traits in this module. Windows gets real
//! implementations backed by the Service Control Manager and the shell; every
//! other target gets inert backends where no driver exists and nothing can be
//! elevated.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ControlResult;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod unsupported;

#[cfg(test)]
pub mod testing;

/// Snapshot of a service's run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Running,
    StartPending,
    StopPending,
    /// Paused, pause pending or continue pending
    Other,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServiceState::Stopped => "Stopped",
            ServiceState::Running => "Running",
            ServiceState::StartPending => "StartPending",
            ServiceState::StopPending => "StopPending",
            ServiceState::Other => "Other",
        };
        f.write_str(text)
    }
}

/// A service found by a [`DeviceRegistry`].
///
/// Implementations must not cache the state: every call to `query_state`
/// asks the OS again.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Service name as registered with the OS
    fn name(&self) -> &str;

    /// Refresh and return the current state
    async fn query_state(&self) -> ControlResult<ServiceState>;

    /// Ask the OS to stop the service without waiting for it to stop
    async fn request_stop(&self) -> ControlResult<()>;
}

/// Lookup of device and kernel-driver services
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Find the driver service with exactly this name.
    ///
    /// `Ok(None)` means the service does not exist, which is not an error.
    async fn find_device(&self, name: &str) -> ControlResult<Option<Arc<dyn ServiceHandle>>>;
}

/// Membership check for the administrators role
pub trait PrivilegeCheck: Send + Sync {
    fn is_elevated(&self) -> ControlResult<bool>;
}

/// Starts a process with the OS elevation verb
pub trait ProcessLauncher: Send + Sync {
    fn launch_elevated(&self, request: &LaunchRequest) -> ControlResult<()>;
}

/// Everything needed to relaunch an executable with elevation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchRequest {
    /// Arguments joined into a single command-line parameter string
    pub fn parameters(&self) -> String {
        self.arguments
            .iter()
            .map(|arg| quote_argument(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // Backslashes before a quote are doubled, plus one for the quote
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
                continue;
            }
            _ => {}
        }
        if c != '\\' {
            quoted.extend(std::iter::repeat('\\').take(backslashes));
            backslashes = 0;
            quoted.push(c);
        }
    }
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

/// First name equal to `name`, compared byte for byte
pub fn select_exact<'a, I>(names: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().find(|candidate| *candidate == name)
}

/// The set of backends the controller runs on
#[derive(Clone)]
pub struct Platform {
    pub registry: Arc<dyn DeviceRegistry>,
    pub privileges: Arc<dyn PrivilegeCheck>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl Platform {
    /// Backends for the platform this binary was built for
    pub fn native() -> Self {
        #[cfg(target_os = "windows")]
        {
            debug!("Using Windows service control backends");
            Self {
                registry: Arc::new(windows::ScmDeviceRegistry),
                privileges: Arc::new(windows::TokenMembershipCheck),
                launcher: Arc::new(windows::ShellExecuteLauncher),
            }
        }

        #[cfg(not(target_os = "windows"))]
        {
            debug!(
                "Service control is unavailable on {}, using inert backends",
                std::env::consts::OS
            );
            Self {
                registry: Arc::new(unsupported::NoDevices),
                privileges: Arc::new(unsupported::NeverElevated),
                launcher: Arc::new(unsupported::NoElevatedLaunch),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&str]) -> LaunchRequest {
        LaunchRequest {
            executable: PathBuf::from("viewer.exe"),
            arguments: args.iter().map(|a| a.to_string()).collect(),
            working_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_parameters_plain_arguments() {
        assert_eq!(
            request(&["disable", "vanguard"]).parameters(),
            "disable vanguard"
        );
    }

    #[test]
    fn test_parameters_quotes_whitespace_and_quotes() {
        assert_eq!(request(&["a b"]).parameters(), "\"a b\"");
        assert_eq!(request(&[""]).parameters(), "\"\"");
        assert_eq!(request(&["say \"hi\""]).parameters(), "\"say \\\"hi\\\"\"");
        assert_eq!(request(&["C:\\dir name\\"]).parameters(), "\"C:\\dir name\\\\\"");
    }

    #[test]
    fn test_select_exact_ignores_case_variants() {
        let names = ["VGK", "vgk", "vgk2"];
        assert_eq!(select_exact(names.iter().copied(), "vgk"), Some("vgk"));
        assert_eq!(select_exact(names.iter().copied(), "Vgk"), None);
        assert_eq!(select_exact(["vgk2"].iter().copied(), "vgk"), None);
        assert_eq!(select_exact(std::iter::empty(), "vgk"), None);
    }

    #[test]
    fn test_service_state_display_and_serde() {
        assert_eq!(ServiceState::StopPending.to_string(), "StopPending");
        let json = serde_json::to_string(&ServiceState::StartPending).unwrap();
        assert_eq!(json, "\"start_pending\"");
    }
}
