//! Windows backends: Service Control Manager, token membership and ShellExecute

use async_trait::async_trait;
use log::{debug, warn};
use std::ffi::{OsStr, OsString};
use std::io;
use std::mem;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::ptr;
use std::slice;
use std::sync::Arc;

use winapi::{
    shared::{
        minwindef::{BOOL, DWORD, FALSE, LPBYTE},
        winerror::{ERROR_ACCESS_DENIED, ERROR_MORE_DATA, ERROR_SERVICE_DOES_NOT_EXIST},
    },
    um::{
        securitybaseapi::{AllocateAndInitializeSid, CheckTokenMembership, FreeSid},
        shellapi::ShellExecuteW,
        winnt::{
            DOMAIN_ALIAS_RID_ADMINS, PSID, SECURITY_BUILTIN_DOMAIN_RID, SECURITY_NT_AUTHORITY,
            SERVICE_DRIVER, SID_IDENTIFIER_AUTHORITY,
        },
        winsvc::{
            CloseServiceHandle, EnumServicesStatusExW, OpenSCManagerW,
            ENUM_SERVICE_STATUS_PROCESSW, SC_ENUM_PROCESS_INFO, SC_HANDLE,
            SC_MANAGER_ENUMERATE_SERVICE, SERVICE_STATE_ALL,
        },
        winuser::SW_SHOWNORMAL,
    },
};
use windows_service::{
    service::{Service, ServiceAccess, ServiceState as ScmState},
    service_manager::{ServiceManager, ServiceManagerAccess},
};

use super::{
    select_exact, DeviceRegistry, LaunchRequest, PrivilegeCheck, ProcessLauncher, ServiceHandle,
    ServiceState,
};
use crate::error::{ControlError, ControlResult};

impl From<ScmState> for ServiceState {
    fn from(state: ScmState) -> Self {
        match state {
            ScmState::Stopped => ServiceState::Stopped,
            ScmState::Running => ServiceState::Running,
            ScmState::StartPending => ServiceState::StartPending,
            ScmState::StopPending => ServiceState::StopPending,
            _ => ServiceState::Other,
        }
    }
}

fn map_scm_error(name: &str, action: &str, error: windows_service::Error) -> ControlError {
    if let windows_service::Error::Winapi(io_error) = &error {
        if io_error.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32) {
            return ControlError::AccessDenied(format!("{} '{}': {}", action, name, io_error));
        }
    }
    ControlError::Platform(format!("{} '{}': {}", action, name, error))
}

/// Open a service for the duration of one call. Both SCM handles close on drop.
fn open_service(name: &str, access: ServiceAccess) -> ControlResult<Option<Service>> {
    let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)
        .map_err(|e| map_scm_error(name, "connecting to SCM for", e))?;

    match manager.open_service(name, access) {
        Ok(service) => Ok(Some(service)),
        Err(windows_service::Error::Winapi(io_error))
            if io_error.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST as i32) =>
        {
            Ok(None)
        }
        Err(e) => Err(map_scm_error(name, "opening service", e)),
    }
}

async fn blocking<T, F>(task: F) -> ControlResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ControlResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ControlError::Platform(format!("service control task failed: {}", e)))?
}

/// SCM connection opened through winapi; closed on drop
struct ScManager(SC_HANDLE);

impl Drop for ScManager {
    fn drop(&mut self) {
        unsafe {
            CloseServiceHandle(self.0);
        }
    }
}

unsafe fn wide_to_string(value: *const u16) -> String {
    if value.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *value.add(len) != 0 {
        len += 1;
    }
    OsString::from_wide(slice::from_raw_parts(value, len))
        .to_string_lossy()
        .into_owned()
}

/// Names of every driver service the SCM knows about, in SCM order
fn enumerate_driver_names() -> ControlResult<Vec<String>> {
    unsafe {
        let handle = OpenSCManagerW(ptr::null(), ptr::null(), SC_MANAGER_ENUMERATE_SERVICE);
        if handle.is_null() {
            let e = io::Error::last_os_error();
            if e.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32) {
                return Err(ControlError::AccessDenied(format!("enumerating services: {}", e)));
            }
            return Err(ControlError::Platform(format!("connecting to SCM: {}", e)));
        }
        let manager = ScManager(handle);

        let mut names = Vec::new();
        let mut resume: DWORD = 0;
        // u64 storage keeps the entries pointer-aligned
        let mut buffer: Vec<u64> = vec![0; 8 * 1024];

        loop {
            let mut needed: DWORD = 0;
            let mut returned: DWORD = 0;
            let done = EnumServicesStatusExW(
                manager.0,
                SC_ENUM_PROCESS_INFO,
                SERVICE_DRIVER,
                SERVICE_STATE_ALL,
                buffer.as_mut_ptr() as LPBYTE,
                (buffer.len() * mem::size_of::<u64>()) as DWORD,
                &mut needed,
                &mut returned,
                &mut resume,
                ptr::null(),
            ) != FALSE;

            if !done {
                let e = io::Error::last_os_error();
                if e.raw_os_error() != Some(ERROR_MORE_DATA as i32) {
                    return Err(ControlError::Platform(format!("enumerating services: {}", e)));
                }
            }

            let entries = slice::from_raw_parts(
                buffer.as_ptr() as *const ENUM_SERVICE_STATUS_PROCESSW,
                returned as usize,
            );
            names.extend(entries.iter().map(|entry| wide_to_string(entry.lpServiceName)));

            if done {
                break;
            }
            let needed_words = (needed as usize + 7) / 8;
            if needed_words > buffer.len() {
                buffer.resize(needed_words, 0);
            }
        }

        Ok(names)
    }
}

/// Lookup of kernel and file-system driver services through the SCM
pub struct ScmDeviceRegistry;

#[async_trait]
impl DeviceRegistry for ScmDeviceRegistry {
    async fn find_device(&self, name: &str) -> ControlResult<Option<Arc<dyn ServiceHandle>>> {
        let name = name.to_string();
        blocking(move || {
            // OpenServiceW ignores case, so the exact match happens on the enumerated names
            let drivers = enumerate_driver_names()?;
            let name = match select_exact(drivers.iter().map(String::as_str), &name) {
                Some(found) => found.to_string(),
                None => {
                    debug!("No driver service named '{}'", name);
                    return Ok(None);
                }
            };

            let service = match open_service(&name, ServiceAccess::QUERY_STATUS)? {
                Some(service) => service,
                None => return Ok(None),
            };
            service
                .query_status()
                .map_err(|e| map_scm_error(&name, "querying service", e))?;

            let handle: Arc<dyn ServiceHandle> = Arc::new(ScmServiceHandle { name });
            Ok(Some(handle))
        })
        .await
    }
}

/// A driver service addressed by name; SCM handles are reacquired per call
pub struct ScmServiceHandle {
    name: String,
}

#[async_trait]
impl ServiceHandle for ScmServiceHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_state(&self) -> ControlResult<ServiceState> {
        let name = self.name.clone();
        blocking(move || {
            let service = open_service(&name, ServiceAccess::QUERY_STATUS)?;
            match service {
                Some(service) => {
                    let status = service
                        .query_status()
                        .map_err(|e| map_scm_error(&name, "querying service", e))?;
                    Ok(ServiceState::from(status.current_state))
                }
                // Deleted while we were watching it
                None => Ok(ServiceState::Stopped),
            }
        })
        .await
    }

    async fn request_stop(&self) -> ControlResult<()> {
        let name = self.name.clone();
        blocking(move || {
            let access = ServiceAccess::STOP | ServiceAccess::QUERY_STATUS;
            let service = match open_service(&name, access)? {
                Some(service) => service,
                None => return Ok(()),
            };
            service
                .stop()
                .map_err(|e| map_scm_error(&name, "stopping service", e))?;
            Ok(())
        })
        .await
    }
}

/// Administrators group membership of the current token
pub struct TokenMembershipCheck;

impl PrivilegeCheck for TokenMembershipCheck {
    fn is_elevated(&self) -> ControlResult<bool> {
        unsafe {
            let mut authority = SID_IDENTIFIER_AUTHORITY {
                Value: SECURITY_NT_AUTHORITY,
            };
            let mut admin_group: PSID = ptr::null_mut();

            let allocated = AllocateAndInitializeSid(
                &mut authority,
                2,
                SECURITY_BUILTIN_DOMAIN_RID,
                DOMAIN_ALIAS_RID_ADMINS,
                0,
                0,
                0,
                0,
                0,
                0,
                &mut admin_group,
            );
            if allocated == FALSE {
                return Err(ControlError::Platform(format!(
                    "failed to build administrators SID: {}",
                    io::Error::last_os_error()
                )));
            }

            let mut is_member: BOOL = FALSE;
            let checked = CheckTokenMembership(ptr::null_mut(), admin_group, &mut is_member);
            let check_error = io::Error::last_os_error();
            FreeSid(admin_group);

            if checked == FALSE {
                return Err(ControlError::Platform(format!(
                    "failed to check token membership: {}",
                    check_error
                )));
            }

            Ok(is_member != FALSE)
        }
    }
}

fn to_wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(std::iter::once(0)).collect()
}

/// Relaunch through `ShellExecuteW` with the "runas" verb
pub struct ShellExecuteLauncher;

impl ProcessLauncher for ShellExecuteLauncher {
    fn launch_elevated(&self, request: &LaunchRequest) -> ControlResult<()> {
        let verb = to_wide(OsStr::new("runas"));
        let file = to_wide(request.executable.as_os_str());
        let parameters = to_wide(OsStr::new(&request.parameters()));
        let directory = to_wide(request.working_dir.as_os_str());

        let result = unsafe {
            ShellExecuteW(
                ptr::null_mut(),
                verb.as_ptr(),
                file.as_ptr(),
                parameters.as_ptr(),
                directory.as_ptr(),
                SW_SHOWNORMAL,
            )
        };

        // Values above 32 indicate success
        let code = result as isize;
        if code <= 32 {
            warn!("ShellExecuteW returned {} for {:?}", code, request.executable);
            return Err(ControlError::Launch(format!(
                "ShellExecuteW failed with code {}: {}",
                code,
                describe_shell_execute_error(code)
            )));
        }

        Ok(())
    }
}

/// Meaning of a `ShellExecuteW` return value of 32 or below
fn describe_shell_execute_error(code: isize) -> &'static str {
    match code {
        0 | 8 => "out of memory or resources",
        2 => "file not found",
        3 => "path not found",
        5 => "access denied or elevation declined by the user",
        11 => "invalid executable image",
        26 => "sharing violation",
        27 => "incomplete file association",
        28..=30 => "DDE transaction failed",
        31 => "no application associated with the file",
        32 => "DLL not found",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scm_state_conversion() {
        assert_eq!(ServiceState::from(ScmState::Stopped), ServiceState::Stopped);
        assert_eq!(ServiceState::from(ScmState::StopPending), ServiceState::StopPending);
        assert_eq!(ServiceState::from(ScmState::Paused), ServiceState::Other);
    }

    #[tokio::test]
    async fn test_missing_driver_is_not_found() {
        let found = ScmDeviceRegistry
            .find_device("vanguard-helper-missing-driver")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_driver_lookup_is_case_sensitive() {
        let drivers = enumerate_driver_names().unwrap();
        assert!(!drivers.is_empty());
        let name = &drivers[0];
        let changed = if name.to_uppercase() != *name {
            name.to_uppercase()
        } else {
            name.to_lowercase()
        };
        if changed == *name || drivers.contains(&changed) {
            return;
        }
        assert!(ScmDeviceRegistry.find_device(name).await.unwrap().is_some());
        assert!(ScmDeviceRegistry.find_device(&changed).await.unwrap().is_none());
    }

    #[test]
    fn test_shell_execute_error_codes() {
        assert_eq!(
            describe_shell_execute_error(5),
            "access denied or elevation declined by the user"
        );
        assert_eq!(describe_shell_execute_error(2), "file not found");
        assert_eq!(describe_shell_execute_error(29), "DDE transaction failed");
        assert_eq!(describe_shell_execute_error(17), "unknown error");
    }

    #[test]
    fn test_token_membership_check_succeeds() {
        assert!(TokenMembershipCheck.is_elevated().is_ok());
    }
}
