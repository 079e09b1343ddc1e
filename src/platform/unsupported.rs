//! Inert backends for targets without the Windows Service Control Manager

use async_trait::async_trait;
use std::sync::Arc;

use super::{DeviceRegistry, LaunchRequest, PrivilegeCheck, ProcessLauncher, ServiceHandle};
use crate::error::{ControlError, ControlResult};

/// No driver services exist here
pub struct NoDevices;

#[async_trait]
impl DeviceRegistry for NoDevices {
    async fn find_device(&self, _name: &str) -> ControlResult<Option<Arc<dyn ServiceHandle>>> {
        Ok(None)
    }
}

pub struct NeverElevated;

impl PrivilegeCheck for NeverElevated {
    fn is_elevated(&self) -> ControlResult<bool> {
        Ok(false)
    }
}

pub struct NoElevatedLaunch;

impl ProcessLauncher for NoElevatedLaunch {
    fn launch_elevated(&self, request: &LaunchRequest) -> ControlResult<()> {
        Err(ControlError::Unsupported(format!(
            "elevated launch of {:?} requires Windows",
            request.executable
        )))
    }
}
