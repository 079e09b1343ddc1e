//! Consumer-facing helper for the Vanguard kernel driver (`vgk`)

use anyhow::{Context, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::controller::{PollPolicy, PrivilegedServiceController};
use crate::error::{ControlError, OperationResult};
use crate::notify::{NotificationPresenter, ResourceLookup};
use crate::platform::{Platform, ServiceState};

pub const VANGUARD_SERVICE_NAME: &str = "vgk";

/// Point-in-time view of the driver, as printed by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VanguardStatus {
    pub service: String,
    pub present: bool,
    pub state: Option<ServiceState>,
    pub running: bool,
    pub elevated: bool,
}

pub struct VanguardServiceHelper {
    controller: PrivilegedServiceController,
    config: Config,
}

impl VanguardServiceHelper {
    pub fn new(controller: PrivilegedServiceController, config: Config) -> Self {
        Self { controller, config }
    }

    /// Helper on the native platform backends
    pub fn native(
        config: Config,
        presenter: Arc<dyn NotificationPresenter>,
        resources: Arc<dyn ResourceLookup>,
    ) -> Self {
        let policy = PollPolicy::from(&config);
        let controller =
            PrivilegedServiceController::new(Platform::native(), presenter, resources, policy);
        Self::new(controller, config)
    }

    pub fn controller(&self) -> &PrivilegedServiceController {
        &self.controller
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Relaunch this executable elevated with the disable arguments and wait for the
    /// driver to stop
    pub async fn start_privileged_process(&self) -> OperationResult {
        let executable = match std::env::current_exe()
            .context("Failed to resolve current executable")
        {
            Ok(path) => path,
            Err(e) => {
                error!("{:#}", e);
                return OperationResult::failed(ControlError::Launch(format!("{:#}", e)));
            }
        };

        self.controller
            .request_elevated_relaunch(
                &self.config.service_name,
                &executable,
                &self.config.relaunch_arguments,
            )
            .await
    }

    /// Stop the driver from this process; needs administrator rights
    pub async fn try_stop_vanguard(&self) -> OperationResult {
        let result = self.controller.stop_service(&self.config.service_name).await;
        if result.is_success() {
            info!("Vanguard is stopped");
        }
        result
    }

    pub async fn is_vanguard_running(&self) -> bool {
        self.controller.is_running(&self.config.service_name).await
    }

    pub async fn status(&self) -> Result<VanguardStatus> {
        let name = &self.config.service_name;
        let state = self
            .controller
            .service_state(name)
            .await
            .with_context(|| format!("Failed to query service '{}'", name))?;

        Ok(VanguardStatus {
            service: name.clone(),
            present: state.is_some(),
            running: matches!(state, Some(s) if s != ServiceState::Stopped),
            state,
            elevated: self.controller.is_elevated(),
        })
    }
}
