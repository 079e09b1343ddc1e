//! Privileged service control with bounded status polling

use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::config::Config;
use crate::error::{ControlError, ControlResult, OperationResult};
use crate::notify::{NotificationPresenter, PermissionNotice, ResourceLookup};
use crate::platform::{LaunchRequest, Platform, ServiceHandle, ServiceState};

/// How often and how long to wait for a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for PollPolicy {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }
}

/// Looks up driver services, stops them and relaunches the host elevated.
///
/// Cloning is cheap; every collaborator is shared.
#[derive(Clone)]
pub struct PrivilegedServiceController {
    platform: Platform,
    presenter: Arc<dyn NotificationPresenter>,
    resources: Arc<dyn ResourceLookup>,
    policy: PollPolicy,
}

impl PrivilegedServiceController {
    pub fn new(
        platform: Platform,
        presenter: Arc<dyn NotificationPresenter>,
        resources: Arc<dyn ResourceLookup>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            platform,
            presenter,
            resources,
            policy,
        }
    }

    /// Find the driver service named `name`. Absence is `Ok(None)`.
    pub async fn lookup(&self, name: &str) -> ControlResult<Option<Arc<dyn ServiceHandle>>> {
        self.platform.registry.find_device(name).await
    }

    /// Current state of the service, or `None` when it is not installed
    pub async fn service_state(&self, name: &str) -> ControlResult<Option<ServiceState>> {
        match self.lookup(name).await? {
            Some(handle) => Ok(Some(handle.query_state().await?)),
            None => Ok(None),
        }
    }

    pub async fn is_running(&self, name: &str) -> bool {
        match self.service_state(name).await {
            Ok(Some(state)) => state != ServiceState::Stopped,
            Ok(None) => false,
            Err(e) => {
                error!("Failed to query service '{}': {}", name, e);
                false
            }
        }
    }

    pub fn is_elevated(&self) -> bool {
        match self.platform.privileges.is_elevated() {
            Ok(elevated) => elevated,
            Err(e) => {
                error!("Failed to check administrator privileges: {}", e);
                false
            }
        }
    }

    /// Relaunch `executable` elevated with `arguments`, then wait for `service` to stop.
    ///
    /// The launched process is not tracked; only the service state decides the outcome.
    pub async fn request_elevated_relaunch(
        &self,
        service: &str,
        executable: &Path,
        arguments: &[String],
    ) -> OperationResult {
        let working_dir = match executable.parent() {
            Some(dir) => dir.to_path_buf(),
            None => {
                return OperationResult::failed(ControlError::Launch(format!(
                    "executable path {:?} has no parent directory",
                    executable
                )))
            }
        };

        let handle = match self.lookup(service).await {
            Ok(handle) => handle,
            Err(e) => return OperationResult::failed(e),
        };

        let request = LaunchRequest {
            executable: executable.to_path_buf(),
            arguments: arguments.to_vec(),
            working_dir,
        };
        info!(
            "Starting elevated instance: {:?} {}",
            request.executable,
            request.parameters()
        );
        if let Err(e) = self.platform.launcher.launch_elevated(&request) {
            error!("{}", e);
            return OperationResult::failed(e);
        }

        match handle {
            Some(handle) => self
                .poll_until_status(handle.as_ref(), ServiceState::Stopped)
                .await
                .into(),
            None => {
                debug!("Service '{}' is not installed, nothing to wait for", service);
                OperationResult::succeeded()
            }
        }
    }

    /// Stop `name` and wait for it to reach `Stopped`. Requires administrator rights.
    pub async fn stop_service(&self, name: &str) -> OperationResult {
        if !self.is_elevated() {
            let e = ControlError::NotElevated;
            error!("{}", e);
            let notice = PermissionNotice::from_resources(self.resources.as_ref());
            self.presenter.show_permissions_error(&notice).await;
            return OperationResult::failed(e);
        }

        info!("Getting service '{}'...", name);
        let handle = match self.lookup(name).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                info!("Service '{}' is not installed, treating it as stopped", name);
                return OperationResult::succeeded();
            }
            Err(e) => {
                error!("{}", e);
                return OperationResult::failed(e);
            }
        };

        info!("Attempting to stop service '{}'...", name);
        let stopping = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = stopping.request_stop().await {
                warn!("Stop request for '{}' failed: {}", stopping.name(), e);
            }
        });

        let result: OperationResult = self
            .poll_until_status(handle.as_ref(), ServiceState::Stopped)
            .await
            .into();
        match &result.error {
            None => info!("Service '{}' stopped", name),
            Some(e) => error!("{}", e),
        }
        result
    }

    /// [`stop_service`](Self::stop_service) on a spawned task
    pub fn stop_service_in_background(&self, name: &str) -> JoinHandle<OperationResult> {
        let controller = self.clone();
        let name = name.to_string();
        tokio::spawn(async move { controller.stop_service(&name).await })
    }

    async fn poll_until_status(
        &self,
        handle: &dyn ServiceHandle,
        desired: ServiceState,
    ) -> ControlResult<()> {
        let started = Instant::now();
        let mut state = handle.query_state().await?;

        while state != desired {
            if started.elapsed() > self.policy.timeout {
                return Err(ControlError::Timeout {
                    service: handle.name().to_string(),
                    desired,
                });
            }
            sleep(self.policy.interval).await;
            state = handle.query_state().await?;
            debug!("Service '{}' is {} after {:?}", handle.name(), state, started.elapsed());
        }

        Ok(())
    }
}
