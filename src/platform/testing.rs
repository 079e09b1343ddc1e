//! In-memory doubles for the platform traits

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    DeviceRegistry, LaunchRequest, PrivilegeCheck, ProcessLauncher, ServiceHandle, ServiceState,
};
use crate::error::{ControlError, ControlResult};

struct FakeState {
    state: ServiceState,
    queries: usize,
    stop_requests: usize,
    /// Query number at which the state flips to Stopped
    stopped_at_query: Option<usize>,
    /// Queries between a stop request and reaching Stopped
    stop_latency: Option<usize>,
    stop_seen_before_stopped: bool,
    /// Query number that reports an OS error
    failing_query: Option<usize>,
    stop_fails: bool,
}

/// A driver whose state changes after a scripted number of queries
pub struct FakeDevice {
    name: String,
    inner: Mutex<FakeState>,
}

impl FakeDevice {
    pub fn new(name: &str, state: ServiceState) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inner: Mutex::new(FakeState {
                state,
                queries: 0,
                stop_requests: 0,
                stopped_at_query: None,
                stop_latency: None,
                stop_seen_before_stopped: false,
                failing_query: None,
                stop_fails: false,
            }),
        })
    }

    /// Reaches Stopped on the given query regardless of stop requests
    pub fn stopping_on_query(name: &str, query: usize) -> Arc<Self> {
        let device = Self::new(name, ServiceState::Running);
        device.inner.lock().unwrap().stopped_at_query = Some(query);
        device
    }

    /// Goes StopPending on a stop request and Stopped `latency` queries later
    pub fn honoring_stop(name: &str, latency: usize) -> Arc<Self> {
        let device = Self::new(name, ServiceState::Running);
        device.inner.lock().unwrap().stop_latency = Some(latency);
        device
    }

    /// Make the given query fail with a platform error
    pub fn fail_query(self: Arc<Self>, query: usize) -> Arc<Self> {
        self.inner.lock().unwrap().failing_query = Some(query);
        self
    }

    /// Make every stop request fail; the request is still counted
    pub fn fail_stop_requests(self: Arc<Self>) -> Arc<Self> {
        self.inner.lock().unwrap().stop_fails = true;
        self
    }

    pub fn queries(&self) -> usize {
        self.inner.lock().unwrap().queries
    }

    pub fn stop_requests(&self) -> usize {
        self.inner.lock().unwrap().stop_requests
    }

    pub fn stop_seen_before_stopped(&self) -> bool {
        self.inner.lock().unwrap().stop_seen_before_stopped
    }
}

#[async_trait]
impl ServiceHandle for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_state(&self) -> ControlResult<ServiceState> {
        let mut inner = self.inner.lock().unwrap();
        inner.queries += 1;
        if inner.failing_query == Some(inner.queries) {
            return Err(ControlError::Platform(format!("querying service '{}'", self.name)));
        }
        if let Some(at) = inner.stopped_at_query {
            if inner.queries >= at && inner.state != ServiceState::Stopped {
                inner.state = ServiceState::Stopped;
                if inner.stop_requests > 0 {
                    inner.stop_seen_before_stopped = true;
                }
            }
        }
        Ok(inner.state)
    }

    async fn request_stop(&self) -> ControlResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.stop_requests += 1;
        if inner.stop_fails {
            return Err(ControlError::Platform(format!("stopping service '{}'", self.name)));
        }
        if let Some(latency) = inner.stop_latency {
            if inner.state != ServiceState::Stopped {
                inner.state = ServiceState::StopPending;
                inner.stopped_at_query = Some(inner.queries + latency);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    devices: Vec<Arc<FakeDevice>>,
    lookups: AtomicUsize,
    deny_access: bool,
}

impl FakeRegistry {
    pub fn with(devices: Vec<Arc<FakeDevice>>) -> Arc<Self> {
        Arc::new(Self {
            devices,
            ..Default::default()
        })
    }

    pub fn denying_access() -> Arc<Self> {
        Arc::new(Self {
            deny_access: true,
            ..Default::default()
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceRegistry for FakeRegistry {
    async fn find_device(&self, name: &str) -> ControlResult<Option<Arc<dyn ServiceHandle>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.deny_access {
            return Err(ControlError::AccessDenied(format!("opening service '{}'", name)));
        }
        Ok(self
            .devices
            .iter()
            .find(|device| device.name() == name)
            .map(|device| device.clone() as Arc<dyn ServiceHandle>))
    }
}

pub struct FakePrivileges(pub bool);

impl PrivilegeCheck for FakePrivileges {
    fn is_elevated(&self) -> ControlResult<bool> {
        Ok(self.0)
    }
}

/// A privilege check that cannot read the process token
pub struct BrokenPrivileges;

impl PrivilegeCheck for BrokenPrivileges {
    fn is_elevated(&self) -> ControlResult<bool> {
        Err(ControlError::Platform("failed to check token membership".to_string()))
    }
}

/// Records launches instead of starting processes
#[derive(Default)]
pub struct RecordingLauncher {
    requests: Mutex<Vec<LaunchRequest>>,
    fail: AtomicBool,
}

impl RecordingLauncher {
    pub fn failing() -> Arc<Self> {
        let launcher = Self::default();
        launcher.fail.store(true, Ordering::SeqCst);
        Arc::new(launcher)
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch_elevated(&self, request: &LaunchRequest) -> ControlResult<()> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::Launch(
                "The operation was canceled by the user".to_string(),
            ));
        }
        Ok(())
    }
}
