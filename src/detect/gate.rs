//! Model readiness gate.
//!
//! Wraps the detector behind an explicit state machine:
//! `Uninitialized -> Loading -> Ready | Failed`. Loading runs on its own thread
//! so nothing else waits on it; callers arriving early get `ModelNotReady`.
//! `Failed` is terminal for the process.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::error::JobError;
use crate::frame::Frame;

type SharedBackend = Arc<Mutex<Box<dyn DetectorBackend>>>;

/// Observable gate state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ModelStatus {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

enum GateState {
    Uninitialized,
    Loading,
    Ready {
        backend: SharedBackend,
        name: &'static str,
    },
    Failed(String),
}

pub struct ModelGate {
    state: RwLock<GateState>,
}

impl ModelGate {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GateState::Uninitialized),
        }
    }

    /// A gate that is already `Ready` with the given backend.
    pub fn ready<B: DetectorBackend + 'static>(backend: B) -> Self {
        let name = backend.name();
        Self {
            state: RwLock::new(GateState::Ready {
                backend: Arc::new(Mutex::new(Box::new(backend))),
                name,
            }),
        }
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.read_state() {
            GateState::Uninitialized => ModelStatus::Uninitialized,
            GateState::Loading => ModelStatus::Loading,
            GateState::Ready { .. } => ModelStatus::Ready,
            GateState::Failed(reason) => ModelStatus::Failed(reason.clone()),
        }
    }

    /// Name of the loaded backend, once ready.
    pub fn backend_name(&self) -> Option<&'static str> {
        match &*self.read_state() {
            GateState::Ready { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Start loading on a background thread. Only valid from `Uninitialized`.
    pub fn spawn_load<F>(self: &Arc<Self>, loader: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Box<dyn DetectorBackend>> + Send + 'static,
    {
        {
            let mut state = self.write_state();
            if !matches!(*state, GateState::Uninitialized) {
                return Err(anyhow!("model gate already initialised"));
            }
            *state = GateState::Loading;
        }

        let gate = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || gate.complete_load(loader))?;
        Ok(handle)
    }

    fn complete_load<F>(&self, loader: F)
    where
        F: FnOnce() -> Result<Box<dyn DetectorBackend>>,
    {
        log::info!("loading detection model");
        let started = Instant::now();
        let loaded = loader().and_then(|mut backend| {
            backend.warm_up()?;
            Ok(backend)
        });
        let mut state = self.write_state();
        match loaded {
            Ok(backend) => {
                let name = backend.name();
                log::info!(
                    "detection model ready (backend={}, {} ms)",
                    name,
                    started.elapsed().as_millis()
                );
                *state = GateState::Ready {
                    backend: Arc::new(Mutex::new(backend)),
                    name,
                };
            }
            Err(err) => {
                log::error!("detection model failed to load: {:#}", err);
                *state = GateState::Failed(format!("{err:#}"));
            }
        }
    }

    /// Non-blocking readiness check.
    pub fn check_ready(&self) -> Result<(), JobError> {
        match &*self.read_state() {
            GateState::Ready { .. } => Ok(()),
            GateState::Failed(reason) => Err(JobError::ModelFailed(reason.clone())),
            GateState::Uninitialized | GateState::Loading => Err(JobError::ModelNotReady),
        }
    }

    /// Run the detector on a frame, or report why it cannot run yet.
    ///
    /// The state lock is released before inference starts.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>, JobError> {
        let backend = match &*self.read_state() {
            GateState::Ready { backend, .. } => Arc::clone(backend),
            GateState::Failed(reason) => return Err(JobError::ModelFailed(reason.clone())),
            GateState::Uninitialized | GateState::Loading => {
                return Err(JobError::ModelNotReady)
            }
        };
        let mut guard = backend
            .lock()
            .map_err(|_| JobError::DetectionFailed("detector lock poisoned".to_string()))?;
        guard
            .detect(frame.pixels(), frame.width(), frame.height())
            .map_err(|err| JobError::DetectionFailed(format!("{err:#}")))
    }

    /// Poll until the gate leaves `Loading` or the timeout elapses.
    ///
    /// For one-shot tools that prefer to wait; services should call
    /// `check_ready` and report not-ready instead.
    pub fn wait_settled(&self, timeout: Duration) -> ModelStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status();
            let settled = matches!(status, ModelStatus::Ready | ModelStatus::Failed(_));
            if settled || Instant::now() >= deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, GateState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, GateState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ModelGate {
    fn default() -> Self {
        Self::new()
    }
}
