//! ONNX Runtime session construction shared by every model adapter.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, TryLockError};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

use crate::shared::BoxError;

/// Loads a model with the platform's preferred execution providers.
///
/// Intra-op parallelism uses every available core; callers that run
/// several sessions concurrently should cap it with `intra_threads`.
pub fn load(model_path: &Path, intra_threads: Option<usize>) -> ort::Result<Session> {
    let intra_threads = intra_threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    log::debug!(
        "Loading ONNX model {} ({intra_threads} intra-op threads)",
        model_path.display()
    );
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)
}

/// Loads `sessions` copies of one model for concurrent use, splitting the
/// machine's cores between them for intra-op work.
pub fn load_pool(model_path: &Path, sessions: usize) -> Result<SessionPool<Session>, BoxError> {
    let sessions = sessions.max(1);
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let intra_threads = (cores / sessions).max(1);
    let loaded = (0..sessions)
        .map(|_| load(model_path, Some(intra_threads)))
        .collect::<ort::Result<Vec<_>>>()?;
    SessionPool::new(loaded)
}

/// Interchangeable model sessions shared by worker threads.
///
/// A call borrows whichever session is idle, so up to `len()` inferences
/// run at once. When all are busy the caller waits for one.
pub struct SessionPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SessionPool<T> {
    pub fn new(sessions: Vec<T>) -> Result<Self, BoxError> {
        if sessions.is_empty() {
            return Err("session pool needs at least one session".into());
        }
        Ok(Self {
            slots: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Runs `f` with exclusive use of one session.
    pub fn run<R>(&self, f: impl FnOnce(&mut T) -> Result<R, BoxError>) -> Result<R, BoxError> {
        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        for offset in 0..self.slots.len() {
            match self.slots[(start + offset) % self.slots.len()].try_lock() {
                Ok(mut session) => return f(&mut *session),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    return Err(format!("model session lock poisoned: {e}").into())
                }
            }
        }
        let mut session = self.slots[start]
            .lock()
            .map_err(|e| format!("model session lock poisoned: {e}"))?;
        f(&mut *session)
    }
}

/// Preferred execution providers for the current platform.
///
/// An empty list leaves ONNX Runtime on its default CPU provider.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}
