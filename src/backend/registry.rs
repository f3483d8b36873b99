use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use super::{Backend, BackendType};
use crate::error::SqliteDualError;

/// Detects which engine is usable and constructs backends.
///
/// Native availability is probed once per registry and cached, failure included, until
/// [`BackendRegistry::reset`] is called.
pub struct BackendRegistry {
    detected: Mutex<Option<BackendType>>,
    probes: AtomicUsize,
    probe: fn() -> bool,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "sqlite")]
fn native_probe() -> bool {
    crate::native::probe()
}

#[cfg(not(feature = "sqlite"))]
fn native_probe() -> bool {
    false
}

impl BackendRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_probe(native_probe)
    }

    /// Registry whose native probe is replaced by `probe`.
    #[must_use]
    pub fn with_probe(probe: fn() -> bool) -> Self {
        Self {
            detected: Mutex::new(None),
            probes: AtomicUsize::new(0),
            probe,
        }
    }

    /// The engine `create` picks when none is forced: native when its probe succeeds,
    /// portable otherwise.
    pub fn detect_available(&self) -> BackendType {
        let mut detected = self
            .detected
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(backend_type) = *detected {
            return backend_type;
        }
        self.probes.fetch_add(1, Ordering::Relaxed);
        let backend_type = if (self.probe)() {
            BackendType::Native
        } else {
            BackendType::Portable
        };
        info!(backend = %backend_type, "detected SQLite backend");
        *detected = Some(backend_type);
        backend_type
    }

    /// How many times the native probe has actually run.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    /// Forget the cached detection result; the next call probes again.
    pub fn reset(&self) {
        *self
            .detected
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    fn is_available(&self, backend_type: BackendType) -> bool {
        match backend_type {
            BackendType::Native => self.detect_available() == BackendType::Native,
            BackendType::Portable => cfg!(feature = "turso"),
        }
    }

    /// Construct a backend, optionally seeded with an existing database image.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when the forced (or detected) engine is not usable, and
    /// `InvalidFormat` when `existing` is not a valid SQLite image.
    pub async fn create(
        &self,
        force: Option<BackendType>,
        existing: Option<&[u8]>,
    ) -> Result<Box<dyn Backend + Send>, SqliteDualError> {
        let backend_type = match force {
            Some(forced) if !self.is_available(forced) => {
                return Err(SqliteDualError::BackendUnavailable(format!(
                    "{forced} backend was requested but is not available"
                )));
            }
            Some(forced) => forced,
            None => self.detect_available(),
        };

        match backend_type {
            BackendType::Native => open_native(existing),
            BackendType::Portable => open_portable(existing).await,
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_native(existing: Option<&[u8]>) -> Result<Box<dyn Backend + Send>, SqliteDualError> {
    Ok(Box::new(crate::native::NativeBackend::open(existing)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_native(_existing: Option<&[u8]>) -> Result<Box<dyn Backend + Send>, SqliteDualError> {
    Err(SqliteDualError::BackendUnavailable(
        "native backend is not compiled in (enable the `sqlite` feature)".into(),
    ))
}

#[cfg(feature = "turso")]
async fn open_portable(existing: Option<&[u8]>) -> Result<Box<dyn Backend + Send>, SqliteDualError> {
    Ok(Box::new(crate::portable::PortableBackend::open(existing).await?))
}

#[cfg(not(feature = "turso"))]
async fn open_portable(_existing: Option<&[u8]>) -> Result<Box<dyn Backend + Send>, SqliteDualError> {
    Err(SqliteDualError::BackendUnavailable(
        "portable backend is not compiled in (enable the `turso` feature)".into(),
    ))
}
