use std::sync::{Arc, OnceLock};

use super::traits::CacheBackend;

/// Backend slot filled once the connection succeeds
///
/// Worker startup connects in the background; until then the handle is
/// empty and the worker runs uncached.
#[derive(Clone, Default)]
pub struct BackendHandle {
    inner: Arc<OnceLock<Arc<dyn CacheBackend>>>,
}

impl BackendHandle {
    /// No backend
    pub fn none() -> Self {
        Self::default()
    }

    /// Already connected backend
    pub fn connected(backend: Arc<dyn CacheBackend>) -> Self {
        let handle = Self::default();
        let _ = handle.inner.set(backend);
        handle
    }

    /// Install the backend; returns false when one was already installed
    pub fn install(&self, backend: Arc<dyn CacheBackend>) -> bool {
        self.inner.set(backend).is_ok()
    }

    pub fn get(&self) -> Option<Arc<dyn CacheBackend>> {
        self.inner.get().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;

    #[test]
    fn test_install_once() {
        let handle = BackendHandle::none();
        assert!(!handle.is_connected());

        let clone = handle.clone();
        assert!(handle.install(Arc::new(MemoryBackend::new())));
        assert!(!handle.install(Arc::new(MemoryBackend::new())));
        assert!(clone.is_connected());
        assert_eq!(clone.get().map(|b| b.name()), Some("memory"));
    }
}
