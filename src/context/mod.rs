//! # Service Context
//!
//! Process-wide holder for the backend client, the error emitter, the
//! metrics registry and the current identity snapshot.
//!
//! Lifecycle follows application mount:
//!
//! ```text
//! Initializing --mount()--> Ready --unmount()--> Unmounted
//! ```
//!
//! Bindings read availability on every `watch`; while services are not
//! available they behave as if given a null locator. Bindings created
//! from a context are tracked by it, and `unmount` detaches every live
//! one: its listener is released and its state settles to idle.

mod identity;

pub use identity::Identity;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::sync::watch;

use crate::emitter::ErrorEmitter;
use crate::observability::{Event, MetricsRegistry};
use crate::store::{DocumentBackend, MemoryBackend};

/// Availability of the backend services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Created, not yet mounted
    Initializing,
    /// Mounted, services usable
    Ready,
    /// Torn down
    Unmounted,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Initializing => "initializing",
            ServiceStatus::Ready => "ready",
            ServiceStatus::Unmounted => "unmounted",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binding the context can force back to idle
pub(crate) trait Detach: Send + Sync {
    /// Release the listener and settle to idle, keeping the locator
    fn detach(&self);
}

/// Shared handles every binding and writer is built from
pub struct ServiceContext {
    backend: Arc<dyn DocumentBackend>,
    emitter: Arc<ErrorEmitter>,
    metrics: Arc<MetricsRegistry>,
    identity: RwLock<Option<Identity>>,
    status: watch::Sender<ServiceStatus>,
    bindings: Mutex<Vec<Weak<dyn Detach>>>,
}

impl ServiceContext {
    /// Create an unmounted context from explicit handles
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        emitter: Arc<ErrorEmitter>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            backend,
            emitter,
            metrics,
            identity: RwLock::new(None),
            status: watch::channel(ServiceStatus::Initializing).0,
            bindings: Mutex::new(Vec::new()),
        }
    }

    pub fn builder() -> ServiceContextBuilder {
        ServiceContextBuilder::default()
    }

    /// Make services available
    pub fn mount(&self) {
        self.status.send_replace(ServiceStatus::Ready);
        Event::ContextMounted.emit(&[]);
    }

    /// Tear services down. Every live binding releases its listener and
    /// settles to idle; `refresh` after a remount re-attaches it.
    pub fn unmount(&self) {
        self.status.send_replace(ServiceStatus::Unmounted);

        let live: Vec<Arc<dyn Detach>> = self
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|b| b.upgrade())
            .collect();
        for binding in &live {
            binding.detach();
        }
        Event::ContextUnmounted.emit(&[("detached", live.len().to_string().as_str())]);
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every lifecycle change
    pub fn status_changes(&self) -> watch::Receiver<ServiceStatus> {
        self.status.subscribe()
    }

    /// Register a binding to be detached on unmount
    pub(crate) fn track(&self, binding: Weak<dyn Detach>) {
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        bindings.retain(|b| b.strong_count() > 0);
        bindings.push(binding);
    }

    /// Number of bindings still alive
    pub fn tracked_bindings(&self) -> usize {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|b| b.strong_count() > 0)
            .count()
    }

    /// True until the context is first mounted
    pub fn is_loading(&self) -> bool {
        self.status() == ServiceStatus::Initializing
    }

    pub fn are_services_available(&self) -> bool {
        self.status() == ServiceStatus::Ready
    }

    /// Snapshot of the signed-in identity
    pub fn identity(&self) -> Option<Identity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the identity. Existing listeners keep the identity they
    /// were attached with; call `refresh` on a binding to re-attach.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let uid = identity
            .as_ref()
            .map(|i| i.uid.clone())
            .unwrap_or_default();
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = identity;
        Event::IdentityChanged.emit(&[("uid", uid.as_str())]);
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub fn emitter(&self) -> &Arc<ErrorEmitter> {
        &self.emitter
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("status", &self.status())
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServiceContext`] with in-memory defaults
#[derive(Default)]
pub struct ServiceContextBuilder {
    backend: Option<Arc<dyn DocumentBackend>>,
    metrics: Option<Arc<MetricsRegistry>>,
    identity: Option<Identity>,
    mounted: bool,
}

impl ServiceContextBuilder {
    pub fn backend(mut self, backend: Arc<dyn DocumentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Mount the context as part of `build`
    pub fn mounted(mut self) -> Self {
        self.mounted = true;
        self
    }

    pub fn build(self) -> Arc<ServiceContext> {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsRegistry::new()));
        let emitter = Arc::new(ErrorEmitter::with_metrics(Arc::clone(&metrics)));

        let ctx = ServiceContext::new(backend, emitter, metrics);
        if let Some(identity) = self.identity {
            *ctx.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
        }
        if self.mounted {
            ctx.mount();
        }
        Arc::new(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let ctx = ServiceContext::builder().build();
        assert_eq!(ctx.status(), ServiceStatus::Initializing);
        assert!(ctx.is_loading());
        assert!(!ctx.are_services_available());

        ctx.mount();
        assert!(!ctx.is_loading());
        assert!(ctx.are_services_available());

        ctx.unmount();
        assert!(!ctx.is_loading());
        assert!(!ctx.are_services_available());
    }

    #[test]
    fn test_identity_snapshot() {
        let ctx = ServiceContext::builder()
            .identity(Identity::new("u1"))
            .mounted()
            .build();
        assert_eq!(ctx.identity().map(|i| i.uid), Some("u1".to_string()));

        ctx.set_identity(None);
        assert!(ctx.identity().is_none());
    }

    #[test]
    fn test_status_changes_observed() {
        let ctx = ServiceContext::builder().build();
        let mut changes = ctx.status_changes();

        ctx.mount();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), ServiceStatus::Ready);

        ctx.unmount();
        assert_eq!(*changes.borrow_and_update(), ServiceStatus::Unmounted);
    }

    #[test]
    fn test_unmount_detaches_tracked_bindings() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(AtomicUsize);
        impl Detach for Counting {
            fn detach(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let ctx = ServiceContext::builder().mounted().build();
        let live = Arc::new(Counting(AtomicUsize::new(0)));
        let dropped = Arc::new(Counting(AtomicUsize::new(0)));
        let live_weak: Weak<dyn Detach> = Arc::downgrade(&live) as Weak<Counting>;
        let dropped_weak: Weak<dyn Detach> = Arc::downgrade(&dropped) as Weak<Counting>;
        ctx.track(live_weak);
        ctx.track(dropped_weak);
        drop(dropped);
        assert_eq!(ctx.tracked_bindings(), 1);

        ctx.unmount();
        assert_eq!(live.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builder_shares_metrics_with_emitter() {
        let metrics = Arc::new(MetricsRegistry::new());
        let ctx = ServiceContext::builder()
            .metrics(Arc::clone(&metrics))
            .build();

        assert!(Arc::ptr_eq(ctx.metrics(), &metrics));
        ctx.emitter().publish(
            crate::emitter::PERMISSION_ERROR,
            &crate::errors::PermissionError::new(crate::errors::Operation::Get, "a/b").into(),
        );
        assert_eq!(metrics.snapshot().errors_published, 1);
    }
}
