//! Listener slot shared by document and collection bindings.
//!
//! Every attach bumps a generation counter. Callbacks capture the
//! generation they were attached under and are discarded once it is no
//! longer current, so a listener that was replaced (or a late callback
//! from one) can never overwrite the state of its successor.
//!
//! Lock discipline: the slot mutex is held only to read or update the
//! slot and to push a new state to observers. It is never held across a
//! backend call or an emitter publish, since backends may deliver
//! synchronously from inside `listen_*`.
//!
//! Every state transition is pushed to each observer in order. Observers
//! read an unbounded channel, so a loading state followed immediately by
//! a synchronous delivery is seen as two transitions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::context::{Detach, Identity, ServiceContext};
use crate::emitter::ErrorEmitter;
use crate::errors::SubscriptionError;
use crate::observability::{Event, MetricsRegistry};
use crate::store::{DocumentPath, ListenerRegistration, Query};

use super::state::SubscriptionResult;

/// Something a binding can be pointed at
pub(crate) trait Locator: Clone + PartialEq + Send + 'static {
    /// Path reported in errors and logs
    fn resource_path(&self) -> String;
}

impl Locator for DocumentPath {
    fn resource_path(&self) -> String {
        self.as_str().to_string()
    }
}

impl Locator for Query {
    fn resource_path(&self) -> String {
        self.collection().as_str().to_string()
    }
}

struct Slot<L, V> {
    generation: u64,
    locator: Option<L>,
    path: String,
    /// Detached by an unmount; the next watch re-attaches even if the
    /// locator is unchanged
    suspended: bool,
    registration: Option<ListenerRegistration>,
    current: SubscriptionResult<V>,
    observers: Vec<mpsc::UnboundedSender<SubscriptionResult<V>>>,
}

impl<L, V: Clone> Slot<L, V> {
    fn set(&mut self, result: SubscriptionResult<V>) {
        self.observers
            .retain(|observer| observer.send(result.clone()).is_ok());
        self.current = result;
    }

    fn settle_idle(&mut self) {
        if !self.current.is_idle() {
            self.set(SubscriptionResult::idle());
        }
    }
}

struct Shared<L, V> {
    slot: Mutex<Slot<L, V>>,
    metrics: Arc<MetricsRegistry>,
}

impl<L, V> Shared<L, V> {
    fn lock(&self) -> MutexGuard<'_, Slot<L, V>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, registration: ListenerRegistration, path: &str) {
        if !registration.is_active() {
            return;
        }
        registration.remove();
        self.metrics.increment_listeners_released();
        Event::ListenerReleased.emit(&[("path", path)]);
    }
}

impl<L, V: Clone> Shared<L, V> {
    /// Invalidate the current generation, settle to idle and release the
    /// listener. `keep_locator` leaves the binding pointed at its locator.
    fn reset(&self, keep_locator: bool) {
        let previous = {
            let mut slot = self.lock();
            slot.generation += 1;
            slot.suspended = keep_locator && slot.locator.is_some();
            if !keep_locator {
                slot.locator = None;
            }
            let path = if keep_locator {
                slot.path.clone()
            } else {
                std::mem::take(&mut slot.path)
            };
            slot.settle_idle();
            slot.registration.take().map(|r| (r, path))
        };
        if let Some((registration, path)) = previous {
            self.release(registration, &path);
        }
    }
}

impl<L, V> Detach for Shared<L, V>
where
    L: Send,
    V: Clone + Send,
{
    fn detach(&self) {
        self.reset(true);
    }
}

pub(crate) struct LiveState<L, V> {
    shared: Arc<Shared<L, V>>,
    emitter: Arc<ErrorEmitter>,
    metrics: Arc<MetricsRegistry>,
}

impl<L, V> LiveState<L, V>
where
    L: Locator,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(ctx: &ServiceContext) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                generation: 0,
                locator: None,
                path: String::new(),
                suspended: false,
                registration: None,
                current: SubscriptionResult::idle(),
                observers: Vec::new(),
            }),
            metrics: Arc::clone(ctx.metrics()),
        });
        let tracked: Weak<dyn Detach> = Arc::downgrade(&shared) as Weak<Shared<L, V>>;
        ctx.track(tracked);

        Self {
            shared,
            emitter: Arc::clone(ctx.emitter()),
            metrics: Arc::clone(ctx.metrics()),
        }
    }

    /// Point the slot at `locator`, attaching through `attach`.
    ///
    /// A `None` locator, or a context whose services are unavailable,
    /// releases the listener and settles to idle. Re-watching the current
    /// locator is a no-op unless `force` is set.
    pub(crate) fn watch<F>(&self, ctx: &ServiceContext, locator: Option<L>, force: bool, attach: F)
    where
        F: FnOnce(&L, Sink<L, V>, Option<Identity>) -> ListenerRegistration,
    {
        let Some(locator) = locator.filter(|_| ctx.are_services_available()) else {
            self.clear();
            return;
        };

        let path = locator.resource_path();
        let Some((generation, previous)) = self.begin(&locator, &path, force) else {
            return;
        };
        if let Some((registration, old_path)) = previous {
            self.shared.release(registration, &old_path);
        }

        let sink = Sink {
            shared: Arc::downgrade(&self.shared),
            generation,
            path: path.clone(),
            emitter: Arc::clone(&self.emitter),
            metrics: Arc::clone(&self.metrics),
        };
        let registration = attach(&locator, sink, ctx.identity());
        self.install(generation, registration, &path);
    }

    /// Bump the generation and switch to loading.
    ///
    /// Returns the new generation and the registration it replaced, or
    /// `None` if nothing needs to change.
    fn begin(
        &self,
        locator: &L,
        path: &str,
        force: bool,
    ) -> Option<(u64, Option<(ListenerRegistration, String)>)> {
        let mut slot = self.shared.lock();
        if !force && !slot.suspended && slot.locator.as_ref() == Some(locator) {
            return None;
        }

        let old_path = std::mem::replace(&mut slot.path, path.to_string());
        let previous = slot.registration.take().map(|r| (r, old_path));
        slot.generation += 1;
        slot.suspended = false;
        slot.locator = Some(locator.clone());
        slot.set(SubscriptionResult::loading());
        Some((slot.generation, previous))
    }

    /// Store the registration for `generation`, or remove it if a newer
    /// watch already superseded it.
    fn install(&self, generation: u64, registration: ListenerRegistration, path: &str) {
        if registration.is_active() {
            self.metrics.increment_listeners_attached();
            Event::ListenerAttached.emit(&[
                ("generation", generation.to_string().as_str()),
                ("path", path),
            ]);
        }

        let superseded = {
            let mut slot = self.shared.lock();
            if slot.generation == generation {
                slot.registration = Some(registration);
                None
            } else {
                Some(registration)
            }
        };
        if let Some(registration) = superseded {
            self.shared.release(registration, path);
        }
    }

    /// Release any listener and settle to idle
    pub(crate) fn clear(&self) {
        self.shared.reset(false);
    }

    pub(crate) fn locator(&self) -> Option<L> {
        self.shared.lock().locator.clone()
    }

    pub(crate) fn current(&self) -> SubscriptionResult<V> {
        self.shared.lock().current.clone()
    }

    /// Receive every transition from now on, in order
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<SubscriptionResult<V>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().observers.push(tx);
        rx
    }
}

impl<L, V> Drop for LiveState<L, V> {
    fn drop(&mut self) {
        let previous = {
            let mut slot = self.shared.lock();
            slot.generation += 1;
            let path = std::mem::take(&mut slot.path);
            slot.registration.take().map(|r| (r, path))
        };
        if let Some((registration, path)) = previous {
            self.shared.release(registration, &path);
        }
    }
}

/// Write end handed to a backend callback for one generation
pub(crate) struct Sink<L, V> {
    shared: Weak<Shared<L, V>>,
    generation: u64,
    path: String,
    emitter: Arc<ErrorEmitter>,
    metrics: Arc<MetricsRegistry>,
}

impl<L, V: Clone> Sink<L, V> {
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Replace the binding state if this sink is still current
    fn settle(&self, result: SubscriptionResult<V>) -> bool {
        let applied = match self.shared.upgrade() {
            Some(shared) => {
                let mut slot = shared.lock();
                if slot.generation == self.generation {
                    slot.set(result);
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !applied {
            self.metrics.increment_stale_callbacks();
            Event::StaleCallbackDropped.emit(&[
                ("generation", self.generation.to_string().as_str()),
                ("path", self.path.as_str()),
            ]);
        }
        applied
    }

    pub(crate) fn deliver(&self, data: Option<V>) {
        if self.settle(SubscriptionResult::ready(data)) {
            self.metrics.increment_snapshots_applied();
            Event::SnapshotApplied.emit(&[("path", self.path.as_str())]);
        }
    }

    /// Record `error` locally, then publish it
    pub(crate) fn fail(&self, error: SubscriptionError) {
        if !self.settle(SubscriptionResult::failed(error.clone())) {
            return;
        }

        match &error {
            SubscriptionError::Permission(e) => {
                self.metrics.increment_permission_denials();
                let cause = e.cause.map(|c| c.as_str()).unwrap_or("unknown");
                Event::PermissionDenied.emit(&[
                    ("cause", cause),
                    ("operation", e.operation.as_str()),
                    ("path", self.path.as_str()),
                ]);
            }
            SubscriptionError::Decode(e) => {
                self.metrics.increment_decode_failures();
                Event::DecodeFailed.emit(&[("message", e.message.as_str()), ("path", self.path.as_str())]);
            }
        }
        self.emitter.publish_error(&error);
    }
}
