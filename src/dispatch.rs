//! Dispatch router - from a fired native event to one action invocation.
//!
//! Native events arrive on foreign threads: the OS hotkey dispatch thread
//! for the standard backend, the keyboard hook thread for the fallback
//! backend. Neither may run action logic. The router does a snapshot table
//! lookup and the suppression check, then hands a `HotkeyCommand` to a
//! bounded queue. The host drains that queue on its own main loop.
//!
//! ```text
//! backend thread                       host main loop
//! ──────────────                       ──────────────
//! Router::fire(combo)
//!   ├─ table snapshot lookup
//!   ├─ SuppressionGuard check
//!   └─ try_send(HotkeyCommand) ──────▶ DispatchQueue::drain()
//!                                        └─ command.execute() (if still live)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, info, warn};

use crate::keys::KeyCombination;

/// Which native mechanism serves a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// OS atomic hotkey registration
    Standard,
    /// System-wide low-level keyboard hook
    ReservedFallback,
}

impl BackendKind {
    /// Classify a combination. Bare Win keys go to the hook, everything else to the OS facility.
    pub fn for_combination(combo: &KeyCombination) -> Self {
        if combo.is_reserved() {
            Self::ReservedFallback
        } else {
            Self::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::ReservedFallback => "reserved_fallback",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an action does, for logs and for the host's bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionId {
    /// Show or hide the launcher window
    ToggleLauncher,
    /// Show the launcher with a pending query
    Query { keyword: String },
    /// Anything else the host binds
    Custom(String),
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToggleLauncher => f.write_str("toggle-launcher"),
            Self::Query { keyword } => write!(f, "query:{}", keyword),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Callback type for hotkey actions - uses Arc<dyn Fn()> for repeated invocation
pub type ActionFn = Arc<dyn Fn() + Send + Sync>;

/// An explicit command value: what to do plus the closure bound to the
/// context it needs. Invoked with no payload beyond "fired".
#[derive(Clone)]
pub struct Action {
    id: ActionId,
    callback: ActionFn,
}

impl Action {
    pub fn new<F>(id: ActionId, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            callback: Arc::new(callback),
        }
    }

    pub fn custom<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(ActionId::Custom(name.into()), callback)
    }

    pub fn id(&self) -> &ActionId {
        &self.id
    }

    pub(crate) fn invoke(&self) {
        (self.callback)();
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("id", &self.id).finish()
    }
}

/// One live binding of a combination to an action on a backend.
#[derive(Clone, Debug)]
pub struct Registration {
    combination: KeyCombination,
    backend: BackendKind,
    action: Arc<Action>,
    live: Arc<AtomicBool>,
}

impl Registration {
    pub(crate) fn new(combination: KeyCombination, backend: BackendKind, action: Action) -> Self {
        Self {
            combination,
            backend,
            action: Arc::new(action),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn combination(&self) -> KeyCombination {
        self.combination
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn action_id(&self) -> &ActionId {
        self.action.id()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Mark removed. Queued commands for this registration will be discarded.
    pub(crate) fn revoke(&self) {
        self.live.store(false, Ordering::Release);
    }
}

type TableMap = HashMap<KeyCombination, Registration>;

/// Combination → registration table.
///
/// Writers are serialized by the registry's lock and publish a whole new map;
/// readers (including the keyboard hook thread) take a lock-free snapshot.
#[derive(Default)]
pub struct RegistrationTable {
    map: ArcSwap<TableMap>,
}

impl RegistrationTable {
    pub fn snapshot(&self) -> Arc<TableMap> {
        self.map.load_full()
    }

    pub fn get(&self, combo: &KeyCombination) -> Option<Registration> {
        self.map.load().get(combo).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.load().is_empty()
    }

    /// Insert or replace. Returns the replaced registration, already revoked.
    /// Caller must hold the registry write lock.
    pub(crate) fn insert(&self, registration: Registration) -> Option<Registration> {
        let mut next = TableMap::clone(&self.map.load());
        let previous = next.insert(registration.combination, registration);
        self.map.store(Arc::new(next));
        if let Some(ref old) = previous {
            old.revoke();
        }
        previous
    }

    /// Remove. Returns the removed registration, already revoked.
    /// Caller must hold the registry write lock.
    pub(crate) fn remove(&self, combo: &KeyCombination) -> Option<Registration> {
        let current = self.map.load();
        if !current.contains_key(combo) {
            return None;
        }
        let mut next = TableMap::clone(&current);
        let removed = next.remove(combo);
        self.map.store(Arc::new(next));
        if let Some(ref old) = removed {
            old.revoke();
        }
        removed
    }
}

/// Host-owned predicate polled at fire time.
///
/// Implementations run on native threads and must answer in bounded time:
/// read an atomic, never take a contended lock.
pub trait SuppressionGuard: Send + Sync {
    fn should_suppress_dispatch(&self) -> bool;
}

impl<F> SuppressionGuard for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_suppress_dispatch(&self) -> bool {
        self()
    }
}

/// Atomic flag the host flips while hotkeys must be ignored.
#[derive(Debug, Default)]
pub struct SuppressionFlag(AtomicBool);

impl SuppressionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, suppressed: bool) {
        self.0.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl SuppressionGuard for SuppressionFlag {
    fn should_suppress_dispatch(&self) -> bool {
        self.is_set()
    }
}

/// Never suppresses.
pub struct NeverSuppress;

impl SuppressionGuard for NeverSuppress {
    fn should_suppress_dispatch(&self) -> bool {
        false
    }
}

/// A fired registration waiting for the host loop.
#[derive(Debug)]
pub struct HotkeyCommand {
    combination: KeyCombination,
    backend: BackendKind,
    action: Arc<Action>,
    live: Arc<AtomicBool>,
}

impl HotkeyCommand {
    pub fn combination(&self) -> KeyCombination {
        self.combination
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn action_id(&self) -> &ActionId {
        self.action.id()
    }

    /// Run the action unless its registration was removed or replaced since firing.
    /// Returns whether the action ran.
    pub fn execute(self) -> bool {
        if !self.live.load(Ordering::Acquire) {
            debug!(
                event_type = "hotkey_dispatch",
                combination = %self.combination,
                action = %self.action.id(),
                "Discarding fire for a registration removed after it fired"
            );
            return false;
        }
        info!(
            event_type = "hotkey_dispatch",
            combination = %self.combination,
            backend = %self.backend,
            action = %self.action.id(),
            "Invoking hotkey action"
        );
        self.action.invoke();
        true
    }
}

/// Result of a single fire, mainly for logs and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// Handed to the host queue
    Queued,
    /// Discarded by the suppression guard
    Suppressed,
    /// No live registration for this combination on this backend
    Unbound,
    /// Host queue full or closed; event dropped
    QueueFull,
}

/// Routes fired events to the host queue.
pub struct Router {
    table: Arc<RegistrationTable>,
    guard: Arc<dyn SuppressionGuard>,
    sender: Sender<HotkeyCommand>,
    /// Fires dropped since the host side last reported them
    dropped: Arc<AtomicUsize>,
}

impl Router {
    /// Create a router and the host-side queue it feeds.
    ///
    /// `capacity` bounds the number of fires waiting for the host loop;
    /// fires beyond it are dropped rather than blocking the native thread.
    pub fn new(
        table: Arc<RegistrationTable>,
        guard: Arc<dyn SuppressionGuard>,
        capacity: usize,
    ) -> (Arc<Self>, DispatchQueue) {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let router = Arc::new(Self {
            table,
            guard,
            sender,
            dropped: Arc::clone(&dropped),
        });
        (router, DispatchQueue { receiver, dropped })
    }

    pub fn table(&self) -> &Arc<RegistrationTable> {
        &self.table
    }

    /// Which backend serves this combination.
    pub fn route(&self, combo: &KeyCombination) -> BackendKind {
        BackendKind::for_combination(combo)
    }

    /// Called from backend threads when a physical key event matched.
    ///
    /// Never blocks: one snapshot load, one predicate call, one `try_send`.
    pub fn fire(&self, combo: &KeyCombination, source: BackendKind) -> FireOutcome {
        let Some(registration) = self.table.get(combo) else {
            debug!(combination = %combo, backend = %source, "Fired combination is not bound");
            return FireOutcome::Unbound;
        };
        if registration.backend != source || !registration.is_live() {
            return FireOutcome::Unbound;
        }

        if self.guard.should_suppress_dispatch() {
            debug!(
                event_type = "hotkey_fire",
                combination = %combo,
                backend = %source,
                "Hotkey suppressed by host"
            );
            return FireOutcome::Suppressed;
        }

        let command = HotkeyCommand {
            combination: registration.combination,
            backend: registration.backend,
            action: Arc::clone(&registration.action),
            live: Arc::clone(&registration.live),
        };
        match self.sender.try_send(command) {
            Ok(()) => FireOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(combination = %combo, "Hotkey dispatch queue full, dropping fire");
                FireOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(combination = %combo, "Hotkey dispatch queue closed, dropping fire");
                FireOutcome::QueueFull
            }
        }
    }
}

/// Host side of the dispatch queue. Lives on the host's main loop.
pub struct DispatchQueue {
    receiver: Receiver<HotkeyCommand>,
    dropped: Arc<AtomicUsize>,
}

impl DispatchQueue {
    /// Run every pending command on the calling thread. Returns how many actions ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(command) => {
                    if command.execute() {
                        ran += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.report_dropped();
        ran
    }

    /// Take the next pending command without running it.
    pub fn try_next(&self) -> Option<HotkeyCommand> {
        self.receiver.try_recv().ok()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Event-driven loop for async hosts: runs commands until the router is dropped.
    pub async fn run(&self) {
        while let Ok(command) = self.receiver.recv().await {
            command.execute();
            self.report_dropped();
        }
        debug!("Hotkey dispatch queue closed");
    }

    /// Blocking loop for hosts with a dedicated dispatch thread.
    pub fn run_blocking(&self) {
        while let Ok(command) = self.receiver.recv_blocking() {
            command.execute();
            self.report_dropped();
        }
        debug!("Hotkey dispatch queue closed");
    }

    /// Warn about fires dropped on overflow since the last report. Returns the count.
    pub fn report_dropped(&self) -> usize {
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!(
                event_type = "hotkey_fire",
                dropped = dropped,
                "Hotkey dispatch queue overflowed, fires dropped"
            );
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn combo(s: &str) -> KeyCombination {
        KeyCombination::parse(s).unwrap()
    }

    fn counting_action(counter: &Arc<AtomicUsize>) -> Action {
        let counter = Arc::clone(counter);
        Action::custom("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn router_with(guard: Arc<dyn SuppressionGuard>) -> (Arc<Router>, DispatchQueue) {
        Router::new(Arc::new(RegistrationTable::default()), guard, 8)
    }

    #[test]
    fn classification_routes_reserved_keys_to_fallback() {
        assert_eq!(
            BackendKind::for_combination(&combo("LWin")),
            BackendKind::ReservedFallback
        );
        assert_eq!(
            BackendKind::for_combination(&combo("RWin")),
            BackendKind::ReservedFallback
        );
        assert_eq!(
            BackendKind::for_combination(&combo("Ctrl+Alt+Space")),
            BackendKind::Standard
        );
    }

    #[test]
    fn fire_queues_and_drain_invokes() {
        let (router, queue) = router_with(Arc::new(NeverSuppress));
        let counter = Arc::new(AtomicUsize::new(0));
        let c = combo("Alt+Space");
        router
            .table()
            .insert(Registration::new(c, BackendKind::Standard, counting_action(&counter)));

        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Queued);
        // Not invoked on the firing thread
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(queue.drain(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fire_for_unbound_combination() {
        let (router, queue) = router_with(Arc::new(NeverSuppress));
        assert_eq!(
            router.fire(&combo("Alt+Space"), BackendKind::Standard),
            FireOutcome::Unbound
        );
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn fire_from_wrong_backend_is_ignored() {
        let (router, _queue) = router_with(Arc::new(NeverSuppress));
        let counter = Arc::new(AtomicUsize::new(0));
        let c = combo("LWin");
        router.table().insert(Registration::new(
            c,
            BackendKind::ReservedFallback,
            counting_action(&counter),
        ));
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Unbound);
    }

    #[test]
    fn suppression_is_checked_at_fire_time() {
        let flag = Arc::new(SuppressionFlag::new());
        let (router, queue) = router_with(flag.clone());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = combo("Ctrl+K");
        router
            .table()
            .insert(Registration::new(c, BackendKind::Standard, counting_action(&counter)));

        flag.set(true);
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Suppressed);
        // Suppressed fires are discarded, not queued for later
        flag.set(false);
        assert_eq!(queue.drain(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Queued);
        assert_eq!(queue.drain(), 1);
    }

    #[test]
    fn closure_guard() {
        let (router, _queue) = router_with(Arc::new(|| true));
        let c = combo("Ctrl+K");
        router.table().insert(Registration::new(
            c,
            BackendKind::Standard,
            Action::custom("noop", || {}),
        ));
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Suppressed);
    }

    #[test]
    fn replaced_registration_drops_in_flight_fire() {
        let (router, queue) = router_with(Arc::new(NeverSuppress));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let c = combo("Ctrl+K");

        router
            .table()
            .insert(Registration::new(c, BackendKind::Standard, counting_action(&first)));
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Queued);

        let replaced = router
            .table()
            .insert(Registration::new(c, BackendKind::Standard, counting_action(&second)));
        assert!(replaced.is_some_and(|r| !r.is_live()));

        assert_eq!(queue.drain(), 0);
        assert_eq!(first.load(Ordering::SeqCst), 0);

        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Queued);
        assert_eq!(queue.drain(), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_registration_is_never_invoked() {
        let (router, queue) = router_with(Arc::new(NeverSuppress));
        let counter = Arc::new(AtomicUsize::new(0));
        let c = combo("Ctrl+K");
        router
            .table()
            .insert(Registration::new(c, BackendKind::Standard, counting_action(&counter)));
        router.fire(&c, BackendKind::Standard);
        router.table().remove(&c);
        assert_eq!(queue.drain(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let table = Arc::new(RegistrationTable::default());
        let (router, queue) = Router::new(table, Arc::new(NeverSuppress), 1);
        let c = combo("Ctrl+K");
        router.table().insert(Registration::new(
            c,
            BackendKind::Standard,
            Action::custom("noop", || {}),
        ));
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::Queued);
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::QueueFull);
        assert_eq!(router.fire(&c, BackendKind::Standard), FireOutcome::QueueFull);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn overflow_is_counted_and_reported_from_the_host_side() {
        let table = Arc::new(RegistrationTable::default());
        let (router, queue) = Router::new(table, Arc::new(NeverSuppress), 1);
        let c = combo("Ctrl+K");
        router.table().insert(Registration::new(
            c,
            BackendKind::Standard,
            Action::custom("noop", || {}),
        ));
        router.fire(&c, BackendKind::Standard);
        router.fire(&c, BackendKind::Standard);
        router.fire(&c, BackendKind::Standard);

        assert_eq!(queue.drain(), 1);
        // drain already reported and reset the counter
        assert_eq!(queue.report_dropped(), 0);

        router.fire(&c, BackendKind::Standard);
        router.fire(&c, BackendKind::Standard);
        assert_eq!(queue.report_dropped(), 1);
        assert_eq!(queue.report_dropped(), 0);
    }

    #[test]
    fn run_blocking_exits_when_router_dropped() {
        let (router, queue) = router_with(Arc::new(NeverSuppress));
        let counter = Arc::new(AtomicUsize::new(0));
        let c = combo("Ctrl+K");
        router
            .table()
            .insert(Registration::new(c, BackendKind::Standard, counting_action(&counter)));
        router.fire(&c, BackendKind::Standard);
        router.fire(&c, BackendKind::Standard);
        drop(router);

        queue.run_blocking();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn action_id_display() {
        assert_eq!(ActionId::ToggleLauncher.to_string(), "toggle-launcher");
        assert_eq!(
            ActionId::Query {
                keyword: "wiki".to_string()
            }
            .to_string(),
            "query:wiki"
        );
    }
}
