//! Hotkey registry - the single bind/unbind/probe surface over both backends.
//!
//! Each combination is either unbound or bound to exactly one action on one
//! backend. Writers (`bind`, `unbind`, `shutdown`, the availability probe)
//! are serialized by one lock; dispatch reads the registration table through
//! lock-free snapshots and never waits on that lock.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::dispatch::{
    Action, BackendKind, DispatchQueue, Registration, RegistrationTable, Router, SuppressionGuard,
};
use crate::error::BindError;
use crate::fallback::{FallbackBackend, HookInstaller, HookOptions};
use crate::keys::KeyCombination;
use crate::standard::{HotkeyApi, StandardBackend};

/// Identifier the availability probe registers under. Never used by a binding.
pub const AVAILABILITY_SENTINEL_ID: &str = "HotkeyAvailabilityTest";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryOptions {
    pub dispatch_queue_capacity: usize,
    pub hook: HookOptions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            dispatch_queue_capacity: crate::config::DEFAULT_DISPATCH_QUEUE_CAPACITY,
            hook: HookOptions::default(),
        }
    }
}

/// Result of loading a batch of bindings. Failures do not stop the batch.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub bound: Vec<KeyCombination>,
    pub failed: Vec<BindError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Unregisters the availability sentinel on every exit path of the probe.
struct SentinelGuard<'a> {
    standard: &'a StandardBackend,
}

impl Drop for SentinelGuard<'_> {
    fn drop(&mut self) {
        self.standard.unregister(AVAILABILITY_SENTINEL_ID);
    }
}

pub struct HotkeyRegistry {
    write_lock: Mutex<()>,
    table: Arc<RegistrationTable>,
    router: Arc<Router>,
    standard: StandardBackend,
    fallback: FallbackBackend,
}

impl HotkeyRegistry {
    /// Build the registry and the queue the host drains on its main loop.
    pub fn new(
        api: Box<dyn HotkeyApi>,
        installer: Box<dyn HookInstaller>,
        guard: Arc<dyn SuppressionGuard>,
        options: RegistryOptions,
    ) -> (Self, DispatchQueue) {
        let table = Arc::new(RegistrationTable::default());
        let (router, queue) =
            Router::new(Arc::clone(&table), guard, options.dispatch_queue_capacity);
        let standard = StandardBackend::new(api, Arc::clone(&router));
        let fallback = FallbackBackend::new(installer, Arc::clone(&router), options.hook);
        let registry = Self {
            write_lock: Mutex::new(()),
            table,
            router,
            standard,
            fallback,
        };
        (registry, queue)
    }

    /// Bind `combination` to `action`, replacing any existing binding for it.
    ///
    /// Returns the canonical combination that was bound.
    #[instrument(skip(self, action), fields(action = %action.id()))]
    pub fn bind(&self, combination: &str, action: Action) -> Result<KeyCombination, BindError> {
        let combo = KeyCombination::parse(combination).map_err(|source| BindError::Parse {
            combination: combination.to_string(),
            source,
        })?;
        self.bind_combination(combination, combo, action)?;
        Ok(combo)
    }

    fn bind_combination(
        &self,
        original: &str,
        combo: KeyCombination,
        action: Action,
    ) -> Result<(), BindError> {
        let _write = self.write_lock.lock();
        let backend = self.router.route(&combo);

        match backend {
            BackendKind::Standard => self
                .standard
                .register(&combo.to_string(), combo)
                .map_err(|source| BindError::Register {
                    combination: original.to_string(),
                    source,
                })?,
            BackendKind::ReservedFallback => {
                self.fallback
                    .register(combo)
                    .map_err(|source| BindError::HookUnavailable {
                        combination: original.to_string(),
                        source,
                    })?
            }
        }

        let action_id = action.id().clone();
        let replaced = self
            .table
            .insert(Registration::new(combo, backend, action));

        info!(
            event_type = "hotkey_bind",
            combination = %combo,
            backend = %backend,
            action = %action_id,
            replaced = replaced.is_some(),
            "Hotkey bound"
        );
        Ok(())
    }

    /// Remove the binding for `combination`. Returns whether one existed.
    pub fn unbind(&self, combination: &str) -> Result<bool, BindError> {
        let combo = KeyCombination::parse(combination).map_err(|source| BindError::Parse {
            combination: combination.to_string(),
            source,
        })?;
        Ok(self.unbind_combination(&combo))
    }

    pub fn unbind_combination(&self, combo: &KeyCombination) -> bool {
        let _write = self.write_lock.lock();
        // Table first: once removed, queued fires for it are discarded
        let Some(removed) = self.table.remove(combo) else {
            return false;
        };
        match removed.backend() {
            BackendKind::Standard => self.standard.unregister(&combo.to_string()),
            BackendKind::ReservedFallback => self.fallback.unregister(combo),
        }
        info!(
            event_type = "hotkey_unbind",
            combination = %combo,
            backend = %removed.backend(),
            "Hotkey unbound"
        );
        true
    }

    /// Probe whether `combo` could be bound right now, without binding it.
    ///
    /// Standard combinations do a register/unregister round trip under a
    /// private identifier; nothing stays registered whatever the outcome.
    /// Reserved combinations are available unless already bound here.
    pub fn check_availability(&self, combo: &KeyCombination) -> bool {
        let _write = self.write_lock.lock();
        let available = match self.router.route(combo) {
            BackendKind::ReservedFallback => !self.fallback.is_registered(combo),
            BackendKind::Standard => {
                let _sentinel = SentinelGuard {
                    standard: &self.standard,
                };
                self.standard
                    .register(AVAILABILITY_SENTINEL_ID, *combo)
                    .is_ok()
            }
        };
        info!(
            event_type = "hotkey_probe",
            combination = %combo,
            available = available,
            "Hotkey availability checked"
        );
        available
    }

    /// Bind every entry. A failing entry is logged and reported; the rest still bind.
    pub fn load_custom_bindings<I>(&self, bindings: I) -> LoadReport
    where
        I: IntoIterator<Item = (String, Action)>,
    {
        let mut report = LoadReport::default();
        for (combination, action) in bindings {
            match self.bind(&combination, action) {
                Ok(combo) => report.bound.push(combo),
                Err(e) => {
                    warn!(
                        event_type = "hotkey_bind",
                        combination = e.combination(),
                        error = %e,
                        "Failed to bind hotkey"
                    );
                    report.failed.push(e);
                }
            }
        }
        if !report.is_complete() {
            warn!(
                bound = report.bound.len(),
                failed = report.failed.len(),
                "Some hotkeys could not be bound"
            );
        }
        report
    }

    /// Remove every binding and release every native handle and hook. Idempotent.
    pub fn shutdown(&self) {
        let _write = self.write_lock.lock();
        let snapshot = self.table.snapshot();
        for combo in snapshot.keys() {
            self.table.remove(combo);
        }
        self.standard.unregister_all();
        self.fallback.unregister_all();
        info!(
            event_type = "app_lifecycle",
            action = "hotkeys_released",
            released = snapshot.len(),
            "All hotkeys released"
        );
    }

    pub fn is_bound(&self, combo: &KeyCombination) -> bool {
        self.table.get(combo).is_some()
    }

    pub fn backend_of(&self, combo: &KeyCombination) -> Option<BackendKind> {
        self.table.get(combo).map(|r| r.backend())
    }

    pub fn registration(&self, combo: &KeyCombination) -> Option<Registration> {
        self.table.get(combo)
    }

    /// All live registrations, ordered by combination.
    pub fn registrations(&self) -> Vec<Registration> {
        let mut all: Vec<Registration> = self.table.snapshot().values().cloned().collect();
        all.sort_by_key(|r| r.combination());
        all
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn standard_handle_count(&self) -> usize {
        self.standard.active_count()
    }

    pub fn is_hook_installed(&self) -> bool {
        self.fallback.is_hook_installed()
    }
}

impl Drop for HotkeyRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
