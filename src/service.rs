//! Launcher-facing hotkey service.
//!
//! Wires settings to the registry: the primary toggle hotkey, the custom
//! query hotkeys, settings-change rebinds and the availability probe used by
//! the hotkey editor. Bind failures are surfaced through the host's
//! notification channel and never abort startup.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, CustomBinding};
use crate::dispatch::{Action, ActionId, DispatchQueue, SuppressionGuard};
use crate::error::{BindError, ResultExt};
use crate::fallback::{HookInstaller, PlatformHookInstaller};
use crate::keys::{normalize, KeyCombination};
use crate::registry::{HotkeyRegistry, LoadReport, RegistryOptions};
use crate::standard::{GlobalHotKeyApi, HotkeyApi};

/// What the launcher exposes to its hotkeys.
///
/// Actions run on whichever thread drains the `DispatchQueue`.
/// `should_ignore_hotkeys` is polled from native input threads and must
/// answer without blocking.
pub trait LauncherHost: Send + Sync + 'static {
    fn toggle_launcher(&self);
    /// Show the launcher with `keyword` as the pending query.
    fn show_with_query(&self, keyword: &str);
    fn should_ignore_hotkeys(&self) -> bool;
    fn notify(&self, title: &str, message: &str);
}

struct HostSuppression<H>(Arc<H>);

impl<H: LauncherHost> SuppressionGuard for HostSuppression<H> {
    fn should_suppress_dispatch(&self) -> bool {
        self.0.should_ignore_hotkeys()
    }
}

pub struct HotkeyService<H: LauncherHost> {
    host: Arc<H>,
    registry: HotkeyRegistry,
}

impl<H: LauncherHost> HotkeyService<H> {
    pub fn new(
        host: Arc<H>,
        api: Box<dyn HotkeyApi>,
        installer: Box<dyn HookInstaller>,
        options: RegistryOptions,
    ) -> (Self, DispatchQueue) {
        let guard = Arc::new(HostSuppression(Arc::clone(&host)));
        let (registry, queue) = HotkeyRegistry::new(api, installer, guard, options);
        (Self { host, registry }, queue)
    }

    /// Service over the real OS hotkey facility and keyboard hook.
    ///
    /// NOTE: Must be called on the thread that runs the platform event loop.
    pub fn with_platform(
        host: Arc<H>,
        options: RegistryOptions,
    ) -> Result<(Self, DispatchQueue), global_hotkey::Error> {
        let api = GlobalHotKeyApi::new()?;
        Ok(Self::new(
            host,
            Box::new(api),
            Box::new(PlatformHookInstaller),
            options,
        ))
    }

    pub fn registry(&self) -> &HotkeyRegistry {
        &self.registry
    }

    /// Bind the toggle hotkey and every custom hotkey from `config`.
    pub fn initialize(&self, config: &Config) -> LoadReport {
        let mut report = LoadReport::default();
        match self.bind_toggle(&config.hotkey) {
            Ok(combo) => report.bound.push(combo),
            Err(e) => report.failed.push(e),
        }
        let custom = self.bind_custom(config.custom_hotkeys.iter());
        report.bound.extend(custom.bound);
        report.failed.extend(custom.failed);

        info!(
            event_type = "app_lifecycle",
            action = "hotkeys_initialized",
            bound = report.bound.len(),
            failed = report.failed.len(),
            "Hotkeys initialized"
        );
        report
    }

    /// Settings change of the primary toggle hotkey.
    pub fn set_toggle_hotkey(&self, old: &str, new: &str) -> Result<KeyCombination, BindError> {
        let unchanged = matches!((normalize(old), normalize(new)), (Ok(a), Ok(b)) if a == b);
        if !unchanged && !old.trim().is_empty() {
            self.registry.unbind(old).warn_on_err();
        }
        self.bind_toggle(new)
    }

    /// Settings change of the custom hotkey list.
    ///
    /// Entries missing from `new` are unbound first, then new or changed entries are bound.
    pub fn replace_custom_bindings(
        &self,
        old: &[CustomBinding],
        new: &[CustomBinding],
    ) -> LoadReport {
        let key = |b: &CustomBinding| {
            normalize(&b.hotkey)
                .ok()
                .map(|combo| (combo, b.action_keyword.clone()))
        };
        let new_keys: Vec<_> = new.iter().filter_map(key).collect();
        let old_keys: Vec<_> = old.iter().filter_map(key).collect();

        for removed in old_keys.iter().filter(|k| !new_keys.contains(k)) {
            self.registry.unbind(&removed.0).warn_on_err();
        }
        let added = new
            .iter()
            .filter(|b| key(*b).map_or(true, |k| !old_keys.contains(&k)));
        self.bind_custom(added)
    }

    /// Whether `combination` could be bound right now. Unparsable strings are unavailable.
    pub fn check_availability(&self, combination: &str) -> bool {
        match KeyCombination::parse(combination) {
            Ok(combo) => self.registry.check_availability(&combo),
            Err(e) => {
                info!(combination = combination, error = %e, "Unparsable hotkey is unavailable");
                false
            }
        }
    }

    /// Remove one hotkey. Empty strings are ignored.
    pub fn remove_hotkey(&self, combination: &str) {
        if combination.trim().is_empty() {
            return;
        }
        self.registry.unbind(combination).warn_on_err();
    }

    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    fn bind_toggle(&self, combination: &str) -> Result<KeyCombination, BindError> {
        let host = Arc::clone(&self.host);
        let action = Action::new(ActionId::ToggleLauncher, move || host.toggle_launcher());
        self.registry
            .bind(combination, action)
            .inspect_err(|e| self.surface(e))
    }

    fn bind_custom<'a>(&self, bindings: impl Iterator<Item = &'a CustomBinding>) -> LoadReport {
        let entries: Vec<(String, Action)> = bindings
            .map(|binding| {
                let host = Arc::clone(&self.host);
                let keyword = binding.action_keyword.clone();
                let action = Action::new(
                    ActionId::Query {
                        keyword: keyword.clone(),
                    },
                    move || host.show_with_query(&keyword),
                );
                (binding.hotkey.clone(), action)
            })
            .collect();
        let report = self.registry.load_custom_bindings(entries);
        for e in &report.failed {
            self.surface(e);
        }
        report
    }

    fn surface(&self, e: &BindError) {
        warn!(
            combination = e.combination(),
            severity = ?e.severity(),
            error = %e,
            "Surfacing hotkey failure"
        );
        self.host.notify(e.title(), &e.user_message());
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
