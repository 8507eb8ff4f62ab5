use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use hotkey_dispatch::config::{self, Config};
use hotkey_dispatch::fallback::HookOptions;
use hotkey_dispatch::{
    logging, BackendKind, HotkeyService, KeyCombination, LauncherHost, RegistryOptions,
};

#[derive(Parser)]
#[command(author, version, about = "Inspect, validate and run global hotkeys", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the canonical form and routing of a combination
    Parse {
        /// e.g. "ctrl+alt+space" or "LWin"
        combination: String,
    },
    /// Check whether a combination can be registered right now
    Check { combination: String },
    /// Parse every hotkey in the settings file without registering anything
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Bind every hotkey in the settings file and log fires until terminated
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Stands in for a launcher window: logs what the launcher would do.
struct ConsoleHost;

impl LauncherHost for ConsoleHost {
    fn toggle_launcher(&self) {
        info!(event_type = "launcher", action = "toggle", "Toggle launcher");
        println!("toggle launcher");
    }

    fn show_with_query(&self, keyword: &str) {
        info!(event_type = "launcher", action = "query", keyword = keyword, "Show with query");
        println!("show launcher with query '{}'", keyword);
    }

    fn should_ignore_hotkeys(&self) -> bool {
        false
    }

    fn notify(&self, title: &str, message: &str) {
        eprintln!("{}: {}", title, message);
    }
}

fn registry_options(config: &Config) -> RegistryOptions {
    RegistryOptions {
        dispatch_queue_capacity: config.engine.dispatch_queue_capacity,
        hook: HookOptions {
            swallow_reserved_keys: config.engine.swallow_reserved_keys,
        },
    }
}

fn parse(combination: &str) -> Result<()> {
    let combo = KeyCombination::parse(combination)
        .with_context(|| format!("invalid hotkey '{}'", combination))?;
    let backend = BackendKind::for_combination(&combo);
    println!("canonical: {}", combo);
    println!("display:   {}", combo.display());
    println!("backend:   {}", backend);
    println!("reserved:  {}", combo.is_reserved());
    Ok(())
}

fn check(combination: &str) -> Result<()> {
    let (service, _queue) =
        HotkeyService::with_platform(Arc::new(ConsoleHost), RegistryOptions::default())
            .context("failed to create the OS hotkey manager")?;
    let available = service.check_availability(combination);
    println!(
        "{}: {}",
        combination,
        if available { "available" } else { "unavailable" }
    );
    Ok(())
}

fn validate(path: PathBuf) -> Result<()> {
    let config = config::try_load_config(&path)?;
    let mut failures = 0;
    let entries = std::iter::once((config.hotkey.as_str(), "(toggle)")).chain(
        config
            .custom_hotkeys
            .iter()
            .map(|b| (b.hotkey.as_str(), b.action_keyword.as_str())),
    );
    for (hotkey, keyword) in entries {
        match KeyCombination::parse(hotkey) {
            Ok(combo) => println!(
                "ok    {:<24} {:<18} {}",
                combo,
                BackendKind::for_combination(&combo),
                keyword
            ),
            Err(e) => {
                failures += 1;
                println!("error {:<24} {}", hotkey, e);
            }
        }
    }
    if failures > 0 {
        bail!("{} invalid hotkey(s) in {}", failures, path.display());
    }
    Ok(())
}

fn run(path: PathBuf) -> Result<()> {
    let config = config::load_config(&path);
    let (service, queue) =
        HotkeyService::with_platform(Arc::new(ConsoleHost), registry_options(&config))
            .context("failed to create the OS hotkey manager")?;
    let report = service.initialize(&config);
    println!(
        "{} hotkey(s) bound, {} failed; press Ctrl+C to exit",
        report.bound.len(),
        report.failed.len()
    );
    for registration in service.registry().registrations() {
        println!(
            "  {:<24} {:<18} {}",
            registration.combination(),
            registration.backend(),
            registration.action_id()
        );
    }

    loop {
        platform::pump_events();
        queue.drain();
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn main() -> Result<()> {
    let _guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { combination } => parse(&combination),
        Commands::Check { combination } => check(&combination),
        Commands::Validate { config: path } => {
            validate(path.unwrap_or_else(config::default_config_path))
        }
        Commands::Run { config: path } => run(path.unwrap_or_else(config::default_config_path)),
    }
}

/// The OS hotkey facility delivers presses through the creating thread's event loop.
mod platform {
    #[cfg(target_os = "windows")]
    pub fn pump_events() {
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
        };
        // SAFETY: `msg` is a live stack value; a null window handle reads the thread queue.
        unsafe {
            let mut msg: MSG = std::mem::zeroed();
            while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    #[cfg(target_os = "macos")]
    pub fn pump_events() {
        use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};
        // SAFETY: `kCFRunLoopDefaultMode` is a valid CoreFoundation runloop mode.
        let mode = unsafe { kCFRunLoopDefaultMode };
        let _ = CFRunLoop::run_in_mode(mode, std::time::Duration::ZERO, true);
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    pub fn pump_events() {}
}
