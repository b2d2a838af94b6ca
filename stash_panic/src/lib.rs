/*!
 * Stash Panic Hook: ships panics to the collector.
 *
 * This crate provides `install()`, which registers a custom
 * `std::panic::set_hook` handler. When a panic occurs, it:
 *
 * 1. Extracts the panic message, source location, and thread name.
 * 2. Captures a backtrace at the panic site.
 * 3. Builds a JSON event line (same shape as regular log events: `@timestamp`,
 *    `@source_host`, `@message`, `@fields`) and hands it to
 *    `stash_core::dispatch()`.
 * 4. Calls the previous panic hook (so the default stderr output is preserved).
 *
 * # Recursion safety
 *
 * The hook uses a `thread_local` boolean flag to prevent infinite recursion
 * if building or dispatching the event were to panic.
 */

use std::cell::Cell;
use std::env;
use std::panic;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Ensures `install()` is idempotent: calling it multiple times
/// won't stack hooks and produce duplicate events per panic.
static INSTALLED: AtomicBool = AtomicBool::new(false);

static SETTINGS: OnceLock<Settings> = OnceLock::new();

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/**
 * Values stamped into every panic event.
 *
 * `source_host` defaults to the `FQDN` environment variable, then
 * `HOSTNAME`, then `"unknown_hostname"`.
 */
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Name of the application sending the events.
    pub application: Option<String>,

    /// Where the event should appear to come from.
    pub source_host: Option<String>,
}

// ---------------------------------------------------------------------------
// Event document
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PanicEvent {
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "@timestamp")]
    timestamp: u64,
    #[serde(rename = "@source_host")]
    source_host: String,
    #[serde(rename = "@source_path")]
    source_path: &'static str,
    #[serde(rename = "@message")]
    message: String,
    #[serde(rename = "@fields")]
    fields: PanicFields,
}

#[derive(Debug, Serialize)]
struct PanicFields {
    thread: String,
    priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/**
 * Installs the panic hook.
 *
 * Replaces the current panic hook with one that:
 * 1. Dispatches the panic as a JSON event line.
 * 2. Forwards to the *previous* hook (preserving default behaviour).
 *
 * Idempotent: subsequent calls are silent no-ops, and the first call's
 * `settings` win.
 *
 * Must be called AFTER `stash_core::init()`: otherwise the events have
 * nowhere to go and are dropped.
 */
pub fn install(settings: Settings) {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let _ = SETTINGS.set(settings);
    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let is_recursive = IN_HOOK.with(|flag| flag.replace(true));

        if !is_recursive {
            let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                handle_panic(info);
            }));

            IN_HOOK.with(|flag| flag.set(false));
        }

        previous_hook(info);
    }));
}

// ---------------------------------------------------------------------------
// Internal: build and send the panic event
// ---------------------------------------------------------------------------

fn handle_panic(info: &PanicHookInfo) {
    let settings = SETTINGS.get().cloned().unwrap_or_default();
    let message = panic_message(info);
    let location = info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

    let bt = backtrace::Backtrace::new();
    let event = build_event(&settings, message, location, format_backtrace(&bt));

    if let Ok(line) = serde_json::to_string(&event) {
        stash_core::dispatch(line);
    }
}

fn panic_message(info: &PanicHookInfo) -> String {
    match info.payload().downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "<unknown panic>".to_string(),
        },
    }
}

fn build_event(
    settings: &Settings,
    message: String,
    location: Option<String>,
    stack_trace: Option<String>,
) -> PanicEvent {
    let thread = std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string();

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    PanicEvent {
        timestamp,
        source_host: settings
            .source_host
            .clone()
            .unwrap_or_else(source_host),
        source_path: "panic",
        message,
        fields: PanicFields {
            thread,
            priority: "FATAL",
            location,
            application: settings.application.clone(),
            stack_trace,
        },
    }
}

/**
 * Renders the backtrace one frame per line, then escapes newlines and tabs
 * so the whole trace stays on one wire line inside the JSON string.
 */
fn format_backtrace(bt: &backtrace::Backtrace) -> Option<String> {
    let mut frames = Vec::new();

    for frame in bt.frames() {
        for symbol in frame.symbols() {
            let function = symbol.name().map(|n| n.to_string());
            let file = symbol.filename().map(|p| p.display().to_string());

            let rendered = match (function, file, symbol.lineno()) {
                (None, None, _) => continue,
                (Some(f), Some(path), Some(line)) => format!("\tat {f} ({path}:{line})"),
                (Some(f), _, _) => format!("\tat {f}"),
                (None, Some(path), line) => {
                    format!("\tat {path}:{}", line.unwrap_or_default())
                }
            };
            frames.push(rendered);
        }
    }

    if frames.is_empty() {
        None
    } else {
        Some(frames.join("\n").replace('\n', "\\n").replace('\t', "\\t"))
    }
}

fn source_host() -> String {
    env::var("FQDN")
        .or_else(|_| env::var("HOSTNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "unknown_hostname".to_string())
}
