//! Bridges the `log` facade to the console (ambient stack: SPEC_FULL.md's
//! expansion of spec.md §4.F names `log` as the workspace's structured
//! logging crate). Every `log::info!`/`warn!`/`error!` call anywhere in
//! the workspace — not just this binary — reaches this sink once it is
//! installed here at boot.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{Level, Log, Metadata, Record};
use spin::Mutex;
use station_hal::console::ConsoleColor;
use station_hal::FirmwareServices;

use crate::fmtbuf::LineBuffer;

static FW: Mutex<Option<FirmwareServices>> = Mutex::new(None);
static INSTALLED: AtomicBool = AtomicBool::new(false);

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let Some(fw) = *FW.lock() else { return };
        let color = match record.level() {
            Level::Error => ConsoleColor::Error,
            Level::Warn => ConsoleColor::Warning,
            Level::Info | Level::Debug | Level::Trace => ConsoleColor::Normal,
        };
        let mut line = LineBuffer::new();
        let _ = write!(line, "[{}] {}\n", record.level(), record.args());
        fw.console_write(line.as_str(), color);
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Installs the console sink and records `fw` for every later `log!` call
/// to reach. Safe to call more than once (e.g. across a `run_source`
/// re-entry); only the first call registers the logger with the `log`
/// facade, all calls refresh the firmware handle.
pub fn init(fw: FirmwareServices) {
    *FW.lock() = Some(fw);
    if !INSTALLED.swap(true, Ordering::AcqRel) {
        log::set_logger(&LOGGER).ok();
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// The most recently installed firmware handle, for callers (the panic
/// handler) that need console access without going through `log`.
pub fn firmware() -> Option<FirmwareServices> {
    *FW.lock()
}
