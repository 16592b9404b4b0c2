//! The cooperative main loop (spec.md §5: "the main loop passes control
//! to exactly one component at a time... Components do not yield control
//! mid-operation"). Editor/browser/image-viewer UI specifics are out of
//! scope (spec.md §1, "deliberately out of scope"); each variant here
//! exercises only the interface the real external-collaborator UI would
//! call through.

use core::fmt::Write as _;

use station_fs::FilesystemKind;
use station_hal::console::ConsoleColor;
use station_hal::FirmwareServices;
use station_storage::block::BlockDevice;

use crate::document::{NoDocument, TextDocument};
use crate::fmtbuf::LineBuffer;
use crate::flasher_ui::ConsoleFlasherUi;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Launcher,
    Editor,
    Browser,
    Compiler,
    Flasher,
    ImageViewer,
}

/// Everything carried between one screen's exit and the next one's entry
/// — per spec.md §5, "no shared mutable state across variants beyond the
/// boot-state record".
pub struct WorkstationState {
    pub fw: FirmwareServices,
    pub volume: Option<(BlockDevice, FilesystemKind)>,
    pub settings: Settings,
    pub document: Option<TextDocument>,
}

impl WorkstationState {
    pub fn new(fw: FirmwareServices, volume: Option<(BlockDevice, FilesystemKind)>) -> Self {
        let settings = Settings::load(&fw);
        Self { fw, volume, settings, document: None }
    }

    fn write_line(&self, text: &str, color: ConsoleColor) {
        self.fw.console_write(text, color);
        self.fw.console_write("\n", color);
    }

    /// Blocks until a non-modified key is seen and returns its code.
    fn read_key(&self) -> u16 {
        loop {
            if let Ok(event) = self.fw.keyboard_read_event(true) {
                return event.code;
            }
        }
    }
}

/// Runs the launcher/dispatch loop forever — firmware reset is the only
/// exit, issued from the rebuild-reboot prompt (spec.md §4.K step 6).
pub fn run(mut state: WorkstationState) -> ! {
    loop {
        let next = show_launcher(&mut state);
        match next {
            Screen::Editor => run_editor(&mut state),
            Screen::Browser => run_browser(&state),
            Screen::Compiler => run_compiler(&mut state),
            Screen::Flasher => run_flasher(&mut state),
            Screen::ImageViewer => run_image_viewer(&state),
            Screen::Launcher => {}
        }
    }
}

fn show_launcher(state: &mut WorkstationState) -> Screen {
    let menu = if state.settings.compact_ui {
        "[1-5] screen  [r] rebuild"
    } else {
        "station: [1] editor  [2] browser  [3] compiler  [4] flasher  [5] image viewer  [r] rebuild"
    };
    state.write_line(menu, ConsoleColor::Normal);
    match state.read_key() {
        c if c == b'1' as u16 => Screen::Editor,
        c if c == b'2' as u16 => Screen::Browser,
        c if c == b'3' as u16 => Screen::Compiler,
        c if c == b'4' as u16 => Screen::Flasher,
        c if c == b'5' as u16 => Screen::ImageViewer,
        c if c == b'r' as u16 || c == b'R' as u16 => {
            run_rebuild_prompt(state);
            Screen::Launcher
        }
        c if c == b't' as u16 || c == b'T' as u16 => {
            toggle_ui_variant(state);
            Screen::Launcher
        }
        _ => Screen::Launcher,
    }
}

fn toggle_ui_variant(state: &mut WorkstationState) {
    state.settings.compact_ui = !state.settings.compact_ui;
    if let Err(e) = state.settings.save(&state.fw) {
        let mut line = LineBuffer::new();
        let _ = write!(line, "settings not persisted: {e:?}");
        state.write_line(line.as_str(), ConsoleColor::Warning);
    }
}

/// Editor screen (spec.md §1: UI specifics out of scope). Exercises the
/// interface the real editor drives: open-or-create the currently bound
/// document, append whatever raw bytes arrive from the keyboard, quit on
/// Escape back to the launcher.
fn run_editor(state: &mut WorkstationState) {
    let Some((device, kind)) = state.volume else {
        state.write_line("no volume mounted; cannot edit", ConsoleColor::Error);
        return;
    };
    if state.document.is_none() {
        state.document = Some(TextDocument::new(state.fw, device, kind, "/src/app/editor.c"));
    }
    state.write_line("editing /src/app/editor.c — type to append, Esc to return", ConsoleColor::Normal);
    loop {
        let code = state.read_key();
        if code == 0x1B {
            return;
        }
        if let Some(ch) = char::from_u32(code as u32) {
            if let Some(doc) = state.document.as_mut() {
                let mut s = [0u8; 4];
                doc.insert_str(ch.encode_utf8(&mut s));
            }
        }
    }
}

/// Browser screen (spec.md §1: UI specifics out of scope). Exercises the
/// interface the real file browser drives: list the mounted volume's root
/// directory.
fn run_browser(state: &WorkstationState) {
    let Some((device, kind)) = state.volume else {
        state.write_line("no volume mounted", ConsoleColor::Error);
        return;
    };
    let mut io = station_fs::FirmwareBlockIo { fw: &state.fw, device };
    match station_fs::readdir(&mut io, kind) {
        Ok(entries) => {
            for entry in &entries {
                let mut line = LineBuffer::new();
                let _ = write!(line, "{}{}", entry.name, if entry.is_directory { "/" } else { "" });
                state.write_line(line.as_str(), ConsoleColor::Normal);
            }
        }
        Err(e) => {
            let mut line = LineBuffer::new();
            let _ = write!(line, "readdir failed: {e:?}");
            state.write_line(line.as_str(), ConsoleColor::Error);
        }
    }
}

/// Compiler screen (spec.md §4.J): compiles and runs the currently open
/// document's text as a C source buffer.
fn run_compiler(state: &mut WorkstationState) {
    let Some(document) = state.document.as_ref() else {
        state.write_line("no document open; use the editor first", ConsoleColor::Error);
        return;
    };
    let outcome = unsafe { station_runtime::run_source(&state.fw, document.path(), document.text(), state.volume) };
    let mut line = LineBuffer::new();
    let _ = write!(line, "exit_code={} success={}", outcome.exit_code, outcome.success);
    state.write_line(line.as_str(), if outcome.success { ConsoleColor::Normal } else { ConsoleColor::Error });
    if !outcome.error_msg.is_empty() {
        state.write_line(&outcome.error_msg, ConsoleColor::Error);
    }
}

/// Flasher screen (spec.md §4.M): reads a SURV payload blob from a fixed
/// well-known path on the mounted volume (this workstation has no second
/// attachment point for "the SD card with the payload on it" — that
/// belongs to the microcontroller side spec.md §1 places out of scope)
/// and runs the full enumerate/GPT/format/unpack sequence against it.
fn run_flasher(state: &mut WorkstationState) {
    const PAYLOAD_PATH: &str = "/station-payload.bin";
    let Some((device, kind)) = state.volume else {
        state.write_line("no volume mounted; cannot load a payload to flash", ConsoleColor::Error);
        return;
    };
    let mut io = station_fs::FirmwareBlockIo { fw: &state.fw, device };
    let blob = match station_fs::readfile(&mut io, kind, PAYLOAD_PATH) {
        Ok(bytes) => bytes,
        Err(e) => {
            let mut line = LineBuffer::new();
            let _ = write!(line, "no payload at {PAYLOAD_PATH} ({e:?})");
            state.write_line(line.as_str(), ConsoleColor::Warning);
            return;
        }
    };
    let payload = match station_payload::PayloadView::parse(&blob) {
        Ok(view) => view,
        Err(e) => {
            let mut line = LineBuffer::new();
            let _ = write!(line, "payload parse failed: {e:?}");
            state.write_line(line.as_str(), ConsoleColor::Error);
            return;
        }
    };
    let seed = blob.as_ptr() as u64 ^ state.fw.boot_image_handle().0 as u64;
    let mut ui = ConsoleFlasherUi::new(&state.fw);
    station_flasher::flash(&state.fw, &payload, &mut ui, seed);
}

fn run_image_viewer(state: &WorkstationState) {
    state.write_line("image viewing is outside this workstation's core (spec.md 1)", ConsoleColor::Normal);
}

fn run_rebuild_prompt(state: &WorkstationState) {
    let Some((device, kind)) = state.volume else {
        state.write_line("no volume mounted; cannot rebuild", ConsoleColor::Error);
        return;
    };
    if !matches!(kind, FilesystemKind::Fat32) {
        state.write_line("rebuild requires a writable FAT32 volume", ConsoleColor::Error);
        return;
    }
    state.write_line("rebuilding...", ConsoleColor::Normal);
    let mut io = station_fs::FirmwareBlockIo { fw: &state.fw, device };
    let mut doc = NoDocument;
    match station_runtime::rebuild(&mut io, &mut doc) {
        station_runtime::RebuildResult::Ok => {
            state.write_line("rebuild succeeded. Press 'r' again to reboot into it, any other key to stay.", ConsoleColor::Normal);
            if state.read_key() == b'r' as u16 {
                station_runtime::rebuild::reboot(&state.fw);
            }
        }
        station_runtime::RebuildResult::ErrorSummary(summary) => {
            state.write_line(&summary, ConsoleColor::Error);
        }
    }
}
