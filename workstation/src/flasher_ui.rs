//! A keyboard/console-driven [`station_flasher::FlasherUi`] (SPEC_FULL.md
//! 4.M: the real touch/display driver belongs to the microcontroller's
//! external collaborator; this is the bring-up substitute that lets the
//! sequencing in `station_flasher::orchestrator` run against a real
//! firmware console today).

use core::fmt::Write as _;

use station_flasher::{FlashOutcome, FlasherUi};
use station_hal::console::ConsoleColor;
use station_hal::keyboard::Modifiers;
use station_hal::FirmwareServices;
use station_payload::Arch;
use station_storage::BlockDevice;

use crate::fmtbuf::LineBuffer;

pub struct ConsoleFlasherUi<'a> {
    fw: &'a FirmwareServices,
}

impl<'a> ConsoleFlasherUi<'a> {
    pub fn new(fw: &'a FirmwareServices) -> Self {
        Self { fw }
    }

    fn write_line(&self, text: &str, color: ConsoleColor) {
        self.fw.console_write(text, color);
        self.fw.console_write("\n", color);
    }

    fn read_digit(&self) -> Option<usize> {
        loop {
            let event = self.fw.keyboard_read_event(true).ok()?;
            if event.modifiers != Modifiers::empty() {
                continue;
            }
            match event.code {
                0x1B => return None, // Escape cancels selection.
                c @ (0x30..=0x39) => return Some((c - 0x30) as usize),
                _ => continue,
            }
        }
    }
}

impl<'a> FlasherUi for ConsoleFlasherUi<'a> {
    fn select_target(&mut self, devices: &[BlockDevice]) -> Option<usize> {
        self.write_line("Select a target device (0-9), Esc to cancel:", ConsoleColor::Normal);
        for (i, device) in devices.iter().enumerate() {
            let mut line = LineBuffer::new();
            let _ = write!(line, "  {i}: {} blocks, {} bytes/block", device.last_block + 1, device.block_size);
            self.write_line(line.as_str(), ConsoleColor::Normal);
        }
        self.read_digit().filter(|&i| i < devices.len())
    }

    fn select_arch(&mut self, archs: &[Arch]) -> Option<Arch> {
        self.write_line("Select an architecture (0-9), Esc to cancel:", ConsoleColor::Normal);
        for (i, arch) in archs.iter().enumerate() {
            let mut line = LineBuffer::new();
            let _ = write!(line, "  {i}: {}", arch.esp_dir_name());
            self.write_line(line.as_str(), ConsoleColor::Normal);
        }
        self.read_digit().and_then(|i| archs.get(i).copied())
    }

    fn confirm(&mut self, device: &BlockDevice, arch: Arch) -> bool {
        let mut line = LineBuffer::new();
        let _ = write!(
            line,
            "This will erase {} blocks and write {}. Press 'y' to confirm, any other key to cancel.",
            device.last_block + 1,
            arch.esp_dir_name()
        );
        self.write_line(line.as_str(), ConsoleColor::Warning);
        match self.fw.keyboard_read_event(true) {
            Ok(event) => event.code == b'y' as u16,
            Err(_) => false,
        }
    }

    fn progress(&mut self, stage: &str, current: usize, total: usize) {
        let mut line = LineBuffer::new();
        let _ = write!(line, "{stage}: {current}/{total}");
        self.write_line(line.as_str(), ConsoleColor::Normal);
    }

    fn finished(&mut self, outcome: FlashOutcome, detail: &str) {
        let color = match outcome {
            FlashOutcome::Success => ConsoleColor::Normal,
            FlashOutcome::Cancelled => ConsoleColor::Warning,
            FlashOutcome::Failed => ConsoleColor::Error,
        };
        let mut line = LineBuffer::new();
        let _ = write!(line, "{outcome:?}: {detail}");
        self.write_line(line.as_str(), color);
    }
}
