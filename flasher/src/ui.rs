//! Abstract UI surface for the flasher (spec.md §4.M supplement): the
//! touch/display hardware for the microcontroller companion is out of
//! scope here (spec.md §1), so the orchestration in [`crate::orchestrator`]
//! is driven through this trait instead of a concrete device driver.

use alloc::string::String;

use station_payload::Arch;
use station_storage::BlockDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOutcome {
    Success,
    Cancelled,
    Failed,
}

pub trait FlasherUi {
    /// Step 2: presents the enumerated targets (boot device already
    /// excluded) and returns the chosen index, or `None` if the operator
    /// backed out.
    fn select_target(&mut self, devices: &[BlockDevice]) -> Option<usize>;

    /// Step 2: presents the architectures this payload was built for.
    fn select_arch(&mut self, archs: &[Arch]) -> Option<Arch>;

    /// Step 3: requires explicit confirmation before anything destructive
    /// happens.
    fn confirm(&mut self, device: &BlockDevice, arch: Arch) -> bool;

    /// Step 8 (partial): periodic progress during GPT/format/unpack.
    fn progress(&mut self, stage: &str, current: usize, total: usize);

    /// Step 8: final result.
    fn finished(&mut self, outcome: FlashOutcome, detail: &str);
}

/// A headless implementation for tests and serial-console bring-up,
/// recording every call instead of rendering anything.
#[derive(Debug, Default)]
pub struct RecordingUi {
    pub chosen_target: Option<usize>,
    pub chosen_arch: Option<Arch>,
    pub confirmed: bool,
    pub progress_log: alloc::vec::Vec<(String, usize, usize)>,
    pub outcome: Option<(FlashOutcome, String)>,
}

impl RecordingUi {
    pub fn new(chosen_target: usize, chosen_arch: Arch, confirmed: bool) -> Self {
        Self {
            chosen_target: Some(chosen_target),
            chosen_arch: Some(chosen_arch),
            confirmed,
            progress_log: alloc::vec::Vec::new(),
            outcome: None,
        }
    }
}

impl FlasherUi for RecordingUi {
    fn select_target(&mut self, _devices: &[BlockDevice]) -> Option<usize> {
        self.chosen_target
    }

    fn select_arch(&mut self, _archs: &[Arch]) -> Option<Arch> {
        self.chosen_arch
    }

    fn confirm(&mut self, _device: &BlockDevice, _arch: Arch) -> bool {
        self.confirmed
    }

    fn progress(&mut self, stage: &str, current: usize, total: usize) {
        self.progress_log.push((String::from(stage), current, total));
    }

    fn finished(&mut self, outcome: FlashOutcome, detail: &str) {
        self.outcome = Some((outcome, String::from(detail)));
    }
}
