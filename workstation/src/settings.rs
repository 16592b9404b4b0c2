//! Persisted application settings (spec.md §3 "Persisted state"): a
//! single Boolean flag for UI variant, backed by the firmware variable
//! store, tolerating an empty store as initial defaults.

use station_hal::{FirmwareServices, FwResult};

const VARIABLE_NAME: &str = "StationSettings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub compact_ui: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { compact_ui: false }
    }
}

impl Settings {
    /// Reads the settings record. A `NotFound` or any other read failure
    /// falls back to defaults rather than blocking boot — the record may
    /// genuinely never have been written yet.
    pub fn load(fw: &FirmwareServices) -> Self {
        let mut buf = [0u8; 1];
        match fw.get_variable(VARIABLE_NAME, &mut buf) {
            Ok(n) if n >= 1 => Self { compact_ui: buf[0] != 0 },
            _ => Self::default(),
        }
    }

    pub fn save(&self, fw: &FirmwareServices) -> FwResult<()> {
        let buf = [self.compact_ui as u8];
        fw.set_variable(VARIABLE_NAME, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_non_compact() {
        assert_eq!(Settings::default(), Settings { compact_ui: false });
    }
}
