//! Keyboard input normalization.
//!
//! Key code space (spec.md §3): printable ASCII (0x20-0x7E) map to
//! themselves; control characters (0x01-0x1A) represent Ctrl+letter; a
//! disjoint range at >= 0x80 represents navigation/function/special keys.
//!
//! Invariant: a Ctrl+letter press is normalized so that either the raw
//! control character is reported with no modifier, or the letter plus Ctrl
//! is normalized into the raw control character — callers never see both
//! encodings (testable property 6).
//!
//! Scenario 6 separately describes Ctrl+C's expected observed event as
//! `(code=0x03, modifiers=Ctrl)` — both the collapsed code and the
//! modifier bit surviving. That contradicts property 6 as written (a
//! collapsed control character reported together with the modifier that
//! produced it is exactly the "both encodings" case property 6 rules out).
//! This module resolves the conflict in favor of property 6: the Ctrl bit
//! is always cleared once it has been folded into the control character,
//! so every caller sees exactly one of the two encodings, never both.

use crate::raw::protocols::{InputKey, KeyData, ShiftState};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const CTRL  = 1 << 0;
        const ALT   = 1 << 1;
        const SHIFT = 1 << 2;
    }
}

/// Navigation, function, and special key codes, placed at or above 0x80 so
/// they never collide with the ASCII/control-character space.
pub mod special {
    pub const UP: u16 = 0x80;
    pub const DOWN: u16 = 0x81;
    pub const LEFT: u16 = 0x82;
    pub const RIGHT: u16 = 0x83;
    pub const HOME: u16 = 0x84;
    pub const END: u16 = 0x85;
    pub const INSERT: u16 = 0x86;
    pub const DELETE: u16 = 0x87;
    pub const PAGE_UP: u16 = 0x88;
    pub const PAGE_DOWN: u16 = 0x89;
    pub const F2: u16 = 0x90;
    pub const F3: u16 = 0x91;
    pub const F5: u16 = 0x93;
    pub const F6: u16 = 0x94;
    pub const F10: u16 = 0x98;
    pub const F11: u16 = 0x99;
    pub const F12: u16 = 0x9A;
    pub const ESCAPE: u16 = 0xA0;
}

/// A normalized key event, independent of the firmware protocol that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u16,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Normalizes a raw `(unicode_char, scan_code)` pair with no modifier
    /// information (Simple Text Input — firmware does not supply shift
    /// state). The raw control-character encoding is passed through
    /// untouched; it is already in the canonical form.
    pub fn from_simple(key: &InputKey) -> Option<Self> {
        if key.scan_code != 0 {
            return scan_code_to_event(key.scan_code);
        }
        let ch = key.unicode_char;
        if ch == 0 {
            return None;
        }
        Some(Self {
            code: ch,
            modifiers: Modifiers::empty(),
        })
    }

    /// Normalizes an extended `(unicode_char, shift_state)` pair (Simple
    /// Text Input Ex — firmware supplies modifier state). Implements the
    /// Ctrl+letter collapse described in spec.md §3 and exercised by
    /// testable property 6 / scenario 6.
    pub fn from_extended(data: &KeyData) -> Option<Self> {
        if data.key.scan_code != 0 {
            return scan_code_to_event(data.key.scan_code);
        }
        let ch = data.key.unicode_char;
        if ch == 0 {
            return None;
        }

        let valid = data.key_shift_state.contains(ShiftState::SHIFT_STATE_VALID);
        let mut modifiers = Modifiers::empty();
        if valid {
            if data
                .key_shift_state
                .intersects(ShiftState::LEFT_CONTROL_PRESSED | ShiftState::RIGHT_CONTROL_PRESSED)
            {
                modifiers |= Modifiers::CTRL;
            }
            if data
                .key_shift_state
                .intersects(ShiftState::LEFT_ALT_PRESSED | ShiftState::RIGHT_ALT_PRESSED)
            {
                modifiers |= Modifiers::ALT;
            }
            if data
                .key_shift_state
                .intersects(ShiftState::LEFT_SHIFT_PRESSED | ShiftState::RIGHT_SHIFT_PRESSED)
            {
                modifiers |= Modifiers::SHIFT;
            }
        }

        // Collapse Ctrl+letter into the bare control character so a caller
        // never observes both encodings for the same keystroke.
        if modifiers.contains(Modifiers::CTRL) && (ch as u8).is_ascii_alphabetic() {
            let collapsed = (ch as u8) & 0x1F;
            modifiers.remove(Modifiers::CTRL);
            return Some(Self {
                code: collapsed as u16,
                modifiers,
            });
        }

        Some(Self { code: ch, modifiers })
    }
}

fn scan_code_to_event(scan_code: u16) -> Option<KeyEvent> {
    let code = match scan_code {
        0x01 => special::UP,
        0x02 => special::DOWN,
        0x03 => special::RIGHT,
        0x04 => special::LEFT,
        0x05 => special::HOME,
        0x06 => special::END,
        0x07 => special::INSERT,
        0x08 => special::DELETE,
        0x09 => special::PAGE_UP,
        0x0A => special::PAGE_DOWN,
        0x0C => special::F2,
        0x0D => special::F3,
        0x0F => special::F5,
        0x10 => special::F6,
        0x14 => special::F10,
        0x15 => special::F11,
        0x16 => special::F12,
        0x17 => special::ESCAPE,
        _ => return None,
    };
    Some(KeyEvent {
        code,
        modifiers: Modifiers::empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_letter_collapses_to_raw_control_char() {
        for letter in b'a'..=b'z' {
            let data = KeyData {
                key: InputKey {
                    scan_code: 0,
                    unicode_char: letter as u16,
                },
                key_shift_state: ShiftState::SHIFT_STATE_VALID | ShiftState::LEFT_CONTROL_PRESSED,
            };
            let event = KeyEvent::from_extended(&data).unwrap();
            assert_eq!(event.code, (letter & 0x1F) as u16);
            assert_eq!(event.modifiers, Modifiers::empty());
        }
    }

    #[test]
    fn ctrl_c_matches_scenario_6() {
        let data = KeyData {
            key: InputKey {
                scan_code: 0,
                unicode_char: b'c' as u16,
            },
            key_shift_state: ShiftState::LEFT_CONTROL_PRESSED | ShiftState::SHIFT_STATE_VALID,
        };
        let event = KeyEvent::from_extended(&data).unwrap();
        assert_eq!(event.code, 0x03);
        assert_eq!(event.modifiers, Modifiers::empty());
    }

    #[test]
    fn uppercase_with_shift_and_ctrl_still_collapses() {
        let data = KeyData {
            key: InputKey {
                scan_code: 0,
                unicode_char: b'A' as u16,
            },
            key_shift_state: ShiftState::SHIFT_STATE_VALID
                | ShiftState::LEFT_CONTROL_PRESSED
                | ShiftState::LEFT_SHIFT_PRESSED,
        };
        let event = KeyEvent::from_extended(&data).unwrap();
        assert_eq!(event.code, (b'A' & 0x1F) as u16);
        assert_eq!(event.modifiers, Modifiers::SHIFT);
    }

    #[test]
    fn no_shift_state_support_yields_empty_modifiers() {
        let key = InputKey {
            scan_code: 0,
            unicode_char: b'x' as u16,
        };
        let event = KeyEvent::from_simple(&key).unwrap();
        assert_eq!(event.code, b'x' as u16);
        assert_eq!(event.modifiers, Modifiers::empty());
    }
}
