//! Key event classification.
//!
//! Host input libraries disagree on how they spell modifier keys (`LEFT CTRL`,
//! `LCONTROL`, `Control_L`, `ControlLeft`, ...) and each OS reports its own
//! numeric key codes. Classification therefore goes through a [`KeyTable`]
//! that is built per platform and can be extended from settings.

use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::HashMap;

/// Normalized meaning of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(tag = "kind", content = "letter", rename_all = "snake_case")]
pub enum KeyKind {
    Ctrl,
    Shift,
    Alt,
    Letter(char),
    Other,
}

/// Raw key event as delivered by the OS-level listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub raw_name: String,
    /// Platform key code, `0` when the listener did not provide one.
    pub virtual_key_code: u32,
    pub is_down: bool,
}

#[cfg(test)]
impl KeyEvent {
    pub fn down(raw_name: impl Into<String>, virtual_key_code: u32) -> Self {
        Self {
            raw_name: raw_name.into(),
            virtual_key_code,
            is_down: true,
        }
    }

    pub fn up(raw_name: impl Into<String>, virtual_key_code: u32) -> Self {
        Self {
            raw_name: raw_name.into(),
            virtual_key_code,
            is_down: false,
        }
    }
}

/// Name-or-code lookup table for one target platform.
#[derive(Debug, Clone)]
pub struct KeyTable {
    names: HashMap<String, KeyKind>,
    codes: HashMap<u32, KeyKind>,
    copy_letter: char,
}

const CTRL_NAMES: &[&str] = &[
    "LEFT CTRL",
    "RIGHT CTRL",
    "CTRL",
    "LCONTROL",
    "RCONTROL",
    "Control_L",
    "Control_R",
    "ControlLeft",
    "ControlRight",
];

const SHIFT_NAMES: &[&str] = &[
    "LEFT SHIFT",
    "RIGHT SHIFT",
    "SHIFT",
    "LSHIFT",
    "RSHIFT",
    "Shift_L",
    "Shift_R",
    "ShiftLeft",
    "ShiftRight",
];

const ALT_NAMES: &[&str] = &[
    "LEFT ALT",
    "RIGHT ALT",
    "ALT",
    "LMENU",
    "RMENU",
    "Alt_L",
    "Alt_R",
    "Alt",
    "AltGr",
];

// Windows virtual-key codes.
#[cfg(target_os = "windows")]
mod platform_codes {
    use super::KeyKind;

    pub const MODIFIERS: &[(u32, KeyKind)] = &[
        (17, KeyKind::Ctrl),
        (162, KeyKind::Ctrl),
        (163, KeyKind::Ctrl),
        (16, KeyKind::Shift),
        (160, KeyKind::Shift),
        (161, KeyKind::Shift),
        (18, KeyKind::Alt),
        (164, KeyKind::Alt),
        (165, KeyKind::Alt),
    ];

    pub fn letter_codes(letter: char) -> Vec<u32> {
        vec![letter as u32]
    }
}

// macOS virtual keycodes. Command fills the copy-modifier role.
#[cfg(target_os = "macos")]
mod platform_codes {
    use super::KeyKind;

    pub const MODIFIERS: &[(u32, KeyKind)] = &[
        (59, KeyKind::Ctrl),
        (62, KeyKind::Ctrl),
        (55, KeyKind::Ctrl),
        (54, KeyKind::Ctrl),
        (56, KeyKind::Shift),
        (60, KeyKind::Shift),
        (58, KeyKind::Alt),
        (61, KeyKind::Alt),
    ];

    const LETTERS: &[(char, u32)] = &[
        ('A', 0),
        ('S', 1),
        ('D', 2),
        ('F', 3),
        ('H', 4),
        ('G', 5),
        ('Z', 6),
        ('X', 7),
        ('C', 8),
        ('V', 9),
        ('B', 11),
        ('Q', 12),
        ('W', 13),
        ('E', 14),
        ('R', 15),
        ('Y', 16),
        ('T', 17),
        ('O', 31),
        ('U', 32),
        ('I', 34),
        ('P', 35),
        ('L', 37),
        ('J', 38),
        ('K', 40),
        ('N', 45),
        ('M', 46),
    ];

    pub fn letter_codes(letter: char) -> Vec<u32> {
        LETTERS
            .iter()
            .filter(|(c, _)| *c == letter)
            .map(|(_, code)| *code)
            .collect()
    }
}

// X11 keysyms (what rdev reports as the platform code on Linux).
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
mod platform_codes {
    use super::KeyKind;

    pub const MODIFIERS: &[(u32, KeyKind)] = &[
        (0xffe3, KeyKind::Ctrl),
        (0xffe4, KeyKind::Ctrl),
        (0xffe1, KeyKind::Shift),
        (0xffe2, KeyKind::Shift),
        (0xffe9, KeyKind::Alt),
        (0xffea, KeyKind::Alt),
        (0xfe03, KeyKind::Alt),
    ];

    // Shifted letters report the uppercase keysym.
    pub fn letter_codes(letter: char) -> Vec<u32> {
        vec![
            letter.to_ascii_lowercase() as u32,
            letter.to_ascii_uppercase() as u32,
        ]
    }
}

impl KeyTable {
    /// An empty table: every key classifies as [`KeyKind::Other`].
    pub fn empty(copy_letter: char) -> Self {
        Self {
            names: HashMap::new(),
            codes: HashMap::new(),
            copy_letter: copy_letter.to_ascii_uppercase(),
        }
    }

    /// Table for the platform this binary was built for.
    pub fn platform_default() -> Self {
        let mut table = Self::with_common_names('C');
        for (code, kind) in platform_codes::MODIFIERS {
            table.codes.insert(*code, *kind);
        }
        for letter in 'A'..='Z' {
            for code in platform_codes::letter_codes(letter) {
                table.codes.insert(code, KeyKind::Letter(letter));
            }
        }
        table
    }

    /// Symbolic names only, no numeric codes.
    pub fn with_common_names(copy_letter: char) -> Self {
        let mut table = Self::empty(copy_letter);
        for name in CTRL_NAMES {
            table.names.insert((*name).to_string(), KeyKind::Ctrl);
        }
        for name in SHIFT_NAMES {
            table.names.insert((*name).to_string(), KeyKind::Shift);
        }
        for name in ALT_NAMES {
            table.names.insert((*name).to_string(), KeyKind::Alt);
        }
        #[cfg(target_os = "macos")]
        for name in ["MetaLeft", "MetaRight", "Command", "LEFT META", "RIGHT META"] {
            table.names.insert(name.to_string(), KeyKind::Ctrl);
        }
        for letter in 'A'..='Z' {
            table.names.insert(letter.to_string(), KeyKind::Letter(letter));
            table
                .names
                .insert(format!("Key{}", letter), KeyKind::Letter(letter));
        }
        table
    }

    pub fn insert_name(&mut self, name: impl Into<String>, kind: KeyKind) {
        self.names.insert(name.into(), kind);
    }

    pub fn insert_code(&mut self, code: u32, kind: KeyKind) {
        if code != 0 {
            self.codes.insert(code, kind);
        }
    }

    pub fn copy_letter(&self) -> char {
        self.copy_letter
    }

    /// Classifies a key. The numeric code wins when it is known to the table;
    /// the name is only consulted when the code is absent or unmapped.
    pub fn classify(&self, name: &str, code: u32) -> KeyKind {
        if code != 0 {
            if let Some(kind) = self.codes.get(&code) {
                return *kind;
            }
        }
        self.names.get(name).copied().unwrap_or(KeyKind::Other)
    }

    pub fn is_ctrl(&self, name: &str, code: u32) -> bool {
        self.classify(name, code) == KeyKind::Ctrl
    }

    pub fn is_copy_chord(&self, name: &str, code: u32, ctrl_held: bool) -> bool {
        ctrl_held && self.classify(name, code) == KeyKind::Letter(self.copy_letter)
    }

    /// Short human-readable name, used in debug logging.
    pub fn friendly_name(&self, name: &str, code: u32) -> String {
        match self.classify(name, code) {
            KeyKind::Ctrl => "Ctrl".to_string(),
            KeyKind::Shift => "Shift".to_string(),
            KeyKind::Alt => "Alt".to_string(),
            KeyKind::Letter(c) => c.to_string(),
            KeyKind::Other if name.is_empty() => format!("#{}", code),
            KeyKind::Other => name.to_string(),
        }
    }
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::platform_default()
    }
}
