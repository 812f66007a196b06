//! Keyboard input and synthetic event types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named keys that can be sent to an element alongside literal text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKey {
    /// Backspace
    Backspace,
    /// Tab
    Tab,
    /// Enter
    Enter,
    /// Shift
    Shift,
    /// Control
    Control,
    /// Alt
    Alt,
    /// Escape
    Escape,
    /// Page up
    PageUp,
    /// Page down
    PageDown,
    /// End
    End,
    /// Home
    Home,
    /// Left arrow
    LeftArrow,
    /// Up arrow
    UpArrow,
    /// Right arrow
    RightArrow,
    /// Down arrow
    DownArrow,
    /// Insert
    Insert,
    /// Delete
    Delete,
    /// Meta (command / windows key)
    Meta,
    /// Function key F1..F12
    F(u8),
}

impl TestKey {
    /// The DOM `KeyboardEvent.key` value for this key
    #[must_use]
    pub fn key_name(&self) -> String {
        match self {
            Self::Backspace => "Backspace".to_string(),
            Self::Tab => "Tab".to_string(),
            Self::Enter => "Enter".to_string(),
            Self::Shift => "Shift".to_string(),
            Self::Control => "Control".to_string(),
            Self::Alt => "Alt".to_string(),
            Self::Escape => "Escape".to_string(),
            Self::PageUp => "PageUp".to_string(),
            Self::PageDown => "PageDown".to_string(),
            Self::End => "End".to_string(),
            Self::Home => "Home".to_string(),
            Self::LeftArrow => "ArrowLeft".to_string(),
            Self::UpArrow => "ArrowUp".to_string(),
            Self::RightArrow => "ArrowRight".to_string(),
            Self::DownArrow => "ArrowDown".to_string(),
            Self::Insert => "Insert".to_string(),
            Self::Delete => "Delete".to_string(),
            Self::Meta => "Meta".to_string(),
            Self::F(n) => format!("F{n}"),
        }
    }
}

impl std::fmt::Display for TestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key_name())
    }
}

/// One entry of a key sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyInput {
    /// Literal text, typed character by character
    Text(String),
    /// A named key
    Key(TestKey),
}

impl From<&str> for KeyInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for KeyInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<TestKey> for KeyInput {
    fn from(key: TestKey) -> Self {
        Self::Key(key)
    }
}

/// Modifier keys held down for the duration of a key sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ModifierKeys {
    /// Control held
    pub control: bool,
    /// Alt held
    pub alt: bool,
    /// Shift held
    pub shift: bool,
    /// Meta held
    pub meta: bool,
}

impl ModifierKeys {
    /// No modifiers
    pub const NONE: Self = Self {
        control: false,
        alt: false,
        shift: false,
        meta: false,
    };

    /// Hold control
    #[must_use]
    pub const fn control(mut self) -> Self {
        self.control = true;
        self
    }

    /// Hold alt
    #[must_use]
    pub const fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Hold shift
    #[must_use]
    pub const fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Hold meta
    #[must_use]
    pub const fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Whether any modifier is held
    #[must_use]
    pub const fn any(&self) -> bool {
        self.control || self.alt || self.shift || self.meta
    }
}

/// Properties attached to a synthetic event
pub type EventData = BTreeMap<String, serde_json::Value>;
