use thiserror::Error;

/// Errors raised while normalizing a hotkey string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyError {
    /// The hotkey string was empty or whitespace
    #[error("hotkey must not be empty")]
    Empty,
    /// The hotkey string is not a named key or a single printable character
    #[error("unsupported hotkey '{0}'")]
    Unsupported(String),
}

/// Named special keys supported as hotkeys
///
/// `Control` is only ever produced by the keyboard listener for modifier
/// tracking; normalization never yields it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Escape,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Control,
}

/// Normalized identity of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyId {
    /// One of the enumerated special keys
    Named(NamedKey),
    /// The printable character produced by the key
    Char(char),
}

/// A parsed hotkey: normalized identity plus a display label
#[derive(Debug, Clone)]
pub struct HotkeySpec {
    key: KeyId,
    label: String,
}

impl HotkeySpec {
    /// Normalizes a hotkey string into a key identity and label
    ///
    /// Accepts the named special keys (space, enter/return, tab, esc/escape,
    /// f1-f12) or a single printable character. Matching against characters
    /// is case-insensitive, so the case of the input does not matter.
    ///
    /// # Errors
    /// Returns [`HotkeyError::Empty`] for blank input and
    /// [`HotkeyError::Unsupported`] for anything else that is not a supported
    /// key.
    pub fn parse(hotkey: &str) -> Result<Self, HotkeyError> {
        let key = hotkey.trim().to_lowercase();
        if key.is_empty() {
            return Err(HotkeyError::Empty);
        }

        if let Some(named) = named_key(&key) {
            return Ok(Self {
                key: KeyId::Named(named),
                label: key.to_uppercase(),
            });
        }

        let mut chars = key.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() {
                return Ok(Self {
                    key: KeyId::Char(c),
                    label: key.to_uppercase(),
                });
            }
        }

        Err(HotkeyError::Unsupported(hotkey.to_owned()))
    }

    /// Whether the given key event identity triggers this hotkey
    pub fn matches(&self, key: KeyId) -> bool {
        match (self.key, key) {
            (KeyId::Named(target), KeyId::Named(actual)) => target == actual,
            (KeyId::Char(target), KeyId::Char(actual)) => {
                target == actual || target.to_lowercase().eq(actual.to_lowercase())
            }
            _ => false,
        }
    }

    /// Human-readable label, e.g. `F8` or `SPACE`
    pub fn label(&self) -> &str {
        &self.label
    }
}

fn named_key(key: &str) -> Option<NamedKey> {
    match key {
        "space" => Some(NamedKey::Space),
        "enter" | "return" => Some(NamedKey::Enter),
        "tab" => Some(NamedKey::Tab),
        "esc" | "escape" => Some(NamedKey::Escape),
        "f1" => Some(NamedKey::F1),
        "f2" => Some(NamedKey::F2),
        "f3" => Some(NamedKey::F3),
        "f4" => Some(NamedKey::F4),
        "f5" => Some(NamedKey::F5),
        "f6" => Some(NamedKey::F6),
        "f7" => Some(NamedKey::F7),
        "f8" => Some(NamedKey::F8),
        "f9" => Some(NamedKey::F9),
        "f10" => Some(NamedKey::F10),
        "f11" => Some(NamedKey::F11),
        "f12" => Some(NamedKey::F12),
        _ => None,
    }
}
