use super::spec::{KeyId, NamedKey};
use super::transcriber::HotkeyTranscriber;
use anyhow::{Context, Result};
use rdev::{Event, EventType, Key};
use tracing::{debug, warn};

/// Starts the global keyboard listener on its own thread
///
/// Events are forwarded synchronously, in platform order, to the
/// transcriber. The OS listen call cannot be cancelled; once shutdown is
/// latched every callback is a no-op and the thread is reclaimed at process
/// exit, so the thread is detached rather than joined.
///
/// # Errors
/// Returns error if the listener thread cannot be spawned
pub fn spawn(transcriber: HotkeyTranscriber) -> Result<()> {
    std::thread::Builder::new()
        .name("keyboard-listener".to_owned())
        .spawn(move || {
            debug!("keyboard listener started");
            let result = rdev::listen(move |event: Event| match event.event_type {
                EventType::KeyPress(key) => {
                    if let Some(id) = map_key(key, event.name.as_deref()) {
                        transcriber.handle_press(id);
                    }
                }
                EventType::KeyRelease(key) => {
                    if let Some(id) = map_key(key, event.name.as_deref()) {
                        transcriber.handle_release(id);
                    }
                }
                _ => {}
            });
            if let Err(e) = result {
                // On macOS this usually means missing accessibility permission.
                warn!("keyboard listener failed: {e:?}");
            }
        })
        .context("failed to spawn listener thread")?;
    Ok(())
}

/// Maps a platform key event to the subset of keys the pipeline understands
///
/// Letters and digits become characters (the event's produced character when
/// available, the physical key otherwise, so layout quirks still match).
/// Unmapped keys are ignored.
fn map_key(key: Key, produced: Option<&str>) -> Option<KeyId> {
    let named = match key {
        Key::Space => Some(NamedKey::Space),
        Key::Return => Some(NamedKey::Enter),
        Key::Tab => Some(NamedKey::Tab),
        Key::Escape => Some(NamedKey::Escape),
        Key::F1 => Some(NamedKey::F1),
        Key::F2 => Some(NamedKey::F2),
        Key::F3 => Some(NamedKey::F3),
        Key::F4 => Some(NamedKey::F4),
        Key::F5 => Some(NamedKey::F5),
        Key::F6 => Some(NamedKey::F6),
        Key::F7 => Some(NamedKey::F7),
        Key::F8 => Some(NamedKey::F8),
        Key::F9 => Some(NamedKey::F9),
        Key::F10 => Some(NamedKey::F10),
        Key::F11 => Some(NamedKey::F11),
        Key::F12 => Some(NamedKey::F12),
        Key::ControlLeft | Key::ControlRight => Some(NamedKey::Control),
        _ => None,
    };
    if let Some(named) = named {
        return Some(KeyId::Named(named));
    }

    if let Some(ch) = produced.and_then(single_printable) {
        return Some(KeyId::Char(ch));
    }

    physical_char(key).map(KeyId::Char)
}

fn single_printable(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let ch = chars.next()?;
    if chars.next().is_some() || ch.is_control() || ch.is_whitespace() {
        return None;
    }
    Some(ch)
}

/// Fallback character for the physical key when no produced text is reported
/// (key-release events on most platforms)
const fn physical_char(key: Key) -> Option<char> {
    let ch = match key {
        Key::KeyA => 'a',
        Key::KeyB => 'b',
        Key::KeyC => 'c',
        Key::KeyD => 'd',
        Key::KeyE => 'e',
        Key::KeyF => 'f',
        Key::KeyG => 'g',
        Key::KeyH => 'h',
        Key::KeyI => 'i',
        Key::KeyJ => 'j',
        Key::KeyK => 'k',
        Key::KeyL => 'l',
        Key::KeyM => 'm',
        Key::KeyN => 'n',
        Key::KeyO => 'o',
        Key::KeyP => 'p',
        Key::KeyQ => 'q',
        Key::KeyR => 'r',
        Key::KeyS => 's',
        Key::KeyT => 't',
        Key::KeyU => 'u',
        Key::KeyV => 'v',
        Key::KeyW => 'w',
        Key::KeyX => 'x',
        Key::KeyY => 'y',
        Key::KeyZ => 'z',
        Key::Num0 => '0',
        Key::Num1 => '1',
        Key::Num2 => '2',
        Key::Num3 => '3',
        Key::Num4 => '4',
        Key::Num5 => '5',
        Key::Num6 => '6',
        Key::Num7 => '7',
        Key::Num8 => '8',
        Key::Num9 => '9',
        _ => return None,
    };
    Some(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_keys_map_to_identities() {
        assert_eq!(map_key(Key::Space, None), Some(KeyId::Named(NamedKey::Space)));
        assert_eq!(map_key(Key::Return, None), Some(KeyId::Named(NamedKey::Enter)));
        assert_eq!(map_key(Key::F8, None), Some(KeyId::Named(NamedKey::F8)));
        assert_eq!(
            map_key(Key::ControlLeft, None),
            Some(KeyId::Named(NamedKey::Control))
        );
        assert_eq!(
            map_key(Key::ControlRight, None),
            Some(KeyId::Named(NamedKey::Control))
        );
    }

    #[test]
    fn test_produced_text_wins_for_characters() {
        assert_eq!(map_key(Key::KeyA, Some("A")), Some(KeyId::Char('A')));
        assert_eq!(map_key(Key::KeyA, Some("a")), Some(KeyId::Char('a')));
    }

    #[test]
    fn test_physical_fallback_without_produced_text() {
        assert_eq!(map_key(Key::KeyV, None), Some(KeyId::Char('v')));
        assert_eq!(map_key(Key::Num7, None), Some(KeyId::Char('7')));
    }

    #[test]
    fn test_unmapped_keys_are_ignored() {
        assert_eq!(map_key(Key::ShiftLeft, None), None);
        assert_eq!(map_key(Key::MetaLeft, None), None);
        assert_eq!(map_key(Key::Backspace, None), None);
    }

    #[test]
    fn test_control_characters_in_produced_text_are_ignored() {
        // Space key reported as named, but a produced " " on another key
        // must not turn into a bogus character hotkey.
        assert_eq!(map_key(Key::ShiftLeft, Some(" ")), None);
        assert_eq!(map_key(Key::ShiftLeft, Some("\u{8}")), None);
    }
}
