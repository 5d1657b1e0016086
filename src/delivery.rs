use anyhow::{Context, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::time::Duration;
use tracing::{debug, warn};

/// Delay between the clipboard write and the paste keystrokes so the target
/// application's clipboard watcher can register the update.
const CLIPBOARD_SETTLE: Duration = Duration::from_millis(50);

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: Key = Key::Control;

/// Seam over clipboard and keystroke side effects (enables testing via mocking)
#[cfg_attr(test, mockall::automock)]
pub trait TextInjector: Send {
    /// Place text on the system clipboard
    ///
    /// # Errors
    /// Returns error if the clipboard is unavailable or rejects the write
    fn set_clipboard(&mut self, text: &str) -> Result<()>;

    /// Simulate the platform paste combination (primary modifier + V)
    ///
    /// # Errors
    /// Returns error if keystroke synthesis fails
    fn send_paste_chord(&mut self) -> Result<()>;

    /// Simulate keystrokes that type the text character by character
    ///
    /// # Errors
    /// Returns error if keystroke synthesis fails
    fn type_text(&mut self, text: &str) -> Result<()>;
}

/// Production injector backed by arboard and enigo
pub struct SystemInjector {
    enigo: Enigo,
}

impl SystemInjector {
    /// Connects to the platform input subsystem
    ///
    /// # Errors
    /// Returns error if the synthetic-input connection cannot be established
    pub fn new() -> Result<Self> {
        let enigo =
            Enigo::new(&Settings::default()).context("failed to initialize keystroke synthesis")?;
        Ok(Self { enigo })
    }
}

impl TextInjector for SystemInjector {
    fn set_clipboard(&mut self, text: &str) -> Result<()> {
        // The clipboard handle is not kept open between deliveries; some
        // platforms invalidate long-lived handles when focus changes.
        let mut clipboard = arboard::Clipboard::new().context("failed to open clipboard")?;
        clipboard
            .set_text(text.to_owned())
            .context("failed to write clipboard")
    }

    fn send_paste_chord(&mut self) -> Result<()> {
        self.enigo
            .key(PASTE_MODIFIER, Direction::Press)
            .context("failed to press paste modifier")?;
        self.enigo
            .key(Key::Unicode('v'), Direction::Click)
            .context("failed to press paste key")?;
        self.enigo
            .key(PASTE_MODIFIER, Direction::Release)
            .context("failed to release paste modifier")
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        self.enigo.text(text).context("failed to type text")
    }
}

/// Delivers recognized text into the focused application
///
/// Policy: clipboard write then a simulated paste; if the clipboard is
/// unavailable, or the paste keystrokes fail after a successful clipboard
/// write, fall back to typing the text directly. Empty text triggers no
/// side effect at all.
pub struct TextDelivery {
    injector: Box<dyn TextInjector>,
    settle_delay: Duration,
}

impl TextDelivery {
    /// Wraps an injector with the default clipboard settle delay
    pub fn new(injector: Box<dyn TextInjector>) -> Self {
        Self {
            injector,
            settle_delay: CLIPBOARD_SETTLE,
        }
    }

    /// Production delivery via the system clipboard and keystroke synthesis
    ///
    /// # Errors
    /// Returns error if the input subsystem connection fails
    pub fn system() -> Result<Self> {
        Ok(Self::new(Box::new(SystemInjector::new()?)))
    }

    /// Delivers `text` to the focused application
    ///
    /// # Errors
    /// Returns error only when the final typing fallback itself fails
    pub fn deliver(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            debug!("empty transcript, nothing to deliver");
            return Ok(());
        }

        if let Err(e) = self.injector.set_clipboard(text) {
            debug!("clipboard copy failed: {e:#}; falling back to typing");
            return self.injector.type_text(text);
        }

        std::thread::sleep(self.settle_delay);

        if let Err(e) = self.injector.send_paste_chord() {
            warn!("failed to send paste key sequence: {e:#}; falling back to typing");
            return self.injector.type_text(text);
        }

        debug!(chars = text.len(), "transcript pasted");
        Ok(())
    }
}
