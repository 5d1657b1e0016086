//! Global hotkey handling: normalization, the push-to-talk state machine,
//! and the OS keyboard listener

mod listener;
mod spec;
mod transcriber;

pub use spec::{HotkeyError, HotkeySpec, KeyId, NamedKey};
pub use transcriber::{
    HotkeyTranscriber, RecordingState, SettingsError, TranscriptionObserver,
};
