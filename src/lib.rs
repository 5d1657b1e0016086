//! Push-to-talk speech transcription
//!
//! Hold a hotkey to record from the microphone, release it to transcribe,
//! and have the recognized text pasted (or typed) into the focused
//! application. This library exports the pipeline modules for testing and
//! reuse.

/// Microphone capture and WAV persistence
pub mod audio;
/// Configuration file management
pub mod config;
/// Clipboard-paste and typed text delivery
pub mod delivery;
/// Hotkey normalization, state machine, and keyboard listener
pub mod hotkey;
/// Transcription provider interface and backends
pub mod provider;
/// Logging setup
pub mod telemetry;
