//! Microphone capture and temporary WAV persistence

mod recorder;

pub use recorder::{
    AudioRecorder, CaptureBackend, CaptureHandle, CpalBackend, FrameBuffer, StreamErrorCount,
};

#[cfg(test)]
pub use recorder::MockCaptureBackend;
