use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered frame copies appended by the capture callback, guarded by its own
/// lock so callback latency never contends with hotkey dispatch.
pub type FrameBuffer = Arc<Mutex<Vec<Vec<f32>>>>;

/// Counter of non-fatal stream errors reported during a session
pub type StreamErrorCount = Arc<AtomicU64>;

/// How long `start()` waits for the capture thread to report readiness
const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(3);

/// Handle to a live capture session
///
/// The underlying stream lives on a dedicated thread (cpal streams are not
/// `Send`); stopping sends the thread a signal and joins it, which drops the
/// stream.
pub struct CaptureHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

impl CaptureHandle {
    /// Wraps a stop channel and the thread owning the stream
    pub fn new(stop_tx: Sender<()>, join: JoinHandle<()>) -> Self {
        Self { stop_tx, join }
    }

    /// Best-effort teardown; failures are logged, never raised
    fn stop(self) {
        // A closed channel means the capture thread already exited.
        let _ = self.stop_tx.send(());
        if self.join.join().is_err() {
            warn!("capture thread panicked during shutdown");
        }
    }
}

/// Seam over the audio subsystem (enables testing via mocking)
#[cfg_attr(test, mockall::automock)]
pub trait CaptureBackend: Send {
    /// Opens a capture session appending frames into `frames` until stopped
    ///
    /// Non-fatal stream errors observed while capturing are counted in
    /// `errors`; capture continues past them.
    ///
    /// # Errors
    /// Returns error if no device is available or the stream cannot start
    fn open(
        &self,
        sample_rate: u32,
        channels: u16,
        frames: FrameBuffer,
        errors: StreamErrorCount,
    ) -> Result<CaptureHandle>;
}

/// Microphone recorder driven by explicit start/stop calls
///
/// Owns at most one capture session at a time. `stop()` persists the session
/// to a uniquely named temporary WAV file owned by the caller.
pub struct AudioRecorder {
    sample_rate: u32,
    channels: u16,
    frames: FrameBuffer,
    stream_errors: StreamErrorCount,
    session: Option<CaptureHandle>,
    backend: Box<dyn CaptureBackend>,
}

impl AudioRecorder {
    /// Creates an idle recorder bound to a backend and stream parameters
    pub fn new(backend: Box<dyn CaptureBackend>, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            frames: Arc::new(Mutex::new(Vec::new())),
            stream_errors: Arc::new(AtomicU64::new(0)),
            session: None,
            backend,
        }
    }

    /// Sample rate the recorder captures at, in Hz
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Begin capturing audio from the default input device
    ///
    /// Idempotent: a second `start()` while a session is active is a logged
    /// no-op. On failure the recorder is left as if never started.
    ///
    /// # Errors
    /// Returns error if the stream cannot be acquired or started
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("recorder already running; ignoring start request");
            return Ok(());
        }

        self.lock_frames().clear();
        self.stream_errors.store(0, Ordering::Relaxed);

        let handle = self
            .backend
            .open(
                self.sample_rate,
                self.channels,
                Arc::clone(&self.frames),
                Arc::clone(&self.stream_errors),
            )
            .context("failed to start audio input stream")?;
        self.session = Some(handle);
        debug!("audio stream started");
        Ok(())
    }

    /// Stop the recording session and persist the audio to a temporary file
    ///
    /// Returns `None` when no session is active or no frames were captured.
    /// Never raises: stream teardown and file-write failures are logged and
    /// the recorder is left reusable.
    pub fn stop(&mut self) -> Option<PathBuf> {
        let Some(session) = self.session.take() else {
            debug!("recorder not running; ignoring stop request");
            return None;
        };
        session.stop();
        debug!("audio stream stopped");

        let errors = self.stream_errors.swap(0, Ordering::Relaxed);
        if errors > 0 {
            warn!(errors, "stream reported errors during capture, audio may be incomplete");
        }

        let frames = std::mem::take(&mut *self.lock_frames());
        if frames.is_empty() {
            info!("no audio captured during the session");
            return None;
        }

        let total: usize = frames.iter().map(Vec::len).sum();
        let mut audio = Vec::with_capacity(total);
        for frame in frames {
            audio.extend_from_slice(&frame);
        }

        match self.write_temp_wav(&audio) {
            Ok(path) => {
                debug!(path = %path.display(), samples = total, "wrote temporary audio file");
                Some(path)
            }
            Err(e) => {
                warn!("failed to persist captured audio: {e:#}");
                None
            }
        }
    }

    /// Release any resources held by the recorder
    ///
    /// Unconditional best-effort shutdown; idempotent and infallible.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
        self.lock_frames().clear();
    }

    fn lock_frames(&self) -> std::sync::MutexGuard<'_, Vec<Vec<f32>>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_temp_wav(&self, audio: &[f32]) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix("asr-hotkey-")
            .suffix(".wav")
            .tempfile()
            .context("failed to create temporary file")?;
        let path = file
            .into_temp_path()
            .keep()
            .context("failed to persist temporary file")?;

        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).context("failed to create WAV file")?;
        for &sample in audio {
            writer
                .write_sample(sample)
                .context("failed to write sample")?;
        }
        writer.finalize().context("failed to finalize WAV file")?;
        Ok(path)
    }
}

/// CPAL-backed capture
///
/// `open` spawns a thread that builds the input stream, starts it, reports
/// readiness over a one-shot channel, and parks until stopped. Keeping the
/// stream on its own thread sidesteps cpal's `!Send` stream handle.
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn open(
        &self,
        sample_rate: u32,
        channels: u16,
        frames: FrameBuffer,
        errors: StreamErrorCount,
    ) -> Result<CaptureHandle> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let join = std::thread::Builder::new()
            .name("audio-capture".to_owned())
            .spawn(move || run_capture(sample_rate, channels, frames, errors, &ready_tx, &stop_rx))
            .context("failed to spawn capture thread")?;

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => Ok(CaptureHandle::new(stop_tx, join)),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = stop_tx.send(());
                let _ = join.join();
                bail!("timed out waiting for the audio stream to start")
            }
        }
    }
}

/// Body of the capture thread: owns the stream for the session's lifetime
fn run_capture(
    sample_rate: u32,
    channels: u16,
    frames: FrameBuffer,
    errors: StreamErrorCount,
    ready_tx: &Sender<Result<()>>,
    stop_rx: &Receiver<()>,
) {
    let built = build_stream(sample_rate, channels, frames, errors);
    match built {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            // Parked until stop() or the recorder is dropped.
            let _ = stop_rx.recv();
            drop(stream);
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_stream(
    sample_rate: u32,
    channels: u16,
    frames: FrameBuffer,
    errors: StreamErrorCount,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("no input device available")?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
    info!("using input device: {device_name}");

    let supported = device
        .default_input_config()
        .context("failed to get default input config")?;
    let config = cpal::StreamConfig {
        channels,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let on_error = move |err: cpal::StreamError| {
        // Overruns and the like: count and keep capturing.
        warn!("audio input status: {err}");
        errors.fetch_add(1, Ordering::Relaxed);
    };

    let push = move |frame: Vec<f32>| {
        frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| push(data.to_vec()),
                on_error,
                None,
            )
            .context("failed to build input stream")?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push(data.iter().map(|&s| f32::from(s) / 32768.0).collect());
                },
                on_error,
                None,
            )
            .context("failed to build input stream")?,
        cpal::SampleFormat::U16 => device
            .build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    push(
                        data.iter()
                            .map(|&s| (f32::from(s) - 32768.0) / 32768.0)
                            .collect(),
                    );
                },
                on_error,
                None,
            )
            .context("failed to build input stream")?,
        other => bail!("unsupported sample format {other:?}"),
    };

    stream.play().context("failed to start audio stream")?;
    Ok(stream)
}
