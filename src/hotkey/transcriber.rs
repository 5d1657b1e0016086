use crate::audio::AudioRecorder;
use crate::delivery::TextDelivery;
use crate::hotkey::spec::{HotkeyError, HotkeySpec, KeyId, NamedKey};
use crate::provider::{ProviderError, TranscriptionProvider};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Invoked with the recognized text after each successful transcription
pub type TranscriptionObserver = dyn Fn(&str) + Send + Sync;

/// Errors from runtime reconfiguration requests
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The requested hotkey string failed normalization
    #[error(transparent)]
    Hotkey(#[from] HotkeyError),

    /// Provider or model identity cannot change while running
    #[error(
        "switching the transcription provider or model at runtime is not supported; \
         update the configuration and restart"
    )]
    ProviderSwitchUnsupported,

    /// The provider rejected a vocabulary update
    #[error("failed to apply vocabulary: {0}")]
    Vocabulary(#[from] ProviderError),
}

/// Where the push-to-talk pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RecordingState {
    Idle,
    Recording,
    Transcribing,
}

/// Timestamps for the session being captured, reset on every new recording
///
/// Durations are computed only when every timestamp is present; a session
/// interrupted by reconfiguration or shutdown reports nothing rather than
/// fabricated values.
#[derive(Debug, Default, Clone, Copy)]
struct SessionTimings {
    record_start: Option<Instant>,
    record_stop: Option<Instant>,
    transcribe_start: Option<Instant>,
}

impl SessionTimings {
    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Capture, decode, and end-to-end durations as of `delivered`
    fn durations(&self, delivered: Instant) -> Option<(Duration, Duration, Duration)> {
        let capture = self
            .record_stop?
            .checked_duration_since(self.record_start?)?;
        let decode = delivered.checked_duration_since(self.transcribe_start?)?;
        let total = delivered.checked_duration_since(self.record_start?)?;
        Some((capture, decode, total))
    }
}

/// One-way shutdown latch that also unblocks the waiting run loop
struct ShutdownSignal {
    requested: AtomicBool,
    done: Mutex<bool>,
    unblock: Condvar,
}

impl ShutdownSignal {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            done: Mutex::new(false),
            unblock: Condvar::new(),
        }
    }

    /// Latches the signal; returns false if it was already set
    fn request(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.unblock.notify_all();
        true
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .unblock
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, _) = self
                .unblock
                .wait_timeout(done, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            done = guard;
        }
        true
    }
}

/// Everything guarded by the state lock
struct Inner {
    state: RecordingState,
    hotkey: HotkeySpec,
    recorder: AudioRecorder,
    timings: SessionTimings,
    vocabulary: Vec<String>,
}

struct Shared {
    inner: Mutex<Inner>,
    provider: Arc<dyn TranscriptionProvider>,
    delivery: Mutex<TextDelivery>,
    observer: Mutex<Option<Arc<TranscriptionObserver>>>,
    ctrl_held: AtomicBool,
    shutdown: ShutdownSignal,
}

/// Push-to-talk state machine
///
/// Owns one recorder and one provider reference. Keyboard events arrive on
/// the listener thread via `handle_press`/`handle_release`; each utterance is
/// transcribed on its own background thread so the listener stays responsive.
/// All transitions read-check-write under a single state lock, making
/// key-repeat, stray releases, and shutdown races harmless.
///
/// Cheap to clone; clones share the same state and are how the listener
/// thread, the transcription workers, and the signal handler all reach it.
#[derive(Clone)]
pub struct HotkeyTranscriber {
    shared: Arc<Shared>,
}

impl HotkeyTranscriber {
    /// Builds the pipeline around a normalized hotkey
    ///
    /// # Errors
    /// Returns error if the hotkey string is empty or unsupported
    pub fn new(
        hotkey: &str,
        recorder: AudioRecorder,
        provider: Arc<dyn TranscriptionProvider>,
        delivery: TextDelivery,
    ) -> Result<Self, SettingsError> {
        let hotkey = HotkeySpec::parse(hotkey)?;
        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: RecordingState::Idle,
                    hotkey,
                    recorder,
                    timings: SessionTimings::default(),
                    vocabulary: Vec::new(),
                }),
                provider,
                delivery: Mutex::new(delivery),
                observer: Mutex::new(None),
                ctrl_held: AtomicBool::new(false),
                shutdown: ShutdownSignal::new(),
            }),
        })
    }

    /// Registers a callback invoked with each successful transcript
    pub fn set_observer(&self, observer: Box<TranscriptionObserver>) {
        *self.lock_observer() = Some(Arc::from(observer));
    }

    /// Human-readable label of the current hotkey
    pub fn hotkey_label(&self) -> String {
        self.lock_inner().hotkey.label().to_owned()
    }

    /// Current pipeline state (primarily for tests and diagnostics)
    pub fn state(&self) -> RecordingState {
        self.lock_inner().state
    }

    /// Key-down event from the listener thread
    pub fn handle_press(&self, key: KeyId) {
        if key == KeyId::Named(NamedKey::Control) {
            self.shared.ctrl_held.store(true, Ordering::SeqCst);
            return;
        }
        if self.shared.ctrl_held.load(Ordering::SeqCst) && is_interrupt_key(key) {
            info!("interrupt chord detected");
            self.request_shutdown();
            return;
        }
        if self.shared.shutdown.is_requested() {
            return;
        }

        let mut inner = self.lock_inner();
        if !inner.hotkey.matches(key) {
            return;
        }
        // A press during Transcribing starts a new recording right away; the
        // in-flight utterance keeps decoding on its worker thread.
        if inner.state == RecordingState::Recording {
            debug!("press ignored, already recording");
            return;
        }

        inner.state = RecordingState::Recording;
        inner.timings.clear();
        inner.timings.record_start = Some(Instant::now());

        if let Err(e) = inner.recorder.start() {
            inner.state = RecordingState::Idle;
            inner.timings.clear();
            warn!("failed to start recording: {e:#}");
            println!("Could not start recording: {e:#}");
            return;
        }
        println!("Recording... (release {} to transcribe)", inner.hotkey.label());
    }

    /// Key-up event from the listener thread
    pub fn handle_release(&self, key: KeyId) {
        if key == KeyId::Named(NamedKey::Control) {
            self.shared.ctrl_held.store(false, Ordering::SeqCst);
            return;
        }
        if self.shared.shutdown.is_requested() {
            return;
        }

        let mut inner = self.lock_inner();
        if !inner.hotkey.matches(key) {
            return;
        }
        if inner.state != RecordingState::Recording {
            debug!(state = ?inner.state, "release ignored, no recording in progress");
            return;
        }

        inner.timings.record_stop = Some(Instant::now());
        let Some(path) = inner.recorder.stop() else {
            inner.state = RecordingState::Idle;
            inner.timings.clear();
            println!("No audio captured.");
            return;
        };

        inner.state = RecordingState::Transcribing;
        let timings = inner.timings;
        drop(inner);

        println!("Transcribing...");
        self.spawn_transcription(path, timings);
    }

    /// Latches shutdown and aborts any in-progress recording
    ///
    /// Idempotent. A transcription already dispatched runs to completion; it
    /// is not cancelled.
    pub fn request_shutdown(&self) {
        if !self.shared.shutdown.request() {
            return;
        }
        info!("shutdown requested");

        let mut inner = self.lock_inner();
        if inner.state == RecordingState::Recording {
            // Discard the aborted session's audio untranscribed.
            if let Some(path) = inner.recorder.stop() {
                remove_temp_file(&path);
            }
            inner.state = RecordingState::Idle;
        }
        inner.timings.clear();
    }

    /// Starts the global keyboard listener and blocks until shutdown
    ///
    /// # Errors
    /// Returns error if the listener thread cannot be spawned
    pub fn run(&self) -> Result<()> {
        super::listener::spawn(self.clone()).context("failed to start keyboard listener")?;
        self.shared.shutdown.wait();
        self.lock_inner().recorder.close();
        Ok(())
    }

    /// Blocks until shutdown is requested or the timeout elapses
    ///
    /// Returns true if shutdown was requested.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        self.shared.shutdown.wait_timeout(timeout)
    }

    /// Re-normalizes and atomically swaps the hotkey
    ///
    /// # Errors
    /// Returns error if the new hotkey string fails normalization
    pub fn update_hotkey(&self, hotkey: &str) -> Result<(), SettingsError> {
        let parsed = HotkeySpec::parse(hotkey)?;
        let mut inner = self.lock_inner();
        info!(old = inner.hotkey.label(), new = parsed.label(), "hotkey updated");
        inner.hotkey = parsed;
        Ok(())
    }

    /// Closes the current recorder and swaps in a replacement
    ///
    /// This is how sample-rate changes arrive. Timings of any half-captured
    /// session are cleared so no partial report is produced.
    pub fn update_recorder(&self, recorder: AudioRecorder) {
        let mut inner = self.lock_inner();
        inner.recorder.close();
        if inner.state == RecordingState::Recording {
            inner.state = RecordingState::Idle;
        }
        inner.timings.clear();
        info!(sample_rate = recorder.sample_rate(), "recorder replaced");
        inner.recorder = recorder;
    }

    /// Applies a new vocabulary list to the provider if it changed
    ///
    /// # Errors
    /// Returns error if the provider rejects the update
    pub fn update_vocabulary(&self, phrases: Vec<String>) -> Result<(), SettingsError> {
        let mut inner = self.lock_inner();
        if inner.vocabulary == phrases {
            debug!("vocabulary unchanged");
            return Ok(());
        }
        self.shared.provider.clear_vocabulary()?;
        if !phrases.is_empty() {
            self.shared.provider.add_vocabulary(&phrases)?;
        }
        info!(phrases = phrases.len(), "vocabulary updated");
        inner.vocabulary = phrases;
        Ok(())
    }

    /// Rejects runtime provider or model switches
    ///
    /// # Errors
    /// Always returns `SettingsError::ProviderSwitchUnsupported`
    pub fn update_provider(&self, _name: &str) -> Result<(), SettingsError> {
        Err(SettingsError::ProviderSwitchUnsupported)
    }

    fn spawn_transcription(&self, path: PathBuf, timings: SessionTimings) {
        let this = self.clone();
        let worker_path = path.clone();
        let spawned = std::thread::Builder::new()
            .name("transcription".to_owned())
            .spawn(move || this.run_transcription(worker_path, timings));

        if let Err(e) = spawned {
            warn!("failed to spawn transcription worker: {e}");
            println!("Transcription failed to start.");
            remove_temp_file(&path);
            self.finish_session();
        }
    }

    /// Body of the per-utterance worker thread
    ///
    /// The provider call happens outside every transcriber lock. The temp
    /// file is deleted exactly once whatever the outcome.
    fn run_transcription(&self, path: PathBuf, mut timings: SessionTimings) {
        timings.transcribe_start = Some(Instant::now());
        let result = self.shared.provider.transcribe(&path);
        remove_temp_file(&path);

        match result {
            Ok(text) => {
                // Clone the handle so the callback runs without the lock held
                // and may itself call set_observer.
                let observer = self.lock_observer().clone();
                if let Some(observer) = observer {
                    observer(&text);
                }
                if text.is_empty() {
                    println!("(no speech recognized)");
                } else {
                    println!("→ {text}");
                    self.deliver(&text, &timings);
                }
            }
            Err(e) => {
                warn!("transcription failed: {e}");
                println!("Transcription failed: {e}");
            }
        }

        self.finish_session();
    }

    fn deliver(&self, text: &str, timings: &SessionTimings) {
        let delivered = {
            let mut delivery = self
                .shared
                .delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            delivery.deliver(text)
        };
        match delivered {
            Ok(()) => self.report_timings(timings),
            Err(e) => {
                warn!("failed to deliver text: {e:#}");
                println!("Could not deliver text: {e:#}");
            }
        }
    }

    fn report_timings(&self, timings: &SessionTimings) {
        let Some((capture, decode, total)) = timings.durations(Instant::now()) else {
            return;
        };
        info!(
            capture_ms = capture.as_millis() as u64,
            decode_ms = decode.as_millis() as u64,
            total_ms = total.as_millis() as u64,
            "session complete"
        );
        println!(
            "timing: capture {:.2}s, decode {:.2}s, total {:.2}s",
            capture.as_secs_f64(),
            decode.as_secs_f64(),
            total.as_secs_f64()
        );
    }

    /// Completion path shared by the worker and its spawn-failure fallback
    fn finish_session(&self) {
        let mut inner = self.lock_inner();
        // A newer recording may already be underway; leave it alone.
        if inner.state == RecordingState::Transcribing {
            inner.state = RecordingState::Idle;
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observer(&self) -> std::sync::MutexGuard<'_, Option<Arc<TranscriptionObserver>>> {
        self.shared.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The "c" in ctrl+c, case-insensitive
fn is_interrupt_key(key: KeyId) -> bool {
    matches!(key, KeyId::Char(c) if c.eq_ignore_ascii_case(&'c'))
}

fn remove_temp_file(path: &std::path::Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), "failed to delete temporary audio file: {e}");
    } else {
        debug!(path = %path.display(), "temporary audio file deleted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockCaptureBackend;
    use crate::delivery::MockTextInjector;
    use std::sync::mpsc;

    struct FakeProvider {
        result: Mutex<Option<Result<String, ProviderError>>>,
        transcribed: Mutex<Vec<PathBuf>>,
        vocabulary_calls: Mutex<Vec<Vec<String>>>,
        clear_calls: AtomicBool,
    }

    impl FakeProvider {
        fn returning(text: &str) -> Self {
            Self {
                result: Mutex::new(Some(Ok(text.to_owned()))),
                transcribed: Mutex::new(Vec::new()),
                vocabulary_calls: Mutex::new(Vec::new()),
                clear_calls: AtomicBool::new(false),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Mutex::new(Some(Err(ProviderError::Transcription(anyhow::anyhow!(
                    "{message}"
                ))))),
                transcribed: Mutex::new(Vec::new()),
                vocabulary_calls: Mutex::new(Vec::new()),
                clear_calls: AtomicBool::new(false),
            }
        }
    }

    impl TranscriptionProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn load(&self, _progress: Option<&crate::provider::ProgressFn>) -> Result<(), ProviderError> {
            Ok(())
        }

        fn transcribe(&self, audio_path: &std::path::Path) -> Result<String, ProviderError> {
            self.transcribed.lock().unwrap().push(audio_path.to_owned());
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(String::new()))
        }

        fn add_vocabulary(&self, phrases: &[String]) -> Result<(), ProviderError> {
            self.vocabulary_calls.lock().unwrap().push(phrases.to_vec());
            Ok(())
        }

        fn clear_vocabulary(&self) -> Result<(), ProviderError> {
            self.clear_calls.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Signals when `transcribe` is entered and blocks the first call until
    /// told to finish. Later calls return immediately.
    struct BlockingProvider {
        started_tx: mpsc::Sender<()>,
        release_rx: Mutex<Option<mpsc::Receiver<()>>>,
        transcribed: Mutex<Vec<PathBuf>>,
    }

    impl BlockingProvider {
        fn new(started_tx: mpsc::Sender<()>, release_rx: mpsc::Receiver<()>) -> Self {
            Self {
                started_tx,
                release_rx: Mutex::new(Some(release_rx)),
                transcribed: Mutex::new(Vec::new()),
            }
        }
    }

    impl TranscriptionProvider for BlockingProvider {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn load(&self, _progress: Option<&crate::provider::ProgressFn>) -> Result<(), ProviderError> {
            Ok(())
        }

        fn transcribe(&self, audio_path: &std::path::Path) -> Result<String, ProviderError> {
            self.transcribed.lock().unwrap().push(audio_path.to_owned());
            let gate = self.release_rx.lock().unwrap().take();
            let _ = self.started_tx.send(());
            if let Some(gate) = gate {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            Ok(String::new())
        }
    }

    fn recorder_with_frames() -> AudioRecorder {
        let mut backend = MockCaptureBackend::new();
        backend.expect_open().returning(|_, _, frames, _| {
            frames.lock().unwrap().push(vec![0.1, 0.2]);
            let (stop_tx, stop_rx) = mpsc::channel();
            let join = std::thread::spawn(move || {
                let _ = stop_rx.recv();
            });
            Ok(crate::audio::CaptureHandle::new(stop_tx, join))
        });
        AudioRecorder::new(Box::new(backend), 16000, 1)
    }

    fn empty_recorder() -> AudioRecorder {
        let mut backend = MockCaptureBackend::new();
        backend.expect_open().returning(|_, _, _, _| {
            let (stop_tx, stop_rx) = mpsc::channel();
            let join = std::thread::spawn(move || {
                let _ = stop_rx.recv();
            });
            Ok(crate::audio::CaptureHandle::new(stop_tx, join))
        });
        AudioRecorder::new(Box::new(backend), 16000, 1)
    }

    fn silent_delivery() -> TextDelivery {
        let mut injector = MockTextInjector::new();
        injector.expect_set_clipboard().returning(|_| Ok(()));
        injector.expect_send_paste_chord().returning(|| Ok(()));
        injector.expect_type_text().returning(|_| Ok(()));
        TextDelivery::new(Box::new(injector))
    }

    fn transcriber(
        hotkey: &str,
        recorder: AudioRecorder,
        provider: Arc<dyn TranscriptionProvider>,
    ) -> HotkeyTranscriber {
        HotkeyTranscriber::new(hotkey, recorder, provider, silent_delivery()).unwrap()
    }

    fn await_idle(t: &HotkeyTranscriber) {
        for _ in 0..100 {
            if t.state() == RecordingState::Idle {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("pipeline did not return to idle");
    }

    #[test]
    fn test_press_release_runs_full_pipeline() {
        let provider = Arc::new(FakeProvider::returning("hello world"));
        let t = transcriber("f8", recorder_with_frames(), provider.clone());

        let (text_tx, text_rx) = mpsc::channel();
        t.set_observer(Box::new(move |text| {
            let _ = text_tx.send(text.to_owned());
        }));

        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Recording);
        t.handle_release(KeyId::Named(NamedKey::F8));

        let text = text_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(text, "hello world");
        await_idle(&t);

        let paths = provider.transcribed.lock().unwrap();
        assert_eq!(paths.len(), 1);
        // The worker is responsible for deleting the temp file.
        assert!(!paths[0].exists());
    }

    #[test]
    fn test_observer_may_replace_itself() {
        let provider = Arc::new(FakeProvider::returning("first"));
        let t = transcriber("f8", recorder_with_frames(), provider);

        let (text_tx, text_rx) = mpsc::channel();
        let handle = t.clone();
        t.set_observer(Box::new(move |text| {
            let _ = text_tx.send(text.to_owned());
            handle.set_observer(Box::new(|_| {}));
        }));

        t.handle_press(KeyId::Named(NamedKey::F8));
        t.handle_release(KeyId::Named(NamedKey::F8));

        let text = text_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(text, "first");
        await_idle(&t);
    }

    #[test]
    fn test_failed_start_reverts_to_idle() {
        let mut backend = MockCaptureBackend::new();
        backend
            .expect_open()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("no input device")));
        let recorder = AudioRecorder::new(Box::new(backend), 16000, 1);
        let provider = Arc::new(FakeProvider::returning("should not run"));
        let t = transcriber("f8", recorder, provider.clone());

        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Idle);
        t.handle_release(KeyId::Named(NamedKey::F8));

        assert_eq!(t.state(), RecordingState::Idle);
        assert!(provider.transcribed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_press_is_ignored() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", recorder_with_frames(), provider);

        t.handle_press(KeyId::Named(NamedKey::F8));
        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Recording);
        t.handle_release(KeyId::Named(NamedKey::F8));
        await_idle(&t);
    }

    #[test]
    fn test_press_during_transcription_starts_new_recording() {
        let (started_tx, started_rx) = mpsc::channel();
        let (finish_tx, finish_rx) = mpsc::channel();
        let provider = Arc::new(BlockingProvider::new(started_tx, finish_rx));
        let t = transcriber("f8", recorder_with_frames(), provider.clone());

        t.handle_press(KeyId::Named(NamedKey::F8));
        t.handle_release(KeyId::Named(NamedKey::F8));
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(t.state(), RecordingState::Transcribing);

        // A new utterance can begin while the previous one is still decoding.
        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Recording);

        // The first worker finishing must not disturb the newer session.
        finish_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(t.state(), RecordingState::Recording);

        t.handle_release(KeyId::Named(NamedKey::F8));
        await_idle(&t);
        assert_eq!(provider.transcribed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_stray_release_is_ignored() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        t.handle_release(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Idle);
    }

    #[test]
    fn test_non_matching_key_has_no_effect() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        t.handle_press(KeyId::Named(NamedKey::Space));
        assert_eq!(t.state(), RecordingState::Idle);
    }

    #[test]
    fn test_release_with_no_audio_skips_transcription() {
        let provider = Arc::new(FakeProvider::returning("should not run"));
        let t = transcriber("f8", empty_recorder(), provider.clone());

        t.handle_press(KeyId::Named(NamedKey::F8));
        t.handle_release(KeyId::Named(NamedKey::F8));

        assert_eq!(t.state(), RecordingState::Idle);
        assert!(provider.transcribed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_transcription_failure_recovers_to_idle() {
        let provider = Arc::new(FakeProvider::failing("model exploded"));
        let t = transcriber("f8", recorder_with_frames(), provider.clone());

        t.handle_press(KeyId::Named(NamedKey::F8));
        t.handle_release(KeyId::Named(NamedKey::F8));
        await_idle(&t);

        let paths = provider.transcribed.lock().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
    }

    #[test]
    fn test_interrupt_chord_requests_shutdown() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", recorder_with_frames(), provider.clone());

        t.handle_press(KeyId::Named(NamedKey::F8));
        t.handle_press(KeyId::Named(NamedKey::Control));
        t.handle_press(KeyId::Char('c'));

        assert!(t.wait_for_shutdown(Duration::from_secs(1)));
        assert_eq!(t.state(), RecordingState::Idle);
        // Aborted recording was discarded, never transcribed.
        assert!(provider.transcribed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_events_after_shutdown_are_ignored() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        t.request_shutdown();
        t.request_shutdown();
        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Idle);
    }

    #[test]
    fn test_plain_c_does_not_shutdown() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("c", empty_recorder(), provider);

        t.handle_press(KeyId::Char('c'));
        assert_eq!(t.state(), RecordingState::Recording);
        assert!(!t.wait_for_shutdown(Duration::from_millis(50)));
    }

    #[test]
    fn test_ctrl_release_clears_chord_tracking() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        t.handle_press(KeyId::Named(NamedKey::Control));
        t.handle_release(KeyId::Named(NamedKey::Control));
        t.handle_press(KeyId::Char('c'));
        assert!(!t.wait_for_shutdown(Duration::from_millis(50)));
    }

    #[test]
    fn test_update_hotkey_swaps_match() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        t.update_hotkey("space").unwrap();
        assert_eq!(t.hotkey_label(), "SPACE");

        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Idle);
        t.handle_press(KeyId::Named(NamedKey::Space));
        assert_eq!(t.state(), RecordingState::Recording);
    }

    #[test]
    fn test_update_hotkey_rejects_invalid() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        assert!(matches!(
            t.update_hotkey("super+q"),
            Err(SettingsError::Hotkey(_))
        ));
        assert_eq!(t.hotkey_label(), "F8");
    }

    #[test]
    fn test_update_vocabulary_diffs_against_previous() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider.clone());

        let phrases = vec!["anyhow".to_owned(), "tracing".to_owned()];
        t.update_vocabulary(phrases.clone()).unwrap();
        assert!(provider.clear_calls.load(Ordering::SeqCst));
        assert_eq!(provider.vocabulary_calls.lock().unwrap().len(), 1);

        // Same list again is a no-op.
        t.update_vocabulary(phrases).unwrap();
        assert_eq!(provider.vocabulary_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_update_provider_is_rejected() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        assert!(matches!(
            t.update_provider("vosk"),
            Err(SettingsError::ProviderSwitchUnsupported)
        ));
    }

    #[test]
    fn test_update_recorder_swaps_while_idle() {
        let provider = Arc::new(FakeProvider::returning(""));
        let t = transcriber("f8", empty_recorder(), provider);

        let mut backend = MockCaptureBackend::new();
        backend.expect_open().returning(|_, _, _, _| {
            let (stop_tx, stop_rx) = mpsc::channel();
            let join = std::thread::spawn(move || {
                let _ = stop_rx.recv();
            });
            Ok(crate::audio::CaptureHandle::new(stop_tx, join))
        });
        t.update_recorder(AudioRecorder::new(Box::new(backend), 48000, 1));

        t.handle_press(KeyId::Named(NamedKey::F8));
        assert_eq!(t.state(), RecordingState::Recording);
    }

    #[test]
    fn test_timings_require_all_timestamps() {
        let start = Instant::now();
        let partial = SessionTimings {
            record_start: Some(start),
            ..SessionTimings::default()
        };
        assert!(partial.durations(Instant::now()).is_none());

        let timings = SessionTimings {
            record_start: Some(start),
            record_stop: Some(start + Duration::from_millis(100)),
            transcribe_start: Some(start + Duration::from_millis(120)),
        };
        let (capture, _, total) = timings
            .durations(start + Duration::from_millis(500))
            .unwrap();
        assert_eq!(capture, Duration::from_millis(100));
        assert_eq!(total, Duration::from_millis(500));
    }
}
