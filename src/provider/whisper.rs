//! Whisper backend for the [`TranscriptionProvider`] interface
//!
//! Wraps whisper.cpp via `whisper-rs`. The model context is loaded lazily and
//! exactly once; vocabulary phrases are applied as the inference initial
//! prompt, which is the biasing mechanism whisper exposes.

use anyhow::{anyhow, Context as _};
use hound::SampleFormat;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::PoisonError;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{ProgressFn, ProviderError, ProviderOptions, TranscriptionProvider};

/// Sample rate whisper.cpp expects
const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Whisper transcription provider
pub struct WhisperProvider {
    model_path: PathBuf,
    threads: i32,
    beam_size: i32,
    language: Option<String>,
    ctx: Mutex<Option<WhisperContext>>,
    vocabulary: Mutex<Vec<String>>,
}

impl WhisperProvider {
    /// Creates an unloaded provider bound to a model file
    ///
    /// # Errors
    /// Returns error if no model path is configured or the options are out of
    /// range for the whisper API
    pub fn new(model_id: Option<&str>, options: &ProviderOptions) -> Result<Self, ProviderError> {
        let model_id = model_id.ok_or_else(|| ProviderError::ModelLoad {
            path: "<unset>".to_owned(),
            source: anyhow!("no model path configured for the whisper provider"),
        })?;
        let model_path = crate::config::Config::expand_path(model_id).map_err(|e| {
            ProviderError::ModelLoad {
                path: model_id.to_owned(),
                source: e,
            }
        })?;

        if options.threads == 0 || options.beam_size == 0 {
            return Err(ProviderError::ModelLoad {
                path: model_id.to_owned(),
                source: anyhow!("threads and beam_size must be > 0"),
            });
        }
        let threads = i32::try_from(options.threads).map_err(|_| ProviderError::ModelLoad {
            path: model_id.to_owned(),
            source: anyhow!("threads value too large (max: {})", i32::MAX),
        })?;
        let beam_size = i32::try_from(options.beam_size).map_err(|_| ProviderError::ModelLoad {
            path: model_id.to_owned(),
            source: anyhow!("beam_size value too large (max: {})", i32::MAX),
        })?;

        Ok(Self {
            model_path,
            threads,
            beam_size,
            language: options.language.clone(),
            ctx: Mutex::new(None),
            vocabulary: Mutex::new(Vec::new()),
        })
    }

    /// Determines sampling strategy based on beam size (pure, testable)
    const fn sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }
}

impl TranscriptionProvider for WhisperProvider {
    fn name(&self) -> &'static str {
        "whisper"
    }

    fn load(&self, progress: Option<&ProgressFn>) -> Result<(), ProviderError> {
        let mut ctx = self.ctx.lock().unwrap_or_else(PoisonError::into_inner);
        if ctx.is_some() {
            tracing::debug!("whisper model already loaded");
            return Ok(());
        }

        if let Some(progress) = progress {
            progress(&format!(
                "Loading whisper model '{}'",
                self.model_path.display()
            ));
        }
        tracing::info!(
            path = %self.model_path.display(),
            threads = self.threads,
            beam_size = self.beam_size,
            language = ?self.language,
            "loading whisper model"
        );

        let path_str = self
            .model_path
            .to_str()
            .ok_or_else(|| ProviderError::ModelLoad {
                path: self.model_path.display().to_string(),
                source: anyhow!("model path contains invalid UTF-8"),
            })?;

        let params = WhisperContextParameters::default();
        let loaded = WhisperContext::new_with_params(path_str, params).map_err(|e| {
            ProviderError::ModelLoad {
                path: self.model_path.display().to_string(),
                source: anyhow!("{e:?}"),
            }
        })?;

        tracing::info!("whisper model loaded successfully");
        if let Some(progress) = progress {
            progress("Whisper model loaded");
        }
        *ctx = Some(loaded);
        Ok(())
    }

    fn transcribe(&self, audio_path: &Path) -> Result<String, ProviderError> {
        self.load(None)?;

        let audio = read_wav_as_16khz_mono(audio_path)?;
        let _span = tracing::debug_span!("transcription", samples = audio.len()).entered();

        let prompt = {
            let vocabulary = self
                .vocabulary
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if vocabulary.is_empty() {
                None
            } else {
                Some(vocabulary.join(", "))
            }
        };

        let ctx = self.ctx.lock().unwrap_or_else(PoisonError::into_inner);
        let ctx = ctx
            .as_ref()
            .ok_or_else(|| ProviderError::Transcription(anyhow!("model context missing")))?;
        let mut state = ctx
            .create_state()
            .map_err(|e| ProviderError::Transcription(anyhow!("{e:?}")))?;

        let mut params = FullParams::new(Self::sampling_strategy(self.beam_size));
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref());
        params.set_translate(false);
        if let Some(prompt) = prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }

        let start = std::time::Instant::now();
        state
            .full(params, &audio)
            .context("whisper inference failed")?;
        let inference_duration = start.elapsed();

        let mut result = String::new();
        for segment in state.as_iter() {
            result.push_str(&segment.to_string());
        }
        let result = result.trim().to_owned();

        tracing::info!(
            segments = state.full_n_segments(),
            text_len = result.len(),
            inference_ms = inference_duration.as_millis(),
            "transcription completed"
        );

        Ok(result)
    }

    fn add_vocabulary(&self, phrases: &[String]) -> Result<(), ProviderError> {
        let mut vocabulary = self
            .vocabulary
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for phrase in phrases {
            let phrase = phrase.trim();
            if !phrase.is_empty() && !vocabulary.iter().any(|p| p == phrase) {
                vocabulary.push(phrase.to_owned());
            }
        }
        tracing::debug!(phrases = vocabulary.len(), "vocabulary updated");
        Ok(())
    }

    fn clear_vocabulary(&self) -> Result<(), ProviderError> {
        self.vocabulary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("vocabulary cleared");
        Ok(())
    }
}

/// Reads a WAV file and converts it to the 16kHz mono f32 whisper expects
fn read_wav_as_16khz_mono(path: &Path) -> Result<Vec<f32>, ProviderError> {
    let audio_read = |source: anyhow::Error| ProviderError::AudioRead {
        path: path.display().to_string(),
        source,
    };

    let mut reader = hound::WavReader::open(path)
        .map_err(|e| audio_read(anyhow!("failed to open WAV file: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| audio_read(anyhow!("failed to decode samples: {e}")))?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| f32::from(s) / 32768.0))
            .collect::<Result<_, _>>()
            .map_err(|e| audio_read(anyhow!("failed to decode samples: {e}")))?,
        (format, bits) => {
            return Err(audio_read(anyhow!(
                "unsupported WAV format: {format:?} {bits}-bit"
            )))
        }
    };

    let mono = downmix_to_mono(&samples, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, WHISPER_SAMPLE_RATE))
}

/// Averages interleaved channels into a mono signal
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 → f32: audio samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampling between arbitrary rates
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len_f64 = (samples.len() as f64) / ratio;
    let output_len = if output_len_f64.is_finite() && output_len_f64 >= 0.0 {
        output_len_f64.ceil() as usize
    } else {
        samples.len()
    };

    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx_f64 = (i as f64) * ratio;
        let src_idx_floor = if src_idx_f64 >= 0.0 && src_idx_f64 < (usize::MAX as f64) {
            src_idx_f64.floor() as usize
        } else {
            0
        };
        let src_idx_ceil = (src_idx_floor + 1).min(samples.len().saturating_sub(1));
        let fract = src_idx_f64 - src_idx_f64.floor();

        let sample = if src_idx_floor < samples.len() {
            let s1 = f64::from(samples[src_idx_floor]);
            let s2 = f64::from(samples[src_idx_ceil]);
            s1.mul_add(1.0 - fract, s2 * fract) as f32
        } else {
            0.0_f32
        };
        resampled.push(sample);
    }

    resampled
}

// SAFETY: WhisperContext lives behind a Mutex and is only touched while the
// lock is held; whisper-rs documents the context as thread-safe when access
// is synchronized.
#[allow(unsafe_code)]
unsafe impl Send for WhisperProvider {}
#[allow(unsafe_code)]
unsafe impl Sync for WhisperProvider {}
