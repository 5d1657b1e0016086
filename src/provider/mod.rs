//! Transcription provider interface and backend registry
//!
//! Providers are selected by name from configuration at construction time;
//! swapping the provider on a running system is unsupported and rejected by
//! the settings-update path.

#[cfg(feature = "whisper")]
pub mod whisper;

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Callback for human-readable load progress updates
pub type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Errors that can occur inside a transcription provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider is registered under the configured name
    #[error("unknown provider '{name}' (available: {available})")]
    UnknownProvider {
        /// The requested provider name
        name: String,
        /// Comma-separated list of registered providers
        available: String,
    },

    /// The provider exists but was compiled out of this build
    #[error("provider '{0}' is not available in this build; rebuild with `--features {0}`")]
    FeatureDisabled(&'static str),

    /// Failed to load the model backing the provider
    #[error("failed to load model from {path}: {source}")]
    ModelLoad {
        /// Path or identifier of the model
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to read the audio file handed to `transcribe`
    #[error("failed to read audio file {path}: {source}")]
    AudioRead {
        /// Path to the audio file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Inference itself failed
    #[error("transcription failed")]
    Transcription(#[from] anyhow::Error),
}

/// Common interface for speech-recognition backends
///
/// Implementations must be safe to share across threads; a backend that is
/// not reentrant serializes internally (the pipeline may dispatch overlapping
/// transcriptions).
pub trait TranscriptionProvider: Send + Sync {
    /// Short identifier used in configuration and logs
    fn name(&self) -> &'static str;

    /// Ensure heavy resources are ready for inference
    ///
    /// Idempotent: calling on an already-loaded provider succeeds without
    /// reloading. May invoke `progress` zero or more times with status text.
    ///
    /// # Errors
    /// Returns error if the model cannot be loaded
    fn load(&self, progress: Option<&ProgressFn>) -> Result<(), ProviderError>;

    /// Return the recognized text for the given audio file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or inference fails
    fn transcribe(&self, audio_path: &Path) -> Result<String, ProviderError>;

    /// Best-effort vocabulary biasing; providers without support ignore it
    ///
    /// # Errors
    /// Returns error only if the provider supports biasing and applying fails
    fn add_vocabulary(&self, _phrases: &[String]) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Remove any previously applied vocabulary biasing
    ///
    /// # Errors
    /// Returns error only if the provider supports biasing and clearing fails
    fn clear_vocabulary(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Provider tuning decoded from the free-form `[options]` config table
///
/// Unknown keys are ignored so provider-specific settings can coexist.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// CPU threads used for inference
    pub threads: usize,
    /// Beam width; 1 selects greedy decoding
    pub beam_size: usize,
    /// Language code, `None` for auto-detection
    pub language: Option<String>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            beam_size: 5,
            language: None,
        }
    }
}

impl ProviderOptions {
    /// Decodes options from a raw TOML table
    ///
    /// # Errors
    /// Returns error if a known key has the wrong type
    pub fn from_table(table: &toml::Table) -> anyhow::Result<Self> {
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| anyhow::anyhow!("invalid [options] table: {e}"))
    }
}

/// Constructs the provider registered under `name`
///
/// # Errors
/// Returns [`ProviderError::UnknownProvider`] for unregistered names,
/// [`ProviderError::FeatureDisabled`] when the backend was compiled out, or
/// the backend's own construction error.
pub fn create_provider(
    name: &str,
    model_id: Option<&str>,
    options: &ProviderOptions,
) -> Result<Box<dyn TranscriptionProvider>, ProviderError> {
    match name.to_lowercase().as_str() {
        #[cfg(feature = "whisper")]
        "whisper" => Ok(Box::new(whisper::WhisperProvider::new(model_id, options)?)),
        #[cfg(not(feature = "whisper"))]
        "whisper" => {
            let _ = (model_id, options);
            Err(ProviderError::FeatureDisabled("whisper"))
        }
        other => Err(ProviderError::UnknownProvider {
            name: other.to_owned(),
            available: AVAILABLE_PROVIDERS.join(", "),
        }),
    }
}

const AVAILABLE_PROVIDERS: &[&str] = &["whisper"];
