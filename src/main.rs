use anyhow::{Context, Result};
use asr_hotkey::audio::{AudioRecorder, CpalBackend};
use asr_hotkey::config::Config;
use asr_hotkey::delivery::TextDelivery;
use asr_hotkey::hotkey::HotkeyTranscriber;
use asr_hotkey::provider::{create_provider, ProgressFn, ProviderOptions};
use asr_hotkey::telemetry;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    telemetry::init(&config.telemetry)?;
    tracing::info!("asr-hotkey starting");

    let options = ProviderOptions::from_table(&config.options)
        .context("invalid [options] section in config")?;
    let provider = create_provider(
        &config.provider.name,
        config.provider.model_id.as_deref(),
        &options,
    )?;
    let provider: Arc<dyn asr_hotkey::provider::TranscriptionProvider> = Arc::from(provider);

    let progress: &ProgressFn = &|status| println!("{status}");
    provider.load(Some(progress))?;

    let recorder = AudioRecorder::new(
        Box::new(CpalBackend),
        config.audio.sample_rate,
        config.audio.channels,
    );
    let delivery = TextDelivery::system()?;
    let transcriber =
        HotkeyTranscriber::new(&config.hotkey, recorder, Arc::clone(&provider), delivery)?;

    if !config.vocabulary.is_empty() {
        if let Err(e) = transcriber.update_vocabulary(config.vocabulary.clone()) {
            tracing::warn!("could not apply vocabulary from config: {e}");
        }
    }

    println!(
        "\nHold {} to record, release to transcribe. Ctrl+C to exit.\n",
        transcriber.hotkey_label()
    );

    // The OS interrupt signal and the in-band ctrl+c chord converge on the
    // same shutdown path.
    let signal_target = transcriber.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_target.request_shutdown();
        }
    });

    let runner = transcriber.clone();
    tokio::task::spawn_blocking(move || runner.run())
        .await
        .context("listener task panicked")??;

    println!("Goodbye.");
    Ok(())
}
