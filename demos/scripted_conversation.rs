//! Scripted two-turn conversation with a barge-in, using in-memory
//! collaborators. Watch the cascade in the logs.
//!
//! Usage: RUST_LOG=debug cargo run --example scripted_conversation
//!
//! `TURN_*` environment variables override the stage delays.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use speculative_turns::prelude::*;
use speculative_turns::tests::{
    play_script, RecordingPlayer, ScriptStep, ScriptedGenerator, ScriptedSynthesizer,
    TestServices,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match TurnConfig::default().with_env_overrides() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return;
        }
    };

    let harness = TestServices::new(
        ScriptedGenerator::replying("It is twenty past four.")
            .with_latency(Duration::from_millis(350)),
        ScriptedSynthesizer::producing(Duration::from_secs(2))
            .with_latency(Duration::from_millis(200)),
        RecordingPlayer::new(),
    );

    let handle = match TurnPipeline::new(config, harness.services()) {
        Ok(pipeline) => pipeline
            .with_observer(Arc::new(LogObserver::new().with_text()))
            .with_interruption_strategy(MinWordsInterruption::new(2))
            .spawn(),
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return;
        }
    };

    println!("=== Scripted Conversation ===\n");
    let start = Instant::now();
    let script = [
        // First question, with a mid-sentence pause at 400ms.
        ScriptStep::interim(0, "what"),
        ScriptStep::interim(150, "what time"),
        ScriptStep::interim(400, "what time is"),
        ScriptStep::final_text(600, "what time is it"),
        // Backchannel while the reply plays: suppressed.
        ScriptStep::interim(2_900, "what time is it ok"),
        // Real barge-in.
        ScriptStep::interim(3_400, "what time is it ok and the date"),
    ];
    if let Err(e) = play_script(&handle, start, &script).await {
        eprintln!("session stopped early: {e}");
    }

    tokio::time::sleep(Duration::from_secs(6)).await;
    let stats = handle.shutdown().await;

    println!("\n=== Summary ===");
    println!(
        "generation calls: {}, synthesis calls: {}, playbacks: {}, stops: {}",
        harness.generator.call_count(),
        harness.synthesizer.call_count(),
        harness.player.play_count(),
        harness.player.stops().len(),
    );
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize stats: {e}"),
    }
}
