//! Lingqian CLI - drives one ritual from trigger to reveal.
//!
//! This binary is the display collaborator: it consumes phase transitions
//! from the orchestrator's watch channel, echoes them as plain text, and
//! prints the resolved fortune. All timing, fallback, and validation logic
//! lives in [`lingqian_engine`] and [`lingqian_providers`].

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use lingqian_engine::{LingqianConfig, Orchestrator, RitualPhase};
use lingqian_providers::{FortuneProvider, gemini::GeminiClient};
use lingqian_types::FortuneRecord;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "lingqian.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = LingqianConfig::load(CONFIG_PATH)?;
    let Some(api_key) = config.google_api_key() else {
        bail!(
            "no Gemini API key configured; set GEMINI_API_KEY or [api_keys].google in {CONFIG_PATH}"
        );
    };

    let client = GeminiClient::new(api_key, config.model());
    let provider = FortuneProvider::with_timeout(client, config.generation_timeout());
    let mut orchestrator = Orchestrator::with_timings(provider, config.timings());

    let mut phases = orchestrator.subscribe_phase();
    orchestrator.trigger();
    println!("摇签中…");

    phases
        .wait_for(|phase| *phase == RitualPhase::Revealing)
        .await
        .context("orchestrator stopped while shaking")?;
    println!("出签…");

    phases
        .wait_for(|phase| *phase == RitualPhase::Resolved)
        .await
        .context("orchestrator stopped while revealing")?;

    let fortune = orchestrator
        .fortune()
        .context("ritual resolved without a fortune")?;
    print!("{}", render(&fortune));
    orchestrator.dismiss();
    Ok(())
}

fn render(fortune: &FortuneRecord) -> String {
    let [first, second] = fortune.poem.lines();
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "  【{}】 {}", fortune.level, fortune.title);
    let _ = writeln!(out);
    let _ = writeln!(out, "    {first}");
    let _ = writeln!(out, "    {second}");
    let _ = writeln!(out);
    let _ = writeln!(out, "  解签：{}", fortune.interpretation);
    let _ = writeln!(out);
    let _ = writeln!(out, "  事业：{}", fortune.advice.career);
    let _ = writeln!(out, "  感情：{}", fortune.advice.love);
    let _ = writeln!(out, "  健康：{}", fortune.advice.health);
    let _ = writeln!(out, "  财运：{}", fortune.advice.wealth);
    out
}
