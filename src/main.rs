use std::sync::Arc;

use anyhow::Context as _;
use crop_advisor::advisor::Advisor;
use crop_advisor::channels::TelegramBot;
use crop_advisor::channels::telegram::spawn_digest_task;
use crop_advisor::config::Settings;
use crop_advisor::llm::OpenAiCompatProvider;
use crop_advisor::providers::{LiveEnrichment, OpenWeatherClient, TavilyClient};
use crop_advisor::store::{LibSqlStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: OPENAI_API_KEY, TAVILY_API_KEY, OPENWEATHER_API_KEY, TELEGRAM_BOT_TOKEN");
        std::process::exit(1);
    });

    eprintln!("🌾 Crop Advisor v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", settings.openai_model);
    eprintln!("   Database: {}", settings.db_path.display());
    eprintln!("   Media: {}", settings.media_dir.display());
    eprintln!(
        "   Digest: every {}s\n",
        settings.digest_interval.as_secs()
    );

    // ── Model client ─────────────────────────────────────────────────────
    let llm = Arc::new(OpenAiCompatProvider::new(
        settings.openai_api_key.clone(),
        settings.openai_model.clone(),
        settings.openai_base_url.as_deref(),
    ));

    // ── Enrichment providers ─────────────────────────────────────────────
    let enrichment = LiveEnrichment::new(
        OpenWeatherClient::new(
            settings.openweather_api_key.clone(),
            settings.openweather_units.clone(),
        ),
        TavilyClient::new(
            settings.tavily_api_key.clone(),
            settings.tavily_max_results,
        ),
    );

    // ── Session store ────────────────────────────────────────────────────
    let store: Arc<dyn SessionStore> = Arc::new(
        LibSqlStore::new_local(&settings.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    settings.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    // ── Orchestrator + Telegram front-end ────────────────────────────────
    let advisor = Arc::new(Advisor::new(llm, enrichment, settings.freshness.clone()));
    let bot = Arc::new(TelegramBot::new(
        settings.telegram_bot_token.clone(),
        settings.media_dir.clone(),
        Arc::clone(&store),
        advisor,
    ));

    bot.health_check()
        .await
        .context("Telegram health check failed")?;

    let _digest_handle = spawn_digest_task(Arc::clone(&bot), settings.digest_interval);

    tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
        _ = bot.run() => {
            tracing::info!("Telegram poll loop ended, shutting down...");
        }
    }

    Ok(())
}
