use vidstream_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Logging comes up before configuration so configuration warnings are visible.
    dotenvy::dotenv().ok();
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    vidstream_api::telemetry::init_telemetry(json_logs)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let config = Config::from_env()?;

    let (_state, router) = vidstream_api::setup::initialize_app(&config).await?;

    vidstream_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
