use clap::Parser;
use qbrsync::{Application, Config, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Values from a local .env fill in whatever the real environment leaves unset
    dotenvy::dotenv().ok();

    // Install rustls crypto provider before anything else that might build a TLS client
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Parse CLI args
    let args = qbrsync::config::Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    // Initialize telemetry (tracing + optional OpenTelemetry)
    telemetry::init_telemetry(config.enable_otel_export)?;

    tracing::debug!("{:?}", args);

    let result = match Application::new(config) {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };

    // Flush exported spans whether or not the run succeeded
    telemetry::shutdown_telemetry();

    result?;
    Ok(())
}
