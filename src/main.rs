use anyhow::Context;

mod app;
mod config;
mod db;
mod error;
mod models;

use app::{App, Command, USAGE};
use config::Config;
use error::AppError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e @ AppError::Usage(_)) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    let config = Config::load().context("failed to load configuration")?;
    let app = App::new(&config)
        .await
        .with_context(|| format!("failed to open entry store at {}", config.db_path.display()))?;

    let result = app.handle_command(command).await;

    // Let pending backups finish before the runtime shuts down
    app.shutdown().await;

    let output = match result {
        Ok(output) => output,
        Err(AppError::Store(e)) => {
            let failure = serde_json::json!({ "error": e.to_string(), "status": e.status_code() });
            println!("{}", serde_json::to_string_pretty(&failure)?);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
