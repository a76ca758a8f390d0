//! Form Tracker - interactive form state demo
//!
//! Mounts one of the bundled forms and reads commands from stdin, printing
//! the resulting form state as JSON after each one.

use anyhow::Result;
use clap::Parser;
use form_tracker::app::App;
use form_tracker::forms::DemoForm;
use form_tracker::TrackerConfig;
use std::io;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "form-tracker", version, about = "Interactive form state demo")]
struct Cli {
    /// Form to mount
    #[arg(value_enum, default_value_t = DemoForm::YouTube)]
    form: DemoForm,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = TrackerConfig::load().unwrap_or_else(|err| {
        tracing::warn!("Ignoring unreadable config: {err:#}");
        TrackerConfig::default()
    });

    let mut app = App::new(cli.form, config).await?;
    let result = app
        .run(BufReader::new(tokio::io::stdin()), &mut io::stdout())
        .await;

    if let Err(err) = result {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }

    Ok(())
}
