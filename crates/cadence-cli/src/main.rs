//! Cadence CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;


use commands::Commands;
use config::{CliSettings, OutputFormat};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about = "Instantiate and rerun pipeline stages", long_about = None)]
struct Cli {
    /// Output encoding (defaults to the configured one)
    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(settings: &CliSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = CliSettings::load()?;
    init_tracing(&settings);

    let format = cli.format.unwrap_or(settings.output_format);

    match cli.command {
        Commands::Plan {
            pipeline,
            agents,
            stage,
            user,
            cause,
        } => {
            let user = user.unwrap_or_else(|| settings.default_user.clone());
            handlers::plan(
                format,
                &pipeline,
                agents.as_deref(),
                stage.as_deref(),
                &user,
                cause.as_deref(),
            )
            .await?
        }
        Commands::Rerun {
            stage_file,
            pipeline,
            stage,
            jobs,
            agents,
            user,
        } => {
            let user = user.unwrap_or_else(|| settings.default_user.clone());
            handlers::rerun(
                format,
                &stage_file,
                &pipeline,
                stage.as_deref(),
                &jobs,
                agents.as_deref(),
                &user,
            )
            .await?
        }
        Commands::Fingerprint { pipeline } => handlers::fingerprint(&pipeline).await?,
        Commands::Schema => handlers::schema()?,
    }

    Ok(())
}
