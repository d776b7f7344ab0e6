use clap::Parser;
use fintrack::args::{Args, Command};
use fintrack::{commands, Config, Result};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, trace};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init => commands::init(home).await?.print(),

        Command::Add(add_args) => commands::add(Config::load(home).await?, add_args.clone())
            .await?
            .print(),

        Command::Delete(delete_args) => {
            commands::delete(Config::load(home).await?, delete_args.clone())
                .await?
                .print()
        }

        Command::Update(update_args) => {
            commands::update(Config::load(home).await?, update_args.clone())
                .await?
                .print()
        }

        Command::List(list_args) => commands::list(Config::load(home).await?, list_args.clone())
            .await?
            .print(),

        Command::Summary => commands::summary(Config::load(home).await?)
            .await?
            .print(),

        Command::Import(import_args) => {
            commands::import(Config::load(home).await?, import_args.clone())
                .await?
                .print()
        }

        Command::Advise => commands::advise(Config::load(home).await?)
            .await?
            .print(),

        Command::Holidays => commands::holidays(Config::load(home).await?)
            .await?
            .print(),

        Command::Recommendations(rec_args) => {
            commands::recommendations(Config::load(home).await?, rec_args.clone())
                .await?
                .print()
        }

        Command::Dismiss(dismiss_args) => {
            commands::dismiss(Config::load(home).await?, dismiss_args.clone())
                .await?
                .print()
        }

        Command::Feedback(feedback_args) => {
            commands::feedback(Config::load(home).await?, feedback_args.clone())
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
