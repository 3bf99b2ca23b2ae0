use routegen_app::app::App;
use routegen_core::task::runner::Runner;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod config;

#[tokio::main]
async fn main() {
    // Install global log collector. Logs go to stderr so stdout carries route output only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::load().unwrap_or_else(|err| {
        error!("{}", err);
        process::exit(1);
    });

    // Run every configured route until they all finish.
    if let Err(err) = (App { config }).run().await {
        error!("{}", err);
        process::exit(1);
    }
}
