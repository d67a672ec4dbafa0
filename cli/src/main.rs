use clap::Parser;
use revtrail_cli::Cli;

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    tracing::debug!("revtrail v{} starting", revtrail_core::VERSION);

    let code = Cli::parse().run().await;
    std::process::exit(code);
}
