use tracing_subscriber::EnvFilter;
use vigil::cli::Cli;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match Cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ Error: {:#}", e);
            1
        }
    };

    std::process::exit(code);
}
