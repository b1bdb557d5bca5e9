use clap::Parser;
use overwatch_receiver::{ReceiverArgs, ReceiverConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let args = ReceiverArgs::parse();
    let config = match ReceiverConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level().into()),
        )
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("caught interrupt, shutting down");
            on_signal.cancel();
        }
    });

    if let Err(e) = overwatch_receiver::run(&config, cancel).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
