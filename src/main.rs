use clap::{Parser, Subcommand};
use matching_engine::state::AppState;
use matching_engine::utils::shutdown_token;
use matching_engine::{api, client, ws};
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "matching-engine")]
#[command(
    version = "0.1",
    about = "A multi-symbol limit order book matching engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST and WebSocket servers
    Server {
        /// Port for the REST order-entry API
        #[arg(long, default_value_t = 8080)]
        rest_port: u16,
        /// Port for the WebSocket market-data feed
        #[arg(long, default_value_t = 9002)]
        ws_port: u16,
    },
    /// Run the interactive trading client
    Client {
        /// WebSocket endpoint of a running server
        #[arg(long, default_value = "ws://127.0.0.1:9002")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let token = shutdown_token();
    let cli = Cli::parse();
    match cli.command {
        Commands::Server { rest_port, ws_port } => {
            let state = AppState::new();
            let rest_app = api::router(state.clone());
            let feed_app = ws::router(state);

            let rest_listener = TcpListener::bind(("0.0.0.0", rest_port)).await?;
            let feed_listener = TcpListener::bind(("0.0.0.0", ws_port)).await?;
            tracing::info!("REST server listening on port {rest_port}");
            tracing::info!("WebSocket server listening on port {ws_port}");

            let rest_token = token.clone();
            let rest_task = tokio::spawn(async move {
                axum::serve(rest_listener, rest_app)
                    .with_graceful_shutdown(rest_token.cancelled_owned())
                    .await
            });
            let feed_token = token.clone();
            let feed_task = tokio::spawn(async move {
                axum::serve(feed_listener, feed_app)
                    .with_graceful_shutdown(feed_token.cancelled_owned())
                    .await
            });

            let (rest_result, feed_result) = tokio::try_join!(rest_task, feed_task)?;
            rest_result?;
            feed_result?;
            tracing::info!("shutdown complete");
        }
        Commands::Client { url } => {
            client::run_client(&url, token).await?;
        }
    }
    Ok(())
}
