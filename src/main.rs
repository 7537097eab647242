use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use order_book_engine::engine::AppState;
use order_book_engine::instrument::Symbol;
use order_book_engine::marketdata::{self, Mode};
use order_book_engine::risk::RiskLimits;
use order_book_engine::utils::shutdown_token;
use order_book_engine::api;

/// Starts one order book for one symbol and serves the REST/WS ingress,
/// plus an in-process market-data producer.
#[derive(Parser)]
#[command(name = "engine-cli")]
#[command(
    author = "Andrew Odiit",
    version = "0.1",
    about = "A single-symbol limit order book engine with a pre-trade risk gate"
)]
struct Cli {
    /// Port to bind the HTTP/WS server on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Symbol this process's book is configured for.
    #[arg(long, default_value = "BTC-USD")]
    symbol: String,

    /// Price increment an order's limit price is rounded to.
    #[arg(long, default_value_t = 0.01)]
    tick_size: f64,

    #[arg(long, default_value_t = RiskLimits::default().max_position)]
    max_position: i64,

    #[arg(long, default_value_t = RiskLimits::default().max_daily_loss)]
    max_daily_loss: f64,

    #[arg(long, default_value_t = RiskLimits::default().max_order_rate)]
    max_order_rate: u32,

    #[arg(long, default_value_t = RiskLimits::default().max_order_size)]
    max_order_size: u64,

    #[arg(long, default_value_t = RiskLimits::default().price_deviation_pct)]
    price_deviation_pct: f64,

    /// Disable the background synthetic market-data producer.
    #[arg(long, default_value_t = false)]
    no_market_data: bool,
}

async fn get_app_listener(port: u16, state: AppState) -> anyhow::Result<(TcpListener, Router)> {
    let app = api::router(state);
    let ep = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(ep).await?;
    Ok((listener, app))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let risk_limits = RiskLimits {
        max_position: cli.max_position,
        max_daily_loss: cli.max_daily_loss,
        max_order_rate: cli.max_order_rate,
        max_order_size: cli.max_order_size,
        price_deviation_pct: cli.price_deviation_pct,
    };
    let state = AppState::new(Symbol::new(cli.symbol), cli.tick_size, risk_limits);

    let token = shutdown_token();
    let server_token = token.clone();
    let md_token = token.clone();

    let (listener, app) = get_app_listener(cli.port, state.clone()).await?;
    let server = tokio::spawn(async move {
        tracing::info!(port = cli.port, "HTTP/WS server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
            .expect("axum server task failed");
    });

    let md = if cli.no_market_data {
        None
    } else {
        Some(tokio::spawn(marketdata::run(
            state,
            Mode::Synthetic { base_price: 100.0 },
            md_token,
        )))
    };

    server.await?;
    if let Some(md) = md {
        md.await?;
    }
    Ok(())
}
