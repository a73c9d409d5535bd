//! # checkout-server
//!
//! Hosted checkout server backed by Stripe.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables (or put them in .env)
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...   # optional, strongly recommended
//! export DOMAIN=http://localhost:3000
//!
//! # Run the server
//! checkout-server
//! ```

use pay_api::{routes, state::AppState};
use pay_stripe::REQUIRED_WEBHOOK_EVENTS;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging; LOG_FORMAT=json for machine-readable output
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    print_banner();

    let state = AppState::new()?;

    let addr = state.config.socket_addr();

    info!("Environment: {}", state.config.environment);
    info!("Redirect domain: {}", state.config.domain);
    info!("Static pages: {}", state.config.static_dir.display());

    if !state.config.static_dir.join("index.html").is_file() {
        warn!(
            "No index.html in {}, GET / will answer 404",
            state.config.static_dir.display()
        );
    }

    if state.strategy.webhook_signing_enabled() {
        info!("Webhook signatures: verified");
    } else if state.config.is_production() {
        warn!("STRIPE_WEBHOOK_SECRET is not set in production: webhook bodies are trusted without verification");
    } else {
        warn!("STRIPE_WEBHOOK_SECRET not set, webhook signatures are not checked (development only)");
    }

    let app = routes::create_router(state);

    info!("🚀 Checkout server listening on http://{}", addr);
    info!(
        "🔔 Webhook: POST http://{}/webhook (events: {})",
        addr,
        REQUIRED_WEBHOOK_EVENTS.join(", ")
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  🛒 Hosted Checkout Server
  ━━━━━━━━━━━━━━━━━━━━━━━━━
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
