//! # pay-api
//!
//! HTTP server for the hosted checkout flow.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Static checkout, success and cancel pages
//! - Checkout Session creation
//! - Webhook handler for payment events
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/` | Checkout page |
//! | POST | `/create-session` | Create checkout session |
//! | GET | `/success` | Payment succeeded page |
//! | GET | `/cancel` | Payment cancelled page |
//! | POST | `/webhook` | Stripe webhook |
//! | GET | `/health` | Health check |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
