#![doc = include_str!("../Readme.md")]
#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]
#![cfg_attr(any(test, feature = "bench"), allow(clippy::wildcard_imports))]
// TODO: These lints
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]

mod admin;
pub mod answer_pipeline;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod events;
pub mod fanout;
pub mod keys;
pub mod leaderboard;
pub mod model;
pub mod profanity;
pub mod rate_limiter;
pub mod recovery;
pub mod registry;
pub mod scoring;
pub mod session;
pub mod store;
pub mod timer;
pub mod token;
pub mod util;
mod ws;

use crate::clock::{SharedClock, SystemClock};
use crate::keys::Keys;
use crate::rate_limiter::RateLimiter;
use crate::registry::{SessionRegistry, SharedRegistry};
use crate::store::audit::SqlAuditLog;
use crate::store::durable;
use crate::store::ephemeral::DashMapEphemeralStore;
use crate::store::quiz::SqlQuizStore;
use crate::store::{AuditLog, DurableStore, QuizStore};
use crate::token::TokenIssuer;
use axum::extract::Extension;
use axum::routing::{get, post, IntoMakeService};
use axum::{Router, Server};
use clap::Parser;
use eyre::Result as EyreResult;
use hyper::server::conn::AddrIncoming;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq, Eq, Parser)]
pub struct Options {
    /// Address the HTTP/WebSocket server binds to.
    #[clap(long, env, default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    #[clap(flatten)]
    pub keys: keys::Options,

    #[clap(flatten)]
    pub store: durable::Options,
}

#[allow(clippy::missing_errors_doc)]
pub async fn async_main(options: Options) -> EyreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = options.bind;
    let server = start_server(options).await?;
    info!("Listening on http://{}", server.local_addr());
    server
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    let _ = addr;
    Ok(())
}

/// Application state shared across every request/connection via `Extension`
/// layers, following the teacher's own preference for several narrow
/// `Extension<T>`s over one monolithic `AppState` struct.
#[allow(clippy::missing_errors_doc)]
pub async fn start_server(
    options: Options,
) -> EyreResult<Server<AddrIncoming, IntoMakeService<axum::routing::IntoMakeServiceWithConnectInfo<Router, SocketAddr>>>>
{
    let clock: SharedClock = Arc::new(SystemClock);
    let keys = Arc::new(Keys::new(&options.keys)?);
    let tokens = Arc::new(TokenIssuer::new(keys));
    let registry: SharedRegistry = Arc::new(SessionRegistry::new());
    let ephemeral = Arc::new(DashMapEphemeralStore::new());
    let rate_limiter = Arc::new(RateLimiter::new(ephemeral));

    let durable = durable::connect(&options.store).await?;
    let pool = durable.pool();
    let audit: Arc<dyn AuditLog> = Arc::new(SqlAuditLog::new(pool.clone()));
    let quizzes: Arc<dyn QuizStore> = Arc::new(SqlQuizStore::new(pool));
    let durable: Arc<dyn DurableStore> = Arc::new(durable);

    let router = Router::new()
        .route("/healthz", get(admin::healthz))
        .route("/sessions", post(admin::create_session))
        .route("/sessions/:id/info", get(admin::session_info))
        .route("/ws/:join_code", get(ws::ws_handler))
        .layer(Extension(registry))
        .layer(Extension(tokens))
        .layer(Extension(clock))
        .layer(Extension(durable))
        .layer(Extension(audit))
        .layer(Extension(quizzes))
        .layer(Extension(rate_limiter))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let service = router.into_make_service_with_connect_info::<SocketAddr>();
    let server = Server::try_bind(&options.bind)?.serve(service);
    Ok(server)
}

#[cfg(test)]
mod tests {}
