pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod users;

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::db::VersionedStore;
use crate::services::PairingEngine;
use crate::utils::Config;

pub use auth::register_user;
pub use error::ApiError;
pub use users::{delete_user, get_user, partner_user, ping_partner, pong_partner, unpartner_user, update_user};

pub type AppState<S> = (PairingEngine<S>, Config);

pub fn create_router<S: VersionedStore + Clone + 'static>(engine: PairingEngine<S>, config: Config) -> Router {
    let cors_layer = create_cors_layer(&config);
    let timeout_layer = TimeoutLayer::new(config.request_timeout);
    let rate_limiter = rate_limit::shared_rate_limiter(config.rate_limit_per_minute);
    let app_state: AppState<S> = (engine, config);

    Router::new()
        .route("/v1/health", get(health_check))
        .route("/v1/authentication/user", post(register_user::<S>))
        .route(
            "/v1/users/{id}",
            get(get_user::<S>).patch(update_user::<S>).delete(delete_user::<S>),
        )
        .route("/v1/users/{id}/partner/{partner_id}", put(partner_user::<S>))
        .route("/v1/users/{id}/unpartner", put(unpartner_user::<S>))
        .route("/v1/users/{id}/ping", put(ping_partner::<S>))
        .route("/v1/users/{id}/pong", put(pong_partner::<S>))
        .layer(timeout_layer)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit::limit_by_ip))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(CatchPanicLayer::new())
        .with_state(app_state)
}

fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        // Permissive for development or when nothing parsed
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

async fn health_check() -> &'static str {
    "OK"
}
