//! litcircle is the backend of a book-reading-club social application.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod auth;
mod database;
pub mod error;
mod group;
mod middleware;
mod oauth;
mod post;
mod response;
mod router;
mod session;
pub mod telemetry;
mod token;
mod user;

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, header};
use axum::routing::{delete, get, post, put};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    state: Option<&AppState>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    make_request_as(state, app, method, path, body, 1).await
}

/// Same as [`make_request`], impersonating another fixture user.
#[cfg(test)]
pub async fn make_request_as(
    state: Option<&AppState>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
    user_id: i64,
) -> axum::http::Response<axum::body::Body> {
    let token = match state {
        Some(state) => format!(
            "Bearer {}",
            state
                .token
                .create_access(user_id, &format!("ext-{user_id}"))
                .expect("cannot create JWT")
        ),
        None => String::default(),
    };

    make_request_with_token(app, method, path, body, &token).await
}

#[cfg(test)]
pub async fn make_request_with_token(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    token: &str,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, token)
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub token: token::TokenManager,
    pub oauth: Option<oauth::OAuthClient>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Authentication use cases over this state's repositories.
    pub(crate) fn auth(&self) -> auth::AuthService {
        auth::AuthService::new(
            user::UserRepository::new(self.db.postgres.clone()),
            session::SessionStore::new(self.db.postgres.clone()),
            self.token.clone(),
            self.oauth.clone(),
        )
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let allow_origin = if state.config.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok()),
        )
    };

    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(allow_origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .vary([header::AUTHORIZATION]),
        );

    let mut auth_routes = Router::new()
        // `GET /{provider}/callback` finishes the provider login.
        .route("/{provider}/callback", get(router::auth::callback))
        // `POST /refresh` rotates a refresh token.
        .route("/refresh", post(router::auth::refresh))
        // `POST /logout` drops every session of the presented user.
        .route("/logout", post(router::auth::logout))
        // `GET /validate` checks the presented access token.
        .route("/validate", get(router::auth::validate));

    if state.config.dev_login {
        auth_routes =
            auth_routes.route("/dev-login", post(router::auth::dev_login));
    }

    Router::new()
        .route("/api/status", get(router::status::health))
        .route("/metrics", get(telemetry::render))
        .nest("/api/auth", auth_routes)
        .route("/api/users/me", get(router::users::me).put(router::users::update_me))
        .route("/api/users/{user_id}", get(router::users::get_one))
        .route("/api/posts", post(router::posts::create).get(router::posts::list))
        .route(
            "/api/posts/{post_id}",
            get(router::posts::get_one)
                .put(router::posts::update)
                .delete(router::posts::remove),
        )
        .route(
            "/api/posts/{post_id}/comments",
            post(router::comments::create).get(router::comments::list),
        )
        .route("/api/comments/{comment_id}", delete(router::comments::remove))
        .route(
            "/api/reading-groups",
            post(router::groups::create).get(router::groups::list),
        )
        .route("/api/reading-groups/mine", get(router::groups::mine))
        .route("/api/reading-groups/join", post(router::groups::join))
        .route(
            "/api/reading-groups/{group_id}",
            get(router::groups::get_one)
                .put(router::groups::update)
                .delete(router::groups::remove),
        )
        .route(
            "/api/reading-groups/{group_id}/members",
            get(router::groups::members),
        )
        .route("/api/reading-groups/{group_id}/leave", post(router::groups::leave))
        .route(
            "/api/reading-groups/{group_id}/invite-code",
            post(router::groups::regenerate_invite_code),
        )
        .route(
            "/api/reading-groups/{group_id}/meetings",
            get(router::meetings::list).post(router::meetings::create),
        )
        .route(
            "/api/meetings/{meeting_id}",
            put(router::meetings::update).delete(router::meetings::remove),
        )
        .route(
            "/api/reading-groups/{group_id}/monthly-books",
            get(router::monthly_books::list).post(router::monthly_books::select),
        )
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::session_filter,
        ))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Bulk-delete refresh tokens past their stored expiry. Exposed for the
/// `sweep-expired-tokens` subcommand so a cron job can drive it; the
/// request path never calls this.
pub async fn sweep_expired_tokens(state: &AppState) -> error::Result<u64> {
    session::SessionStore::new(state.db.postgres.clone())
        .sweep_expired(chrono::Utc::now())
        .await
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;

    let db = match config.postgres {
        Some(ref postgres) => {
            database::Database::new(
                &postgres.address,
                &postgres
                    .username
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &postgres
                    .password
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &postgres
                    .database
                    .clone()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME.into()),
                postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::error!("missing `postgres` entry on `config.yaml` file");
            std::process::exit(0);
        },
    };

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    // handle jwt.
    let secret = std::env::var("TOKEN_SECRET")
        .expect("missing `TOKEN_SECRET` environnement variable");
    let token = token::TokenManager::new(
        &secret,
        config.token.access_token_ttl,
        config.token.refresh_token_ttl,
    );

    // handle the external identity provider.
    let oauth = match &config.oauth {
        Some(provider) => Some(oauth::OAuthClient::new(provider.clone())?),
        None => {
            tracing::warn!(
                "missing `oauth` entry on `config.yaml` file; provider login is disabled"
            );
            None
        },
    };

    Ok(AppState {
        config,
        db,
        token,
        oauth,
        metrics: None,
    })
}
