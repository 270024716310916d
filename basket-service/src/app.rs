use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{FromRef, State},
    handler::Handler,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Duration;
use common_auth::TokenCodec;
use common_http_errors::ApiResult;
use reqwest::Client;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::basket_handlers::{create_basket, delete_basket, update_basket};
use crate::config::ServiceConfig;
use crate::directory::{AccountDirectory, StaffRegistry};
use crate::invitation_handlers::{
    accept_invitation, cancel_invitation, create_invitation, list_pending_invitations,
    remove_staff_member,
};
use crate::invitations::{InvitationService, InvitationStore};
use crate::merchant_handlers::{
    create_merchant_request, list_pending_merchant_requests, process_merchant_request,
};
use crate::metrics::ServiceMetrics;
use crate::middleware::{
    authenticate, require_admin, require_merchant, require_merchant_with_sync,
    require_store_staff_from_body, require_store_staff_from_query,
};
use crate::notifications::{LogNotifier, Notifier, WebhookNotifier};
use crate::repo::PgRepository;
use crate::store_handlers::{create_store, list_my_stores};
use crate::tokens::{RefreshTokenStore, SessionIssuer};
use crate::user_handlers::{login, refresh, signup, validate_code};

/// Persistence and delivery seams behind the core services.
#[derive(Clone)]
pub struct Backends {
    pub accounts: Arc<dyn AccountDirectory>,
    pub staff: Arc<dyn StaffRegistry>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub invitations: Arc<dyn InvitationStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Backends {
    pub fn postgres(pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        let repo = Arc::new(PgRepository::new(pool));
        Self {
            accounts: repo.clone(),
            staff: repo.clone(),
            refresh_tokens: repo.clone(),
            invitations: repo,
            notifier,
        }
    }
}

pub fn build_notifier(config: &ServiceConfig) -> Result<Arc<dyn Notifier>> {
    match &config.notify_webhook_url {
        Some(url) => {
            let client = Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("Failed to build notification HTTP client")?;
            info!(%url, "notifications delivered through webhook");
            Ok(Arc::new(WebhookNotifier::new(
                client,
                url.clone(),
                config.notify_webhook_bearer.clone(),
            )))
        }
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set; notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub codec: Arc<TokenCodec>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub staff: Arc<dyn StaffRegistry>,
    pub sessions: Arc<SessionIssuer>,
    pub invitations: Arc<InvitationService>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: ServiceConfig,
        metrics: Arc<ServiceMetrics>,
        backends: Backends,
    ) -> Result<Self> {
        let codec = Arc::new(
            TokenCodec::new(config.jwt.clone()).context("Invalid token signing configuration")?,
        );

        let sessions = Arc::new(SessionIssuer::new(
            codec.clone(),
            backends.accounts.clone(),
            backends.staff.clone(),
            backends.refresh_tokens.clone(),
        ));

        let invitations = Arc::new(
            InvitationService::new(
                backends.invitations.clone(),
                backends.accounts.clone(),
                backends.staff.clone(),
                backends.notifier.clone(),
                config.invitation_accept_url.clone(),
            )
            .with_ttl(Duration::seconds(config.invitation_ttl_seconds())),
        );

        Ok(Self {
            db,
            codec,
            accounts: backends.accounts,
            staff: backends.staff,
            sessions,
            invitations,
            notifier: backends.notifier,
            config: Arc::new(config),
            metrics,
        })
    }
}

impl FromRef<AppState> for Arc<TokenCodec> {
    fn from_ref(state: &AppState) -> Self {
        state.codec.clone()
    }
}

impl FromRef<AppState> for Arc<dyn AccountDirectory> {
    fn from_ref(state: &AppState) -> Self {
        state.accounts.clone()
    }
}

impl FromRef<AppState> for Arc<ServiceMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(metrics): State<Arc<ServiceMetrics>>) -> ApiResult<Response> {
    metrics.render()
}

pub fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
}

/// Every protected route runs `authenticate` first; role and store gates
/// are layered inside it.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/auth/signup", post(signup))
        .route("/auth/validate-code", post(validate_code))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh));

    let authenticated = Router::new()
        .route("/merchants/request", post(create_merchant_request))
        .route("/invitations/accept", post(accept_invitation));

    let admin = Router::new()
        .route(
            "/admin/merchant-requests",
            get(list_pending_merchant_requests),
        )
        .route(
            "/admin/merchant-requests/:id",
            put(process_merchant_request),
        )
        .route_layer(middleware::from_fn(require_admin));

    let merchant = Router::new()
        .route("/stores/mine", get(list_my_stores))
        .route_layer(middleware::from_fn(require_merchant));

    let merchant_synced = Router::new()
        .route("/stores", post(create_store))
        .route("/invitations", post(create_invitation))
        .route("/stores/:id/invitations", get(list_pending_invitations))
        .route("/invitations/:id", delete(cancel_invitation))
        .route("/stores/:id/staff/:user_id", delete(remove_staff_member))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_merchant_with_sync,
        ));

    let store_staff = Router::new()
        .route(
            "/baskets",
            post(create_basket.layer(middleware::from_fn(require_store_staff_from_body))),
        )
        .route(
            "/baskets/:id",
            put(update_basket.layer(middleware::from_fn(require_store_staff_from_body))).delete(
                delete_basket.layer(middleware::from_fn(require_store_staff_from_query)),
            ),
        );

    let protected = authenticated
        .merge(admin)
        .merge(merchant)
        .merge(merchant_synced)
        .merge(store_staff)
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let cors = cors_layer(&state.config);

    public.merge(protected).with_state(state).layer(cors)
}
