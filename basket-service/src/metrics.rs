use anyhow::Result;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use common_http_errors::{ApiError, ApiResult};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    invitation_events: IntCounterVec,
    token_refreshes: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            login_attempts: outcome_counter(
                &registry,
                "basket_login_attempts_total",
                "Count of login attempts grouped by outcome",
                "outcome",
            )?,
            invitation_events: outcome_counter(
                &registry,
                "basket_invitation_events_total",
                "Count of invitation lifecycle events",
                "event",
            )?,
            token_refreshes: outcome_counter(
                &registry,
                "basket_token_refresh_total",
                "Count of refresh-token redemptions grouped by outcome",
                "outcome",
            )?,
            registry,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn invitation_event(&self, event: &str) {
        self.invitation_events.with_label_values(&[event]).inc();
    }

    pub fn token_refresh(&self, outcome: &str) {
        self.token_refreshes.with_label_values(&[outcome]).inc();
    }

    /// Text exposition of every registered family, served as `GET /metrics`.
    pub fn render(&self) -> ApiResult<Response> {
        let encoder = TextEncoder::new();
        let body = encoder
            .encode_to_string(&self.registry.gather())
            .map_err(ApiError::internal)?;
        Ok(([(header::CONTENT_TYPE, encoder.format_type().to_owned())], body).into_response())
    }
}

fn outcome_counter(
    registry: &Registry,
    name: &str,
    help: &str,
    label: &str,
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), &[label])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
