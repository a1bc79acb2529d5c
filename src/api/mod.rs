pub mod close;
pub mod dust;
pub mod health;
pub mod lots;
pub mod reconcile;
pub mod rules;

use crate::config::Config;
use crate::db::Repository;
use crate::error::AppError;
use crate::idempotency::{scoped_key, IdempotencyLayer, Outcome, RunOptions, WorkError};
use crate::orchestration::{Reconciler, TradeError, TradeService};
use crate::wallets::WalletSelector;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub trader: Arc<TradeService>,
    pub reconciler: Arc<Reconciler>,
    pub idempotency: Arc<IdempotencyLayer>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        trader: Arc<TradeService>,
        reconciler: Arc<Reconciler>,
        idempotency: Arc<IdempotencyLayer>,
    ) -> Self {
        Self {
            repo,
            config,
            trader,
            reconciler,
            idempotency,
        }
    }

    pub fn run_opts(&self) -> RunOptions {
        RunOptions {
            timeout: Duration::from_secs(self.config.mutation_timeout_secs),
            max_retries: self.config.mutation_max_retries,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/open-lots",
            get(lots::get_open_lots).delete(lots::delete_open_lots),
        )
        .route("/v1/open-lot", post(lots::post_open_lot))
        .route("/v1/open-lot/:mint", delete(lots::delete_open_lot))
        .route("/v1/close-lot/:mint", patch(close::patch_close_lot))
        .route("/v1/clear-dust", post(dust::post_clear_dust))
        .route("/v1/tpsl-rule/:mint", put(rules::put_tpsl_rule))
        .route("/v1/reconcile", post(reconcile::post_reconcile))
        .layer(cors)
        .with_state(state)
}

/// Scoped idempotency key from the request headers, if the client sent one.
pub(crate) fn idempotency_key(headers: &HeaderMap, scope: &str) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(|k| scoped_key(scope, k))
}

/// Resolve the `walletId`/`walletLabel` pair every mutating body carries.
pub(crate) fn wallet_selector(
    wallet_id: Option<&str>,
    wallet_label: Option<&str>,
) -> Result<WalletSelector, AppError> {
    match (wallet_id, wallet_label) {
        (Some(id), _) if !id.is_empty() => Ok(WalletSelector::Id(crate::domain::WalletId::new(id))),
        (_, Some(label)) if !label.is_empty() => Ok(WalletSelector::Label(label.to_string())),
        _ => Err(AppError::BadRequest(
            "Missing walletId or walletLabel".to_string(),
        )),
    }
}

pub(crate) fn json_outcome<T: serde::Serialize>(value: &T) -> Outcome {
    Outcome::ok(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
}

/// Map a service failure onto the idempotency layer's error split:
/// infrastructure failures are retried, domain outcomes are cached terminals.
pub(crate) fn work_error(err: TradeError) -> WorkError {
    if err.is_retryable() {
        WorkError::Retryable(anyhow::anyhow!(err))
    } else {
        let app: AppError = err.into();
        let (status, body) = app.to_outcome();
        WorkError::Terminal(Outcome {
            status: status.as_u16(),
            body,
        })
    }
}

pub(crate) fn outcome_response(outcome: Outcome) -> Response {
    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.body)).into_response()
}
