use crate::api::lots::user_from;
use crate::api::{
    idempotency_key, json_outcome, outcome_response, wallet_selector, AppState, work_error,
};
use crate::error::AppError;
use crate::orchestration::ImportedLot;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileBody {
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileResponse {
    imported: Vec<ImportedLot>,
}

pub async fn post_reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReconcileBody>,
) -> Result<Response, AppError> {
    let wallet = match (body.wallet_id.as_deref(), body.wallet_label.as_deref()) {
        (None, None) => None,
        (id, label) => Some(wallet_selector(id, label)?),
    };
    let user = user_from(&body.user_id);

    let key = idempotency_key(&headers, "reconcile");
    let reconciler = Arc::clone(&state.reconciler);
    let outcome = state
        .idempotency
        .run(key.as_deref(), state.run_opts(), || {
            let reconciler = Arc::clone(&reconciler);
            let user = user.clone();
            let wallet = wallet.clone();
            async move {
                reconciler
                    .reconcile(&user, wallet.as_ref())
                    .await
                    .map(|imported| json_outcome(&ReconcileResponse { imported }))
                    .map_err(work_error)
            }
        })
        .await;
    Ok(outcome_response(outcome))
}
