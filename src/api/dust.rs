use crate::api::lots::user_from;
use crate::api::{
    idempotency_key, json_outcome, outcome_response, wallet_selector, AppState, work_error,
};
use crate::domain::Decimal;
use crate::error::AppError;
use crate::orchestration::trader::ClearDustRequest;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDustBody {
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
    pub min_dust_usd: Option<Decimal>,
    pub hard_delete: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearDustResponse {
    cleared: Vec<crate::orchestration::trader::ClearedPosition>,
}

pub async fn post_clear_dust(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ClearDustBody>,
) -> Result<Response, AppError> {
    // Wallet is optional here: absent means every wallet of the user.
    let wallet = match (body.wallet_id.as_deref(), body.wallet_label.as_deref()) {
        (None, None) => None,
        (id, label) => Some(wallet_selector(id, label)?),
    };
    let request = ClearDustRequest {
        wallet,
        min_dust_usd: body.min_dust_usd,
        hard_delete: body.hard_delete.unwrap_or(false),
    };
    let user = user_from(&body.user_id);

    let key = idempotency_key(&headers, "clear-dust");
    let trader = Arc::clone(&state.trader);
    let outcome = state
        .idempotency
        .run(key.as_deref(), state.run_opts(), || {
            let trader = Arc::clone(&trader);
            let user = user.clone();
            let request = request.clone();
            async move {
                trader
                    .clear_dust(&user, request)
                    .await
                    .map(|cleared| json_outcome(&ClearDustResponse { cleared }))
                    .map_err(work_error)
            }
        })
        .await;
    Ok(outcome_response(outcome))
}
