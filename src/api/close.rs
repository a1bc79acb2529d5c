use crate::api::lots::user_from;
use crate::api::{
    idempotency_key, json_outcome, outcome_response, wallet_selector, AppState, work_error,
};
use crate::domain::{Decimal, Mint, RawAmount, Strategy, Trigger};
use crate::engine::CloseTarget;
use crate::error::AppError;
use crate::orchestration::trader::CloseRequest;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseLotBody {
    /// Share of the held quantity; values above 1 are percentages.
    pub percent: Option<Decimal>,
    /// Absolute token quantity in smallest units, as a string.
    pub amount: Option<RawAmount>,
    /// Quantity already removed on-chain, as a string.
    pub removed_amount: Option<RawAmount>,
    pub strategy: Option<String>,
    pub trigger_type: Option<String>,
    pub exit_price: Option<Decimal>,
    pub exit_price_usd: Option<Decimal>,
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
}

fn close_target(body: &CloseLotBody) -> Result<CloseTarget, AppError> {
    if let Some(removed) = body.removed_amount {
        return Ok(CloseTarget::Removed(removed));
    }
    if let Some(amount) = body.amount {
        return Ok(CloseTarget::Amount(amount));
    }
    if let Some(percent) = body.percent {
        return Ok(CloseTarget::Percent(percent));
    }
    Err(AppError::BadRequest("Invalid sell amount".to_string()))
}

pub async fn patch_close_lot(
    Path(mint): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CloseLotBody>,
) -> Result<Response, AppError> {
    let target = close_target(&body)?;
    let trigger = match body.trigger_type.as_deref() {
        Some(raw) => Some(
            Trigger::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown trigger type: {}", raw)))?,
        ),
        None => None,
    };
    let exit_price = body
        .exit_price
        .ok_or_else(|| AppError::BadRequest("Missing required field: exitPrice".to_string()))?;
    let exit_price_usd = body.exit_price_usd.ok_or_else(|| {
        AppError::BadRequest("Missing required field: exitPriceUsd".to_string())
    })?;

    let mint = Mint::new(mint);
    let request = CloseRequest {
        wallet: wallet_selector(body.wallet_id.as_deref(), body.wallet_label.as_deref())?,
        strategy: body.strategy.as_deref().map(Strategy::new),
        target,
        exit_price,
        exit_price_usd,
        trigger,
    };
    let user = user_from(&body.user_id);

    let key = idempotency_key(&headers, &format!("close-lot:{}", mint));
    let trader = Arc::clone(&state.trader);
    let outcome = state
        .idempotency
        .run(key.as_deref(), state.run_opts(), || {
            let trader = Arc::clone(&trader);
            let user = user.clone();
            let mint = mint.clone();
            let request = request.clone();
            async move {
                trader
                    .close_position(&user, &mint, request)
                    .await
                    .map(|summary| json_outcome(&summary))
                    .map_err(work_error)
            }
        })
        .await;
    Ok(outcome_response(outcome))
}
