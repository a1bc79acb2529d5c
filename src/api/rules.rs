use crate::api::lots::user_from;
use crate::api::{
    idempotency_key, json_outcome, outcome_response, wallet_selector, AppState, work_error,
};
use crate::domain::{Decimal, Mint, Strategy};
use crate::error::AppError;
use crate::orchestration::trader::{RuleLegs, RuleRequest};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpSlRuleBody {
    pub tp: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub tp_percent: Option<Decimal>,
    pub sl_percent: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub strategy: Option<String>,
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
}

pub async fn put_tpsl_rule(
    Path(mint): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TpSlRuleBody>,
) -> Result<Response, AppError> {
    let mint = Mint::new(mint);
    let request = RuleRequest {
        wallet: wallet_selector(body.wallet_id.as_deref(), body.wallet_label.as_deref())?,
        strategy: Strategy::new(body.strategy.as_deref().unwrap_or("manual")),
        legs: RuleLegs {
            tp_price: body.tp,
            sl_price: body.sl,
            tp_percent: body.tp_percent,
            sl_percent: body.sl_percent,
        },
        entry_price: body.entry_price,
    };
    let user = user_from(&body.user_id);

    let key = idempotency_key(&headers, &format!("tpsl-rule:{}", mint));
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
                    .upsert_rule(&user, &mint, request)
                    .await
                    .map(|rule| json_outcome(&rule))
                    .map_err(work_error)
            }
        })
        .await;
    Ok(outcome_response(outcome))
}
