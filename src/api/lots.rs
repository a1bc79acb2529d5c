use crate::api::{
    idempotency_key, json_outcome, outcome_response, wallet_selector, AppState, work_error,
};
use crate::domain::{Decimal, Mint, OpenLot, RawAmount, Strategy, UserId, WalletId};
use crate::error::AppError;
use crate::orchestration::trader::{DeleteRequest, OpenLotRequest, RuleLegs};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLotsQuery {
    pub wallet_id: Option<String>,
    pub mint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotDto {
    pub id: i64,
    pub mint: Mint,
    pub strategy: Strategy,
    pub cost: RawAmount,
    pub acquired_quantity: RawAmount,
    pub closed_quantity: RawAmount,
    pub remaining: RawAmount,
    pub decimals: u8,
    pub entry_price: Decimal,
    pub entry_price_usd: Decimal,
    pub created_at_ms: i64,
}

impl From<&OpenLot> for LotDto {
    fn from(lot: &OpenLot) -> Self {
        LotDto {
            id: lot.id,
            mint: lot.mint.clone(),
            strategy: lot.strategy.clone(),
            cost: lot.cost,
            acquired_quantity: lot.acquired_quantity,
            closed_quantity: lot.closed_quantity,
            remaining: lot.remaining(),
            decimals: lot.decimals,
            entry_price: lot.entry_price,
            entry_price_usd: lot.entry_price_usd,
            created_at_ms: lot.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLotsResponse {
    pub lots: Vec<LotDto>,
}

pub async fn get_open_lots(
    Query(params): Query<OpenLotsQuery>,
    State(state): State<AppState>,
) -> Result<Json<OpenLotsResponse>, AppError> {
    let wallet_id = params
        .wallet_id
        .filter(|w| !w.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing walletId".to_string()))?;
    let mint = params.mint.map(Mint::new);

    let lots = state
        .repo
        .query_open_lots(&WalletId::new(wallet_id), mint.as_ref(), None)
        .await?;
    Ok(Json(OpenLotsResponse {
        lots: lots.iter().map(LotDto::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLotBody {
    pub mint: Option<String>,
    pub acquisition_price: Option<Decimal>,
    pub acquisition_price_usd: Option<Decimal>,
    /// Base asset spent, smallest units, as a string.
    pub input_amount: Option<RawAmount>,
    /// Tokens received, smallest units, as a string.
    pub output_amount: Option<RawAmount>,
    pub decimals: Option<u8>,
    pub strategy: Option<String>,
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
    pub tp: Option<Decimal>,
    pub sl: Option<Decimal>,
    pub tp_percent: Option<Decimal>,
    pub sl_percent: Option<Decimal>,
    pub extensions: Option<serde_json::Value>,
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("Missing required field: {}", field)))
}

pub(crate) fn user_from(user_id: &Option<String>) -> UserId {
    UserId::new(user_id.as_deref().unwrap_or("default"))
}

pub async fn post_open_lot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OpenLotBody>,
) -> Result<Response, AppError> {
    let mint = Mint::new(require(body.mint.clone(), "mint")?);
    let entry_price = require(body.acquisition_price, "acquisitionPrice")?;
    let entry_price_usd = require(body.acquisition_price_usd, "acquisitionPriceUsd")?;
    let cost = require(body.input_amount, "inputAmount")?;
    let quantity = require(body.output_amount, "outputAmount")?;
    let decimals = require(body.decimals, "decimals")?;
    let wallet = wallet_selector(body.wallet_id.as_deref(), body.wallet_label.as_deref())?;
    let user = user_from(&body.user_id);

    let legs = RuleLegs {
        tp_price: body.tp,
        sl_price: body.sl,
        tp_percent: body.tp_percent,
        sl_percent: body.sl_percent,
    };
    let request = OpenLotRequest {
        wallet,
        mint,
        cost,
        quantity,
        decimals,
        strategy: Strategy::new(body.strategy.as_deref().unwrap_or("manual")),
        entry_price,
        entry_price_usd,
        rule: if legs.is_empty() { None } else { Some(legs) },
        extensions: body.extensions.clone(),
    };

    let key = idempotency_key(&headers, "open-lot");
    let trader = Arc::clone(&state.trader);
    let outcome = state
        .idempotency
        .run(key.as_deref(), state.run_opts(), || {
            let trader = Arc::clone(&trader);
            let user = user.clone();
            let request = request.clone();
            async move {
                trader
                    .open_lot(&user, request)
                    .await
                    .map(|out| json_outcome(&out))
                    .map_err(work_error)
            }
        })
        .await;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLotQuery {
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
    pub force: Option<bool>,
    pub hard_delete: Option<bool>,
}

pub async fn delete_open_lot(
    Path(mint): Path<String>,
    Query(params): Query<DeleteLotQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let request = DeleteRequest {
        wallet: wallet_selector(params.wallet_id.as_deref(), params.wallet_label.as_deref())?,
        mints: vec![Mint::new(mint)],
        force: params.force.unwrap_or(false),
        hard_delete: params.hard_delete.unwrap_or(false),
    };
    run_delete(state, headers, user_from(&params.user_id), request).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLotsBody {
    pub mints: Option<Vec<String>>,
    pub wallet_id: Option<String>,
    pub wallet_label: Option<String>,
    pub user_id: Option<String>,
    pub force_delete: Option<bool>,
    pub hard_delete: Option<bool>,
}

pub async fn delete_open_lots(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeleteLotsBody>,
) -> Result<Response, AppError> {
    let mints = require(body.mints.clone(), "mints")?;
    if mints.is_empty() {
        return Err(AppError::BadRequest("mints must not be empty".to_string()));
    }
    let request = DeleteRequest {
        wallet: wallet_selector(body.wallet_id.as_deref(), body.wallet_label.as_deref())?,
        mints: mints.into_iter().map(Mint::new).collect(),
        force: body.force_delete.unwrap_or(false),
        hard_delete: body.hard_delete.unwrap_or(false),
    };
    run_delete(state, headers, user_from(&body.user_id), request).await
}

async fn run_delete(
    state: AppState,
    headers: HeaderMap,
    user: UserId,
    request: DeleteRequest,
) -> Result<Response, AppError> {
    let key = idempotency_key(&headers, "delete-lots");
    let trader = Arc::clone(&state.trader);
    let outcome = state
        .idempotency
        .run(key.as_deref(), state.run_opts(), || {
            let trader = Arc::clone(&trader);
            let user = user.clone();
            let request = request.clone();
            async move {
                trader
                    .delete_lots(&user, request)
                    .await
                    .map(|out| json_outcome(&out))
                    .map_err(work_error)
            }
        })
        .await;
    Ok(outcome_response(outcome))
}
