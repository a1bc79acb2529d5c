pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod oracle;
pub mod orchestration;
pub mod wallets;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Mint, OpenLot, RawAmount, RealizedTrade, Strategy, TimeMs, TpSlRule, Trigger, UserId,
    WalletId,
};
pub use error::AppError;
pub use idempotency::IdempotencyLayer;
pub use oracle::{CachingOracle, HttpPriceOracle, MockOracle, PriceOracle};
pub use orchestration::{Reconciler, TradeService};
pub use wallets::{InMemoryWalletDirectory, WalletDirectory};
