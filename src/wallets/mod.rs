//! Wallet/auth collaborator contract.
//!
//! Custody and authentication live elsewhere; the ledger consumes exactly two
//! capabilities: resolving a wallet reference to its identity, and reading
//! live on-chain token balances for reconciliation.

use crate::domain::{Mint, RawAmount, UserId, WalletId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// A wallet reference supplied by a client: by id or by display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletSelector {
    Id(WalletId),
    Label(String),
}

/// Resolved wallet identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub id: WalletId,
    pub label: String,
    pub public_key: String,
}

/// One on-chain token holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub mint: Mint,
    /// Balance in smallest units.
    pub raw_amount: RawAmount,
    pub decimals: u8,
}

/// Wallet directory contract consumed by the ledger.
#[async_trait]
pub trait WalletDirectory: Send + Sync + fmt::Debug {
    /// Resolve a wallet by id or label for a user. None when absent.
    async fn resolve(
        &self,
        user: &UserId,
        selector: &WalletSelector,
    ) -> Result<Option<WalletInfo>, anyhow::Error>;

    /// Every wallet registered for a user.
    async fn list_wallets(&self, user: &UserId) -> Result<Vec<WalletInfo>, anyhow::Error>;

    /// Live on-chain balances for a wallet public key.
    async fn onchain_balances(&self, public_key: &str)
        -> Result<Vec<TokenBalance>, anyhow::Error>;
}

/// In-memory wallet directory.
///
/// Serves as the test double and as the standalone deployment mode where
/// wallets are registered at startup; balances are scripted per public key.
#[derive(Debug, Default)]
pub struct InMemoryWalletDirectory {
    wallets: Mutex<HashMap<String, Vec<WalletInfo>>>,
    balances: Mutex<HashMap<String, Vec<TokenBalance>>>,
}

impl InMemoryWalletDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wallet(self, user: &UserId, wallet: WalletInfo) -> Self {
        self.register_wallet(user, wallet);
        self
    }

    pub fn register_wallet(&self, user: &UserId, wallet: WalletInfo) {
        self.wallets
            .lock()
            .expect("directory lock poisoned")
            .entry(user.as_str().to_string())
            .or_default()
            .push(wallet);
    }

    /// Script the balances returned for a public key.
    pub fn set_balances(&self, public_key: &str, balances: Vec<TokenBalance>) {
        self.balances
            .lock()
            .expect("directory lock poisoned")
            .insert(public_key.to_string(), balances);
    }
}

#[async_trait]
impl WalletDirectory for InMemoryWalletDirectory {
    async fn resolve(
        &self,
        user: &UserId,
        selector: &WalletSelector,
    ) -> Result<Option<WalletInfo>, anyhow::Error> {
        let wallets = self.wallets.lock().expect("directory lock poisoned");
        let owned = match wallets.get(user.as_str()) {
            Some(w) => w,
            None => return Ok(None),
        };
        Ok(owned
            .iter()
            .find(|w| match selector {
                WalletSelector::Id(id) => &w.id == id,
                WalletSelector::Label(label) => &w.label == label,
            })
            .cloned())
    }

    async fn list_wallets(&self, user: &UserId) -> Result<Vec<WalletInfo>, anyhow::Error> {
        let wallets = self.wallets.lock().expect("directory lock poisoned");
        Ok(wallets.get(user.as_str()).cloned().unwrap_or_default())
    }

    async fn onchain_balances(
        &self,
        public_key: &str,
    ) -> Result<Vec<TokenBalance>, anyhow::Error> {
        let balances = self.balances.lock().expect("directory lock poisoned");
        Ok(balances.get(public_key).cloned().unwrap_or_default())
    }
}
