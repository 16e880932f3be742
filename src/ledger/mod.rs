//! Stake ledger collaborator.
//!
//! The tournament core touches the ledger in exactly two places: an invite
//! acceptance debits the stake, and finalization credits the pot to the
//! winner. Both are atomic balance adjustments keyed for idempotency: an
//! implementation must treat a repeated key as success without re-applying
//! the adjustment, which makes retried finalization replay-safe.

use crate::tournament::models::AccountId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

pub mod postgres;

pub use postgres::PgLedger;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Not enough points to cover the debit
    #[error("Insufficient funds for account {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        required: i64,
    },

    /// Unknown account
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Balance would overflow
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Backend failure, possibly transient
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Whether the error is worth an automatic bounded-backoff retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// External ledger interface
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically debit an account, failing when the balance cannot cover
    /// the amount. A repeated `idempotency_key` is a success no-op.
    async fn debit(
        &self,
        account: AccountId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()>;

    /// Atomically credit an account. A repeated `idempotency_key` is a
    /// success no-op.
    async fn credit(
        &self,
        account: AccountId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()>;

    /// Current balance of an account
    async fn balance(&self, account: AccountId) -> LedgerResult<i64>;
}

#[derive(Default)]
struct MemoryLedgerInner {
    balances: HashMap<AccountId, i64>,
    used_keys: HashSet<String>,
}

/// In-memory ledger for tests and embedded deployments
#[derive(Default)]
pub struct MemoryLedger {
    inner: RwLock<MemoryLedgerInner>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account balance
    pub async fn fund(&self, account: AccountId, balance: i64) {
        self.inner.write().await.balances.insert(account, balance);
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn debit(
        &self,
        account: AccountId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut inner = self.inner.write().await;
        if inner.used_keys.contains(idempotency_key) {
            return Ok(());
        }
        let balance = inner
            .balances
            .get_mut(&account)
            .ok_or(LedgerError::AccountNotFound(account))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account,
                available: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        inner.used_keys.insert(idempotency_key.to_string());
        Ok(())
    }

    async fn credit(
        &self,
        account: AccountId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut inner = self.inner.write().await;
        if inner.used_keys.contains(idempotency_key) {
            return Ok(());
        }
        let balance = inner.balances.entry(account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        inner.used_keys.insert(idempotency_key.to_string());
        Ok(())
    }

    async fn balance(&self, account: AccountId) -> LedgerResult<i64> {
        self.inner
            .read()
            .await
            .balances
            .get(&account)
            .copied()
            .ok_or(LedgerError::AccountNotFound(account))
    }
}
