//! PostgreSQL ledger backend.
//!
//! Balance adjustments are guarded single-statement updates; the entry log
//! carries the idempotency key behind a unique constraint, checked inside
//! the same transaction as the balance change.

use super::{Ledger, LedgerError, LedgerResult};
use crate::tournament::models::AccountId;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

/// PostgreSQL stake ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: Arc<PgPool>,
}

impl PgLedger {
    /// Create a ledger over an existing connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns true when the key has already been applied
    async fn key_seen(
        tx: &mut Transaction<'_, Postgres>,
        idempotency_key: &str,
    ) -> LedgerResult<bool> {
        let existing = sqlx::query("SELECT id FROM ledger_entries WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(existing.is_some())
    }

    async fn record_entry(
        tx: &mut Transaction<'_, Postgres>,
        account: AccountId,
        amount: i64,
        balance_after: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        sqlx::query(
            "INSERT INTO ledger_entries \
             (account_id, amount, balance_after, idempotency_key) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(account)
        .bind(amount)
        .bind(balance_after)
        .bind(idempotency_key)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn debit(
        &self,
        account: AccountId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut tx = self.pool.begin().await?;

        if Self::key_seen(&mut tx, idempotency_key).await? {
            return Ok(());
        }

        // Balance check and debit in one guarded statement
        let updated = sqlx::query(
            "UPDATE wallets SET balance = balance - $1, updated_at = NOW() \
             WHERE account_id = $2 AND balance >= $1 \
             RETURNING balance",
        )
        .bind(amount)
        .bind(account)
        .fetch_optional(&mut *tx)
        .await?;

        let balance_after: i64 = match updated {
            Some(row) => row.get("balance"),
            None => {
                let current = sqlx::query("SELECT balance FROM wallets WHERE account_id = $1")
                    .bind(account)
                    .fetch_optional(&mut *tx)
                    .await?;
                return match current {
                    Some(row) => Err(LedgerError::InsufficientFunds {
                        account,
                        available: row.get("balance"),
                        required: amount,
                    }),
                    None => Err(LedgerError::AccountNotFound(account)),
                };
            }
        };

        Self::record_entry(&mut tx, account, -amount, balance_after, idempotency_key).await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        if Self::key_seen(&mut tx, idempotency_key).await? {
            return Ok(());
        }

        let updated = sqlx::query(
            "UPDATE wallets SET balance = balance + $1, updated_at = NOW() \
             WHERE account_id = $2 \
             RETURNING balance",
        )
        .bind(amount)
        .bind(account)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::AccountNotFound(account))?;

        let balance_after: i64 = updated.get("balance");
        Self::record_entry(&mut tx, account, amount, balance_after, idempotency_key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn balance(&self, account: AccountId) -> LedgerResult<i64> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE account_id = $1")
            .bind(account)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::AccountNotFound(account))?;
        Ok(row.get("balance"))
    }
}
