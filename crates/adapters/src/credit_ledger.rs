// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `CreditLedger` — atomic deduct/refund against a user's credit balance
//!. Implementations are assumed linearizable per user; the
//! orchestrator never interprets balances beyond success/failure.

use async_trait::async_trait;
use oj_core::{AdapterError, UserId};

#[async_trait]
pub trait CreditLedger: Send + Sync + 'static {
    /// Atomic conditional decrement. Fails with `AdapterError::InsufficientBalance`
    /// if the user's balance is below `amount`.
    async fn deduct(&self, user_id: &UserId, amount: f64) -> Result<f64, AdapterError>;

    /// Best-effort credit; failures are logged by the caller, not retried
    /// indefinitely (step 7, at-most-one-charge property).
    async fn refund(&self, user_id: &UserId, amount: f64) -> Result<f64, AdapterError>;

    /// Current balance, for surfacing `remaining_credits` without mutating it.
    async fn balance(&self, user_id: &UserId) -> Result<f64, AdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
