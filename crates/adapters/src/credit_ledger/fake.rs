// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`CreditLedger`] keyed by user id, for tests.

use super::CreditLedger;
use async_trait::async_trait;
use oj_core::{AdapterError, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryCreditLedger {
    balances: Mutex<HashMap<UserId, f64>>,
}

impl InMemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(user_id: UserId, balance: f64) -> Self {
        let ledger = Self::new();
        ledger.balances.lock().insert(user_id, balance);
        ledger
    }

    pub fn set_balance(&self, user_id: &UserId, balance: f64) {
        self.balances.lock().insert(user_id.clone(), balance);
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn deduct(&self, user_id: &UserId, amount: f64) -> Result<f64, AdapterError> {
        let mut balances = self.balances.lock();
        let balance = balances.entry(user_id.clone()).or_insert(0.0);
        if *balance < amount {
            return Err(AdapterError::InsufficientBalance);
        }
        *balance -= amount;
        Ok(*balance)
    }

    async fn refund(&self, user_id: &UserId, amount: f64) -> Result<f64, AdapterError> {
        let mut balances = self.balances.lock();
        let balance = balances.entry(user_id.clone()).or_insert(0.0);
        *balance += amount;
        Ok(*balance)
    }

    async fn balance(&self, user_id: &UserId) -> Result<f64, AdapterError> {
        Ok(*self.balances.lock().get(user_id).unwrap_or(&0.0))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
