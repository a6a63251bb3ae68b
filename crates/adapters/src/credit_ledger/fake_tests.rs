// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oj_core::AdapterError;

#[tokio::test]
async fn deduct_fails_when_balance_too_low() {
    let user = UserId::from_string("usr-1");
    let ledger = InMemoryCreditLedger::with_balance(user.clone(), 0.10);
    let err = ledger.deduct(&user, 0.20).await.unwrap_err();
    assert!(matches!(err, AdapterError::InsufficientBalance));
}

#[tokio::test]
async fn deduct_and_refund_round_trip() {
    let user = UserId::from_string("usr-1");
    let ledger = InMemoryCreditLedger::with_balance(user.clone(), 1.0);
    let remaining = ledger.deduct(&user, 0.20).await.unwrap();
    assert_eq!(remaining, 0.80);
    let restored = ledger.refund(&user, 0.20).await.unwrap();
    assert_eq!(restored, 1.0);
}

#[tokio::test]
async fn unknown_user_starts_at_zero_balance() {
    let ledger = InMemoryCreditLedger::new();
    let user = UserId::from_string("usr-new");
    assert_eq!(ledger.balance(&user).await.unwrap(), 0.0);
}
