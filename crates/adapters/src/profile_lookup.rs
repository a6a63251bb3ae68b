// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ProfileLookup` — authoritative sender/MP context for letter persistence.
//! The model's own `mp_*`/`sender_*` output fields are
//! discarded in favor of whatever this collaborator returns; only
//! `letter_content`, `subject_line_html`, and `references[]` survive from
//! the model.

use async_trait::async_trait;
use oj_core::{AdapterError, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientProfile {
    pub sender_name: String,
    pub sender_address_1: String,
    pub sender_address_2: String,
    pub sender_address_3: String,
    pub sender_city: String,
    pub sender_county: String,
    pub sender_postcode: String,
    pub sender_phone: String,
    pub mp_name: String,
    pub mp_address_1: String,
    pub mp_address_2: String,
    pub mp_city: String,
    pub mp_county: String,
    pub mp_postcode: String,
    pub constituency: String,
    /// `"2 January 2026"`-style date string, formatted by the caller so the
    /// orchestrator never has to reason about locale or timezone.
    pub today: String,
}

#[async_trait]
pub trait ProfileLookup: Send + Sync + 'static {
    async fn get(&self, user_id: &UserId) -> Result<RecipientProfile, AdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
