// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`ProfileLookup`] for tests.

use super::{ProfileLookup, RecipientProfile};
use async_trait::async_trait;
use oj_core::{AdapterError, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;

oj_core::builder! {
    pub struct RecipientProfileBuilder => RecipientProfile {
        into {
            sender_name: String = "Jane Doe",
            sender_address_1: String = "1 Example Street",
            sender_address_2: String = "",
            sender_address_3: String = "",
            sender_city: String = "London",
            sender_county: String = "",
            sender_postcode: String = "SW1A 1AA",
            sender_phone: String = "0123456789",
            mp_name: String = "A. Member",
            mp_address_1: String = "House of Commons",
            mp_address_2: String = "",
            mp_city: String = "London",
            mp_county: String = "",
            mp_postcode: String = "SW1A 0AA",
            constituency: String = "Example",
            today: String = "2 January 2026",
        }
    }
}

#[derive(Default)]
pub struct FakeProfileLookup {
    profiles: Mutex<HashMap<UserId, RecipientProfile>>,
}

impl FakeProfileLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(user_id: UserId, profile: RecipientProfile) -> Self {
        let lookup = Self::new();
        lookup.profiles.lock().insert(user_id, profile);
        lookup
    }

    pub fn set(&self, user_id: UserId, profile: RecipientProfile) {
        self.profiles.lock().insert(user_id, profile);
    }
}

#[async_trait]
impl ProfileLookup for FakeProfileLookup {
    async fn get(&self, user_id: &UserId) -> Result<RecipientProfile, AdapterError> {
        self.profiles
        .lock()
        .get(user_id)
        .cloned()
        .ok_or_else(|| AdapterError::NotFound(format!("no profile for {user_id}")))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
