/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use linkfed_vocab::Object;
use time::OffsetDateTime;

use crate::account::Account;
use crate::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowState {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Default)]
pub struct FollowRequest {
    pub hash: Hash,
    pub iri: Option<String>,
    pub submitted_by: Option<Account>,
    pub object: Option<Account>,
    pub in_reply_to: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub state: FollowState,
    pub activity: Option<Object>,
}

impl FollowRequest {
    pub fn is_valid(&self) -> bool {
        self.hash.is_valid() && self.submitted_by.is_some()
    }

    pub fn resolve(&mut self, accept: bool) {
        self.state = if accept {
            FollowState::Accepted
        } else {
            FollowState::Rejected
        };
    }

    pub fn is_pending(&self) -> bool {
        self.state == FollowState::Pending
    }
}
