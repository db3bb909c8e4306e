/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use linkfed_vocab::{Kind, Object};
use time::OffsetDateTime;

use crate::account::Account;
use crate::hash::Hash;
use crate::item::ItemRef;

/// An appreciation by `submitted_by` on `item`. `weight` is +1, -1, or 0
/// for a retracted vote.
#[derive(Debug, Clone, Default)]
pub struct Vote {
    pub submitted_by: Option<Account>,
    pub item: Option<ItemRef>,
    pub weight: i8,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    /// IRI of the Like/Dislike/Undo activity.
    pub iri: Option<String>,
    /// For an Undo, the activity it retracts.
    pub original_iri: Option<String>,
    pub object: Option<Object>,
}

impl Vote {
    pub fn new(by: Account, item: ItemRef, weight: i8) -> Self {
        Self {
            submitted_by: Some(by),
            item: Some(item),
            weight: weight.signum(),
            ..Default::default()
        }
    }

    pub fn hash(&self) -> Hash {
        self.iri.as_deref().map(Hash::from_iri).unwrap_or_default()
    }

    pub fn is_valid(&self) -> bool {
        self.item.is_some() && self.submitted_by.is_some()
    }

    pub fn direction(&self) -> i8 {
        self.weight.signum()
    }

    /// Activity type asserting this vote, `None` for a zero weight.
    pub fn activity_kind(&self) -> Option<Kind> {
        match self.direction() {
            1 => Some(Kind::Like),
            -1 => Some(Kind::Dislike),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<OffsetDateTime> {
        self.created_at.or(self.updated_at)
    }

    pub fn voter_is(&self, account: &Account) -> bool {
        self.submitted_by
            .as_ref()
            .map(|a| a.same_as(account))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_clamped_to_direction() {
        let v = Vote::new(
            Account::from_iri("https://fed.example/actors/a"),
            ItemRef::new("https://fed.example/objects/1"),
            5,
        );
        assert_eq!(v.weight, 1);
        assert_eq!(v.activity_kind(), Some(Kind::Like));
        let mut v = v;
        v.weight = 0;
        assert_eq!(v.activity_kind(), None);
    }
}
