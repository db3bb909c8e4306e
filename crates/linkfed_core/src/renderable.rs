/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use linkfed_vocab::Object;
use time::OffsetDateTime;

use crate::account::Account;
use crate::follow::FollowRequest;
use crate::hash::Hash;
use crate::item::Item;
use crate::moderation::{ModerationGroup, ModerationOp};
use crate::vote::Vote;

/// Any entity a listing can show.
#[derive(Debug, Clone)]
pub enum Renderable {
    Item(Item),
    Account(Account),
    Vote(Vote),
    Follow(FollowRequest),
    Moderation(ModerationOp),
    ModerationGroup(ModerationGroup),
}

impl Renderable {
    pub fn hash(&self) -> Hash {
        match self {
            Renderable::Item(i) => i.hash,
            Renderable::Account(a) => a.hash,
            Renderable::Vote(v) => v.hash(),
            Renderable::Follow(f) => f.hash,
            Renderable::Moderation(m) => m.hash,
            Renderable::ModerationGroup(g) => g.hash,
        }
    }

    pub fn iri(&self) -> Option<&str> {
        match self {
            Renderable::Item(i) => i.iri(),
            Renderable::Account(a) => a.iri(),
            Renderable::Vote(v) => v.iri.as_deref(),
            Renderable::Follow(f) => f.iri.as_deref(),
            Renderable::Moderation(m) => m.iri.as_deref(),
            Renderable::ModerationGroup(g) => Some(g.target_iri.as_str()),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Renderable::Item(i) => i.is_valid(),
            Renderable::Account(a) => a.is_valid(),
            Renderable::Vote(v) => v.is_valid(),
            Renderable::Follow(f) => f.is_valid(),
            Renderable::Moderation(m) => m.is_valid(),
            Renderable::ModerationGroup(g) => !g.requests.is_empty(),
        }
    }

    pub fn date(&self) -> Option<OffsetDateTime> {
        match self {
            Renderable::Item(i) => i.date(),
            Renderable::Account(a) => a.date(),
            Renderable::Vote(v) => v.date(),
            Renderable::Follow(f) => f.created_at,
            Renderable::Moderation(m) => m.created_at,
            Renderable::ModerationGroup(g) => g.date(),
        }
    }

    /// The protocol object the entity was built from.
    pub fn object(&self) -> Option<&Object> {
        match self {
            Renderable::Item(i) => i.object.as_ref(),
            Renderable::Account(a) => a.object.as_ref(),
            Renderable::Vote(v) => v.object.as_ref(),
            Renderable::Follow(f) => f.activity.as_ref(),
            Renderable::Moderation(m) => m.object.as_ref(),
            Renderable::ModerationGroup(g) => g.requests.first().and_then(|r| r.object.as_ref()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Renderable::Item(i) if i.is_top() => "item",
            Renderable::Item(_) => "comment",
            Renderable::Account(_) => "account",
            Renderable::Vote(_) => "vote",
            Renderable::Follow(_) => "follow",
            Renderable::Moderation(_) => "moderation",
            Renderable::ModerationGroup(_) => "moderation-group",
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            Renderable::Item(i) => i.is_deleted(),
            Renderable::Account(a) => a.is_deleted(),
            _ => false,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Renderable::Item(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Renderable::Account(a) => Some(a),
            _ => None,
        }
    }

    /// Local permalink path for the entity, relative to the instance root.
    pub fn permalink(&self) -> String {
        match self {
            Renderable::Item(i) => match i.submitted_by.as_ref().filter(|a| !a.handle.is_empty()) {
                Some(a) => format!("/~{}/{}", a.handle, i.hash),
                None => format!("/i/{}", i.hash),
            },
            Renderable::Account(a) => format!("/~{}", a.handle),
            Renderable::Vote(v) => format!("/v/{}", v.hash()),
            Renderable::Follow(f) => format!("/follow/{}", f.hash),
            Renderable::Moderation(m) => format!("/moderation/{}", m.hash),
            Renderable::ModerationGroup(g) => format!("/moderation/{}", g.hash),
        }
    }
}

impl From<Item> for Renderable {
    fn from(i: Item) -> Self {
        Renderable::Item(i)
    }
}

impl From<Account> for Renderable {
    fn from(a: Account) -> Self {
        Renderable::Account(a)
    }
}

impl From<Vote> for Renderable {
    fn from(v: Vote) -> Self {
        Renderable::Vote(v)
    }
}

impl From<FollowRequest> for Renderable {
    fn from(f: FollowRequest) -> Self {
        Renderable::Follow(f)
    }
}

impl From<ModerationOp> for Renderable {
    fn from(m: ModerationOp) -> Self {
        Renderable::Moderation(m)
    }
}

impl From<ModerationGroup> for Renderable {
    fn from(g: ModerationGroup) -> Self {
        Renderable::ModerationGroup(g)
    }
}
