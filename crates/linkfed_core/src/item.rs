/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;

use linkfed_vocab::Object;
use time::OffsetDateTime;

use crate::account::{Account, Icon};
use crate::flags::Flags;
use crate::hash::Hash;
use crate::tag::Tag;
use crate::vote::Vote;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MimeType {
    #[default]
    Html,
    Markdown,
    Text,
    Url,
    Other(String),
}

impl MimeType {
    pub fn as_str(&self) -> &str {
        match self {
            MimeType::Html => "text/html",
            MimeType::Markdown => "text/markdown",
            MimeType::Text => "text/plain",
            MimeType::Url => "application/url",
            MimeType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> MimeType {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text/html" => MimeType::Html,
            "text/markdown" => MimeType::Markdown,
            "text/plain" => MimeType::Text,
            "application/url" => MimeType::Url,
            other => MimeType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a linked item (parent, thread root). Full items live in a
/// [`crate::threading::Thread`] arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub hash: Hash,
    pub iri: String,
}

impl ItemRef {
    pub fn new(iri: &str) -> Self {
        Self {
            hash: Hash::from_iri(iri),
            iri: iri.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemMetadata {
    pub iri: Option<String>,
    pub url: Option<String>,
    pub to: Vec<Account>,
    pub cc: Vec<Account>,
    pub tags: Vec<Tag>,
    pub mentions: Vec<Tag>,
    pub author_iri: Option<String>,
    pub replies: Option<String>,
    pub likes: Option<String>,
    pub shares: Option<String>,
    pub icon: Option<Icon>,
}

#[derive(Debug, Clone, Default)]
pub struct Item {
    pub hash: Hash,
    pub title: String,
    pub mime_type: MimeType,
    pub data: String,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
    pub submitted_by: Option<Account>,
    pub updated_by: Option<Account>,
    pub flags: Flags,
    pub parent: Option<ItemRef>,
    pub op: Option<ItemRef>,
    pub metadata: ItemMetadata,
    pub votes: Vec<Vote>,
    pub score: i64,
    pub object: Option<Object>,
}

impl Item {
    pub fn from_iri(iri: &str) -> Self {
        let mut it = Item {
            hash: Hash::from_iri(iri),
            ..Default::default()
        };
        it.metadata.iri = Some(iri.to_string());
        it
    }

    pub fn iri(&self) -> Option<&str> {
        self.metadata.iri.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_valid(&self) -> bool {
        self.hash.is_valid() || self.object.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(Flags::DELETED)
    }

    pub fn delete(&mut self) {
        self.flags.insert(Flags::DELETED);
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(Flags::PRIVATE)
    }

    pub fn make_private(&mut self) {
        self.flags.insert(Flags::PRIVATE);
    }

    pub fn make_public(&mut self) {
        self.flags.remove(Flags::PRIVATE);
    }

    pub fn is_top(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_link(&self) -> bool {
        self.mime_type == MimeType::Url
    }

    pub fn item_ref(&self) -> Option<ItemRef> {
        self.iri().map(ItemRef::new)
    }

    pub fn date(&self) -> Option<OffsetDateTime> {
        self.created_at.or(self.updated_at)
    }

    pub fn author_iri(&self) -> Option<&str> {
        self.submitted_by
            .as_ref()
            .and_then(Account::iri)
            .or(self.metadata.author_iri.as_deref())
    }

    /// Net score of the loaded votes.
    pub fn vote_score(&self) -> i64 {
        self.votes.iter().map(|v| v.weight as i64).sum()
    }
}
