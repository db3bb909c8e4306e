/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;
use std::str::FromStr;

/// Named sub-collections of actors and objects, plus the service-wide
/// collections exposed by the federation service actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionPath {
    Inbox,
    Outbox,
    Followers,
    Following,
    Liked,
    Likes,
    Shares,
    Replies,
    Blocked,
    Ignored,
    Actors,
    Objects,
    Activities,
}

impl CollectionPath {
    pub const ALL: [CollectionPath; 13] = [
        CollectionPath::Inbox,
        CollectionPath::Outbox,
        CollectionPath::Followers,
        CollectionPath::Following,
        CollectionPath::Liked,
        CollectionPath::Likes,
        CollectionPath::Shares,
        CollectionPath::Replies,
        CollectionPath::Blocked,
        CollectionPath::Ignored,
        CollectionPath::Actors,
        CollectionPath::Objects,
        CollectionPath::Activities,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionPath::Inbox => "inbox",
            CollectionPath::Outbox => "outbox",
            CollectionPath::Followers => "followers",
            CollectionPath::Following => "following",
            CollectionPath::Liked => "liked",
            CollectionPath::Likes => "likes",
            CollectionPath::Shares => "shares",
            CollectionPath::Replies => "replies",
            CollectionPath::Blocked => "blocked",
            CollectionPath::Ignored => "ignored",
            CollectionPath::Actors => "actors",
            CollectionPath::Objects => "objects",
            CollectionPath::Activities => "activities",
        }
    }

    /// Collections hanging off an object rather than an actor.
    pub fn is_object_collection(self) -> bool {
        matches!(
            self,
            CollectionPath::Likes | CollectionPath::Shares | CollectionPath::Replies
        )
    }

    /// Relationship collections whose members are actors.
    pub fn is_actor_relation(self) -> bool {
        matches!(self, CollectionPath::Followers | CollectionPath::Following)
    }

    /// `owner/path`, tolerating a trailing slash on the owner.
    pub fn of(self, owner: &str) -> String {
        format!("{}/{}", owner.trim_end_matches('/'), self.as_str())
    }

    /// Splits `https://h/actors/x/inbox?q` into the owner IRI and the
    /// collection. Query and fragment are ignored.
    pub fn split(iri: &str) -> Option<(&str, CollectionPath)> {
        let end = iri.find(['?', '#']).unwrap_or(iri.len());
        let base = iri[..end].trim_end_matches('/');
        let (owner, last) = base.rsplit_once('/')?;
        let path = last.parse().ok()?;
        Some((owner, path))
    }

    /// Collection named by the last path segment of `iri`, if any.
    pub fn of_iri(iri: &str) -> Option<CollectionPath> {
        Self::split(iri).map(|(_, p)| p)
    }
}

impl FromStr for CollectionPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionPath::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_splits_collection_iris() {
        let owner = "https://fed.example/actors/alice/";
        let inbox = CollectionPath::Inbox.of(owner);
        assert_eq!(inbox, "https://fed.example/actors/alice/inbox");
        assert_eq!(
            CollectionPath::split("https://fed.example/actors/alice/inbox?maxItems=5"),
            Some(("https://fed.example/actors/alice", CollectionPath::Inbox))
        );
        assert_eq!(CollectionPath::of_iri("https://fed.example/objects/1"), None);
        assert_eq!(CollectionPath::of_iri("https://fed.example/objects"), Some(CollectionPath::Objects));
    }

    #[test]
    fn unknown_segment_is_not_a_collection() {
        assert!(CollectionPath::split("https://fed.example/actors/alice").is_none());
        assert!("outboxes".parse::<CollectionPath>().is_err());
    }
}
