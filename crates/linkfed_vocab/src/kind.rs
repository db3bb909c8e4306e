/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vocabulary type of a node (`"type"` on the wire).
///
/// Unknown types survive a round trip through [`Kind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Kind {
    Object,
    Link,
    Mention,
    Hashtag,
    Article,
    Note,
    Document,
    Page,
    Image,
    Video,
    Audio,
    Event,
    Profile,
    Tombstone,

    Person,
    Group,
    Application,
    Service,
    Organization,

    Activity,
    Create,
    Update,
    Delete,
    Undo,
    Like,
    Dislike,
    Follow,
    Accept,
    Reject,
    TentativeAccept,
    Block,
    Flag,
    Ignore,
    Announce,
    Add,
    Remove,
    Move,

    Collection,
    CollectionPage,
    OrderedCollection,
    OrderedCollectionPage,

    Other(String),
}

impl Kind {
    pub fn as_str(&self) -> &str {
        match self {
            Kind::Object => "Object",
            Kind::Link => "Link",
            Kind::Mention => "Mention",
            Kind::Hashtag => "Hashtag",
            Kind::Article => "Article",
            Kind::Note => "Note",
            Kind::Document => "Document",
            Kind::Page => "Page",
            Kind::Image => "Image",
            Kind::Video => "Video",
            Kind::Audio => "Audio",
            Kind::Event => "Event",
            Kind::Profile => "Profile",
            Kind::Tombstone => "Tombstone",
            Kind::Person => "Person",
            Kind::Group => "Group",
            Kind::Application => "Application",
            Kind::Service => "Service",
            Kind::Organization => "Organization",
            Kind::Activity => "Activity",
            Kind::Create => "Create",
            Kind::Update => "Update",
            Kind::Delete => "Delete",
            Kind::Undo => "Undo",
            Kind::Like => "Like",
            Kind::Dislike => "Dislike",
            Kind::Follow => "Follow",
            Kind::Accept => "Accept",
            Kind::Reject => "Reject",
            Kind::TentativeAccept => "TentativeAccept",
            Kind::Block => "Block",
            Kind::Flag => "Flag",
            Kind::Ignore => "Ignore",
            Kind::Announce => "Announce",
            Kind::Add => "Add",
            Kind::Remove => "Remove",
            Kind::Move => "Move",
            Kind::Collection => "Collection",
            Kind::CollectionPage => "CollectionPage",
            Kind::OrderedCollection => "OrderedCollection",
            Kind::OrderedCollectionPage => "OrderedCollectionPage",
            Kind::Other(s) => s.as_str(),
        }
    }

    /// Objects that become an `Item` (posts, comments, media).
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Kind::Article
                | Kind::Note
                | Kind::Document
                | Kind::Page
                | Kind::Image
                | Kind::Video
                | Kind::Audio
        )
    }

    pub fn is_actor(&self) -> bool {
        matches!(
            self,
            Kind::Person | Kind::Group | Kind::Application | Kind::Service | Kind::Organization
        )
    }

    pub fn is_appreciation(&self) -> bool {
        matches!(self, Kind::Like | Kind::Dislike)
    }

    /// Activity types that carry moderation meaning when aimed at a target.
    pub fn is_moderation(&self) -> bool {
        matches!(
            self,
            Kind::Block | Kind::Flag | Kind::Ignore | Kind::Delete | Kind::Update
        )
    }

    /// Activities that create, mutate or remove the content they wrap.
    pub fn is_content_management(&self) -> bool {
        matches!(self, Kind::Create | Kind::Update | Kind::Delete)
    }

    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            Kind::Activity
                | Kind::Create
                | Kind::Update
                | Kind::Delete
                | Kind::Undo
                | Kind::Like
                | Kind::Dislike
                | Kind::Follow
                | Kind::Accept
                | Kind::Reject
                | Kind::TentativeAccept
                | Kind::Block
                | Kind::Flag
                | Kind::Ignore
                | Kind::Announce
                | Kind::Add
                | Kind::Remove
                | Kind::Move
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Kind::Collection
                | Kind::CollectionPage
                | Kind::OrderedCollection
                | Kind::OrderedCollectionPage
        )
    }

    /// Update, Undo and Delete mutate state that listing pages already show.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Kind::Update | Kind::Undo | Kind::Delete)
    }
}

impl From<String> for Kind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Object" => Kind::Object,
            "Link" => Kind::Link,
            "Mention" => Kind::Mention,
            "Hashtag" => Kind::Hashtag,
            "Article" => Kind::Article,
            "Note" => Kind::Note,
            "Document" => Kind::Document,
            "Page" => Kind::Page,
            "Image" => Kind::Image,
            "Video" => Kind::Video,
            "Audio" => Kind::Audio,
            "Event" => Kind::Event,
            "Profile" => Kind::Profile,
            "Tombstone" => Kind::Tombstone,
            "Person" => Kind::Person,
            "Group" => Kind::Group,
            "Application" => Kind::Application,
            "Service" => Kind::Service,
            "Organization" => Kind::Organization,
            "Activity" => Kind::Activity,
            "Create" => Kind::Create,
            "Update" => Kind::Update,
            "Delete" => Kind::Delete,
            "Undo" => Kind::Undo,
            "Like" => Kind::Like,
            "Dislike" => Kind::Dislike,
            "Follow" => Kind::Follow,
            "Accept" => Kind::Accept,
            "Reject" => Kind::Reject,
            "TentativeAccept" => Kind::TentativeAccept,
            "Block" => Kind::Block,
            "Flag" => Kind::Flag,
            "Ignore" => Kind::Ignore,
            "Announce" => Kind::Announce,
            "Add" => Kind::Add,
            "Remove" => Kind::Remove,
            "Move" => Kind::Move,
            "Collection" => Kind::Collection,
            "CollectionPage" => Kind::CollectionPage,
            "OrderedCollection" => Kind::OrderedCollection,
            "OrderedCollectionPage" => Kind::OrderedCollectionPage,
            _ => Kind::Other(s),
        }
    }
}

impl From<&str> for Kind {
    fn from(s: &str) -> Self {
        Kind::from(s.to_string())
    }
}

impl From<Kind> for String {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Other(s) => s,
            k => k.as_str().to_string(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_types_round_trip() {
        let k: Kind = serde_json::from_str("\"ChatMessage\"").unwrap();
        assert_eq!(k, Kind::Other("ChatMessage".to_string()));
        assert_eq!(serde_json::to_string(&k).unwrap(), "\"ChatMessage\"");
    }

    #[test]
    fn type_groups() {
        assert!(Kind::Note.is_content());
        assert!(Kind::Service.is_actor());
        assert!(Kind::Dislike.is_appreciation());
        assert!(Kind::Flag.is_moderation());
        assert!(!Kind::Create.is_moderation());
        assert!(Kind::OrderedCollectionPage.is_collection());
        assert!(Kind::Undo.has_side_effects());
        assert!(!Kind::Create.has_side_effects());
    }
}
