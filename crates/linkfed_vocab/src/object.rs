/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::kind::Kind;
use crate::PUBLIC_NS;

/// A reference to another node: either its bare IRI or the embedded node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Iri(String),
    Object(Box<Object>),
}

impl Item {
    /// IRI of the referenced node, if it has one.
    pub fn iri(&self) -> Option<&str> {
        match self {
            Item::Iri(s) => Some(s.as_str()).filter(|s| !s.is_empty()),
            Item::Object(o) => o.id.as_deref().filter(|s| !s.is_empty()),
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Item::Object(o) => Some(o),
            Item::Iri(_) => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Item::Object(o) => Some(*o),
            Item::Iri(_) => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Item::Iri(_))
    }

    pub fn kind(&self) -> Option<&Kind> {
        self.as_object().and_then(|o| o.kind.as_ref())
    }

    pub fn is_public(&self) -> bool {
        self.iri() == Some(PUBLIC_NS)
    }
}

impl From<Object> for Item {
    fn from(o: Object) -> Self {
        Item::Object(Box::new(o))
    }
}

impl From<String> for Item {
    fn from(s: String) -> Self {
        Item::Iri(s)
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::Iri(s.to_string())
    }
}

/// `name`, `summary` and `content` arrive either as a plain string or as a
/// language map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NaturalLanguage {
    Plain(String),
    Map(BTreeMap<String, String>),
}

impl NaturalLanguage {
    pub fn first(&self) -> &str {
        match self {
            NaturalLanguage::Plain(s) => s,
            NaturalLanguage::Map(m) => m
                .get("und")
                .or_else(|| m.get("en"))
                .or_else(|| m.values().next())
                .map(String::as_str)
                .unwrap_or(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_empty()
    }
}

impl From<&str> for NaturalLanguage {
    fn from(s: &str) -> Self {
        NaturalLanguage::Plain(s.to_string())
    }
}

impl From<String> for NaturalLanguage {
    fn from(s: String) -> Self {
        NaturalLanguage::Plain(s)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NaturalLanguage>,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(rename = "publicKeyPem", default)]
    pub public_key_pem: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(rename = "sharedInbox", default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<String>,
    #[serde(
        rename = "oauthAuthorizationEndpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub oauth_authorization_endpoint: Option<String>,
    #[serde(rename = "oauthTokenEndpoint", default, skip_serializing_if = "Option::is_none")]
    pub oauth_token_endpoint: Option<String>,
}

/// One node of the wire graph.
///
/// The same struct carries objects, links, actors, activities, tombstones and
/// collection pages; which fields are populated depends on `kind`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub ld_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NaturalLanguage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<NaturalLanguage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NaturalLanguage>,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub url: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,

    #[serde(rename = "attributedTo", default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub attributed_to: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Item>,
    #[serde(rename = "inReplyTo", default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub in_reply_to: Vec<Item>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub published: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub updated: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub deleted: Option<OffsetDateTime>,
    #[serde(rename = "formerType", default, skip_serializing_if = "Option::is_none")]
    pub former_type: Option<Kind>,

    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Item>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bto: Vec<Item>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Item>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Item>,

    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<Item>,

    #[serde(rename = "preferredUsername", default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<NaturalLanguage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked: Option<Item>,
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Item>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub object: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Item>,

    #[serde(rename = "totalItems", default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<Item>,
    #[serde(rename = "partOf", default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Item>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
    #[serde(rename = "orderedItems", default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub ordered_items: Vec<Item>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_id(kind: Kind, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn iri(&self) -> Option<&str> {
        self.id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_kind(&self, kind: &Kind) -> bool {
        self.kind.as_ref() == Some(kind)
    }

    /// First `object` of an activity.
    pub fn object(&self) -> Option<&Item> {
        self.object.first()
    }

    pub fn actor_iri(&self) -> Option<&str> {
        self.actor.as_ref().and_then(Item::iri)
    }

    pub fn name_str(&self) -> &str {
        self.name.as_ref().map(NaturalLanguage::first).unwrap_or("")
    }

    pub fn content_str(&self) -> &str {
        self.content.as_ref().map(NaturalLanguage::first).unwrap_or("")
    }

    pub fn summary_str(&self) -> &str {
        self.summary.as_ref().map(NaturalLanguage::first).unwrap_or("")
    }

    pub fn is_collection(&self) -> bool {
        self.kind.as_ref().map(Kind::is_collection).unwrap_or(false)
    }

    /// Members of a collection page, whichever of `orderedItems`/`items` is set.
    pub fn collection_items(&self) -> &[Item] {
        if !self.ordered_items.is_empty() {
            &self.ordered_items
        } else {
            &self.items
        }
    }

    /// All recipients in to, bto, cc, bcc order.
    pub fn recipients(&self) -> impl Iterator<Item = &Item> {
        self.to
            .iter()
            .chain(self.bto.iter())
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
    }

    pub fn is_public(&self) -> bool {
        self.to.iter().chain(self.cc.iter()).any(Item::is_public)
    }
}

/// Accepts `null`, a single value or an array for multi-valued properties.
pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
        Null(()),
    }

    Ok(match OneOrMany::<T>::deserialize(deserializer)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(v) => vec![v],
        OneOrMany::Null(()) => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_activity_with_embedded_note() {
        let raw = r#"{
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": "https://fed.example/activities/1",
            "type": "Create",
            "actor": "https://fed.example/actors/alice",
            "to": "https://www.w3.org/ns/activitystreams#Public",
            "cc": ["https://fed.example/actors/alice/followers"],
            "object": {
                "id": "https://fed.example/objects/1",
                "type": "Note",
                "content": {"en": "hello"},
                "inReplyTo": "https://fed.example/objects/0",
                "published": "2024-03-01T10:00:00Z"
            },
            "linkfedExt": 42
        }"#;
        let act: Object = serde_json::from_str(raw).unwrap();
        assert_eq!(act.kind, Some(Kind::Create));
        assert_eq!(act.actor_iri(), Some("https://fed.example/actors/alice"));
        assert!(act.is_public());
        assert_eq!(act.to.len(), 1);
        let note = act.object().and_then(Item::as_object).unwrap();
        assert_eq!(note.content_str(), "hello");
        assert_eq!(note.in_reply_to[0].iri(), Some("https://fed.example/objects/0"));
        assert!(note.published.is_some());
        assert_eq!(act.extra.get("linkfedExt"), Some(&Value::from(42)));
    }

    #[test]
    fn collection_items_prefers_ordered() {
        let raw = r#"{
            "id": "https://fed.example/inbox?maxItems=2",
            "type": "OrderedCollectionPage",
            "totalItems": 5,
            "orderedItems": ["https://fed.example/a", "https://fed.example/b"],
            "next": "https://fed.example/inbox?after=b&maxItems=2"
        }"#;
        let page: Object = serde_json::from_str(raw).unwrap();
        assert!(page.is_collection());
        assert_eq!(page.collection_items().len(), 2);
        assert_eq!(page.total_items, Some(5));
        assert_eq!(
            page.next.as_ref().and_then(Item::iri),
            Some("https://fed.example/inbox?after=b&maxItems=2")
        );
    }

    #[test]
    fn null_multi_valued_properties_are_empty() {
        let o: Object = serde_json::from_str(r#"{"type": "Note", "tag": null}"#).unwrap();
        assert!(o.tag.is_empty());
    }

    #[test]
    fn empty_fields_are_not_serialized() {
        let o = Object::with_id(Kind::Note, "https://fed.example/objects/2");
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"id": "https://fed.example/objects/2", "type": "Note"})
        );
    }
}
