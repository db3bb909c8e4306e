/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;

use linkfed_vocab::{Item, Kind, Object};
use sha2::{Digest, Sha256};

/// Matches an absent property with `=` and a present one with `!`.
pub const NIL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Equals,
    Not,
    Like,
}

/// Comparator value as it travels in a query string: `value`, `!value` or
/// `~value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompStr {
    pub op: CompOp,
    pub value: String,
}

impl CompStr {
    pub fn equals(value: impl Into<String>) -> Self {
        Self { op: CompOp::Equals, value: value.into() }
    }

    pub fn different(value: impl Into<String>) -> Self {
        Self { op: CompOp::Not, value: value.into() }
    }

    pub fn like(value: impl Into<String>) -> Self {
        Self { op: CompOp::Like, value: value.into() }
    }

    pub fn nil() -> Self {
        Self::equals(NIL)
    }

    pub fn not_nil() -> Self {
        Self::different(NIL)
    }

    pub fn parse(raw: &str) -> Self {
        if let Some(v) = raw.strip_prefix('!') {
            Self::different(v)
        } else if let Some(v) = raw.strip_prefix('~') {
            Self::like(v)
        } else {
            Self::equals(raw)
        }
    }

    /// Whether any of `values` satisfies this comparator. An empty slice is
    /// an absent property.
    fn accepts(&self, values: &[&str]) -> bool {
        if self.value == NIL {
            return match self.op {
                CompOp::Not => !values.is_empty(),
                _ => values.is_empty(),
            };
        }
        match self.op {
            CompOp::Equals => values.iter().any(|v| *v == self.value),
            CompOp::Not => values.iter().all(|v| *v != self.value),
            CompOp::Like => {
                let needle = self.value.to_lowercase();
                values.iter().any(|v| v.to_lowercase().contains(&needle))
            }
        }
    }
}

impl fmt::Display for CompStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            CompOp::Equals => write!(f, "{}", self.value),
            CompOp::Not => write!(f, "!{}", self.value),
            CompOp::Like => write!(f, "~{}", self.value),
        }
    }
}

/// Positive comparators are alternatives, negative ones must all hold.
fn all_accept(comps: &[CompStr], values: &[&str]) -> bool {
    if comps.is_empty() {
        return true;
    }
    let (neg, pos): (Vec<&CompStr>, Vec<&CompStr>) =
        comps.iter().partition(|c| c.op == CompOp::Not);
    neg.iter().all(|c| c.accepts(values)) && (pos.is_empty() || pos.iter().any(|c| c.accepts(values)))
}

/// Query filters understood by the collection API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub name: Vec<CompStr>,
    pub content: Vec<CompStr>,
    pub media_type: Vec<CompStr>,
    pub url: Vec<CompStr>,
    pub iri: Vec<CompStr>,
    pub generator: Vec<CompStr>,
    pub kind: Vec<CompStr>,
    pub attributed_to: Vec<CompStr>,
    pub in_reply_to: Vec<CompStr>,
    pub context: Vec<CompStr>,
    pub recipients: Vec<CompStr>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub max_items: Option<u32>,
    pub object: Option<Box<Filters>>,
    pub actor: Option<Box<Filters>>,
    pub tag: Option<Box<Filters>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_types(kinds: &[Kind]) -> Self {
        Self {
            kind: types(kinds),
            ..Default::default()
        }
    }

    pub fn with_max_items(mut self, n: u32) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn with_object(mut self, f: Filters) -> Self {
        self.object = Some(Box::new(f));
        self
    }

    pub fn with_actor(mut self, f: Filters) -> Self {
        self.actor = Some(Box::new(f));
        self
    }

    /// Stable key order: comparators first, nested filters next, then
    /// pagination.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.push_pairs("", &mut out);
        if let Some(a) = self.after.as_deref().filter(|s| !s.is_empty()) {
            out.push(("after".to_string(), a.to_string()));
        }
        if let Some(b) = self.before.as_deref().filter(|s| !s.is_empty()) {
            out.push(("before".to_string(), b.to_string()));
        }
        if let Some(n) = self.max_items {
            out.push(("maxItems".to_string(), n.to_string()));
        }
        out
    }

    fn push_pairs(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        let fields: [(&str, &Vec<CompStr>); 11] = [
            ("name", &self.name),
            ("content", &self.content),
            ("mediaType", &self.media_type),
            ("url", &self.url),
            ("iri", &self.iri),
            ("generator", &self.generator),
            ("type", &self.kind),
            ("attributedTo", &self.attributed_to),
            ("inReplyTo", &self.in_reply_to),
            ("context", &self.context),
            ("recipients", &self.recipients),
        ];
        for (key, comps) in fields {
            for c in comps {
                out.push((format!("{prefix}{key}"), c.to_string()));
            }
        }
        for (key, nested) in [("object", &self.object), ("actor", &self.actor), ("tag", &self.tag)] {
            if let Some(n) = nested {
                n.push_pairs(&format!("{prefix}{key}."), out);
            }
        }
    }

    /// Inverse of [`Filters::to_query_pairs`]. Unknown keys are ignored.
    pub fn from_query_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut f = Filters::default();
        for (k, v) in pairs {
            f.set_pair(k, v);
        }
        f
    }

    pub fn from_iri(iri: &str) -> Self {
        match url::Url::parse(iri) {
            Ok(u) => {
                let pairs: Vec<(String, String)> = u
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                Self::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
            Err(_) => Filters::default(),
        }
    }

    fn set_pair(&mut self, key: &str, value: &str) {
        if let Some((head, rest)) = key.split_once('.') {
            let slot = match head {
                "object" => &mut self.object,
                "actor" => &mut self.actor,
                "tag" => &mut self.tag,
                _ => return,
            };
            slot.get_or_insert_with(Box::default).set_pair(rest, value);
            return;
        }
        let c = CompStr::parse(value);
        match key {
            "name" => self.name.push(c),
            "content" => self.content.push(c),
            "mediaType" => self.media_type.push(c),
            "url" => self.url.push(c),
            "iri" => self.iri.push(c),
            "generator" => self.generator.push(c),
            "type" => self.kind.push(c),
            "attributedTo" => self.attributed_to.push(c),
            "inReplyTo" => self.in_reply_to.push(c),
            "context" => self.context.push(c),
            "recipients" => self.recipients.push(c),
            "after" => self.after = Some(value.to_string()),
            "before" => self.before = Some(value.to_string()),
            "maxItems" => self.max_items = value.parse().ok(),
            _ => {}
        }
    }

    /// Evaluates the comparators against an object, the way the collection
    /// API does server side.
    pub fn matches(&self, o: &Object) -> bool {
        let mut name = non_empty(o.name_str());
        // actors answer to their handle as well
        if let Some(handle) = o.preferred_username.as_ref().map(|n| n.first()).filter(|h| !h.is_empty()) {
            name.push(handle);
        }
        let content = non_empty(o.content_str());
        let media = o.media_type.as_deref().into_iter().collect::<Vec<_>>();
        let url: Vec<&str> = o.url.iter().filter_map(Item::iri).chain(o.href.as_deref()).collect();
        let id = o.iri().into_iter().collect::<Vec<_>>();
        let generator = o.generator.as_ref().and_then(Item::iri).into_iter().collect::<Vec<_>>();
        let kind = o.kind.as_ref().map(Kind::as_str).into_iter().collect::<Vec<_>>();
        let attributed: Vec<&str> = o.attributed_to.iter().filter_map(Item::iri).collect();
        let replied: Vec<&str> = o.in_reply_to.iter().filter_map(Item::iri).collect();
        let context = o.context.as_ref().and_then(Item::iri).into_iter().collect::<Vec<_>>();
        let recipients: Vec<&str> = o.recipients().filter_map(Item::iri).collect();

        let own = all_accept(&self.name, &name)
            && all_accept(&self.content, &content)
            && all_accept(&self.media_type, &media)
            && all_accept(&self.url, &url)
            && all_accept(&self.iri, &id)
            && all_accept(&self.generator, &generator)
            && all_accept(&self.kind, &kind)
            && all_accept(&self.attributed_to, &attributed)
            && all_accept(&self.in_reply_to, &replied)
            && all_accept(&self.context, &context)
            && all_accept(&self.recipients, &recipients);
        if !own {
            return false;
        }
        nested_matches(self.object.as_deref(), o.object())
            && nested_matches(self.actor.as_deref(), o.actor.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self == &Filters::default()
    }
}

fn non_empty(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        vec![s]
    }
}

fn nested_matches(f: Option<&Filters>, it: Option<&Item>) -> bool {
    let Some(f) = f else {
        return true;
    };
    match it {
        Some(Item::Object(o)) => f.matches(o),
        Some(Item::Iri(iri)) => f.matches(&Object {
            id: Some(iri.clone()),
            ..Default::default()
        }),
        None => f.matches(&Object::default()),
    }
}

pub fn types(kinds: &[Kind]) -> Vec<CompStr> {
    kinds.iter().map(|k| CompStr::equals(k.as_str())).collect()
}

pub fn iris<S: AsRef<str>>(iris: &[S]) -> Vec<CompStr> {
    iris.iter().map(|i| CompStr::equals(i.as_ref())).collect()
}

/// Opaque pagination token derived from an IRI: base 36 of the first eight
/// bytes of its SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorRef(String);

impl CursorRef {
    pub fn of(iri: &str) -> Self {
        let digest = Sha256::digest(iri.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        CursorRef(base36(u64::from_be_bytes(prefix)))
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.trim();
        if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()) {
            return None;
        }
        Some(CursorRef(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CursorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_are_stable_and_reversible() {
        let f = Filters {
            kind: types(&[Kind::Create]),
            after: Some("abc".to_string()),
            max_items: Some(10),
            ..Default::default()
        }
        .with_object(Filters {
            kind: types(&[Kind::Note, Kind::Article]),
            in_reply_to: vec![CompStr::nil()],
            ..Default::default()
        })
        .with_actor(Filters {
            iri: vec![CompStr::not_nil()],
            ..Default::default()
        });
        let pairs = f.to_query_pairs();
        let rendered: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(
            rendered,
            vec![
                "type=Create",
                "object.type=Note",
                "object.type=Article",
                "object.inReplyTo=-",
                "actor.iri=!-",
                "after=abc",
                "maxItems=10",
            ]
        );
        let back = Filters::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        assert_eq!(back, f);
    }

    #[test]
    fn matches_objects() {
        let act: Object = serde_json::from_value(serde_json::json!({
            "id": "https://fed.example/activities/1",
            "type": "Create",
            "actor": "https://fed.example/actors/alice",
            "object": {
                "id": "https://fed.example/objects/1",
                "type": "Note",
                "name": "Rust news",
                "content": "hello"
            }
        }))
        .unwrap();
        let top_level = Filters::of_types(&[Kind::Create]).with_object(Filters {
            in_reply_to: vec![CompStr::nil()],
            name: vec![CompStr::like("rust")],
            ..Default::default()
        });
        assert!(top_level.matches(&act));
        let by_bob = Filters::new().with_actor(Filters {
            iri: vec![CompStr::equals("https://fed.example/actors/bob")],
            ..Default::default()
        });
        assert!(!by_bob.matches(&act));
        let not_alice = Filters::new().with_actor(Filters {
            iri: vec![CompStr::different("https://fed.example/actors/alice")],
            ..Default::default()
        });
        assert!(!not_alice.matches(&act));
        assert!(!Filters::of_types(&[Kind::Like]).matches(&act));
    }

    #[test]
    fn actor_names_match_handles() {
        let bob: Object = serde_json::from_value(serde_json::json!({
            "id": "https://fed.example/actors/bob",
            "type": "Person",
            "preferredUsername": "bob",
            "name": "Bob B."
        }))
        .unwrap();
        let f = Filters {
            name: vec![CompStr::equals("bob")],
            ..Filters::of_types(&[Kind::Person])
        };
        assert!(f.matches(&bob));
        let full = Filters {
            name: vec![CompStr::equals("Bob B.")],
            ..Default::default()
        };
        assert!(full.matches(&bob));
    }

    #[test]
    fn cursor_refs_are_base36() {
        let a = CursorRef::of("https://fed.example/activities/1");
        assert_eq!(a, CursorRef::of("https://fed.example/activities/1"));
        assert_ne!(a, CursorRef::of("https://fed.example/activities/2"));
        assert!(a.as_str().len() <= 13);
        assert_eq!(CursorRef::from_token(a.as_str()), Some(a));
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert!(CursorRef::from_token("no spaces").is_none());
    }
}
