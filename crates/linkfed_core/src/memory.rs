/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! In-process collection API used by tests and dry runs.
//!
//! Documents are kept in a map keyed by IRI. Collections stored here are
//! paginated and filtered on GET the way the remote service does it, and
//! POSTed activities get the usual outbox side effects (ids assigned,
//! objects created, updated or tombstoned, appreciations recorded).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use linkfed_vocab::{CollectionPath, Item, Kind, Object};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::account::Credential;
use crate::error::{SyncError, SyncResult};
use crate::filters::{CursorRef, Filters};
use crate::iri;
use crate::transport::{Posted, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Unsigned,
    Bearer,
    Signature,
}

impl AuthKind {
    fn of(auth: Option<&Credential>) -> Self {
        match auth {
            None => AuthKind::Unsigned,
            Some(Credential::Bearer(_)) => AuthKind::Bearer,
            Some(Credential::HttpSignature { .. }) => AuthKind::Signature,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub iri: String,
    pub auth: AuthKind,
    pub body: Option<Object>,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<String, Object>,
    failures: HashMap<String, u16>,
    requests: Vec<Recorded>,
    seq: u128,
}

pub struct MemoryTransport {
    base: String,
    state: Mutex<State>,
}

impl MemoryTransport {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Stores a document under its `id`.
    pub fn insert(&self, obj: Object) {
        if let Some(id) = obj.id.clone() {
            self.lock().docs.insert(key(&id), obj);
        }
    }

    /// Stores a document under an explicit IRI, query included. Exact
    /// matches win over generated pages.
    pub fn insert_at(&self, iri: &str, obj: Object) {
        self.lock().docs.insert(iri.to_string(), obj);
    }

    /// Creates (or extends) an ordered collection at `iri`.
    pub fn push_to_collection(&self, iri: &str, item: Item) {
        let mut st = self.lock();
        push_member(&mut st.docs, iri, item);
    }

    pub fn get_doc(&self, iri: &str) -> Option<Object> {
        self.lock().docs.get(&key(iri)).cloned()
    }

    /// Every request to `iri` (query ignored) answers with `status`.
    pub fn fail(&self, iri: &str, status: u16) {
        self.lock().failures.insert(key(iri), status);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.lock().requests.clone()
    }

    pub fn posts(&self) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.method == "POST").collect()
    }

    pub fn gets(&self) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.method == "GET").collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn next_iri(st: &mut State, base: &str, path: CollectionPath) -> String {
        st.seq += 1;
        format!("{}/{}", path.of(base), Uuid::from_u128(0x1f00_0000 + st.seq))
    }

    fn check_failure(st: &State, iri: &str) -> SyncResult<()> {
        if let Some(code) = st.failures.get(&key(iri)) {
            let status = http::StatusCode::from_u16(*code).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            return Err(SyncError::from_status(status, iri, ""));
        }
        Ok(())
    }

    fn page(st: &State, iri: &str, col: &Object) -> Object {
        let filters = Filters::from_iri(iri);
        let max = filters.max_items.unwrap_or(u32::MAX) as usize;

        let members: Vec<Item> = col
            .collection_items()
            .iter()
            .map(|it| resolve(&st.docs, it))
            .filter(|it| match it {
                Item::Object(o) => filters.matches(o),
                Item::Iri(_) => filters_without_pagination(&filters).is_empty(),
            })
            .collect();
        let total = members.len();

        let start = match filters.after.as_deref() {
            Some(after) => members
                .iter()
                .position(|m| m.iri().map(|i| CursorRef::of(i).as_str() == after).unwrap_or(false))
                .map(|p| p + 1)
                .unwrap_or(total),
            None => 0,
        };
        let end = start.saturating_add(max).min(total);
        let slice: Vec<Item> = members[start.min(end)..end].to_vec();

        let mut page = Object::with_id(Kind::OrderedCollectionPage, iri);
        page.part_of = Some(Item::Iri(iri::without_query(iri)));
        page.total_items = Some(total as u64);
        if end < total {
            if let Some(last) = slice.last().and_then(Item::iri) {
                let next = iri::with_query(
                    iri,
                    &[("after".to_string(), CursorRef::of(last).to_string())],
                );
                page.next = Some(Item::Iri(next));
            }
        }
        if start > 0 {
            if let Some(first) = slice.first().and_then(Item::iri) {
                let mut pairs = filters.to_query_pairs();
                pairs.retain(|(k, _)| k != "after");
                pairs.push(("before".to_string(), CursorRef::of(first).to_string()));
                page.prev = Some(Item::Iri(iri::with_query(&iri::without_query(iri), &pairs)));
            }
        }
        page.ordered_items = slice;
        page
    }

    fn apply(&self, st: &mut State, mut act: Object) -> SyncResult<Object> {
        let base = self.base.clone();
        let act_iri = Self::next_iri(st, &base, CollectionPath::Activities);
        act.id = Some(act_iri.clone());
        if act.published.is_none() {
            act.published = Some(OffsetDateTime::now_utc());
        }
        let kind = act.kind.clone().unwrap_or(Kind::Activity);
        let actor = act.actor_iri().map(str::to_string);

        match kind {
            Kind::Create => {
                if let Some(Item::Object(mut ob)) = act.object.first().cloned() {
                    if ob.iri().is_none() {
                        ob.id = Some(Self::next_iri(st, &base, CollectionPath::Objects));
                    }
                    if ob.published.is_none() {
                        ob.published = act.published;
                    }
                    if ob.attributed_to.is_empty() {
                        if let Some(a) = &actor {
                            ob.attributed_to = vec![Item::Iri(a.clone())];
                        }
                    }
                    let ob_iri = ob.iri().map(str::to_string).unwrap_or_default();
                    for parent in ob.in_reply_to.iter().filter_map(Item::iri) {
                        push_member(&mut st.docs, &CollectionPath::Replies.of(parent), Item::Iri(ob_iri.clone()));
                    }
                    ob.replies = Some(Item::Iri(CollectionPath::Replies.of(&ob_iri)));
                    ob.likes = Some(Item::Iri(CollectionPath::Likes.of(&ob_iri)));
                    ob.shares = Some(Item::Iri(CollectionPath::Shares.of(&ob_iri)));
                    st.docs.insert(key(&ob_iri), (*ob).clone());
                    push_member(&mut st.docs, &CollectionPath::Objects.of(&base), Item::Iri(ob_iri));
                    act.object = vec![Item::Object(ob)];
                }
            }
            Kind::Update => {
                if let Some(Item::Object(ob)) = act.object.first() {
                    let ob_iri = ob.iri().map(str::to_string).ok_or_else(|| SyncError::invalid("update without object id"))?;
                    let stored = st.docs.get(&key(&ob_iri)).cloned().ok_or_else(|| SyncError::NotFound(ob_iri.clone()))?;
                    if stored.is_kind(&Kind::Tombstone) {
                        return Err(SyncError::Gone(ob_iri));
                    }
                    let mut merged = (**ob).clone();
                    merged.published = stored.published;
                    merged.updated = Some(OffsetDateTime::now_utc());
                    merged.replies = stored.replies.clone();
                    merged.likes = stored.likes.clone();
                    merged.shares = stored.shares.clone();
                    st.docs.insert(key(&ob_iri), merged);
                }
            }
            Kind::Delete => {
                if let Some(ob_iri) = act.object.first().and_then(Item::iri).map(str::to_string) {
                    if let Some(stored) = st.docs.get(&key(&ob_iri)) {
                        if stored.is_kind(&Kind::Tombstone) {
                            return Err(SyncError::Gone(ob_iri));
                        }
                        let mut tomb = Object::with_id(Kind::Tombstone, ob_iri.clone());
                        tomb.former_type = stored.kind.clone();
                        tomb.context = stored.context.clone();
                        tomb.in_reply_to = stored.in_reply_to.clone();
                        tomb.published = stored.published;
                        tomb.deleted = Some(OffsetDateTime::now_utc());
                        st.docs.insert(key(&ob_iri), tomb);
                    }
                }
            }
            Kind::Like | Kind::Dislike => {
                if let Some(ob_iri) = act.object.first().and_then(Item::iri) {
                    let likes = CollectionPath::Likes.of(ob_iri);
                    push_member(&mut st.docs, &likes, Item::Iri(act_iri.clone()));
                }
                if let Some(a) = &actor {
                    push_member(&mut st.docs, &CollectionPath::Liked.of(a), Item::Iri(act_iri.clone()));
                }
            }
            Kind::Undo => {
                if let Some(undone) = act.object.first().and_then(Item::iri).map(key) {
                    for doc in st.docs.values_mut() {
                        if doc.is_collection() {
                            doc.ordered_items.retain(|m| m.iri().map(key).as_deref() != Some(undone.as_str()));
                            doc.items.retain(|m| m.iri().map(key).as_deref() != Some(undone.as_str()));
                        }
                    }
                }
            }
            Kind::Follow => {
                if let Some(ob_iri) = act.object.first().and_then(Item::iri) {
                    push_member(&mut st.docs, &CollectionPath::Inbox.of(ob_iri), Item::Iri(act_iri.clone()));
                }
            }
            Kind::Accept => {
                let follow = act
                    .object
                    .first()
                    .and_then(Item::iri)
                    .and_then(|f| st.docs.get(&key(f)).cloned());
                if let (Some(follow), Some(a)) = (follow, &actor) {
                    if let Some(follower) = follow.actor_iri() {
                        push_member(&mut st.docs, &CollectionPath::Followers.of(a), Item::Iri(follower.to_string()));
                        push_member(&mut st.docs, &CollectionPath::Following.of(follower), Item::Iri(a.clone()));
                    }
                }
            }
            Kind::Block => {
                if let (Some(a), Some(ob_iri)) = (&actor, act.object.first().and_then(Item::iri)) {
                    push_member(&mut st.docs, &CollectionPath::Blocked.of(a), Item::Iri(ob_iri.to_string()));
                }
            }
            Kind::Ignore => {
                if let (Some(a), Some(ob_iri)) = (&actor, act.object.first().and_then(Item::iri)) {
                    push_member(&mut st.docs, &CollectionPath::Ignored.of(a), Item::Iri(ob_iri.to_string()));
                }
            }
            _ => {}
        }

        if let Some(a) = &actor {
            if let Some(Item::Object(full)) = act.actor.clone() {
                st.docs.entry(key(a)).or_insert(*full);
            }
            push_member(&mut st.docs, &CollectionPath::Outbox.of(a), Item::Iri(act_iri.clone()));
        }
        push_member(&mut st.docs, &CollectionPath::Activities.of(&base), Item::Iri(act_iri.clone()));
        st.docs.insert(key(&act_iri), act.clone());
        Ok(act)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, iri: &str, auth: Option<&Credential>) -> SyncResult<Object> {
        let mut st = self.lock();
        st.requests.push(Recorded {
            method: "GET",
            iri: iri.to_string(),
            auth: AuthKind::of(auth),
            body: None,
        });
        Self::check_failure(&st, iri)?;

        if let Some(exact) = st.docs.get(iri) {
            return Ok(exact.clone());
        }
        let doc = st
            .docs
            .get(&key(iri))
            .cloned()
            .ok_or_else(|| SyncError::NotFound(iri.to_string()))?;
        if doc.is_collection() && doc.first.is_none() {
            return Ok(Self::page(&st, iri, &doc));
        }
        Ok(doc)
    }

    async fn post(&self, iri: &str, activity: &Object, auth: Option<&Credential>) -> SyncResult<Posted> {
        let mut st = self.lock();
        st.requests.push(Recorded {
            method: "POST",
            iri: iri.to_string(),
            auth: AuthKind::of(auth),
            body: Some(activity.clone()),
        });
        Self::check_failure(&st, iri)?;
        let stored = self.apply(&mut st, activity.clone())?;
        Ok(Posted {
            iri: stored.id.clone().unwrap_or_default(),
            status: 201,
            object: Some(stored),
        })
    }
}

fn key(iri: &str) -> String {
    iri::recipient_key(&iri::strip_userinfo(&iri::without_query(iri)))
}

fn filters_without_pagination(f: &Filters) -> Filters {
    Filters {
        after: None,
        before: None,
        max_items: None,
        ..f.clone()
    }
}

fn resolve(docs: &BTreeMap<String, Object>, it: &Item) -> Item {
    match it {
        Item::Iri(i) => docs
            .get(&key(i))
            .map(|o| Item::Object(Box::new(embed_refs(docs, o))))
            .unwrap_or_else(|| it.clone()),
        Item::Object(_) => it.clone(),
    }
}

// Activities come back with their object and actor embedded, one level deep.
fn embed_refs(docs: &BTreeMap<String, Object>, o: &Object) -> Object {
    let mut out = o.clone();
    if out.kind.as_ref().map(Kind::is_activity).unwrap_or(false) {
        out.object = out
            .object
            .iter()
            .map(|it| match it.iri().and_then(|i| docs.get(&key(i))) {
                Some(found) if it.is_iri() => Item::Object(Box::new(found.clone())),
                _ => it.clone(),
            })
            .collect();
        if let Some(actor) = out.actor.as_ref().and_then(Item::iri).and_then(|i| docs.get(&key(i))) {
            out.actor = Some(Item::Object(Box::new(actor.clone())));
        }
    }
    out
}

fn push_member(docs: &mut BTreeMap<String, Object>, iri: &str, item: Item) {
    let col = docs
        .entry(key(iri))
        .or_insert_with(|| Object::with_id(Kind::OrderedCollection, iri::without_query(iri)));
    let exists = item
        .iri()
        .map(|i| col.ordered_items.iter().any(|m| m.iri() == Some(i)))
        .unwrap_or(false);
    if !exists {
        // newest first, like the remote service
        col.ordered_items.insert(0, item);
    }
    col.total_items = Some(col.ordered_items.len() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, name: &str) -> Object {
        let mut o = Object::with_id(Kind::Note, id);
        o.name = Some(name.into());
        o
    }

    #[tokio::test]
    async fn paginates_stored_collections() {
        let t = MemoryTransport::new("https://fed.example");
        for i in 0..5 {
            let id = format!("https://fed.example/objects/{i}");
            t.insert(note(&id, &format!("post {i}")));
            t.push_to_collection("https://fed.example/objects", Item::Iri(id));
        }
        let first = t.get("https://fed.example/objects?maxItems=2", None).await.unwrap();
        assert_eq!(first.total_items, Some(5));
        assert_eq!(first.ordered_items.len(), 2);
        assert_eq!(first.ordered_items[0].iri(), Some("https://fed.example/objects/4"));
        let next = first.next.as_ref().and_then(Item::iri).unwrap().to_string();
        let second = t.get(&next, None).await.unwrap();
        assert_eq!(second.ordered_items[0].iri(), Some("https://fed.example/objects/2"));
        let last = t
            .get(second.next.as_ref().and_then(Item::iri).unwrap(), None)
            .await
            .unwrap();
        assert_eq!(last.ordered_items.len(), 1);
        assert!(last.next.is_none());
        assert_eq!(t.gets().len(), 3);
    }

    #[tokio::test]
    async fn create_assigns_ids_and_delete_tombstones() {
        let t = MemoryTransport::new("https://fed.example");
        let mut act = Object::new(Kind::Create);
        act.actor = Some("https://fed.example/actors/alice".into());
        act.object = vec![Object::new(Kind::Note).into()];
        let posted = t
            .post("https://fed.example/actors/alice/outbox", &act, Some(&Credential::Bearer("t".into())))
            .await
            .unwrap();
        assert!(posted.iri.starts_with("https://fed.example/activities/"));
        let ob_iri = posted
            .object
            .as_ref()
            .and_then(|o| o.object().and_then(Item::iri))
            .unwrap()
            .to_string();
        assert!(t.get_doc("https://fed.example/actors/alice/outbox").is_some());

        let mut del = Object::new(Kind::Delete);
        del.actor = Some("https://fed.example/actors/alice".into());
        del.object = vec![Item::Iri(ob_iri.clone())];
        t.post("https://fed.example/actors/alice/outbox", &del, None).await.unwrap();
        assert!(t.get_doc(&ob_iri).unwrap().is_kind(&Kind::Tombstone));
        let again = t.post("https://fed.example/actors/alice/outbox", &del, None).await;
        assert!(again.unwrap_err().is_gone());
        assert_eq!(t.posts()[0].auth, AuthKind::Bearer);
    }

    #[tokio::test]
    async fn injected_failures() {
        let t = MemoryTransport::new("https://fed.example");
        t.fail("https://down.example/inbox", 502);
        let err = t.get("https://down.example/inbox?maxItems=3", None).await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 502, .. }));
    }
}
