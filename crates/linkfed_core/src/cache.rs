/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use linkfed_vocab::{CollectionPath, Item as ApItem, Kind, Object, PUBLIC_NS};
use tracing::debug;

use crate::account::Account;
use crate::iri;
use crate::metrics::SyncMetrics;

const SWEEP_AT: usize = 512;

struct Entry {
    object: Object,
    expires_at: Instant,
}

/// IRI-keyed document cache. Entries fetched on behalf of an account are
/// partitioned by putting the account hash in the key's userinfo; purging an
/// IRI drops every partition and every filtered page of it.
pub struct Cache {
    enabled: bool,
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
    metrics: Arc<SyncMetrics>,
}

fn base_key(key: &str) -> String {
    iri::recipient_key(&iri::without_query(&iri::strip_userinfo(key)))
}

fn is_empty_page(ob: &Object) -> bool {
    ob.is_collection() && ob.collection_items().is_empty() && ob.first.as_ref().map(ApItem::is_iri).unwrap_or(true)
}

impl Cache {
    pub fn new(enabled: bool, ttl: Duration, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            enabled,
            ttl,
            entries: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO, Arc::new(SyncMetrics::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn key(target: &str, viewer: Option<&Account>) -> String {
        match viewer.filter(|a| a.hash.is_valid()) {
            Some(a) => iri::with_userinfo(target, &a.hash.short()),
            None => target.to_string(),
        }
    }

    pub fn get(&self, target: &str, viewer: Option<&Account>) -> Option<Object> {
        if !self.enabled {
            return None;
        }
        let key = Self::key(target, viewer);
        let now = Instant::now();
        let (hit, stale) = match self.read().get(&key) {
            Some(e) if e.expires_at > now => (Some(e.object.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if stale {
            let mut map = self.write();
            if map.get(&key).map(|e| e.expires_at <= now).unwrap_or(false) {
                map.remove(&key);
            }
        }
        match hit {
            Some(_) => self.metrics.cache_hit(),
            None => self.metrics.cache_miss(),
        }
        hit
    }

    /// Empty collection pages are not stored.
    pub fn put(&self, target: &str, viewer: Option<&Account>, ob: &Object) {
        if !self.enabled || is_empty_page(ob) {
            return;
        }
        let key = Self::key(target, viewer);
        let now = Instant::now();
        let mut map = self.write();
        if map.len() >= SWEEP_AT {
            let before = map.len();
            map.retain(|_, e| e.expires_at > now);
            debug!("swept {} expired cache entries", before - map.len());
        }
        map.insert(
            key,
            Entry {
                object: ob.clone(),
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Removes every entry whose IRI, ignoring query and partition, is in
    /// `targets`. Returns the number of entries dropped.
    pub fn purge<I, S>(&self, targets: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = targets.into_iter().map(|t| base_key(t.as_ref())).collect();
        if wanted.is_empty() {
            return 0;
        }
        let mut map = self.write();
        let before = map.len();
        map.retain(|k, _| !wanted.contains(&base_key(k)));
        let n = before - map.len();
        drop(map);
        self.metrics.purged(n as u64);
        n
    }

    pub fn members_of(&self, collection: &str) -> Vec<String> {
        let wanted = base_key(collection);
        let mut out = BTreeSet::new();
        for (k, e) in self.read().iter() {
            if base_key(k) != wanted {
                continue;
            }
            out.extend(e.object.collection_items().iter().filter_map(ApItem::iri).map(str::to_string));
        }
        out.into_iter().collect()
    }

    fn recipient_targets(&self, recipient: &str, out: &mut BTreeSet<String>) {
        if recipient == PUBLIC_NS || recipient.is_empty() {
            return;
        }
        match CollectionPath::of_iri(recipient) {
            Some(p) if p.is_actor_relation() => {
                // the relationship collection itself does not change
                for member in self.members_of(recipient) {
                    out.insert(CollectionPath::Outbox.of(&member));
                }
            }
            Some(CollectionPath::Inbox | CollectionPath::Outbox) => {
                out.insert(recipient.to_string());
            }
            _ => {
                out.insert(CollectionPath::Inbox.of(recipient));
            }
        }
    }

    /// IRIs made stale by a stored activity.
    pub fn invalidation_set(&self, activity: &Object) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        if let Some(id) = activity.iri() {
            out.insert(id.to_string());
        }
        for r in activity.recipients().filter_map(ApItem::iri) {
            self.recipient_targets(r, &mut out);
        }
        if let Some(actor) = activity.actor_iri() {
            out.insert(CollectionPath::Outbox.of(actor));
        }

        let kind = activity.kind.clone().unwrap_or(Kind::Activity);
        for ob in &activity.object {
            let Some(ob_iri) = ob.iri() else {
                continue;
            };
            out.insert(ob_iri.to_string());
            if kind.has_side_effects() {
                if let Some(parent) = iri::parent_path(ob_iri) {
                    out.insert(parent);
                }
                out.insert(CollectionPath::Replies.of(ob_iri));
            }
            if kind.is_appreciation() {
                out.insert(CollectionPath::Likes.of(ob_iri));
            }
            let Some(inner) = ob.as_object() else {
                continue;
            };
            if inner.kind.as_ref().map(Kind::is_appreciation).unwrap_or(false) {
                // undoing a vote changes the voted object's likes
                for voted in inner.object.iter().filter_map(ApItem::iri) {
                    out.insert(voted.to_string());
                    out.insert(CollectionPath::Likes.of(voted));
                }
            }
            for r in inner.recipients().filter_map(ApItem::iri) {
                self.recipient_targets(r, &mut out);
            }
            for parent in inner.in_reply_to.iter().filter_map(ApItem::iri) {
                out.insert(CollectionPath::Replies.of(parent));
            }
            for author in inner.attributed_to.iter().filter_map(ApItem::iri) {
                out.insert(CollectionPath::Outbox.of(author));
            }
        }
        out
    }

    pub fn invalidate(&self, activity: &Object) -> usize {
        if !self.enabled {
            return 0;
        }
        let set = self.invalidation_set(activity);
        let n = self.purge(&set);
        debug!(
            "purged {n} cache entries for {} ({} iris)",
            activity.iri().unwrap_or("activity"),
            set.len()
        );
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> Cache {
        Cache::new(true, Duration::from_secs(600), Arc::new(SyncMetrics::new()))
    }

    fn page(id: &str, members: &[&str]) -> Object {
        let mut p = Object::with_id(Kind::OrderedCollectionPage, id);
        p.ordered_items = members.iter().map(|m| ApItem::from(*m)).collect();
        p
    }

    #[test]
    fn partitions_and_purges() {
        let c = cache();
        let viewer = Account::from_iri("https://fed.example/actors/1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        let p = page("https://fed.example/inbox", &["https://fed.example/objects/1"]);
        c.put("https://fed.example/inbox?maxItems=10", Some(&viewer), &p);
        c.put("https://fed.example/inbox", None, &p);
        assert!(c.get("https://fed.example/inbox?maxItems=10", None).is_none());
        assert!(c.get("https://fed.example/inbox?maxItems=10", Some(&viewer)).is_some());
        assert_eq!(c.purge(["https://fed.example/inbox"]), 2);
        assert!(c.is_empty());
    }

    #[test]
    fn skips_empty_pages_and_expires() {
        let c = cache();
        c.put("https://fed.example/outbox", None, &page("https://fed.example/outbox", &[]));
        assert!(c.is_empty());
        let short = Cache::new(true, Duration::ZERO, Arc::new(SyncMetrics::new()));
        let p = page("https://fed.example/outbox", &["https://fed.example/objects/1"]);
        short.put("https://fed.example/outbox", None, &p);
        assert_eq!(short.len(), 1);
        assert!(short.get("https://fed.example/outbox", None).is_none());
        assert!(short.is_empty());
    }

    #[test]
    fn stores_sweep_expired_entries() {
        let short = Cache::new(true, Duration::ZERO, Arc::new(SyncMetrics::new()));
        for i in 0..SWEEP_AT + 10 {
            let id = format!("https://fed.example/objects/{i}");
            short.put(&id, None, &Object::with_id(Kind::Note, id.as_str()));
        }
        assert!(short.len() < SWEEP_AT);

        let c = cache();
        for i in 0..SWEEP_AT + 10 {
            let id = format!("https://fed.example/objects/{i}");
            c.put(&id, None, &Object::with_id(Kind::Note, id.as_str()));
        }
        assert_eq!(c.len(), SWEEP_AT + 10);
    }

    fn note_activity(kind: Kind) -> Object {
        let mut note = Object::with_id(Kind::Note, "https://fed.example/objects/o1");
        note.in_reply_to = vec!["https://fed.example/objects/p".into()];
        note.attributed_to = vec!["https://fed.example/actors/alice".into()];
        let mut act = Object::with_id(kind, "https://fed.example/activities/a1");
        act.actor = Some("https://fed.example/actors/alice".into());
        act.to = vec![PUBLIC_NS.into(), "https://fed.example/actors/bob".into()];
        act.cc = vec!["https://fed.example/actors/alice/followers".into()];
        act.object = vec![note.into()];
        act
    }

    #[test]
    fn update_purges_a_superset_of_create() {
        let c = cache();
        c.put(
            "https://fed.example/actors/alice/followers",
            None,
            &page("https://fed.example/actors/alice/followers", &["https://far.example/users/carol"]),
        );
        let create = c.invalidation_set(&note_activity(Kind::Create));
        let update = c.invalidation_set(&note_activity(Kind::Update));
        for expected in [
            "https://fed.example/activities/a1",
            "https://fed.example/actors/alice/outbox",
            "https://fed.example/actors/bob/inbox",
            "https://far.example/users/carol/outbox",
            "https://fed.example/objects/o1",
            "https://fed.example/objects/p/replies",
        ] {
            assert!(create.contains(expected), "missing {expected}");
        }
        assert!(!create.contains("https://fed.example/actors/alice/followers"));
        assert!(update.is_superset(&create));
        assert!(update.contains("https://fed.example/objects"));
        assert!(update.contains("https://fed.example/objects/o1/replies"));
        assert!(update.len() > create.len());
    }
}
