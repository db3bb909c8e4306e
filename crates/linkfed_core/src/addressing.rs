/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Recipient computation for outgoing activities.

use linkfed_vocab::{CollectionPath, Item as ApItem, Object, PUBLIC_NS};

use crate::account::Account;
use crate::config::SyncConfig;
use crate::iri;
use crate::item::Item;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub to: Vec<String>,
    pub bto: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, target: &str) {
    let target = target.trim();
    if target.is_empty() {
        return;
    }
    let key = iri::recipient_key(target);
    if !list.iter().any(|r| iri::recipient_key(r) == key) {
        list.push(target.to_string());
    }
}

fn contains(list: &[String], target: &str) -> bool {
    let key = iri::recipient_key(target);
    list.iter().any(|r| iri::recipient_key(r) == key)
}

impl Recipients {
    pub fn add_to(&mut self, target: &str) {
        push_unique(&mut self.to, target);
    }

    pub fn add_cc(&mut self, target: &str) {
        push_unique(&mut self.cc, target);
    }

    pub fn add_bcc(&mut self, target: &str) {
        push_unique(&mut self.bcc, target);
    }

    pub fn remove_to(&mut self, target: &str) {
        let key = iri::recipient_key(target);
        self.to.retain(|r| iri::recipient_key(r) != key);
    }

    pub fn is_public(&self) -> bool {
        self.to.iter().chain(self.cc.iter()).any(|r| r == PUBLIC_NS)
    }

    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.to.iter().chain(&self.bto).chain(&self.cc).chain(&self.bcc)
    }

    /// Drops entries already present in a more visible list.
    pub fn dedup(&mut self) {
        let to = self.to.clone();
        self.cc.retain(|r| !contains(&to, r));
        let seen: Vec<String> = to.iter().chain(self.cc.iter()).cloned().collect();
        self.bto.retain(|r| !contains(&seen, r));
        let seen: Vec<String> = seen.into_iter().chain(self.bto.iter().cloned()).collect();
        self.bcc.retain(|r| !contains(&seen, r));
    }

    /// Writes the lists onto an activity and onto its embedded object.
    pub fn apply(&self, act: &mut Object) {
        let items = |v: &Vec<String>| v.iter().map(|s| ApItem::from(s.as_str())).collect::<Vec<_>>();
        act.to = items(&self.to);
        act.bto = items(&self.bto);
        act.cc = items(&self.cc);
        act.bcc = items(&self.bcc);
        if let Some(ApItem::Object(ob)) = act.object.first_mut() {
            if !ob.kind.as_ref().map(|k| k.is_actor()).unwrap_or(false) {
                ob.to = act.to.clone();
                ob.cc = act.cc.clone();
            }
        }
    }
}

/// Addressing rules for one instance.
pub struct Addressing<'a> {
    cfg: &'a SyncConfig,
}

impl<'a> Addressing<'a> {
    pub fn new(cfg: &'a SyncConfig) -> Self {
        Self { cfg }
    }

    /// Base lists for something `actor` sends. Every activity is copied to
    /// the application actor and its followers.
    pub fn for_actor(&self, actor: &Account, public: bool) -> Recipients {
        let mut r = Recipients::default();
        if public {
            r.add_to(PUBLIC_NS);
            if let Some(followers) = actor.collection(CollectionPath::Followers) {
                r.add_cc(&followers);
            }
            r.add_bcc(&self.cfg.service());
        }
        if let Some(app) = self.cfg.app() {
            r.add_cc(app);
            r.add_cc(&CollectionPath::Followers.of(app));
        }
        r
    }

    /// Adds an author to `to` (or `cc`), blind-copying its host root when it
    /// lives on another instance.
    pub fn add_author(&self, r: &mut Recipients, author: &str, direct: bool) {
        if direct {
            r.add_to(author);
        } else {
            r.add_cc(author);
        }
        self.bcc_remote_host(r, author);
    }

    pub fn bcc_remote_host(&self, r: &mut Recipients, target: &str) {
        let Some(host) = iri::host_of(target) else {
            return;
        };
        if host != self.cfg.host() && !self.cfg.is_local_iri(target) {
            if let Some(root) = iri::root_of(target) {
                r.add_bcc(&root);
            }
        }
    }

    /// Reply chain, nearest ancestor first. The first ancestor's author is
    /// addressed directly, the rest are copied. Only the parent's own lists
    /// carry forward.
    pub fn reply_chain(&self, r: &mut Recipients, ancestors: &[Item]) {
        let Some((parent, rest)) = ancestors.split_first() else {
            return;
        };
        let direct = parent.author_iri();
        if let Some(author) = direct {
            self.add_author(r, author, true);
        }
        for acc in &parent.metadata.to {
            if let Some(a) = acc.iri() {
                r.add_to(a);
            }
        }
        for acc in &parent.metadata.cc {
            if let Some(a) = acc.iri() {
                r.add_cc(a);
            }
        }
        for author in rest.iter().filter_map(Item::author_iri) {
            if direct.map(|d| iri::recipient_key(d) == iri::recipient_key(author)).unwrap_or(false) {
                continue;
            }
            // older ancestors are only copied, even when the parent addressed them
            r.remove_to(author);
            self.add_author(r, author, false);
        }
    }

    /// Recipients for an item, public or private, including its reply chain
    /// and mentions.
    pub fn for_item(&self, actor: &Account, item: &Item, ancestors: &[Item]) -> Recipients {
        let public = !item.is_private();
        let mut r = self.for_actor(actor, public);
        for acc in &item.metadata.to {
            if let Some(a) = acc.iri() {
                r.add_to(a);
            }
        }
        for acc in &item.metadata.cc {
            if let Some(a) = acc.iri() {
                r.add_cc(a);
            }
        }
        if public && item.is_top() {
            if let Some(author) = item.submitted_by.as_ref().and_then(|a| a.collection(CollectionPath::Followers)) {
                r.add_cc(&author);
            }
        }
        self.reply_chain(&mut r, ancestors);
        for m in &item.metadata.mentions {
            if let Some(target) = m.iri.as_deref() {
                r.add_cc(target);
                self.bcc_remote_host(&mut r, target);
            }
        }
        r.dedup();
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemRef;

    fn cfg() -> SyncConfig {
        let mut c = SyncConfig::new("https://fed.example");
        c.app_iri = Some("https://fed.example/actors/app".into());
        c
    }

    fn authored(iri: &str, author: &str) -> Item {
        let mut it = Item::from_iri(iri);
        it.submitted_by = Some(Account::from_iri(author));
        it
    }

    #[test]
    fn public_top_level() {
        let cfg = cfg();
        let alice = Account::from_iri("https://fed.example/actors/alice");
        let item = Item::default();
        let r = Addressing::new(&cfg).for_item(&alice, &item, &[]);
        assert_eq!(r.to, vec![PUBLIC_NS.to_string()]);
        assert!(r.cc.contains(&"https://fed.example/actors/alice/followers".to_string()));
        assert!(r.cc.contains(&"https://fed.example/actors/app".to_string()));
        assert!(r.cc.contains(&"https://fed.example/actors/app/followers".to_string()));
        assert_eq!(r.bcc, vec!["https://fed.example/".to_string()]);
    }

    #[test]
    fn private_items_skip_the_public_lists() {
        let cfg = cfg();
        let alice = Account::from_iri("https://fed.example/actors/alice");
        let mut item = Item::default();
        item.make_private();
        item.metadata.to.push(Account::from_iri("https://fed.example/actors/bob"));
        let r = Addressing::new(&cfg).for_item(&alice, &item, &[]);
        assert_eq!(r.to, vec!["https://fed.example/actors/bob".to_string()]);
        assert!(!r.is_public());
        assert!(r.bcc.is_empty());
    }

    #[test]
    fn reply_chain_dedups_shared_authors() {
        let cfg = cfg();
        let alice = Account::from_iri("https://fed.example/actors/alice");
        let mut reply = Item::default();
        reply.parent = Some(ItemRef::new("https://fed.example/objects/p"));
        let chain = vec![
            authored("https://fed.example/objects/p", "https://fed.example/actors/bob"),
            authored("https://fed.example/objects/gp", "https://far.example/users/carol"),
            authored("https://fed.example/objects/root", "https://far.example/users/carol/"),
        ];
        let r = Addressing::new(&cfg).for_item(&alice, &reply, &chain);
        assert!(r.to.contains(&"https://fed.example/actors/bob".to_string()));
        let carol: Vec<_> = r.cc.iter().filter(|c| c.contains("carol")).collect();
        assert_eq!(carol.len(), 1);
        assert!(r.bcc.contains(&"https://far.example".to_string()));
        assert!(!r.bcc.iter().any(|b| b.contains("fed.example/actors")));
    }

    #[test]
    fn older_ancestors_stay_copied() {
        let cfg = cfg();
        let alice = Account::from_iri("https://fed.example/actors/alice");
        let mut parent = authored("https://fed.example/objects/mid", "https://fed.example/actors/bob");
        parent.metadata.to.push(Account::from_iri("https://fed.example/actors/carol"));
        parent.metadata.to.push(Account::from_iri("https://fed.example/actors/dave"));
        let chain = vec![
            parent,
            authored("https://fed.example/objects/root", "https://fed.example/actors/carol"),
        ];
        let mut reply = Item::default();
        reply.parent = Some(ItemRef::new("https://fed.example/objects/mid"));
        let r = Addressing::new(&cfg).for_item(&alice, &reply, &chain);
        assert!(r.to.contains(&"https://fed.example/actors/bob".to_string()));
        assert!(r.to.contains(&"https://fed.example/actors/dave".to_string()));
        assert!(!r.to.contains(&"https://fed.example/actors/carol".to_string()));
        assert!(r.cc.contains(&"https://fed.example/actors/carol".to_string()));
    }

    #[test]
    fn apply_copies_to_embedded_object() {
        let mut act = Object::new(linkfed_vocab::Kind::Create);
        act.object = vec![Object::new(linkfed_vocab::Kind::Note).into()];
        let mut r = Recipients::default();
        r.add_to(PUBLIC_NS);
        r.add_to(PUBLIC_NS);
        r.add_cc("https://fed.example/actors/a/followers");
        r.apply(&mut act);
        assert_eq!(act.to.len(), 1);
        let inner = act.object[0].as_object().unwrap();
        assert_eq!(inner.cc[0].iri(), Some("https://fed.example/actors/a/followers"));
    }
}
