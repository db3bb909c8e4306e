/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Protocol objects to domain entities.
//!
//! Conversion is shallow: referenced parents, thread roots, authors and
//! mentions become identity stubs, nothing is re-fetched. Missing optional
//! properties never fail a conversion; only an empty or unrecognized
//! top-level object does.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use linkfed_vocab::{CollectionPath, Item as ApItem, Kind, Object, PUBLIC_NS};

use crate::account::{Account, Icon};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::flags::Flags;
use crate::follow::{FollowRequest, FollowState};
use crate::hash::Hash;
use crate::item::{Item, ItemRef, MimeType};
use crate::moderation::ModerationOp;
use crate::renderable::Renderable;
use crate::tag::{Tag, TagKind};
use crate::vote::Vote;

/// Entities that can be built from a protocol node.
pub trait FromProtocol: Sized {
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self>;
}

/// Bidirectional mapping between entities and protocol objects, configured
/// with the instance it runs for.
#[derive(Clone)]
pub struct Converter {
    cfg: Arc<SyncConfig>,
}

impl Converter {
    pub fn new(cfg: Arc<SyncConfig>) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn parse<T: FromProtocol>(&self, it: &ApItem) -> SyncResult<T> {
        T::from_protocol(self, it)
    }

    pub fn parse_object<T: FromProtocol>(&self, ob: &Object) -> SyncResult<T> {
        T::from_protocol(self, &ApItem::Object(Box::new(ob.clone())))
    }

    fn account_ref(&self, it: &ApItem) -> Option<Account> {
        match it {
            ApItem::Iri(i) if i == PUBLIC_NS => Some(Account::anonymous()),
            ApItem::Iri(i) => Some(Account::from_iri(i)),
            ApItem::Object(_) => self.parse::<Account>(it).ok(),
        }
    }

    fn recipient(&self, it: &ApItem) -> Option<Account> {
        let iri = it.iri()?;
        if iri == PUBLIC_NS {
            return None;
        }
        if let Some((owner, path)) = CollectionPath::split(iri) {
            if path.is_actor_relation() {
                // stands for the owner's followers/following, not an actor
                let mut stub = Account::from_iri(iri);
                stub.handle = format!("{}", path);
                stub.created_by = Some(Box::new(Account::from_iri(owner)));
                return Some(stub);
            }
        }
        self.account_ref(it)
    }
}

fn empty_error(what: &str) -> SyncError {
    SyncError::invalid(format!("empty {what} object"))
}

fn unsupported(what: &str, kind: Option<&Kind>) -> SyncError {
    SyncError::invalid(format!(
        "unsupported {what} type: {}",
        kind.map(Kind::as_str).unwrap_or("none")
    ))
}

fn iri_of(it: &Option<ApItem>) -> Option<String> {
    it.as_ref().and_then(ApItem::iri).map(str::to_string)
}

/// Deterministic SVG avatar showing the first character of `handle`.
pub fn placeholder_icon(handle: &str, hash: &Hash) -> Icon {
    let letter = handle
        .trim_start_matches('@')
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "?".to_string());
    let b = hash.as_uuid().as_bytes();
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 64 64\">\
<rect width=\"64\" height=\"64\" fill=\"#{:02x}{:02x}{:02x}\"/>\
<text x=\"32\" y=\"42\" font-size=\"32\" text-anchor=\"middle\" fill=\"#ffffff\">{}</text></svg>",
        b[0] / 2 + 64,
        b[1] / 2 + 64,
        b[2] / 2 + 64,
        crate::render::html_escape_with_breaks(&letter)
    );
    Icon {
        uri: format!("data:image/svg+xml;base64,{}", B64.encode(svg)),
        mime_type: "image/svg+xml".to_string(),
    }
}

fn icon_of(it: &ApItem) -> Option<Icon> {
    match it {
        ApItem::Iri(i) => Some(Icon {
            uri: i.clone(),
            mime_type: String::new(),
        }),
        ApItem::Object(o) => {
            let uri = o
                .url
                .first()
                .and_then(ApItem::iri)
                .or(o.href.as_deref())
                .or(o.iri())?;
            Some(Icon {
                uri: uri.to_string(),
                mime_type: o.media_type.clone().unwrap_or_default(),
            })
        }
    }
}

pub(crate) fn tag_of(it: &ApItem) -> Option<Tag> {
    let ob = it.as_object()?;
    let name = ob.name_str();
    let link = ob.href.clone().or_else(|| ob.url.first().and_then(ApItem::iri).map(str::to_string));
    let mut tag = match ob.kind.as_ref() {
        Some(Kind::Mention) => Tag::mention(name),
        _ if name.is_empty() => return None,
        _ => Tag::hashtag(name),
    };
    if tag.kind == TagKind::Mention {
        // mentions point at the account
        tag.iri = link.clone().or_else(|| ob.iri().map(str::to_string));
        tag.url = link;
    } else {
        tag.iri = ob.iri().map(str::to_string).or_else(|| link.clone());
        tag.url = link;
    }
    Some(tag)
}

impl FromProtocol for Account {
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self> {
        let ob = match it {
            ApItem::Iri(i) if i.trim().is_empty() => return Err(empty_error("account")),
            ApItem::Iri(i) if i == PUBLIC_NS => return Ok(Account::anonymous()),
            ApItem::Iri(i) => return Ok(Account::from_iri(i)),
            ApItem::Object(o) => o.as_ref(),
        };
        let Some(kind) = ob.kind.as_ref() else {
            return match ob.iri() {
                Some(i) => Ok(Account::from_iri(i)),
                None => Err(empty_error("account")),
            };
        };

        if matches!(kind, Kind::Create | Kind::Update | Kind::Block | Kind::Flag | Kind::Ignore) {
            let inner = ob.object().ok_or_else(|| empty_error("account"))?;
            let mut acc = Account::from_protocol(conv, inner)?;
            if let Some(actor) = ob.actor.as_ref().and_then(|a| conv.account_ref(a)) {
                acc.created_by = Some(Box::new(actor));
            }
            return Ok(acc);
        }

        let id = ob.iri().unwrap_or_default();
        if *kind == Kind::Tombstone {
            let mut acc = Account::from_iri(id);
            acc.handle = "deleted".to_string();
            acc.flags.insert(Flags::DELETED);
            acc.created_at = ob.published;
            acc.updated_at = ob.deleted.or(ob.updated);
            acc.object = Some(ob.clone());
            return Ok(acc);
        }
        if !kind.is_actor() {
            return Err(unsupported("account", Some(kind)));
        }

        let mut acc = Account::from_iri(id);
        acc.handle = ob
            .preferred_username
            .as_ref()
            .map(|n| n.first().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| ob.name_str().to_string());
        acc.created_at = ob.published;
        acc.updated_at = ob.updated;
        match kind {
            Kind::Group => acc.flags.insert(Flags::GROUP),
            Kind::Application => acc.flags.insert(Flags::APPLICATION),
            Kind::Service => acc.flags.insert(Flags::SERVICE),
            _ => {}
        }
        if let Some(generator) = ob.generator.as_ref().and_then(|g| conv.account_ref(g)) {
            acc.created_by = Some(Box::new(generator));
        }

        let m = &mut acc.metadata;
        m.url = ob.url.first().and_then(ApItem::iri).map(str::to_string);
        m.name = Some(ob.name_str().to_string()).filter(|s| !s.is_empty());
        m.blurb = Some(ob.summary_str().to_string()).filter(|s| !s.is_empty());
        m.icon = ob.icon.as_ref().and_then(icon_of);
        m.public_key_pem = ob.public_key.as_ref().map(|k| k.public_key_pem.clone());
        m.inbox = iri_of(&ob.inbox);
        m.outbox = iri_of(&ob.outbox);
        m.followers = iri_of(&ob.followers);
        m.following = iri_of(&ob.following);
        m.liked = iri_of(&ob.liked);
        if let Some(ep) = &ob.endpoints {
            m.authorization_endpoint = ep.oauth_authorization_endpoint.clone();
            m.token_endpoint = ep.oauth_token_endpoint.clone();
        }
        m.tags = ob.tag.iter().filter_map(tag_of).collect();

        let tags = &conv.config().moderation_tags;
        for t in ob.tag.iter().filter_map(ApItem::iri) {
            if tags.moderator.as_deref().map(|m| crate::iri::same_iri(m, t)).unwrap_or(false) {
                acc.flags.insert(Flags::MODERATOR);
            }
            if tags.operator.as_deref().map(|o| crate::iri::same_iri(o, t)).unwrap_or(false) {
                acc.flags.insert(Flags::OPERATOR);
            }
        }

        if acc.metadata.icon.is_none() {
            acc.metadata.icon = Some(placeholder_icon(&acc.handle, &acc.hash));
        }
        acc.object = Some(ob.clone());
        Ok(acc)
    }
}

impl FromProtocol for Item {
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self> {
        let ob = match it {
            ApItem::Iri(i) if i.trim().is_empty() => return Err(empty_error("item")),
            ApItem::Iri(i) => return Ok(Item::from_iri(i)),
            ApItem::Object(o) => o.as_ref(),
        };
        let kind = ob.kind.as_ref().ok_or_else(|| empty_error("item"))?;

        match kind {
            Kind::Delete => {
                let inner = ob.object().ok_or_else(|| empty_error("item"))?;
                let mut item = Item::from_protocol(conv, inner)?;
                item.delete();
                item.updated_by = ob.actor.as_ref().and_then(|a| conv.account_ref(a));
                if item.updated_at.is_none() {
                    item.updated_at = ob.published;
                }
                return Ok(item);
            }
            Kind::Create | Kind::Update => {
                let inner = ob.object().ok_or_else(|| empty_error("item"))?;
                let mut item = Item::from_protocol(conv, inner)?;
                let actor = ob.actor.as_ref().and_then(|a| conv.account_ref(a));
                if *kind == Kind::Update {
                    item.updated_by = actor.clone();
                }
                if item.submitted_by.is_none() {
                    item.metadata.author_iri = actor.as_ref().and_then(Account::iri).map(str::to_string);
                    item.submitted_by = actor;
                }
                if item.metadata.to.is_empty() && item.metadata.cc.is_empty() {
                    item.metadata.to = ob.to.iter().filter_map(|r| conv.recipient(r)).collect();
                    item.metadata.cc = ob.cc.iter().filter_map(|r| conv.recipient(r)).collect();
                    item.flags.set(Flags::PRIVATE, !ob.is_public());
                }
                if item.created_at.is_none() {
                    item.created_at = ob.published;
                }
                return Ok(item);
            }
            _ => {}
        }

        let id = ob.iri().unwrap_or_default();
        let mut item = if id.is_empty() { Item::default() } else { Item::from_iri(id) };
        item.created_at = ob.published;
        item.updated_at = ob.updated;
        item.object = Some(ob.clone());

        if let Some(op) = ob.context.as_ref().and_then(ApItem::iri) {
            item.op = Some(ItemRef::new(op));
        }
        if let Some(parent) = ob.in_reply_to.first().and_then(ApItem::iri) {
            item.parent = Some(ItemRef::new(parent));
            if item.op.is_none() {
                item.op = Some(ItemRef::new(parent));
            }
        }
        if item.op.as_ref().map(|op| Some(op.iri.as_str()) == item.iri()).unwrap_or(false) {
            // a thread root may name itself as context
            item.op = None;
        }

        if *kind == Kind::Tombstone {
            item.delete();
            item.updated_at = ob.deleted.or(ob.updated);
            item.title = ob.name_str().to_string();
            return Ok(item);
        }
        if !kind.is_content() {
            return Err(unsupported("item", Some(kind)));
        }

        item.title = ob.name_str().to_string();
        if item.title.is_empty() && ob.in_reply_to.is_empty() {
            item.title = ob.summary_str().to_string();
        }

        let source = ob
            .source
            .as_ref()
            .filter(|s| s.content.as_ref().map(|c| !c.is_empty()).unwrap_or(false))
            .and_then(|s| s.media_type.as_deref().map(|mt| (s, mt)));
        match source {
            Some((src, mt)) => {
                item.data = src.content.as_ref().map(|c| c.first().to_string()).unwrap_or_default();
                item.mime_type = MimeType::parse(mt);
            }
            None => {
                item.data = ob.content_str().to_string();
                item.mime_type = MimeType::parse(ob.media_type.as_deref().unwrap_or(""));
            }
        }
        let url = ob
            .url
            .first()
            .and_then(ApItem::iri)
            .or(ob.href.as_deref())
            .map(str::to_string);
        if *kind == Kind::Page && item.data.is_empty() {
            if let Some(u) = &url {
                item.data = u.clone();
                item.mime_type = MimeType::Url;
            }
        }
        item.metadata.url = url;

        if let Some(author) = ob.attributed_to.first() {
            item.metadata.author_iri = author.iri().map(str::to_string);
            item.submitted_by = conv.account_ref(author);
        }

        for t in ob.tag.iter().filter_map(tag_of) {
            match t.kind {
                TagKind::Mention => item.metadata.mentions.push(t),
                TagKind::Hashtag => item.metadata.tags.push(t),
            }
        }

        item.metadata.to = ob.to.iter().filter_map(|r| conv.recipient(r)).collect();
        item.metadata.cc = ob.cc.iter().filter_map(|r| conv.recipient(r)).collect();
        item.flags.set(Flags::PRIVATE, !ob.is_public());

        item.metadata.replies = iri_of(&ob.replies);
        item.metadata.likes = iri_of(&ob.likes);
        item.metadata.shares = iri_of(&ob.shares);
        item.metadata.icon = ob.icon.as_ref().and_then(icon_of);
        Ok(item)
    }
}

impl FromProtocol for Vote {
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self> {
        let ob = match it {
            ApItem::Iri(i) => {
                return Err(SyncError::invalid(format!("vote needs an activity, got bare iri {i}")))
            }
            ApItem::Object(o) => o.as_ref(),
        };
        let kind = ob.kind.as_ref().ok_or_else(|| empty_error("vote"))?;
        let mut vote = Vote {
            iri: ob.iri().map(str::to_string),
            submitted_by: ob.actor.as_ref().and_then(|a| conv.account_ref(a)),
            created_at: ob.published,
            updated_at: ob.updated,
            object: Some(ob.clone()),
            ..Default::default()
        };
        match kind {
            Kind::Like | Kind::Dislike => {
                vote.weight = if *kind == Kind::Like { 1 } else { -1 };
                vote.item = ob.object().and_then(ApItem::iri).map(ItemRef::new);
            }
            Kind::Undo => {
                let inner = ob.object().ok_or_else(|| empty_error("vote"))?;
                vote.original_iri = inner.iri().map(str::to_string);
                vote.item = inner
                    .as_object()
                    .and_then(|o| o.object())
                    .and_then(ApItem::iri)
                    .map(ItemRef::new);
            }
            other => return Err(unsupported("vote", Some(other))),
        }
        Ok(vote)
    }
}

impl FromProtocol for FollowRequest {
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self> {
        let ob = match it {
            ApItem::Iri(i) if i.trim().is_empty() => return Err(empty_error("follow")),
            ApItem::Iri(i) => {
                return Ok(FollowRequest {
                    hash: Hash::from_iri(i),
                    iri: Some(i.clone()),
                    ..Default::default()
                })
            }
            ApItem::Object(o) => o.as_ref(),
        };
        match ob.kind.as_ref() {
            Some(Kind::Follow) => {}
            Some(k @ (Kind::Accept | Kind::Reject)) => {
                let inner = ob.object().ok_or_else(|| empty_error("follow"))?;
                let mut f = FollowRequest::from_protocol(conv, inner)?;
                f.resolve(*k == Kind::Accept);
                return Ok(f);
            }
            other => return Err(unsupported("follow", other)),
        }
        let iri = ob.iri().map(str::to_string);
        Ok(FollowRequest {
            hash: iri.as_deref().map(Hash::from_iri).unwrap_or_default(),
            iri,
            submitted_by: ob.actor.as_ref().and_then(|a| conv.account_ref(a)),
            object: ob.object().and_then(|o| conv.account_ref(o)),
            in_reply_to: ob.in_reply_to.first().and_then(ApItem::iri).map(str::to_string),
            created_at: ob.published,
            state: FollowState::Pending,
            activity: Some(ob.clone()),
        })
    }
}

fn looks_like_actor(it: &ApItem) -> bool {
    match it.kind() {
        Some(k) => k.is_actor(),
        None => it.iri().map(|i| i.contains("actors")).unwrap_or(false),
    }
}

impl FromProtocol for ModerationOp {
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self> {
        let ob = match it {
            ApItem::Iri(i) => {
                return Err(SyncError::invalid(format!("moderation needs an activity, got bare iri {i}")))
            }
            ApItem::Object(o) => o.as_ref(),
        };
        let kind = ob.kind.clone().ok_or_else(|| empty_error("moderation"))?;
        if !kind.is_moderation() {
            return Err(unsupported("moderation", Some(&kind)));
        }
        let iri = ob.iri().map(str::to_string);
        let mut op = ModerationOp {
            hash: iri.as_deref().map(Hash::from_iri).unwrap_or_default(),
            iri,
            kind,
            submitted_by: ob.actor.as_ref().and_then(|a| conv.account_ref(a)),
            created_at: ob.published,
            object: Some(ob.clone()),
            ..Default::default()
        };

        if let Some(target) = ob.object() {
            op.target_iri = target.iri().map(str::to_string);
            let rendered = if looks_like_actor(target) {
                Account::from_protocol(conv, target).map(Renderable::Account)
            } else {
                Item::from_protocol(conv, target).map(Renderable::Item)
            };
            op.target = rendered.ok().map(Box::new);
        }

        match ob.source.as_ref().filter(|s| s.content.is_some()) {
            Some(src) => {
                op.reason = src.content.as_ref().map(|c| c.first().to_string()).unwrap_or_default();
                op.mime_type = MimeType::parse(src.media_type.as_deref().unwrap_or(""));
            }
            None => {
                op.reason = ob.content_str().to_string();
                op.mime_type = MimeType::parse(ob.media_type.as_deref().unwrap_or(""));
            }
        }
        op.in_reply_to = ob.in_reply_to.iter().filter_map(ApItem::iri).map(str::to_string).collect();
        op.tags = ob.tag.iter().filter_map(tag_of).collect();
        Ok(op)
    }
}

impl FromProtocol for Renderable {
    /// Picks the entity a listing entry stands for.
    fn from_protocol(conv: &Converter, it: &ApItem) -> SyncResult<Self> {
        let Some(ob) = it.as_object() else {
            let iri = it.iri().ok_or_else(|| empty_error("listing"))?;
            return Ok(if looks_like_actor(it) {
                Renderable::Account(Account::from_iri(iri))
            } else {
                Renderable::Item(Item::from_iri(iri))
            });
        };
        let kind = ob.kind.as_ref().ok_or_else(|| empty_error("listing"))?;
        let inner_is_actor = ob.object().map(looks_like_actor).unwrap_or(false);
        let r = match kind {
            k if k.is_actor() => Renderable::Account(conv.parse(it)?),
            k if k.is_content() || *k == Kind::Tombstone => Renderable::Item(conv.parse(it)?),
            Kind::Like | Kind::Dislike => Renderable::Vote(conv.parse(it)?),
            Kind::Undo => {
                let undone = ob.object().and_then(ApItem::kind);
                match undone {
                    Some(k) if k.is_appreciation() => Renderable::Vote(conv.parse(it)?),
                    _ => return Err(unsupported("listing", Some(kind))),
                }
            }
            Kind::Follow | Kind::Accept | Kind::Reject => Renderable::Follow(conv.parse(it)?),
            Kind::Block | Kind::Flag | Kind::Ignore => Renderable::Moderation(conv.parse(it)?),
            Kind::Create | Kind::Update | Kind::Delete if inner_is_actor => Renderable::Account(conv.parse(it)?),
            Kind::Create | Kind::Update | Kind::Delete => Renderable::Item(conv.parse(it)?),
            other => return Err(unsupported("listing", Some(other))),
        };
        Ok(r)
    }
}
