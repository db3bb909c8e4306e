/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Domain entities to protocol objects and activities.

use linkfed_vocab::{default_context, Endpoints, Item as ApItem, Kind, Object, PublicKey, Source};
use time::OffsetDateTime;

use crate::account::Account;
use crate::convert::Converter;
use crate::flags::Flags;
use crate::item::{Item, MimeType};
use crate::tag::{Tag, TagKind};

/// Bodies longer than this many words are published as articles.
pub const ARTICLE_WORDS: usize = 300;

pub fn html_escape_with_breaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(ch),
        }
    }
    out
}

/// Page for links, Article for long bodies, Note otherwise.
pub fn item_kind(item: &Item) -> Kind {
    if item.is_link() {
        return Kind::Page;
    }
    if item.data.split_whitespace().count() > ARTICLE_WORDS {
        return Kind::Article;
    }
    Kind::Note
}

fn account_kind(acc: &Account) -> Kind {
    if acc.flags.contains(Flags::GROUP) {
        Kind::Group
    } else if acc.flags.contains(Flags::APPLICATION) {
        Kind::Application
    } else if acc.flags.contains(Flags::SERVICE) {
        Kind::Service
    } else {
        Kind::Person
    }
}

fn iri_item(s: &Option<String>) -> Option<ApItem> {
    s.as_deref().filter(|s| !s.is_empty()).map(ApItem::from)
}

impl Converter {
    fn tag_object(&self, t: &Tag) -> ApItem {
        let mut ob = Object::new(match t.kind {
            TagKind::Hashtag => Kind::Hashtag,
            TagKind::Mention => Kind::Mention,
        });
        ob.name = Some(t.name.as_str().into());
        ob.href = match t.kind {
            TagKind::Hashtag => Some(t.url.clone().unwrap_or_else(|| t.local_href(self.config().base()))),
            TagKind::Mention => t.iri.clone().or_else(|| t.url.clone()),
        };
        if t.kind == TagKind::Hashtag {
            ob.id = t.iri.clone();
        }
        ob.into()
    }

    /// Object form of an item. Deleted items render as their tombstone.
    pub fn render_item(&self, item: &Item) -> Object {
        if item.is_deleted() {
            return self.tombstone(item);
        }
        let mut ob = Object::new(item_kind(item));
        ob.id = item.iri().map(str::to_string);
        if !item.title.trim().is_empty() {
            ob.name = Some(item.title.trim().into());
        }
        match &item.mime_type {
            MimeType::Url => {
                ob.url = vec![ApItem::from(item.data.trim())];
            }
            MimeType::Markdown | MimeType::Text => {
                ob.source = Some(Source {
                    content: Some(item.data.as_str().into()),
                    media_type: Some(item.mime_type.to_string()),
                });
                ob.content = Some(format!("<p>{}</p>", html_escape_with_breaks(&item.data)).into());
                ob.media_type = Some(MimeType::Html.to_string());
            }
            MimeType::Html | MimeType::Other(_) => {
                if !item.data.is_empty() {
                    ob.content = Some(item.data.as_str().into());
                }
                ob.media_type = Some(item.mime_type.to_string());
            }
        }
        if let Some(author) = item.author_iri() {
            ob.attributed_to = vec![author.into()];
        }
        if let Some(op) = &item.op {
            ob.context = Some(op.iri.as_str().into());
        }
        if let Some(parent) = &item.parent {
            ob.in_reply_to = vec![parent.iri.as_str().into()];
        }
        ob.published = item.created_at;
        ob.updated = item.updated_at;
        ob.tag = item
            .metadata
            .tags
            .iter()
            .chain(item.metadata.mentions.iter())
            .map(|t| self.tag_object(t))
            .collect();
        ob.replies = iri_item(&item.metadata.replies);
        ob.likes = iri_item(&item.metadata.likes);
        ob.shares = iri_item(&item.metadata.shares);
        ob.generator = self.config().app().map(ApItem::from);
        ob
    }

    /// Tombstone standing in for a deleted item, keeping its thread links.
    pub fn tombstone(&self, item: &Item) -> Object {
        let mut ob = Object::new(Kind::Tombstone);
        ob.id = item.iri().map(str::to_string);
        ob.former_type = item
            .object
            .as_ref()
            .and_then(|o| o.kind.clone())
            .filter(|k| *k != Kind::Tombstone)
            .or_else(|| Some(item_kind(item)));
        ob.context = item.op.as_ref().map(|op| op.iri.as_str().into());
        ob.in_reply_to = item.parent.iter().map(|p| p.iri.as_str().into()).collect();
        ob.published = item.created_at;
        ob.deleted = Some(OffsetDateTime::now_utc());
        ob
    }

    pub fn render_account(&self, acc: &Account) -> Object {
        let mut ob = Object::new(account_kind(acc));
        let m = &acc.metadata;
        ob.id = acc.iri().map(str::to_string);
        if !acc.handle.is_empty() {
            ob.preferred_username = Some(acc.handle.as_str().into());
        }
        ob.name = m.name.as_deref().map(Into::into);
        ob.summary = m.blurb.as_deref().map(Into::into);
        ob.url = m.url.iter().map(|u| u.as_str().into()).collect();
        ob.icon = m
            .icon
            .as_ref()
            .filter(|i| !i.uri.starts_with("data:"))
            .map(|i| {
                let mut img = Object::new(Kind::Image);
                img.url = vec![i.uri.as_str().into()];
                img.media_type = Some(i.mime_type.clone()).filter(|s| !s.is_empty());
                img.into()
            });
        ob.inbox = iri_item(&m.inbox);
        ob.outbox = iri_item(&m.outbox);
        ob.followers = iri_item(&m.followers);
        ob.following = iri_item(&m.following);
        ob.liked = iri_item(&m.liked);
        ob.published = acc.created_at;
        ob.updated = acc.updated_at;
        if let (Some(iri), Some(pem)) = (acc.iri(), m.public_key_pem.as_ref()) {
            ob.public_key = Some(PublicKey {
                id: format!("{iri}#main-key"),
                owner: iri.to_string(),
                public_key_pem: pem.clone(),
            });
        }
        if m.authorization_endpoint.is_some() || m.token_endpoint.is_some() {
            ob.endpoints = Some(Endpoints {
                oauth_authorization_endpoint: m.authorization_endpoint.clone(),
                oauth_token_endpoint: m.token_endpoint.clone(),
                ..Default::default()
            });
        }
        let mut tags: Vec<ApItem> = m.tags.iter().map(|t| self.tag_object(t)).collect();
        let roles = &self.config().moderation_tags;
        if acc.is_moderator() {
            tags.extend(roles.moderator.as_deref().map(ApItem::from));
        }
        if acc.is_operator() {
            tags.extend(roles.operator.as_deref().map(ApItem::from));
        }
        ob.tag = tags;
        ob
    }

    /// Bare activity of `kind` by `actor`. Recipients are filled in by the
    /// addressing step.
    pub fn activity(&self, kind: Kind, actor: &Account, object: ApItem) -> Object {
        let mut act = Object::new(kind);
        act.ld_context = Some(default_context());
        act.actor = actor.iri().map(ApItem::from);
        act.object = vec![object];
        act
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::item::ItemRef;
    use std::sync::Arc;

    fn conv() -> Converter {
        let mut cfg = SyncConfig::new("https://fed.example");
        cfg.app_iri = Some("https://fed.example/actors/app".into());
        Converter::new(Arc::new(cfg))
    }

    fn reply() -> Item {
        let mut it = Item::from_iri("https://fed.example/objects/r1");
        it.mime_type = MimeType::Markdown;
        it.data = "a <b> & \"c\"\nnext".into();
        it.submitted_by = Some(Account::from_iri("https://fed.example/actors/alice"));
        it.parent = Some(ItemRef::new("https://fed.example/objects/p1"));
        it.op = Some(ItemRef::new("https://fed.example/objects/root"));
        it.metadata.tags.push(crate::tag::Tag::hashtag("rustlang"));
        it
    }

    #[test]
    fn markdown_is_kept_in_source() {
        let ob = conv().render_item(&reply());
        assert!(ob.is_kind(&Kind::Note));
        assert_eq!(ob.content_str(), "<p>a &lt;b&gt; &amp; &quot;c&quot;<br>next</p>");
        assert_eq!(ob.source.as_ref().unwrap().media_type.as_deref(), Some("text/markdown"));
        assert_eq!(ob.generator.as_ref().and_then(ApItem::iri), Some("https://fed.example/actors/app"));
        let tag = ob.tag[0].as_object().unwrap();
        assert_eq!(tag.href.as_deref(), Some("https://fed.example/tags/rustlang"));

        let back: Item = conv().parse_object(&ob).unwrap();
        assert_eq!(back.data, reply().data);
        assert_eq!(back.mime_type, MimeType::Markdown);
        assert_eq!(back.author_iri(), Some("https://fed.example/actors/alice"));
        assert_eq!(back.parent, reply().parent);
        assert_eq!(back.op, reply().op);
    }

    #[test]
    fn kind_follows_body() {
        let mut it = Item::default();
        it.data = "word ".repeat(ARTICLE_WORDS + 1);
        assert_eq!(item_kind(&it), Kind::Article);
        it.data = "https://news.example/x".into();
        it.mime_type = MimeType::Url;
        assert_eq!(item_kind(&it), Kind::Page);
        let ob = conv().render_item(&it);
        assert_eq!(ob.url[0].iri(), Some("https://news.example/x"));
    }

    #[test]
    fn deleted_items_become_tombstones() {
        let mut it = reply();
        it.delete();
        let ob = conv().render_item(&it);
        assert!(ob.is_kind(&Kind::Tombstone));
        assert_eq!(ob.former_type, Some(Kind::Note));
        assert_eq!(ob.in_reply_to[0].iri(), Some("https://fed.example/objects/p1"));
        assert_eq!(ob.context.as_ref().and_then(ApItem::iri), Some("https://fed.example/objects/root"));
        assert!(ob.deleted.is_some());
    }

    #[test]
    fn accounts_render_by_flag() {
        let mut acc = Account::from_iri("https://fed.example/actors/g");
        acc.handle = "g".into();
        acc.flags.insert(Flags::GROUP);
        acc.metadata.public_key_pem = Some("PEM".into());
        let ob = conv().render_account(&acc);
        assert!(ob.is_kind(&Kind::Group));
        assert_eq!(ob.public_key.unwrap().id, "https://fed.example/actors/g#main-key");
    }
}
