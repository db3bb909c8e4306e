/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagKind {
    Hashtag,
    Mention,
}

/// A hashtag or a mention. `iri` is the resolved remote object or account,
/// `url` the human facing link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub kind: TagKind,
    pub name: String,
    pub url: Option<String>,
    pub iri: Option<String>,
}

impl Tag {
    pub fn hashtag(name: &str) -> Self {
        Self {
            kind: TagKind::Hashtag,
            name: normalize_name(name, '#'),
            url: None,
            iri: None,
        }
    }

    pub fn mention(name: &str) -> Self {
        Self {
            kind: TagKind::Mention,
            name: normalize_name(name, '@'),
            url: None,
            iri: None,
        }
    }

    pub fn is_mention(&self) -> bool {
        self.kind == TagKind::Mention
    }

    /// `{base}/tags/{name}` link for a hashtag without a resolved href.
    pub fn local_href(&self, base: &str) -> String {
        format!(
            "{}/tags/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(self.name.trim_start_matches('#'))
        )
    }

    /// Handle part of a mention: `@alice@host` gives `alice`.
    pub fn handle(&self) -> &str {
        let name = self.name.trim_start_matches('@');
        name.split('@').next().unwrap_or(name)
    }

    /// Host part of a `@user@host` mention.
    pub fn host(&self) -> Option<&str> {
        let name = self.name.trim_start_matches('@');
        name.split_once('@').map(|(_, h)| h).filter(|h| !h.is_empty())
    }
}

fn normalize_name(name: &str, sigil: char) -> String {
    let bare = name.trim().trim_start_matches(sigil);
    format!("{sigil}{bare}")
}

/// Scans text for `#tag` (three or more characters), `@user` and
/// `@user@host`. Duplicates are dropped, first occurrence wins.
pub fn extract_tags(text: &str) -> Vec<Tag> {
    let mut out: Vec<Tag> = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let boundary = i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_');
        if (ch != '#' && ch != '@') || !boundary {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        let mut word = String::new();
        let mut hosts = 0;
        while j < chars.len() {
            let c = chars[j];
            if c.is_alphanumeric() || c == '_' || c == '-' {
                word.push(c);
            } else if ch == '@' && c == '@' && hosts == 0 && !word.is_empty() {
                hosts += 1;
                word.push(c);
            } else if ch == '@' && c == '.' && hosts == 1 && chars.get(j + 1).map(|n| n.is_alphanumeric()).unwrap_or(false) {
                word.push(c);
            } else {
                break;
            }
            j += 1;
        }
        let word = word.trim_end_matches('@').to_string();
        let tag = match ch {
            '#' if word.chars().count() >= 3 => Some(Tag::hashtag(&word)),
            '@' if !word.is_empty() => Some(Tag::mention(&word)),
            _ => None,
        };
        if let Some(tag) = tag {
            if !out.iter().any(|t| t.kind == tag.kind && t.name.eq_ignore_ascii_case(&tag.name)) {
                out.push(tag);
            }
        }
        i = j.max(i + 1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hashtags_and_mentions() {
        let tags = extract_tags("hi @alice and @bob@remote.example, see #rust #ok #Rust");
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["@alice", "@bob@remote.example", "#rust"]);
        assert_eq!(tags[1].handle(), "bob");
        assert_eq!(tags[1].host(), Some("remote.example"));
        assert_eq!(tags[0].host(), None);
    }

    #[test]
    fn ignores_mid_word_sigils() {
        let tags = extract_tags("mail me at bob@example.com or visit page#anchor");
        assert!(tags.is_empty());
    }

    #[test]
    fn hashtag_href() {
        let t = Tag::hashtag("rust lang");
        assert_eq!(t.local_href("https://fed.example/"), "https://fed.example/tags/rust%20lang");
    }
}
