/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! IRI string helpers shared by the client, the cache and addressing.

use url::{Position, Url};

pub fn host_of(iri: &str) -> Option<String> {
    let url = Url::parse(iri.trim()).ok()?;
    url.host_str().map(|h| h.to_ascii_lowercase())
}

pub fn same_host(a: &str, b: &str) -> bool {
    match (host_of(a), host_of(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// `scheme://host[:port]` of an IRI.
pub fn root_of(iri: &str) -> Option<String> {
    let url = Url::parse(iri.trim()).ok()?;
    url.host_str()?;
    Some(url[..Position::BeforePath].to_string())
}

/// Comparison key for recipient lists: scheme and host lowercased, trailing
/// slash ignored. `http` and `https` variants stay distinct.
pub fn recipient_key(iri: &str) -> String {
    let iri = iri.trim();
    match Url::parse(iri) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(_) => iri.trim_end_matches('/').to_string(),
    }
}

pub fn same_iri(a: &str, b: &str) -> bool {
    recipient_key(a) == recipient_key(b)
}

/// Moves IRIs that point at this instance onto the canonical base.
/// Foreign IRIs are returned untouched.
pub fn rewrite_to_base(iri: &str, base: &str, local_host: &str) -> String {
    let (Ok(url), Ok(base_url)) = (Url::parse(iri.trim()), Url::parse(base.trim())) else {
        return iri.to_string();
    };
    let Some(host) = url.host_str() else {
        return iri.to_string();
    };
    let is_local = host.eq_ignore_ascii_case(local_host)
        || Some(host) == base_url.host_str();
    if !is_local {
        return iri.to_string();
    }
    let origin = base_url[..Position::BeforePath].to_string();
    let base_path = base_url.path().trim_end_matches('/');
    let path = &url[Position::BeforePath..];
    if !base_path.is_empty() && !path.starts_with(base_path) {
        return format!("{origin}{base_path}{path}");
    }
    format!("{origin}{path}")
}

/// IRI with its last path segment removed: `https://h/objects/1` gives
/// `https://h/objects`. Query and fragment are dropped.
pub fn parent_path(iri: &str) -> Option<String> {
    let url = Url::parse(iri.trim()).ok()?;
    let path = url.path().trim_end_matches('/');
    let (dir, last) = path.rsplit_once('/')?;
    if last.is_empty() {
        return None;
    }
    let root = &url[..Position::BeforePath];
    Some(format!("{root}{dir}"))
}

/// Last non-empty path segment.
pub fn last_segment(iri: &str) -> Option<String> {
    let path = match Url::parse(iri.trim()) {
        Ok(url) => url.path().to_string(),
        Err(_) => iri.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.split('/')
        .rev()
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn query_param(iri: &str, name: &str) -> Option<String> {
    let url = Url::parse(iri.trim()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Merges `pairs` into the query of `iri`. Existing keys keep their
/// position and get the new value; new keys are appended in order.
pub fn with_query(iri: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return iri.to_string();
    }
    let Ok(mut url) = Url::parse(iri.trim()) else {
        return iri.to_string();
    };
    let mut merged: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut seen: Vec<&str> = Vec::new();
    for (k, v) in pairs {
        // only the first new value of a key replaces, repeats append
        if !seen.contains(&k.as_str()) {
            seen.push(k);
            if let Some(slot) = merged.iter_mut().find(|(mk, _)| mk == k) {
                slot.1 = v.clone();
                continue;
            }
        }
        merged.push((k.clone(), v.clone()));
    }
    url.query_pairs_mut().clear().extend_pairs(merged.iter());
    url.to_string()
}

/// Puts `user` in the userinfo part. Used to partition cache keys per
/// viewing account.
pub fn with_userinfo(iri: &str, user: &str) -> String {
    let Ok(mut url) = Url::parse(iri.trim()) else {
        return iri.to_string();
    };
    if url.set_username(user).is_err() {
        return iri.to_string();
    }
    url.to_string()
}

pub fn strip_userinfo(iri: &str) -> String {
    let Ok(mut url) = Url::parse(iri.trim()) else {
        return iri.to_string();
    };
    if url.username().is_empty() && url.password().is_none() {
        return url.to_string();
    }
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.to_string()
}

/// Strips the query and fragment.
pub fn without_query(iri: &str) -> String {
    match Url::parse(iri.trim()) {
        Ok(url) => url[..Position::AfterPath].to_string(),
        Err(_) => iri.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_keys_ignore_trailing_slash_and_case() {
        assert!(same_iri("https://Fed.Example/actors/a/", "https://fed.example/actors/a"));
        assert!(!same_iri("http://fed.example/actors/a", "https://fed.example/actors/a"));
        assert!(!same_iri("https://fed.example/actors/A", "https://fed.example/actors/a"));
    }

    #[test]
    fn rewrites_public_host_onto_base() {
        let base = "http://fedbox:4000";
        assert_eq!(
            rewrite_to_base("https://fed.example/actors/a?x=1", base, "fed.example"),
            "http://fedbox:4000/actors/a?x=1"
        );
        assert_eq!(
            rewrite_to_base("https://other.example/actors/a", base, "fed.example"),
            "https://other.example/actors/a"
        );
    }

    #[test]
    fn parent_path_drops_last_segment() {
        assert_eq!(
            parent_path("https://fed.example/objects/1?a=b").as_deref(),
            Some("https://fed.example/objects")
        );
        assert_eq!(
            parent_path("https://fed.example/actors/a/outbox/").as_deref(),
            Some("https://fed.example/actors/a")
        );
    }

    #[test]
    fn query_merge_keeps_order() {
        let out = with_query(
            "https://fed.example/inbox?type=Create&maxItems=10",
            &[
                ("maxItems".to_string(), "5".to_string()),
                ("after".to_string(), "abc".to_string()),
            ],
        );
        assert_eq!(out, "https://fed.example/inbox?type=Create&maxItems=5&after=abc");
        assert_eq!(query_param(&out, "after").as_deref(), Some("abc"));
    }

    #[test]
    fn userinfo_round_trip() {
        let p = with_userinfo("https://fed.example/inbox", "1b4e28ba");
        assert_eq!(p, "https://1b4e28ba@fed.example/inbox");
        assert_eq!(strip_userinfo(&p), "https://fed.example/inbox");
    }

    #[test]
    fn segments_and_roots() {
        assert_eq!(last_segment("https://fed.example/actors/alice/").as_deref(), Some("alice"));
        assert_eq!(root_of("https://fed.example:8443/a/b").as_deref(), Some("https://fed.example:8443"));
        assert_eq!(without_query("https://fed.example/a?b=c#d"), "https://fed.example/a");
    }
}
