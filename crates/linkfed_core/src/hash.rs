/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::iri;
use linkfed_vocab::PUBLIC_NS;

/// Stable local identity of an entity, derived from its IRI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(Uuid);

impl Hash {
    /// The public collective / logged-out viewer.
    pub const ANONYMOUS: Hash = Hash(Uuid::nil());
    /// The federation service actor.
    pub const SYSTEM: Hash = Hash(Uuid::from_u128(1));

    /// Takes the UUID in the last path segment when there is one, otherwise
    /// a name-based UUID of the whole IRI so remote ids stay stable.
    pub fn from_iri(iri: &str) -> Hash {
        let iri = iri.trim();
        if iri.is_empty() || iri == PUBLIC_NS {
            return Hash::ANONYMOUS;
        }
        if let Some(h) = iri::last_segment(iri).and_then(|s| Uuid::parse_str(&s).ok()) {
            return Hash(h);
        }
        Hash(Uuid::new_v5(&Uuid::NAMESPACE_URL, iri::strip_userinfo(iri).as_bytes()))
    }

    pub fn parse(s: &str) -> Option<Hash> {
        Uuid::parse_str(s.trim()).ok().map(Hash)
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for Hash {
    fn from(u: Uuid) -> Self {
        Hash(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_segment_is_the_hash() {
        let h = Hash::from_iri("https://fed.example/objects/1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        assert_eq!(h.to_string(), "1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        assert_eq!(h.short(), "1b4e28ba");
    }

    #[test]
    fn non_uuid_iris_hash_deterministically() {
        let a = Hash::from_iri("https://mastodon.example/users/alice");
        let b = Hash::from_iri("https://mastodon.example/users/alice");
        let c = Hash::from_iri("https://mastodon.example/users/bob");
        assert!(a.is_valid());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn public_and_empty_are_anonymous() {
        assert_eq!(Hash::from_iri(PUBLIC_NS), Hash::ANONYMOUS);
        assert_eq!(Hash::from_iri(""), Hash::ANONYMOUS);
        assert!(!Hash::ANONYMOUS.is_valid());
        assert!(Hash::SYSTEM.is_valid());
    }
}
