/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Wire vocabulary spoken with the federation service: graph nodes, their
//! types and the named collections that hang off actors and objects.

pub mod collection;
pub mod kind;
pub mod object;

pub use collection::CollectionPath;
pub use kind::Kind;
pub use object::{one_or_many, Endpoints, Item, NaturalLanguage, Object, PublicKey, Source};

/// The public collective. Addressing an activity to it makes it public.
pub const PUBLIC_NS: &str = "https://www.w3.org/ns/activitystreams#Public";

pub const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";

/// Accept header used when dereferencing.
pub const ACCEPT: &str =
    "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Content type of submitted activities.
pub const CONTENT_TYPE: &str = "application/activity+json";

pub fn default_context() -> serde_json::Value {
    serde_json::json!([AS_CONTEXT, SECURITY_CONTEXT])
}
