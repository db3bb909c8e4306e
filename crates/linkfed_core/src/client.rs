/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::Arc;

use linkfed_vocab::{CollectionPath, Kind, Object};
use tracing::{debug, info, warn};

use crate::account::{Account, Credential};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::filters::Filters;
use crate::iri;
use crate::metrics::SyncMetrics;
use crate::transport::Transport;

/// Protocol client for the collection API.
///
/// Reads are signed with the acting account's credential only when the
/// target lives on the account's own host. Writes refuse to go out with a
/// foreign target or without a usable credential.
#[derive(Clone)]
pub struct FedClient {
    cfg: Arc<SyncConfig>,
    transport: Arc<dyn Transport>,
    metrics: Arc<SyncMetrics>,
}

impl FedClient {
    pub fn new(cfg: Arc<SyncConfig>, transport: Arc<dyn Transport>, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            cfg,
            transport,
            metrics,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Moves IRIs published under the public host onto the API base.
    pub fn normalize(&self, target: &str) -> String {
        iri::rewrite_to_base(target, self.cfg.base(), &self.cfg.host())
    }

    fn read_credential<'a>(&self, target: &str, by: Option<&'a Account>) -> Option<&'a Credential> {
        let account = by?;
        let cred = account.metadata.credential.as_ref().filter(|c| c.is_usable())?;
        let own = account.iri().map(|i| self.normalize(i))?;
        if iri::same_host(&own, target) {
            return Some(cred);
        }
        warn!(
            "not signing cross-host request for {}: {target}",
            account.iri().unwrap_or_default()
        );
        None
    }

    fn write_credential<'a>(&self, target: &str, by: &'a Account) -> SyncResult<&'a Credential> {
        let cred = by
            .metadata
            .credential
            .as_ref()
            .filter(|c| c.is_usable())
            .ok_or_else(|| SyncError::Unauthorized(format!("no usable credential for {}", by.handle)))?;
        let own = by
            .iri()
            .map(|i| self.normalize(i))
            .ok_or_else(|| SyncError::Unauthorized("acting account has no iri".to_string()))?;
        if !iri::same_host(&own, target) {
            return Err(SyncError::Unauthorized(format!(
                "refusing to sign request to foreign host: {target}"
            )));
        }
        Ok(cred)
    }

    /// Plain dereference, no type check.
    pub async fn load(&self, target: &str, by: Option<&Account>) -> SyncResult<Object> {
        let target = self.normalize(target);
        let auth = self.read_credential(&target, by);
        self.metrics.object_fetch();
        self.transport.get(&target, auth).await
    }

    pub async fn actor(&self, target: &str, by: Option<&Account>) -> SyncResult<Object> {
        let ob = self.load(target, by).await?;
        match ob.kind.as_ref() {
            Some(k) if k.is_actor() || *k == Kind::Tombstone => Ok(ob),
            other => Err(SyncError::invalid(format!(
                "{target} is not an actor: {}",
                other.map(Kind::as_str).unwrap_or("untyped")
            ))),
        }
    }

    pub async fn object(&self, target: &str, by: Option<&Account>) -> SyncResult<Object> {
        let ob = self.load(target, by).await?;
        if ob.kind.is_none() {
            return Err(SyncError::invalid(format!("{target} has no type")));
        }
        Ok(ob)
    }

    pub async fn activity(&self, target: &str, by: Option<&Account>) -> SyncResult<Object> {
        let ob = self.load(target, by).await?;
        match ob.kind.as_ref() {
            Some(k) if k.is_activity() => Ok(ob),
            _ => Err(SyncError::invalid(format!("{target} is not an activity"))),
        }
    }

    /// IRI of `owner`'s sub-collection with `filters` in the query string.
    pub fn collection_iri(&self, owner: &str, path: CollectionPath, filters: &Filters) -> String {
        let base = self.normalize(&path.of(owner));
        iri::with_query(&base, &filters.to_query_pairs())
    }

    pub async fn collection(
        &self,
        owner: &str,
        path: CollectionPath,
        filters: &Filters,
        by: Option<&Account>,
    ) -> SyncResult<Object> {
        let target = self.collection_iri(owner, path, filters);
        self.page(&target, by).await
    }

    /// Fetches one collection page by IRI.
    pub async fn page(&self, target: &str, by: Option<&Account>) -> SyncResult<Object> {
        let target = self.normalize(target);
        let auth = self.read_credential(&target, by);
        self.metrics.page_fetch();
        let ob = self.transport.get(&target, auth).await?;
        if !ob.is_collection() {
            return Err(SyncError::invalid(format!("{target} is not a collection")));
        }
        Ok(ob)
    }

    /// Client-to-server submission. Returns the new activity IRI and its
    /// stored representation.
    pub async fn to_outbox(&self, activity: &Object, by: &Account) -> SyncResult<(String, Object)> {
        let outbox = by
            .collection(CollectionPath::Outbox)
            .ok_or_else(|| SyncError::invalid("acting account has no outbox"))?;
        self.submit(&outbox, activity, by).await
    }

    pub async fn to_inbox(&self, activity: &Object, inbox: &str, by: &Account) -> SyncResult<(String, Object)> {
        self.submit(inbox, activity, by).await
    }

    async fn submit(&self, target: &str, activity: &Object, by: &Account) -> SyncResult<(String, Object)> {
        let target = self.normalize(target);
        let cred = self.write_credential(&target, by)?;
        let posted = self.transport.post(&target, activity, Some(cred)).await?;
        self.metrics.post();

        let kind = activity.kind.as_ref().map(Kind::as_str).unwrap_or("Activity");
        let stored = match posted.object {
            Some(ob) => ob,
            None if !posted.iri.is_empty() => {
                debug!("dereferencing stored activity {}", posted.iri);
                self.load(&posted.iri, Some(by)).await?
            }
            None => {
                return Err(SyncError::invalid(format!(
                    "{kind} accepted by {target} without location"
                )))
            }
        };
        let new_iri = if posted.iri.is_empty() {
            stored.iri().unwrap_or_default().to_string()
        } else {
            posted.iri
        };
        info!("saved {kind} {new_iri}");
        Ok((new_iri, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AuthKind, MemoryTransport};

    fn setup() -> (FedClient, Arc<MemoryTransport>) {
        let cfg = Arc::new(SyncConfig::new("https://fed.example"));
        let mem = Arc::new(MemoryTransport::new("https://fed.example"));
        let client = FedClient::new(cfg, mem.clone(), Arc::new(SyncMetrics::new()));
        (client, mem)
    }

    fn alice() -> Account {
        let mut a = Account::from_iri("https://fed.example/actors/alice");
        a.metadata.credential = Some(Credential::Bearer("secret".into()));
        a
    }

    #[tokio::test]
    async fn signs_only_same_host_reads() {
        let (client, mem) = setup();
        mem.insert(Object::with_id(Kind::Person, "https://fed.example/actors/bob"));
        mem.insert(Object::with_id(Kind::Person, "https://far.example/actors/carol"));
        let a = alice();
        client.actor("https://fed.example/actors/bob", Some(&a)).await.unwrap();
        client.actor("https://far.example/actors/carol", Some(&a)).await.unwrap();
        let gets = mem.gets();
        assert_eq!(gets[0].auth, AuthKind::Bearer);
        assert_eq!(gets[1].auth, AuthKind::Unsigned);
    }

    #[tokio::test]
    async fn writes_need_credentials_on_own_host() {
        let (client, mem) = setup();
        let act = Object::new(Kind::Like);
        let anon = Account::from_iri("https://fed.example/actors/anon");
        let err = client.to_outbox(&act, &anon).await.unwrap_err();
        assert!(err.is_unauthorized());

        let err = client
            .to_inbox(&act, "https://far.example/inbox", &alice())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(mem.posts().is_empty());

        let (iri, stored) = client.to_outbox(&act, &alice()).await.unwrap();
        assert_eq!(stored.iri(), Some(iri.as_str()));
        assert_eq!(client.metrics().snapshot().posts, 1);
    }

    #[tokio::test]
    async fn collection_iri_carries_filters() {
        let (client, _) = setup();
        let f = Filters::of_types(&[Kind::Like]).with_max_items(10);
        assert_eq!(
            client.collection_iri("https://fed.example/objects/1", CollectionPath::Likes, &f),
            "https://fed.example/objects/1/likes?type=Like&maxItems=10"
        );
    }
}
