/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Concurrent pagination over remote collections.
//!
//! Every (host, collection, filter) triple is paged on its own. The
//! callback sees each non-empty page; returning `ControlFlow::Break` cancels
//! the shared token, which stops every triple before its next request.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use futures_util::future::join_all;
use linkfed_vocab::{CollectionPath, Item as ApItem, Object};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::account::Account;
use crate::cache::Cache;
use crate::client::FedClient;
use crate::error::{SyncError, SyncResult};
use crate::filters::Filters;
use crate::iri;

/// One collection to page through, with the filter sets to apply. An empty
/// filter list pages the collection unfiltered.
#[derive(Debug, Clone)]
pub struct RemoteLoad {
    pub actor: String,
    pub collection: CollectionPath,
    pub filters: Vec<Filters>,
}

impl RemoteLoad {
    pub fn new(actor: impl Into<String>, collection: CollectionPath, filters: Vec<Filters>) -> Self {
        Self {
            actor: actor.into(),
            collection,
            filters,
        }
    }
}

/// Loads keyed by base host.
pub type RemoteLoads = BTreeMap<String, Vec<RemoteLoad>>;

/// Adds `load` under the host of its owner.
pub fn add_load(loads: &mut RemoteLoads, load: RemoteLoad) {
    let host = iri::host_of(&load.actor).unwrap_or_default();
    loads.entry(host).or_default().push(load);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub triples: usize,
    pub failed: usize,
    pub pages: usize,
    pub stopped_early: bool,
}

#[derive(Clone)]
pub struct Crawler {
    client: FedClient,
    cache: Arc<Cache>,
}

enum Outcome {
    Done(usize),
    Stopped(usize),
}

impl Crawler {
    pub fn new(client: FedClient, cache: Arc<Cache>) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &FedClient {
        &self.client
    }

    async fn fetch_page(&self, target: &str, viewer: Option<&Account>) -> SyncResult<Object> {
        if let Some(hit) = self.cache.get(target, viewer) {
            return Ok(hit);
        }
        let page = self.client.page(target, viewer).await?;
        self.cache.put(target, viewer, &page);
        Ok(page)
    }

    /// Pages through every triple in `loads`. Fails only when all of them
    /// failed.
    pub async fn crawl<F>(
        &self,
        loads: &RemoteLoads,
        viewer: Option<&Account>,
        cancel: &CancellationToken,
        on_page: F,
    ) -> SyncResult<CrawlStats>
    where
        F: Fn(&Object, &Filters) -> SyncResult<ControlFlow<()>> + Sync,
    {
        let unfiltered = [Filters::default()];
        let mut jobs = Vec::new();
        for (host, list) in loads {
            for load in list {
                let sets: &[Filters] = if load.filters.is_empty() {
                    &unfiltered
                } else {
                    &load.filters
                };
                for filters in sets {
                    jobs.push(self.crawl_one(host, load, filters, viewer, cancel, &on_page));
                }
            }
        }

        let mut stats = CrawlStats {
            triples: jobs.len(),
            ..Default::default()
        };
        let mut first_err = None;
        for res in join_all(jobs).await {
            match res {
                Ok(Outcome::Done(pages)) => stats.pages += pages,
                Ok(Outcome::Stopped(pages)) => {
                    stats.pages += pages;
                    stats.stopped_early = true;
                }
                Err(e) => {
                    stats.failed += 1;
                    first_err.get_or_insert(e);
                }
            }
        }
        if stats.triples > 0 && stats.failed == stats.triples {
            return Err(first_err.unwrap_or_else(|| SyncError::invalid("every collection failed")));
        }
        Ok(stats)
    }

    async fn crawl_one<F>(
        &self,
        host: &str,
        load: &RemoteLoad,
        filters: &Filters,
        viewer: Option<&Account>,
        cancel: &CancellationToken,
        on_page: &F,
    ) -> SyncResult<Outcome>
    where
        F: Fn(&Object, &Filters) -> SyncResult<ControlFlow<()>> + Sync,
    {
        let res = self.paginate(load, filters, viewer, cancel, on_page).await;
        if let Err(e) = &res {
            warn!("crawl {host} {} {} failed: {e:#}", load.actor, load.collection);
        }
        res
    }

    async fn paginate<F>(
        &self,
        load: &RemoteLoad,
        filters: &Filters,
        viewer: Option<&Account>,
        cancel: &CancellationToken,
        on_page: &F,
    ) -> SyncResult<Outcome>
    where
        F: Fn(&Object, &Filters) -> SyncResult<ControlFlow<()>> + Sync,
    {
        let mut target = self
            .client
            .collection_iri(&load.actor, load.collection, filters);
        let mut fetched: u64 = 0;
        let mut pages = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Ok(Outcome::Stopped(pages));
            }
            let mut page = self.fetch_page(&target, viewer).await?;
            pages += 1;
            let declared = page.total_items;

            if page.collection_items().is_empty() {
                // collections may hand out their items on a `first` page
                match page.first.take() {
                    Some(ApItem::Object(first)) => page = *first,
                    Some(ApItem::Iri(first)) if !iri::same_iri(&first, &target) => {
                        if cancel.is_cancelled() {
                            return Ok(Outcome::Stopped(pages));
                        }
                        target = first;
                        page = self.fetch_page(&target, viewer).await?;
                        pages += 1;
                    }
                    _ => {}
                }
            }
            let total = page.total_items.or(declared);

            let count = page.collection_items().len() as u64;
            if count == 0 {
                return Ok(Outcome::Done(pages));
            }
            fetched += count;
            for it in page.collection_items() {
                if let (Some(id), Some(ob)) = (it.iri(), it.as_object()) {
                    self.cache.put(id, viewer, ob);
                }
            }
            if let ControlFlow::Break(()) = on_page(&page, filters)? {
                debug!("stopping crawl after {pages} pages of {}", load.actor);
                cancel.cancel();
                return Ok(Outcome::Stopped(pages));
            }

            let Some(next) = page.next.as_ref().and_then(ApItem::iri) else {
                return Ok(Outcome::Done(pages));
            };
            let self_loop = iri::same_iri(next, &target) || page.iri().map(|p| iri::same_iri(next, p)).unwrap_or(false);
            if self_loop || total.map(|t| fetched >= t).unwrap_or(false) {
                return Ok(Outcome::Done(pages));
            }
            target = next.to_string();
        }
    }
}
