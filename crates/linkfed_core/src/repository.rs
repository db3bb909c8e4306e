/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Repository over the federated store.
//!
//! Reads are crawls of remote collections fed through the converter; writes
//! are activities built by the renderer, addressed, posted to the acting
//! account's outbox and followed by a cache purge of everything they touched.

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use linkfed_vocab::{CollectionPath, Item as ApItem, Kind, Object, Source};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::addressing::{Addressing, Recipients};
use crate::cache::Cache;
use crate::client::FedClient;
use crate::config::SyncConfig;
use crate::convert::{tag_of, Converter, FromProtocol};
use crate::crawler::{add_load, CrawlStats, Crawler, RemoteLoad, RemoteLoads};
use crate::cursor::{Cursor, ResultSet};
use crate::error::{SyncError, SyncResult};
use crate::filters::{self, CompStr, Filters};
use crate::flags::Flags;
use crate::follow::FollowRequest;
use crate::iri;
use crate::item::{Item, MimeType};
use crate::metrics::SyncMetrics;
use crate::moderation::{aggregate, ModerationGroup, ModerationOp};
use crate::render::html_escape_with_breaks;
use crate::renderable::Renderable;
use crate::tag::{self, Tag};
use crate::threading::{sort_flat, SortOrder, Thread};
use crate::transport::{HttpTransport, Transport};
use crate::vote::Vote;
use crate::votes::{self, VoteStep};

/// Minimum age of an account's outbox snapshot before it is crawled again.
pub const OUTBOX_REFRESH: Duration = Duration::from_secs(5 * 60);

/// Page size used when priming the cache.
pub const WARMUP_PAGE_SIZE: u32 = 250;

/// Which related entities a listing resolves after the crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deps {
    /// Dereference submitters that arrived as bare IRIs.
    pub authors: bool,
    /// Load the appreciations of every listed item.
    pub votes: bool,
    /// Append the reply threads of top level items.
    pub replies: bool,
    /// Dereference the accounts named by follow requests.
    pub follows: bool,
    /// Attach the application's Delete/Update followups to moderation groups.
    pub followups: bool,
}

impl Deps {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            authors: true,
            votes: true,
            replies: true,
            follows: true,
            followups: true,
        }
    }
}

/// Early-stop check for a listing accumulator. The threshold is capped at
/// half a page so small pages still fill up.
pub fn should_stop(max_items: usize, accumulated: usize, threshold: usize) -> bool {
    let threshold = threshold.min(max_items / 2).max(1);
    max_items.saturating_sub(accumulated) < threshold
}

#[derive(Default)]
struct Accumulator {
    results: ResultSet,
    moderation: Vec<ModerationOp>,
    /// Largest `totalItems` any page declared.
    declared: usize,
    /// Whether the last page crawled for each source still had a `next` link.
    open: HashMap<String, bool>,
}

impl Accumulator {
    fn len(&self) -> usize {
        self.results.len() + self.moderation.len()
    }

    fn track_next(&mut self, page: &Object, filters: &Filters) {
        let source = page
            .part_of
            .as_ref()
            .and_then(ApItem::iri)
            .or(page.iri())
            .map(iri::without_query)
            .unwrap_or_default();
        self.open.insert(format!("{source} {filters:?}"), page.next.is_some());
    }

    fn has_more(&self) -> bool {
        self.open.values().any(|open| *open)
    }

    fn add(&mut self, r: Renderable) {
        match r {
            Renderable::Moderation(op) => {
                let dup = op.iri.as_deref().map(|own| {
                    self.moderation
                        .iter()
                        .filter_map(|m| m.iri.as_deref())
                        .any(|m| iri::same_iri(m, own))
                });
                if dup != Some(true) {
                    self.moderation.push(op);
                }
            }
            other => {
                self.results.insert(other);
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ensure_live(ctx: &CancellationToken) -> SyncResult<()> {
    if ctx.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

/// Identity of an account without its credential, for embedding in entities.
fn public_copy(acc: &Account) -> Account {
    let mut a = acc.clone();
    a.metadata.credential = None;
    a
}

fn is_stub(acc: &Account) -> bool {
    acc.object.is_none() && acc.iri().is_some()
}

fn submitters_mut(r: &mut Renderable) -> Vec<&mut Account> {
    match r {
        Renderable::Item(i) => i.submitted_by.iter_mut().collect(),
        Renderable::Vote(v) => v.submitted_by.iter_mut().collect(),
        Renderable::Follow(f) => f.submitted_by.iter_mut().collect(),
        Renderable::Moderation(m) => m.submitted_by.iter_mut().collect(),
        Renderable::ModerationGroup(g) => g
            .requests
            .iter_mut()
            .chain(g.followups.iter_mut())
            .filter_map(|op| op.submitted_by.as_mut())
            .collect(),
        Renderable::Account(_) => Vec::new(),
    }
}

fn followed_mut(r: &mut Renderable) -> Vec<&mut Account> {
    match r {
        Renderable::Follow(f) => f.object.iter_mut().collect(),
        _ => Vec::new(),
    }
}

fn requested_max(loads: &RemoteLoads, fallback: u32) -> usize {
    loads
        .values()
        .flatten()
        .flat_map(|l| l.filters.iter())
        .filter_map(|f| f.max_items)
        .max()
        .unwrap_or(fallback)
        .max(1) as usize
}

fn is_paged(loads: &RemoteLoads) -> bool {
    loads
        .values()
        .flatten()
        .flat_map(|l| l.filters.iter())
        .any(|f| f.after.is_some())
}

/// Puts a free-text reason on an activity: markdown in `source`, escaped
/// HTML in `content`.
fn set_reason(act: &mut Object, reason: Option<&str>) {
    let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
        return;
    };
    act.source = Some(Source {
        content: Some(reason.into()),
        media_type: Some(MimeType::Markdown.to_string()),
    });
    act.content = Some(format!("<p>{}</p>", html_escape_with_breaks(reason)).into());
    act.media_type = Some(MimeType::Html.to_string());
}

pub struct Repository {
    cfg: Arc<SyncConfig>,
    client: FedClient,
    conv: Converter,
    cache: Arc<Cache>,
    crawler: Crawler,
    metrics: Arc<SyncMetrics>,
}

impl Repository {
    pub fn new(cfg: SyncConfig, transport: Arc<dyn Transport>, metrics: Arc<SyncMetrics>) -> Self {
        let cfg = Arc::new(cfg);
        let client = FedClient::new(cfg.clone(), transport, metrics.clone());
        let cache = Arc::new(Cache::new(cfg.cache_enabled, cfg.cache_ttl(), metrics.clone()));
        let crawler = Crawler::new(client.clone(), cache.clone());
        Self {
            conv: Converter::new(cfg.clone()),
            cfg,
            client,
            cache,
            crawler,
            metrics,
        }
    }

    /// Repository speaking HTTP to the configured service.
    pub fn connect(cfg: SyncConfig) -> SyncResult<Self> {
        let metrics = Arc::new(SyncMetrics::new());
        let transport = HttpTransport::new(cfg.http_timeout(), cfg.http_attempts, metrics.clone())?;
        info!("linkfed repository for {}", cfg.base());
        Ok(Self::new(cfg, Arc::new(transport), metrics))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn client(&self) -> &FedClient {
        &self.client
    }

    pub fn converter(&self) -> &Converter {
        &self.conv
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// The local application actor with its configured credential.
    pub fn application(&self) -> Option<Account> {
        Account::application(&self.cfg)
    }

    fn addressing(&self) -> Addressing<'_> {
        Addressing::new(&self.cfg)
    }

    fn new_activity(&self, kind: Kind, actor: &Account, object: ApItem) -> Object {
        let mut act = self.conv.activity(kind, actor, object);
        act.published = Some(OffsetDateTime::now_utc());
        act
    }

    /// Posts to `by`'s outbox and purges what the activity touched. The
    /// write is durable once the POST succeeded, so the purge cannot fail it.
    async fn submit(&self, ctx: &CancellationToken, act: &Object, by: &Account) -> SyncResult<(String, Object)> {
        ensure_live(ctx)?;
        let (new_iri, stored) = self.client.to_outbox(act, by).await?;
        let mut purged = self.cache.invalidate(&stored);
        if stored.recipients().next().is_none() {
            // servers may answer with a trimmed representation
            let mut sent = act.clone();
            sent.id = Some(new_iri.clone());
            purged += self.cache.invalidate(&sent);
        }
        debug!("{new_iri}: {purged} cache entries purged");
        Ok((new_iri, stored))
    }

    fn skip(&self, it: &ApItem, e: &SyncError) {
        warn!("skipping {}: {e:#}", it.iri().unwrap_or("anonymous entry"));
        self.metrics.skipped_item();
    }

    fn parse_all<T: FromProtocol>(&self, items: &[ApItem]) -> Vec<T> {
        items
            .iter()
            .filter_map(|it| match self.conv.parse::<T>(it) {
                Ok(v) => Some(v),
                Err(e) => {
                    self.skip(it, &e);
                    None
                }
            })
            .collect()
    }

    /// Collects up to `limit` entries from `loads`. Collections that do not
    /// exist yet count as empty.
    async fn gather(
        &self,
        ctx: &CancellationToken,
        loads: &RemoteLoads,
        viewer: Option<&Account>,
        limit: usize,
    ) -> SyncResult<Vec<ApItem>> {
        if loads.is_empty() {
            return Ok(Vec::new());
        }
        ensure_live(ctx)?;
        let found: Mutex<Vec<ApItem>> = Mutex::new(Vec::new());
        let cancel = ctx.child_token();
        let res = self
            .crawler
            .crawl(loads, viewer, &cancel, |page, _| {
                let mut found = lock(&found);
                found.extend(page.collection_items().iter().cloned());
                Ok(if found.len() >= limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .await;
        match res {
            Ok(_) => {}
            Err(e) if e.is_not_found() => debug!("nothing to gather: {e:#}"),
            Err(e) => return Err(e),
        }
        Ok(found.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    async fn cached_object(&self, target: &str, viewer: Option<&Account>) -> SyncResult<Object> {
        if let Some(hit) = self.cache.get(target, viewer) {
            return Ok(hit);
        }
        let ob = self.client.object(target, viewer).await?;
        self.cache.put(target, viewer, &ob);
        Ok(ob)
    }

    // ---- reads ----

    pub async fn load_account(
        &self,
        ctx: &CancellationToken,
        target: &str,
        viewer: Option<&Account>,
    ) -> SyncResult<Account> {
        ensure_live(ctx)?;
        let ob = match self.cache.get(target, viewer) {
            Some(hit) => hit,
            None => {
                let ob = self.client.actor(target, viewer).await?;
                self.cache.put(target, viewer, &ob);
                ob
            }
        };
        self.conv.parse_object(&ob)
    }

    async fn load_item_bare(&self, target: &str, viewer: Option<&Account>) -> SyncResult<Item> {
        let ob = self.cached_object(target, viewer).await?;
        self.conv.parse_object(&ob)
    }

    /// Loads an item and dereferences its author. A missing author leaves
    /// the identity stub in place.
    pub async fn load_item(&self, ctx: &CancellationToken, target: &str, viewer: Option<&Account>) -> SyncResult<Item> {
        ensure_live(ctx)?;
        let mut item = self.load_item_bare(target, viewer).await?;
        let author = item
            .submitted_by
            .as_ref()
            .filter(|a| is_stub(a))
            .and_then(Account::iri)
            .map(str::to_string);
        if let Some(author) = author {
            match self.load_account(ctx, &author, viewer).await {
                Ok(acc) => item.submitted_by = Some(acc),
                Err(e) => warn!("author {author} of {target} unavailable: {e:#}"),
            }
        }
        Ok(item)
    }

    /// Parent chain of `item`, nearest first, bounded by the configured
    /// thread depth. Stops quietly at the first unreachable parent.
    async fn ancestors(&self, item: &Item, viewer: Option<&Account>) -> Vec<Item> {
        let mut out: Vec<Item> = Vec::new();
        let mut seen = BTreeSet::new();
        if let Some(own) = item.iri() {
            seen.insert(iri::recipient_key(own));
        }
        let mut next = item.parent.as_ref().map(|p| p.iri.clone());
        while let Some(target) = next.take() {
            if out.len() >= self.cfg.max_thread_depth || !seen.insert(iri::recipient_key(&target)) {
                break;
            }
            match self.load_item_bare(&target, viewer).await {
                Ok(parent) => {
                    next = parent.parent.as_ref().map(|p| p.iri.clone());
                    out.push(parent);
                }
                Err(e) => {
                    warn!("ancestor {target} unavailable: {e:#}");
                    break;
                }
            }
        }
        out
    }

    /// Runs a listing. Every (host, collection, filter) triple is crawled
    /// concurrently into one accumulator; moderation entries are grouped by
    /// target, the rest are deduplicated by IRI and ordered newest first.
    pub async fn load_searches(
        &self,
        ctx: &CancellationToken,
        loads: &RemoteLoads,
        viewer: Option<&Account>,
        deps: Deps,
    ) -> SyncResult<Cursor> {
        ensure_live(ctx)?;
        if loads.is_empty() {
            return Ok(Cursor::empty());
        }
        let max_items = requested_max(loads, self.cfg.max_items);
        let threshold = self.cfg.early_stop_threshold as usize;
        let accum = Mutex::new(Accumulator::default());
        let cancel = ctx.child_token();

        let stats = self
            .crawler
            .crawl(loads, viewer, &cancel, |page, filters| {
                let mut acc = lock(&accum);
                let declared = page.total_items.unwrap_or(0) as usize;
                acc.declared = acc.declared.max(declared);
                acc.track_next(page, filters);
                for it in page.collection_items() {
                    match self.conv.parse::<Renderable>(it) {
                        Ok(r) if r.is_valid() => acc.add(r),
                        Ok(r) => debug!("dropping invalid {} entry", r.label()),
                        Err(e) => self.skip(it, &e),
                    }
                }
                Ok(if should_stop(max_items, acc.len(), threshold) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .await?;
        debug!(
            "listing crawled {} pages over {} collections ({} failed)",
            stats.pages, stats.triples, stats.failed
        );

        let acc = accum.into_inner().unwrap_or_else(PoisonError::into_inner);
        let declared = acc.declared;
        let remote_more = acc.has_more();
        let mut entries = acc.results.into_vec();
        if !acc.moderation.is_empty() {
            let mut groups = aggregate(acc.moderation, self.cfg.app());
            if deps.followups {
                let seeded = groups.clone();
                groups = match self.load_moderation_followups(ctx, seeded, viewer).await {
                    Ok(g) => g,
                    Err(e) => {
                        warn!("moderation followups unavailable: {e:#}");
                        groups
                    }
                };
            }
            entries.extend(groups.into_iter().map(Renderable::ModerationGroup));
        }
        sort_flat(&mut entries, SortOrder::Date, OffsetDateTime::now_utc());

        let total = entries.len().max(declared);
        let mut cursor = Cursor::new(entries, max_items, total, remote_more, is_paged(loads));
        self.resolve_deps(ctx, &mut cursor.items, viewer, deps).await;
        Ok(cursor)
    }

    async fn resolve_deps(&self, ctx: &CancellationToken, entries: &mut Vec<Renderable>, viewer: Option<&Account>, deps: Deps) {
        if deps.authors {
            self.resolve_accounts(ctx, entries, viewer, submitters_mut).await;
        }
        if deps.follows {
            self.resolve_accounts(ctx, entries, viewer, followed_mut).await;
        }
        if deps.votes {
            let targets: Vec<String> = entries
                .iter()
                .filter_map(Renderable::as_item)
                .filter_map(|i| i.iri().map(str::to_string))
                .collect();
            match self.load_votes(ctx, &targets, viewer).await {
                Ok(found) => attach_votes(entries, found),
                Err(e) => warn!("votes unavailable: {e:#}"),
            }
        }
        if deps.replies {
            let tops: Vec<String> = entries
                .iter()
                .filter_map(Renderable::as_item)
                .filter(|i| i.is_top())
                .filter_map(|i| i.iri().map(str::to_string))
                .collect();
            let mut present: BTreeSet<String> = entries
                .iter()
                .filter_map(Renderable::iri)
                .map(iri::recipient_key)
                .collect();
            let mut added = false;
            for top in tops {
                match self.load_replies(ctx, &top, viewer).await {
                    Ok(replies) => {
                        for r in replies {
                            let fresh = r.iri().map(|i| present.insert(iri::recipient_key(i))).unwrap_or(false);
                            if fresh {
                                entries.push(Renderable::Item(r));
                                added = true;
                            }
                        }
                    }
                    Err(e) => warn!("replies of {top} unavailable: {e:#}"),
                }
            }
            if added {
                let mut thread = Thread::build(std::mem::take(entries));
                thread.sort(SortOrder::Date, OffsetDateTime::now_utc());
                *entries = thread.into_ordered();
            }
        }
    }

    /// Replaces identity stubs picked by `pick` with dereferenced accounts,
    /// loading each distinct IRI once.
    async fn resolve_accounts(
        &self,
        ctx: &CancellationToken,
        entries: &mut [Renderable],
        viewer: Option<&Account>,
        pick: fn(&mut Renderable) -> Vec<&mut Account>,
    ) {
        let mut wanted = BTreeSet::new();
        for r in entries.iter_mut() {
            for acc in pick(r) {
                if !is_stub(acc) {
                    continue;
                }
                if let Some(i) = acc.iri() {
                    wanted.insert(i.to_string());
                }
            }
        }
        if wanted.is_empty() {
            return;
        }
        let loaded = join_all(wanted.iter().map(|i| self.load_account(ctx, i, viewer))).await;
        let mut by_key: HashMap<String, Account> = HashMap::new();
        for (target, res) in wanted.iter().zip(loaded) {
            match res {
                Ok(acc) => {
                    by_key.insert(iri::recipient_key(target), acc);
                }
                Err(e) => warn!("account {target} unavailable: {e:#}"),
            }
        }
        for r in entries.iter_mut() {
            for acc in pick(r) {
                let found = acc.iri().and_then(|i| by_key.get(&iri::recipient_key(i)));
                if let Some(full) = found {
                    *acc = full.clone();
                }
            }
        }
    }

    /// Appreciations of `targets`, read from their `likes` collections.
    /// Dislikes are only asked for when downvoting is enabled.
    pub async fn load_votes<S: AsRef<str>>(
        &self,
        ctx: &CancellationToken,
        targets: &[S],
        viewer: Option<&Account>,
    ) -> SyncResult<Vec<Vote>> {
        let mut loads = RemoteLoads::new();
        for t in targets {
            add_load(
                &mut loads,
                RemoteLoad::new(t.as_ref(), CollectionPath::Likes, vec![self.vote_filters()]),
            );
        }
        let found = self.gather(ctx, &loads, viewer, usize::MAX).await?;
        Ok(self.parse_all(&found))
    }

    fn vote_kinds(&self) -> Vec<Kind> {
        if self.cfg.downvoting_enabled {
            vec![Kind::Like, Kind::Dislike]
        } else {
            vec![Kind::Like]
        }
    }

    fn vote_filters(&self) -> Filters {
        Filters::of_types(&self.vote_kinds()).with_max_items(self.cfg.max_items)
    }

    /// Replies below `target`, breadth first, down to the configured thread
    /// depth.
    pub async fn load_replies(
        &self,
        ctx: &CancellationToken,
        target: &str,
        viewer: Option<&Account>,
    ) -> SyncResult<Vec<Item>> {
        let mut seen = BTreeSet::from([iri::recipient_key(target)]);
        let mut frontier = vec![target.to_string()];
        let mut out = Vec::new();
        for _ in 0..self.cfg.max_thread_depth {
            if frontier.is_empty() {
                break;
            }
            let mut loads = RemoteLoads::new();
            for parent in frontier.drain(..) {
                add_load(
                    &mut loads,
                    RemoteLoad::new(parent, CollectionPath::Replies, vec![Filters::new().with_max_items(self.cfg.max_items)]),
                );
            }
            let found = self.gather(ctx, &loads, viewer, usize::MAX).await?;
            for reply in self.parse_all::<Item>(&found) {
                let Some(own) = reply.iri().map(str::to_string) else {
                    continue;
                };
                if seen.insert(iri::recipient_key(&own)) {
                    frontier.push(own);
                    out.push(reply);
                }
            }
        }
        Ok(out)
    }

    /// Resolves hashtag names to the tag objects known to the service.
    pub async fn load_tags<S: AsRef<str>>(
        &self,
        ctx: &CancellationToken,
        names: &[S],
        viewer: Option<&Account>,
    ) -> SyncResult<Vec<Tag>> {
        let names: Vec<String> = names.iter().map(|n| Tag::hashtag(n.as_ref()).name).collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut f = Filters::of_types(&[Kind::Hashtag]).with_max_items(self.cfg.max_items);
        f.name = names.iter().map(|n| CompStr::equals(n.as_str())).collect();
        let mut loads = RemoteLoads::new();
        add_load(
            &mut loads,
            RemoteLoad::new(self.cfg.service(), CollectionPath::Objects, vec![f]),
        );
        let found = self.gather(ctx, &loads, viewer, names.len().max(1)).await?;
        let mut tags: Vec<Tag> = Vec::new();
        for t in found.iter().filter_map(tag_of) {
            if !tags.iter().any(|k| k.name == t.name) {
                tags.push(t);
            }
        }
        Ok(tags)
    }

    /// Resolves mentions to accounts by handle, one actors query per
    /// instance. Handles nobody answers for are left out.
    pub async fn load_mentions(
        &self,
        ctx: &CancellationToken,
        mentions: &[Tag],
        viewer: Option<&Account>,
    ) -> SyncResult<Vec<Tag>> {
        let local = self.cfg.host();
        let mut by_host: HashMap<String, Vec<&Tag>> = HashMap::new();
        for m in mentions.iter().filter(|m| m.is_mention()) {
            let host = m.host().map(str::to_ascii_lowercase).unwrap_or_else(|| local.clone());
            by_host.entry(host).or_default().push(m);
        }
        let mut loads = RemoteLoads::new();
        for (host, wanted) in &by_host {
            let base = if *host == local {
                self.cfg.service()
            } else {
                format!("https://{host}/")
            };
            let mut f = Filters::of_types(&[
                Kind::Person,
                Kind::Group,
                Kind::Application,
                Kind::Service,
                Kind::Organization,
            ])
            .with_max_items(self.cfg.max_items);
            f.name = wanted.iter().map(|m| CompStr::equals(m.handle())).collect();
            add_load(&mut loads, RemoteLoad::new(base, CollectionPath::Actors, vec![f]));
        }
        let found = self.gather(ctx, &loads, viewer, mentions.len().max(1)).await?;
        let accounts: Vec<Account> = self.parse_all(&found);
        let mut out = Vec::new();
        for m in mentions.iter().filter(|m| m.is_mention()) {
            let host = m.host().map(str::to_ascii_lowercase).unwrap_or_else(|| local.clone());
            let hit = accounts.iter().find(|a| {
                let Some(own) = a.iri() else {
                    return false;
                };
                let same_host = if host == local {
                    self.cfg.is_local_iri(own)
                } else {
                    iri::host_of(own).map(|h| h.eq_ignore_ascii_case(&host)).unwrap_or(false)
                };
                same_host && a.handle.eq_ignore_ascii_case(m.handle())
            });
            if let Some(acc) = hit {
                let mut resolved = m.clone();
                resolved.iri = acc.iri().map(str::to_string);
                resolved.url = resolved.url.or_else(|| acc.metadata.url.clone());
                out.push(resolved);
            }
        }
        Ok(out)
    }

    /// Picks up hashtags and mentions written in the title or in a plain
    /// text or markdown body, then resolves the ones without an IRI. Lookup
    /// failures leave them as they are.
    async fn resolve_tags(&self, ctx: &CancellationToken, item: &mut Item, by: &Account) {
        let body = match item.mime_type {
            MimeType::Text | MimeType::Markdown => item.data.as_str(),
            _ => "",
        };
        let text = format!("{}\n{}", item.title, body);
        for found in tag::extract_tags(&text) {
            let list = if found.is_mention() {
                &mut item.metadata.mentions
            } else {
                &mut item.metadata.tags
            };
            if !list.iter().any(|t| t.name.eq_ignore_ascii_case(&found.name)) {
                list.push(found);
            }
        }

        let names: Vec<String> = item
            .metadata
            .tags
            .iter()
            .filter(|t| t.iri.is_none())
            .map(|t| t.name.clone())
            .collect();
        if !names.is_empty() {
            match self.load_tags(ctx, &names, Some(by)).await {
                Ok(known) => {
                    for t in item.metadata.tags.iter_mut().filter(|t| t.iri.is_none()) {
                        if let Some(k) = known.iter().find(|k| k.name.eq_ignore_ascii_case(&t.name)) {
                            t.iri = k.iri.clone();
                            t.url = t.url.take().or_else(|| k.url.clone());
                        }
                    }
                }
                Err(e) => warn!("hashtags unavailable: {e:#}"),
            }
        }

        let pending: Vec<Tag> = item
            .metadata
            .mentions
            .iter()
            .filter(|m| m.iri.is_none())
            .cloned()
            .collect();
        if pending.is_empty() {
            return;
        }
        match self.load_mentions(ctx, &pending, Some(by)).await {
            Ok(known) => {
                for m in item.metadata.mentions.iter_mut().filter(|m| m.iri.is_none()) {
                    if let Some(k) = known.iter().find(|k| k.name.eq_ignore_ascii_case(&m.name)) {
                        m.iri = k.iri.clone();
                        m.url = m.url.take().or_else(|| k.url.clone());
                    }
                }
            }
            Err(e) => warn!("mentions unavailable: {e:#}"),
        }
    }

    /// Re-groups `groups` with the application's Delete/Update activities on
    /// their targets.
    pub async fn load_moderation_followups(
        &self,
        ctx: &CancellationToken,
        groups: Vec<ModerationGroup>,
        viewer: Option<&Account>,
    ) -> SyncResult<Vec<ModerationGroup>> {
        let Some(app) = self.cfg.app() else {
            return Ok(groups);
        };
        let targets: Vec<&str> = groups.iter().map(|g| g.target_iri.as_str()).collect();
        if targets.is_empty() {
            return Ok(groups);
        }
        let f = Filters::of_types(&[Kind::Delete, Kind::Update])
            .with_object(Filters {
                iri: filters::iris(&targets),
                ..Default::default()
            })
            .with_max_items(self.cfg.max_items);
        let mut loads = RemoteLoads::new();
        add_load(&mut loads, RemoteLoad::new(app, CollectionPath::Outbox, vec![f]));
        let found = self.gather(ctx, &loads, viewer, usize::MAX).await?;
        let followups: Vec<ModerationOp> = self.parse_all(&found);
        debug!("{} moderation followups for {} groups", followups.len(), groups.len());

        let mut ops: Vec<ModerationOp> = groups
            .into_iter()
            .flat_map(|g| g.requests.into_iter().chain(g.followups))
            .collect();
        ops.extend(followups);
        Ok(aggregate(ops, Some(app)))
    }

    /// Snapshot of what `account` recently did: its Like, Create and Delete
    /// activities (plus Dislike with downvoting on). Kept for five minutes.
    pub async fn load_account_details(&self, ctx: &CancellationToken, account: &mut Account) -> SyncResult<()> {
        if account.outbox_fresh(OUTBOX_REFRESH) {
            return Ok(());
        }
        let owner = account
            .iri()
            .map(str::to_string)
            .ok_or_else(|| SyncError::invalid("account without iri"))?;
        let mut kinds = vec![Kind::Like, Kind::Create, Kind::Delete];
        if self.cfg.downvoting_enabled {
            kinds.push(Kind::Dislike);
        }
        let mut loads = RemoteLoads::new();
        add_load(
            &mut loads,
            RemoteLoad::new(
                owner.clone(),
                CollectionPath::Outbox,
                vec![Filters::of_types(&kinds).with_max_items(self.cfg.max_items)],
            ),
        );
        let found = self
            .gather(ctx, &loads, Some(&*account), self.cfg.max_items as usize)
            .await?;
        let appreciations: Vec<ApItem> = found
            .iter()
            .filter(|it| it.kind().map(Kind::is_appreciation).unwrap_or(false))
            .cloned()
            .collect();
        account.votes = self.parse_all(&appreciations);
        account.metadata.outbox_items = found.into_iter().filter_map(ApItem::into_object).collect();
        account.metadata.outbox_updated = Some(Instant::now());
        debug!(
            "outbox of {owner}: {} activities, {} votes",
            account.metadata.outbox_items.len(),
            account.votes.len()
        );
        Ok(())
    }

    /// Pulls the first large page of the service's actors, objects and
    /// activities into the cache. A collection that fails is logged and
    /// skipped.
    pub async fn warmup_caches(&self, ctx: &CancellationToken) -> SyncResult<CrawlStats> {
        let service = self.cfg.service();
        let mut total = CrawlStats::default();
        for path in [CollectionPath::Actors, CollectionPath::Objects, CollectionPath::Activities] {
            ensure_live(ctx)?;
            let mut loads = RemoteLoads::new();
            add_load(
                &mut loads,
                RemoteLoad::new(service.clone(), path, vec![Filters::new().with_max_items(WARMUP_PAGE_SIZE)]),
            );
            // one page per collection, each with its own token
            let cancel = ctx.child_token();
            match self
                .crawler
                .crawl(&loads, None, &cancel, |_, _| Ok(ControlFlow::Break(())))
                .await
            {
                Ok(stats) => {
                    total.triples += stats.triples;
                    total.pages += stats.pages;
                }
                Err(e) => {
                    total.triples += 1;
                    total.failed += 1;
                    warn!("warmup of {path} failed: {e:#}");
                }
            }
        }
        info!("cache warmed: {} pages, {} entries", total.pages, self.cache.len());
        Ok(total)
    }

    // ---- writes ----

    /// Creates, updates or deletes an item. Deleted items are replaced by a
    /// tombstone; deleting one that is already gone succeeds.
    pub async fn save_item(&self, ctx: &CancellationToken, item: Item, by: &Account) -> SyncResult<Item> {
        let mut item = item;
        let now = OffsetDateTime::now_utc();
        let kind = if item.is_deleted() {
            if item.iri().is_none() {
                return Err(SyncError::invalid("cannot delete an item without iri"));
            }
            Kind::Delete
        } else if item.iri().is_some() {
            Kind::Update
        } else {
            Kind::Create
        };
        if item.submitted_by.is_none() {
            item.submitted_by = Some(public_copy(by));
        }
        match kind {
            Kind::Create => {
                item.created_at.get_or_insert(now);
            }
            _ => {
                item.updated_at = Some(now);
                item.updated_by = Some(public_copy(by));
            }
        }

        if kind != Kind::Delete {
            self.resolve_tags(ctx, &mut item, by).await;
        }
        let ancestors = self.ancestors(&item, Some(by)).await;
        let object = self.conv.render_item(&item);
        let mut act = self.new_activity(kind.clone(), by, object.into());
        self.addressing().for_item(by, &item, &ancestors).apply(&mut act);

        match self.submit(ctx, &act, by).await {
            Ok((_, stored)) => {
                let mut saved: Item = self.conv.parse_object(&stored)?;
                if saved.submitted_by.as_ref().map(is_stub).unwrap_or(true) {
                    saved.submitted_by = item.submitted_by.take();
                }
                Ok(saved)
            }
            Err(e) if kind == Kind::Delete && e.is_gone() => {
                debug!("{} already deleted", item.iri().unwrap_or_default());
                self.cache.purge(item.iri());
                Ok(item)
            }
            Err(e) => Err(e),
        }
    }

    fn vote_recipients(&self, voter: &Account, item: &Item) -> Recipients {
        let addr = self.addressing();
        let mut r = addr.for_actor(voter, self.cfg.public_voting);
        if let Some(author) = item.author_iri() {
            addr.add_author(&mut r, author, true);
        }
        if self.cfg.public_voting {
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
        }
        r.dedup();
        r
    }

    /// Moves the voter's appreciation of an item to `vote.weight`. The
    /// current vote is looked up first: the same direction writes nothing,
    /// a different one is undone before the new one is sent.
    pub async fn save_vote(&self, ctx: &CancellationToken, vote: Vote) -> SyncResult<Vote> {
        if !self.cfg.voting_enabled {
            return Err(SyncError::invalid("voting is disabled"));
        }
        if vote.direction() < 0 && !self.cfg.downvoting_enabled {
            return Err(SyncError::invalid("downvoting is disabled"));
        }
        let voter = vote
            .submitted_by
            .clone()
            .ok_or_else(|| SyncError::invalid("vote without voter"))?;
        if !voter.is_logged() {
            return Err(SyncError::Unauthorized(format!(
                "{} cannot vote without a credential",
                voter.iri().unwrap_or("account")
            )));
        }
        let voter_iri = voter
            .iri()
            .map(str::to_string)
            .ok_or_else(|| SyncError::invalid("voter without iri"))?;
        let target = vote
            .item
            .clone()
            .ok_or_else(|| SyncError::invalid("vote without item"))?;
        let item = self.load_item_bare(&target.iri, Some(&voter)).await?;

        let mut loads = RemoteLoads::new();
        let mut mine = Filters::of_types(&[Kind::Like, Kind::Dislike]).with_max_items(self.cfg.max_items);
        mine = mine.with_actor(Filters {
            iri: filters::iris(&[voter_iri.as_str()]),
            ..Default::default()
        });
        add_load(&mut loads, RemoteLoad::new(target.iri.clone(), CollectionPath::Likes, vec![mine]));
        let existing: Vec<Vote> = {
            let found = self.gather(ctx, &loads, Some(&voter), usize::MAX).await?;
            self.parse_all(&found)
        };
        let prior = votes::find_prior(&existing, &voter).cloned();
        let steps = votes::plan(prior.as_ref(), vote.weight);
        if steps.is_empty() {
            debug!("vote of {voter_iri} on {} unchanged", target.iri);
            return Ok(prior.unwrap_or(vote));
        }

        let recipients = self.vote_recipients(&voter, &item);
        let mut result = Vote {
            submitted_by: Some(public_copy(&voter)),
            item: Some(target.clone()),
            weight: vote.direction(),
            created_at: Some(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        for step in steps {
            let (kind, object) = match &step {
                VoteStep::Undo(prior_iri) => {
                    let undone = prior
                        .as_ref()
                        .and_then(|p| p.object.clone())
                        .map(ApItem::from)
                        .unwrap_or_else(|| ApItem::from(prior_iri.as_str()));
                    (Kind::Undo, undone)
                }
                VoteStep::Assert(k) => (k.clone(), ApItem::from(target.iri.as_str())),
            };
            let mut act = self.new_activity(kind.clone(), &voter, object);
            recipients.apply(&mut act);
            match self.submit(ctx, &act, &voter).await {
                Ok((new_iri, stored)) => match step {
                    VoteStep::Assert(_) => {
                        result.iri = Some(new_iri);
                        result.object = Some(stored);
                    }
                    VoteStep::Undo(prior_iri) => {
                        result.original_iri = Some(prior_iri);
                        if result.weight == 0 {
                            result.iri = Some(new_iri);
                            result.object = Some(stored);
                        }
                    }
                },
                Err(e) if e.is_conflict() => debug!("{} already applied: {e:#}", kind.as_str()),
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }

    /// Creates, updates or deletes an account. `by` is the acting actor,
    /// usually the application for creation and the account itself after.
    pub async fn save_account(&self, ctx: &CancellationToken, account: Account, by: &Account) -> SyncResult<Account> {
        let kind = if account.is_deleted() {
            Kind::Delete
        } else if account.iri().is_some() {
            Kind::Update
        } else {
            Kind::Create
        };
        let object: ApItem = match (&kind, account.iri()) {
            (Kind::Delete, Some(i)) => ApItem::from(i),
            (Kind::Delete, None) => return Err(SyncError::invalid("cannot delete an account without iri")),
            _ => self.conv.render_account(&account).into(),
        };
        let mut act = self.new_activity(kind.clone(), by, object);
        self.addressing().for_actor(by, true).apply(&mut act);

        match self.submit(ctx, &act, by).await {
            Ok(_) if kind == Kind::Delete => Ok(account),
            Ok((_, stored)) => {
                let mut saved: Account = self.conv.parse_object(&stored)?;
                saved.metadata.credential = account.metadata.credential.clone();
                if kind == Kind::Update {
                    saved.created_by = account.created_by.clone().or(saved.created_by);
                }
                Ok(saved)
            }
            Err(e) if kind == Kind::Delete && e.is_gone() => {
                let mut gone = account;
                gone.flags.insert(Flags::DELETED);
                Ok(gone)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn follow_account(
        &self,
        ctx: &CancellationToken,
        follower: &Account,
        followed: &Account,
        reason: Option<&str>,
    ) -> SyncResult<FollowRequest> {
        let target = followed
            .iri()
            .ok_or_else(|| SyncError::invalid("cannot follow an account without iri"))?;
        let mut act = self.new_activity(Kind::Follow, follower, ApItem::from(target));
        set_reason(&mut act, reason);
        let addr = self.addressing();
        let mut r = addr.for_actor(follower, false);
        addr.add_author(&mut r, target, true);
        r.dedup();
        r.apply(&mut act);

        let (_, stored) = self.submit(ctx, &act, follower).await?;
        let mut follow: FollowRequest = self.conv.parse_object(&stored)?;
        follow.submitted_by = Some(public_copy(follower));
        follow.object = Some(public_copy(followed));
        Ok(follow)
    }

    /// Accepts or rejects a follow request on behalf of the followed account.
    pub async fn send_follow_response(
        &self,
        ctx: &CancellationToken,
        follow: &FollowRequest,
        by: &Account,
        accept: bool,
        reason: Option<&str>,
    ) -> SyncResult<FollowRequest> {
        let follow_iri = follow
            .iri
            .as_deref()
            .ok_or_else(|| SyncError::invalid("follow request without iri"))?;
        let follower = follow
            .submitted_by
            .as_ref()
            .and_then(Account::iri)
            .ok_or_else(|| SyncError::invalid("follow request without follower"))?;
        let kind = if accept { Kind::Accept } else { Kind::Reject };
        let mut act = self.new_activity(kind, by, ApItem::from(follow_iri));
        act.in_reply_to = vec![ApItem::from(follow_iri)];
        set_reason(&mut act, reason);
        let addr = self.addressing();
        let mut r = addr.for_actor(by, false);
        addr.add_author(&mut r, follower, true);
        r.dedup();
        r.apply(&mut act);

        let mut resolved = follow.clone();
        match self.submit(ctx, &act, by).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => debug!("follow {follow_iri} already answered"),
            Err(e) => return Err(e),
        }
        resolved.resolve(accept);
        Ok(resolved)
    }

    async fn moderate(
        &self,
        ctx: &CancellationToken,
        kind: Kind,
        by: &Account,
        target: &str,
        notify: &[&str],
        reason: Option<&str>,
        in_reply_to: &[String],
    ) -> SyncResult<ModerationOp> {
        let mut act = self.new_activity(kind, by, ApItem::from(target));
        set_reason(&mut act, reason);
        act.in_reply_to = in_reply_to.iter().map(|r| ApItem::from(r.as_str())).collect();
        let addr = self.addressing();
        let mut r = addr.for_actor(by, false);
        for n in notify {
            r.add_cc(n);
            addr.bcc_remote_host(&mut r, n);
        }
        r.dedup();
        r.apply(&mut act);
        let (_, stored) = self.submit(ctx, &act, by).await?;
        self.conv.parse_object(&stored)
    }

    pub async fn block_account(
        &self,
        ctx: &CancellationToken,
        by: &Account,
        target: &Account,
        reason: Option<&str>,
    ) -> SyncResult<ModerationOp> {
        let t = target.iri().ok_or_else(|| SyncError::invalid("block target without iri"))?;
        self.moderate(ctx, Kind::Block, by, t, &[], reason, &[]).await
    }

    pub async fn block_item(&self, ctx: &CancellationToken, by: &Account, target: &Item, reason: Option<&str>) -> SyncResult<ModerationOp> {
        let t = target.iri().ok_or_else(|| SyncError::invalid("block target without iri"))?;
        self.moderate(ctx, Kind::Block, by, t, &[], reason, &[]).await
    }

    /// Flags an item. Its author is copied so the report reaches its
    /// instance.
    pub async fn report_item(&self, ctx: &CancellationToken, by: &Account, target: &Item, reason: Option<&str>) -> SyncResult<ModerationOp> {
        let t = target.iri().ok_or_else(|| SyncError::invalid("report target without iri"))?;
        let notify: Vec<&str> = target.author_iri().into_iter().collect();
        self.moderate(ctx, Kind::Flag, by, t, &notify, reason, &[]).await
    }

    pub async fn report_account(
        &self,
        ctx: &CancellationToken,
        by: &Account,
        target: &Account,
        reason: Option<&str>,
    ) -> SyncResult<ModerationOp> {
        let t = target.iri().ok_or_else(|| SyncError::invalid("report target without iri"))?;
        self.moderate(ctx, Kind::Flag, by, t, &[t], reason, &[]).await
    }

    /// Deletes `target` as the application actor, answering `requests`.
    /// A target that is already gone still yields the followup.
    pub async fn moderate_delete(
        &self,
        ctx: &CancellationToken,
        target: &Renderable,
        reason: Option<&str>,
        requests: &[ModerationOp],
    ) -> SyncResult<ModerationOp> {
        let app = self
            .application()
            .ok_or_else(|| SyncError::Unauthorized("no application actor configured".to_string()))?;
        let t = target
            .iri()
            .ok_or_else(|| SyncError::invalid("moderation target without iri"))?;
        let answers: Vec<String> = requests.iter().filter_map(|r| r.iri.clone()).collect();
        match self.moderate(ctx, Kind::Delete, &app, t, &[], reason, &answers).await {
            Err(e) if e.is_gone() => {
                debug!("{t} already deleted");
                self.cache.purge([t]);
                Ok(ModerationOp {
                    kind: Kind::Delete,
                    submitted_by: Some(public_copy(&app)),
                    target: Some(Box::new(target.clone())),
                    target_iri: Some(t.to_string()),
                    reason: reason.unwrap_or_default().to_string(),
                    mime_type: MimeType::Markdown,
                    in_reply_to: answers,
                    created_at: Some(OffsetDateTime::now_utc()),
                    ..Default::default()
                })
            }
            other => other,
        }
    }
}

fn attach_votes(entries: &mut [Renderable], found: Vec<Vote>) {
    let mut by_item: HashMap<String, Vec<Vote>> = HashMap::new();
    for v in found {
        if let Some(target) = v.item.as_ref().map(|i| iri::recipient_key(&i.iri)) {
            by_item.entry(target).or_default().push(v);
        }
    }
    for r in entries.iter_mut() {
        let Renderable::Item(item) = r else {
            continue;
        };
        let Some(k) = item.iri().map(iri::recipient_key) else {
            continue;
        };
        if let Some(vs) = by_item.remove(&k) {
            item.votes = vs;
            item.score = item.vote_score();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Credential;
    use crate::item::ItemRef;
    use crate::memory::MemoryTransport;

    const BASE: &str = "https://fed.example";

    fn repo(mem: Arc<MemoryTransport>) -> Repository {
        let mut cfg = SyncConfig::new(BASE);
        cfg.app_iri = Some(format!("{BASE}/actors/app"));
        cfg.app_credential = Some(Credential::Bearer("app-token".into()));
        Repository::new(cfg, mem, Arc::new(SyncMetrics::new()))
    }

    fn alice() -> Account {
        let mut a = Account::from_iri(&format!("{BASE}/actors/alice"));
        a.handle = "alice".into();
        a.metadata.credential = Some(Credential::Bearer("alice-token".into()));
        a
    }

    #[test]
    fn early_stop_threshold() {
        assert!(!should_stop(50, 45, 5));
        assert!(should_stop(50, 46, 5));
        assert!(should_stop(50, 80, 5));
        // small pages still fill up
        assert!(!should_stop(3, 2, 5));
        assert!(should_stop(3, 3, 5));
        assert!(should_stop(1, 1, 0));
    }

    #[tokio::test]
    async fn cancelled_context_writes_nothing() {
        let mem = Arc::new(MemoryTransport::new(BASE));
        let r = repo(mem.clone());
        let ctx = CancellationToken::new();
        ctx.cancel();
        let mut item = Item::default();
        item.title = "hello".into();
        let err = r.save_item(&ctx, item, &alice()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(mem.posts().is_empty());
    }

    #[tokio::test]
    async fn vote_without_credential_is_unauthorized() {
        let mem = Arc::new(MemoryTransport::new(BASE));
        let r = repo(mem.clone());
        let voter = Account::from_iri(&format!("{BASE}/actors/bob"));
        let vote = Vote::new(voter, ItemRef::new(&format!("{BASE}/objects/1")), 1);
        let err = r.save_vote(&CancellationToken::new(), vote).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(mem.requests().is_empty());
    }

    #[tokio::test]
    async fn account_details_are_cached_for_a_while() {
        let mem = Arc::new(MemoryTransport::new(BASE));
        let r = repo(mem.clone());
        let ctx = CancellationToken::new();
        let mut item = Item::default();
        item.data = "first post".into();
        item.mime_type = MimeType::Text;
        let a = alice();
        r.save_item(&ctx, item, &a).await.unwrap();

        let mut acc = alice();
        r.load_account_details(&ctx, &mut acc).await.unwrap();
        assert_eq!(acc.metadata.outbox_items.len(), 1);
        assert!(acc.outbox_fresh(OUTBOX_REFRESH));
        mem.clear_requests();
        r.load_account_details(&ctx, &mut acc).await.unwrap();
        assert!(mem.requests().is_empty());
    }

    #[tokio::test]
    async fn moderate_delete_needs_the_application() {
        let mem = Arc::new(MemoryTransport::new(BASE));
        let r = Repository::new(SyncConfig::new(BASE), mem, Arc::new(SyncMetrics::new()));
        let target = Renderable::Item(Item::from_iri(&format!("{BASE}/objects/1")));
        let err = r
            .moderate_delete(&CancellationToken::new(), &target, Some("spam"), &[])
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }
}
