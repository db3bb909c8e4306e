/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::env;

use anyhow::{anyhow, Context, Result};
use linkfed_core::config::{init_tracing, SyncConfig};
use linkfed_core::crawler::{add_load, RemoteLoad, RemoteLoads};
use linkfed_core::filters::{types, Filters};
use linkfed_core::{Deps, Repository};
use linkfed_vocab::{CollectionPath, Kind};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: linkfed_inspect actor <iri> | item <iri> | list <owner> <collection> [type] | warmup";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str).unwrap_or_default();
    let cfg = match env::var("LINKFED_CONFIG") {
        Ok(path) => SyncConfig::from_file(path)?,
        Err(_) => SyncConfig::from_env()?,
    };
    let repo = Repository::connect(cfg).context("build repository")?;
    let ctx = CancellationToken::new();
    let arg = |i: usize| args.get(i).map(String::as_str).ok_or_else(|| anyhow!(USAGE));

    match cmd {
        "actor" => {
            let acc = repo.load_account(&ctx, arg(1)?, None).await?;
            println!("handle={}", acc.handle);
            println!("hash={}", acc.hash);
            if let Some(inbox) = acc.metadata.inbox.as_deref() {
                println!("inbox={inbox}");
            }
            if let Some(pk) = acc.metadata.public_key_pem.as_deref() {
                println!("public_key_pem_len={}", pk.len());
            }
        }
        "item" => {
            let item = repo.load_item(&ctx, arg(1)?, None).await?;
            println!("title={}", item.title);
            println!("author={}", item.author_iri().unwrap_or("-"));
            println!("mime={}", item.mime_type);
            if let Some(parent) = &item.parent {
                println!("parent={}", parent.iri);
            }
        }
        "list" => {
            let path: CollectionPath = arg(2)?.parse().map_err(|e: String| anyhow!(e))?;
            let mut f = Filters::new().with_max_items(repo.config().max_items);
            if let Some(kind) = args.get(3) {
                f.kind = types(&[Kind::from(kind.as_str())]);
            }
            let mut loads = RemoteLoads::new();
            add_load(&mut loads, RemoteLoad::new(arg(1)?, path, vec![f]));
            let cursor = repo.load_searches(&ctx, &loads, None, Deps::none()).await?;
            for r in cursor.iter() {
                println!("{}\t{}", r.label(), r.iri().unwrap_or("-"));
            }
            println!("total={}", cursor.total);
            if let Some(after) = &cursor.after {
                println!("after={}", after.as_str());
            }
        }
        "warmup" => {
            let stats = repo.warmup_caches(&ctx).await?;
            println!("pages={} failed={}", stats.pages, stats.failed);
        }
        _ => anyhow::bail!(USAGE),
    }

    let m = repo.metrics().snapshot();
    println!(
        "fetches={} cache_hits={} skipped={}",
        m.page_fetches + m.object_fetches,
        m.cache_hits,
        m.skipped_items
    );
    Ok(())
}
