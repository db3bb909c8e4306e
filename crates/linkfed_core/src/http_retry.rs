/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::metrics::SyncMetrics;

const FIRST_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Sends the request built by `build`, retrying transport errors, 429 and
/// 5xx answers with jittered exponential backoff.
pub async fn send_with_retry<F>(mut build: F, attempts: u32, metrics: &SyncMetrics) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = clamp_attempts(attempts);
    let mut backoff = FIRST_BACKOFF;
    let mut last_err = None;
    for attempt in 0..max_attempts {
        let started = std::time::Instant::now();
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                metrics.fetch_rtt_update(started.elapsed().as_millis() as u64);
                if should_retry_status(status) {
                    metrics.http_error();
                    if attempt + 1 < max_attempts {
                        debug!("retrying after {status} (attempt {})", attempt + 1);
                        sleep_with_jitter(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }
                }
                return Ok(resp);
            }
            Err(e) => {
                if e.is_timeout() {
                    metrics.http_timeout();
                } else {
                    metrics.http_error();
                }
                if attempt + 1 >= max_attempts {
                    return Err(e.into());
                }
                last_err = Some(e);
                sleep_with_jitter(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
    Err(last_err
        .map(anyhow::Error::from)
        .unwrap_or_else(|| anyhow!("retry budget exhausted")))
}

pub fn clamp_attempts(attempts: u32) -> u32 {
    attempts.clamp(1, 5)
}

pub fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    let jitter = Duration::from_millis(jitter_ms);
    tokio::time::sleep(base + jitter).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy() {
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!should_retry_status(StatusCode::NOT_FOUND));
        assert_eq!(clamp_attempts(0), 1);
        assert_eq!(clamp_attempts(9), 5);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = FIRST_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(b.as_millis());
            b = next_backoff(b);
        }
        assert_eq!(seen, vec![200, 400, 800, 1600, 3200, 5000]);
    }
}
