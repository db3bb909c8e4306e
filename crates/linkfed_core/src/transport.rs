/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method, Uri};
use linkfed_vocab::{Object, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use crate::account::Credential;
use crate::error::{SyncError, SyncResult};
use crate::http_retry::send_with_retry;
use crate::http_sig::{sign_request_rsa_sha256, GET_HEADERS, POST_HEADERS};
use crate::metrics::SyncMetrics;

/// Outcome of submitting an activity.
#[derive(Debug, Clone)]
pub struct Posted {
    /// `Location` of the stored activity.
    pub iri: String,
    pub status: u16,
    /// Stored representation, when the server returned one.
    pub object: Option<Object>,
}

/// Network seam of the protocol client. `auth` is already vetted by the
/// client: it is `None` whenever the request must go out unsigned.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, iri: &str, auth: Option<&Credential>) -> SyncResult<Object>;

    async fn post(&self, iri: &str, activity: &Object, auth: Option<&Credential>) -> SyncResult<Posted>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    attempts: u32,
    metrics: Arc<SyncMetrics>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, attempts: u32, metrics: Arc<SyncMetrics>) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("linkfed/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            attempts,
            metrics,
        })
    }

    fn auth_headers(
        method: &Method,
        iri: &str,
        body: &[u8],
        auth: Option<&Credential>,
    ) -> SyncResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        match auth {
            None => {}
            Some(Credential::Bearer(token)) => {
                let v = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| SyncError::invalid("bearer token is not a valid header value"))?;
                headers.insert(http::header::AUTHORIZATION, v);
            }
            Some(Credential::HttpSignature {
                key_id,
                private_key_pem,
            }) => {
                let uri: Uri = iri
                    .parse()
                    .map_err(|_| SyncError::invalid(format!("unsignable iri: {iri}")))?;
                let signed = if *method == Method::POST {
                    POST_HEADERS
                } else {
                    GET_HEADERS
                };
                sign_request_rsa_sha256(private_key_pem, key_id, method, &uri, &mut headers, body, signed)?;
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, iri: &str, auth: Option<&Credential>) -> SyncResult<Object> {
        let headers = Self::auth_headers(&Method::GET, iri, &[], auth)?;
        let resp = send_with_retry(
            || {
                self.http
                    .get(iri)
                    .header("Accept", ACCEPT)
                    .headers(headers.clone())
            },
            self.attempts,
            &self.metrics,
        )
        .await
        .map_err(|e| SyncError::Transport(format!("GET {iri}: {e:#}")))?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SyncError::from_status(status, iri, &text));
        }
        let obj: Object = serde_json::from_str(&text)?;
        Ok(obj)
    }

    async fn post(&self, iri: &str, activity: &Object, auth: Option<&Credential>) -> SyncResult<Posted> {
        let body = serde_json::to_vec(activity)?;
        let headers = Self::auth_headers(&Method::POST, iri, &body, auth)?;
        let resp = send_with_retry(
            || {
                self.http
                    .post(iri)
                    .header("Accept", ACCEPT)
                    .header("Content-Type", CONTENT_TYPE)
                    .headers(headers.clone())
                    .body(body.clone())
            },
            self.attempts,
            &self.metrics,
        )
        .await
        .map_err(|e| SyncError::Transport(format!("POST {iri}: {e:#}")))?;

        let status = resp.status();
        let location = resp
            .headers()
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SyncError::from_status(status, iri, &text));
        }
        let object = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Object>(&text)?)
        };
        let iri = location
            .or_else(|| object.as_ref().and_then(|o| o.id.clone()))
            .unwrap_or_default();
        if status != StatusCode::CREATED {
            debug!("activity accepted with {status}: {iri}");
        }
        Ok(Posted {
            iri,
            status: status.as_u16(),
            object,
        })
    }
}
