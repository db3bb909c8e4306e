/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use linkfed_core::account::{Account, Credential};
use linkfed_core::http_sig;
use linkfed_core::{Repository, SyncConfig, SyncError};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    bearer: Option<String>,
    signed_by: Option<String>,
}

#[derive(Clone)]
struct Server {
    base: String,
    public_pem: String,
    private_pem: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Server {
    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap) {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        let signed_by = http_sig::verify_request(&self.public_pem, method, uri, headers).ok();
        self.seen.lock().unwrap().push(Seen {
            method: method.to_string(),
            path: uri.path().to_string(),
            bearer,
            signed_by,
        });
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

async fn actor(
    State(srv): State<Server>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    srv.record(&method, &uri, &headers);
    if name == "ghost" {
        return (StatusCode::GONE, Json(json!({}))).into_response();
    }
    let id = format!("{}/actors/{name}", srv.base);
    Json(json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": id,
        "type": "Person",
        "preferredUsername": name,
        "inbox": format!("{id}/inbox"),
        "outbox": format!("{id}/outbox"),
    }))
    .into_response()
}

async fn outbox(
    State(srv): State<Server>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    srv.record(&method, &uri, &headers);
    if http_sig::verify_digest(&headers, &body).is_err() && headers.contains_key("Digest") {
        return (StatusCode::BAD_REQUEST, "digest mismatch").into_response();
    }
    let Ok(mut act) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "not json").into_response();
    };
    let id = format!("{}/actors/{name}/activities/1", srv.base);
    act["id"] = Value::String(id.clone());
    (StatusCode::CREATED, [(header::LOCATION, id)], Json(act)).into_response()
}

async fn start() -> Server {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
    let public_pem = RsaPublicKey::from(&key).to_public_key_pem(LineEnding::LF).unwrap();
    let srv = Server {
        base: format!("http://127.0.0.1:{port}"),
        public_pem,
        private_pem: key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        seen: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/actors/:name", get(actor))
        .route("/actors/:name/outbox", post(outbox))
        .with_state(srv.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    srv
}

fn repo(srv: &Server) -> Repository {
    let mut cfg = SyncConfig::new(srv.base.clone());
    cfg.http_attempts = 1;
    cfg.http_timeout_secs = 5;
    Repository::connect(cfg).unwrap()
}

fn bearer_account(srv: &Server, name: &str) -> Account {
    let mut a = Account::from_iri(&format!("{}/actors/{name}", srv.base));
    a.handle = name.to_string();
    a.metadata.credential = Some(Credential::Bearer(format!("{name}-token")));
    a
}

#[tokio::test]
async fn same_host_reads_carry_the_viewer_token() {
    let srv = start().await;
    let repo = repo(&srv);
    let ctx = CancellationToken::new();
    let alice = bearer_account(&srv, "alice");

    let bob = repo
        .load_account(&ctx, &format!("{}/actors/bob", srv.base), Some(&alice))
        .await
        .unwrap();
    assert_eq!(bob.handle, "bob");

    // same server, different host name: nothing is attached
    let port = srv.base.rsplit(':').next().unwrap();
    let carol = repo
        .load_account(&ctx, &format!("http://localhost:{port}/actors/carol"), Some(&alice))
        .await
        .unwrap();
    assert_eq!(carol.handle, "carol");

    let seen = srv.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].bearer.as_deref(), Some("alice-token"));
    assert_eq!(seen[1].bearer, None);
    assert_eq!(seen[1].signed_by, None);
}

#[tokio::test]
async fn signed_writes_verify_and_return_location() {
    let srv = start().await;
    let repo = repo(&srv);
    let ctx = CancellationToken::new();
    let private_key_pem = srv.private_pem.clone();
    let key_id = format!("{}/actors/alice#main-key", srv.base);
    let mut alice = bearer_account(&srv, "alice");
    alice.metadata.credential = Some(Credential::HttpSignature {
        key_id: key_id.clone(),
        private_key_pem,
    });
    let bob = bearer_account(&srv, "bob");

    let follow = repo.follow_account(&ctx, &alice, &bob, None).await.unwrap();
    assert_eq!(
        follow.iri.as_deref(),
        Some(format!("{}/actors/alice/activities/1", srv.base).as_str())
    );

    let seen = srv.seen();
    let posted = seen.iter().find(|s| s.method == "POST").expect("follow posted");
    assert_eq!(posted.path, "/actors/alice/outbox");
    assert_eq!(posted.signed_by.as_deref(), Some(key_id.as_str()));
}

#[tokio::test]
async fn gone_actors_map_to_gone() {
    let srv = start().await;
    let repo = repo(&srv);
    let err = repo
        .load_account(&CancellationToken::new(), &format!("{}/actors/ghost", srv.base), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Gone(_)), "{err:?}");
}
