/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use http::{HeaderMap, Method, Uri};
use rsa::{
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{RandomizedSigner, SignatureEncoding},
    RsaPrivateKey,
};
use sha2::{Digest, Sha256};

#[cfg(any(test, feature = "test-util"))]
pub use verify::{parse_signature_header, verify_digest, verify_request, verify_signature_rsa_sha256, SignatureParams};

/// Headers covered by signatures on requests to the collection API.
pub const GET_HEADERS: &[&str] = &["(request-target)", "host", "date"];
pub const POST_HEADERS: &[&str] = &["(request-target)", "host", "date", "digest"];

pub fn build_signing_string(method: &Method, uri: &Uri, headers: &HeaderMap, signed_headers: &[String]) -> Result<String> {
    let mut lines = Vec::with_capacity(signed_headers.len());
    for name in signed_headers {
        if name == "(request-target)" {
            let target = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or_else(|| uri.path());
            lines.push(format!(
                "(request-target): {} {target}",
                method.as_str().to_ascii_lowercase()
            ));
            continue;
        }

        let header_name = http::header::HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("bad signed header name: {name}"))?;
        let value = headers
            .get(&header_name)
            .ok_or_else(|| anyhow!("missing signed header: {name}"))?
            .to_str()
            .with_context(|| format!("invalid header value for {name}"))?;
        lines.push(format!("{name}: {}", value.trim()));
    }
    Ok(lines.join("\n"))
}

pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", B64.encode(Sha256::digest(body)))
}

/// Adds `Date`, `Host`, `Digest` (when there is a body) and `Signature`.
pub fn sign_request_rsa_sha256(
    private_key_pem: &str,
    key_id: &str,
    method: &Method,
    uri: &Uri,
    headers: &mut HeaderMap,
    body: &[u8],
    signed_headers: &[&str],
) -> Result<()> {
    if !headers.contains_key("Date") {
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());
        headers.insert("Date", date.parse().context("set Date")?);
    }

    let signed_headers_lower: Vec<String> = signed_headers.iter().map(|s| s.to_ascii_lowercase()).collect();
    let want_digest = signed_headers_lower.iter().any(|h| h == "digest") || !body.is_empty();
    if want_digest && !headers.contains_key("Digest") {
        headers.insert("Digest", digest_header(body).parse().context("set Digest")?);
    }

    if !headers.contains_key("Host") {
        if let Some(auth) = uri.authority() {
            headers.insert("Host", auth.as_str().parse().context("set Host")?);
        }
    }

    let signing_string = build_signing_string(method, uri, headers, &signed_headers_lower)?;

    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .context("parse private key pem")?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let mut rng = rand::rngs::OsRng;
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    let sig_b64 = B64.encode(signature.to_bytes());

    let headers_list = signed_headers_lower.join(" ");
    let sig_header = format!(
        "keyId=\"{key_id}\",algorithm=\"rsa-sha256\",headers=\"{headers_list}\",signature=\"{sig_b64}\""
    );
    headers.insert("Signature", sig_header.parse().context("set Signature")?);
    Ok(())
}

/// Receiving side of the signature scheme, for fakes that stand in for the
/// collection API.
#[cfg(any(test, feature = "test-util"))]
mod verify {
    use std::collections::HashMap;

    use anyhow::{anyhow, Context, Result};
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    use http::{HeaderMap, Method, Uri};
    use rsa::{pkcs1v15::VerifyingKey, pkcs8::DecodePublicKey, signature::Verifier, RsaPublicKey};
    use sha2::Sha256;

    use super::{build_signing_string, digest_header};

    #[derive(Debug)]
    pub struct SignatureParams {
        pub key_id: String,
        pub headers: Vec<String>,
        pub signature: Vec<u8>,
    }

    pub fn parse_signature_header(value: &str) -> Result<SignatureParams> {
        // keyId="...",algorithm="rsa-sha256",headers="(request-target) host date",signature="..."
        let mut map = HashMap::<String, String>::new();
        for part in value.split(',') {
            let part = part.trim();
            let Some((k, v)) = part.split_once('=') else { continue };
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }

        let key_id = map
            .get("keyId")
            .cloned()
            .ok_or_else(|| anyhow!("Signature missing keyId"))?;
        let headers = map
            .get("headers")
            .cloned()
            .unwrap_or_else(|| "date".to_string());
        let signature_b64 = map
            .get("signature")
            .cloned()
            .ok_or_else(|| anyhow!("Signature missing signature"))?;

        let signature = B64
            .decode(signature_b64.as_bytes())
            .context("decode signature")?;

        Ok(SignatureParams {
            key_id,
            headers: headers
                .split_whitespace()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            signature,
        })
    }

    pub fn verify_digest(headers: &HeaderMap, body: &[u8]) -> Result<()> {
        let digest = headers
            .get("Digest")
            .ok_or_else(|| anyhow!("missing Digest header"))?
            .to_str()
            .context("Digest header not utf8")?;
        if digest.trim() != digest_header(body) {
            return Err(anyhow!("digest mismatch"));
        }
        Ok(())
    }

    pub fn verify_signature_rsa_sha256(public_key_pem: &str, signing_string: &str, signature: &[u8]) -> Result<()> {
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .context("parse public key pem")?;
        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let sig = rsa::pkcs1v15::Signature::try_from(signature)
            .context("invalid rsa signature bytes")?;
        verifying_key
            .verify(signing_string.as_bytes(), &sig)
            .context("signature verify failed")?;
        Ok(())
    }

    /// Checks a `Signature` header produced by [`super::sign_request_rsa_sha256`].
    pub fn verify_request(public_key_pem: &str, method: &Method, uri: &Uri, headers: &HeaderMap) -> Result<String> {
        let raw = headers
            .get("Signature")
            .ok_or_else(|| anyhow!("missing Signature header"))?
            .to_str()
            .context("Signature header not utf8")?;
        let params = parse_signature_header(raw)?;
        let signing_string = build_signing_string(method, uri, headers, &params.headers)?;
        verify_signature_rsa_sha256(public_key_pem, &signing_string, &params.signature)?;
        Ok(params.key_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPublicKey;

    pub(crate) fn test_keypair() -> (String, String) {
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = RsaPublicKey::from(&key)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private_pem, public_pem)
    }

    #[test]
    fn sign_then_verify_post() {
        let (private_pem, public_pem) = test_keypair();
        let uri: Uri = "https://fed.example/actors/alice/outbox?x=1".parse().unwrap();
        let body = br#"{"type":"Like"}"#;
        let mut headers = HeaderMap::new();
        sign_request_rsa_sha256(
            &private_pem,
            "https://fed.example/actors/alice#main-key",
            &Method::POST,
            &uri,
            &mut headers,
            body,
            POST_HEADERS,
        )
        .unwrap();
        assert_eq!(headers.get("Host").unwrap(), "fed.example");
        verify_digest(&headers, body).unwrap();
        let key_id = verify_request(&public_pem, &Method::POST, &uri, &headers).unwrap();
        assert_eq!(key_id, "https://fed.example/actors/alice#main-key");

        assert!(verify_digest(&headers, b"tampered").is_err());
        assert!(verify_request(&public_pem, &Method::GET, &uri, &headers).is_err());
    }

    #[test]
    fn signing_string_layout() {
        let uri: Uri = "https://fed.example/inbox?maxItems=2".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("Host", "fed.example".parse().unwrap());
        headers.insert("Date", "Tue, 07 Jun 2024 20:51:35 GMT".parse().unwrap());
        let s = build_signing_string(
            &Method::GET,
            &uri,
            &headers,
            &GET_HEADERS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .unwrap();
        assert_eq!(
            s,
            "(request-target): get /inbox?maxItems=2\nhost: fed.example\ndate: Tue, 07 Jun 2024 20:51:35 GMT"
        );
    }
}
