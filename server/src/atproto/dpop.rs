//! ES256 signing: DPoP proofs and client assertions
//!
//! Keys travel as multibase strings (`z` + base58btc of the P-256 scalar,
//! with or without a multicodec prefix). Proof and assertion JWTs are signed
//! with `jsonwebtoken` over a PKCS#8 export of the key.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand::RngCore;
use serde::Serialize;

use crate::atproto::error::XrpcError;

/// A P-256 signing key with its multibase form retained for persistence.
pub struct SigningKey {
    secret: SecretKey,
    multibase: String,
}

impl SigningKey {
    /// Parse a multibase-encoded private key. Accepts the bare 32-byte
    /// scalar and the multicodec-prefixed form.
    pub fn from_multibase(multibase: &str) -> Result<Self, XrpcError> {
        let encoded = multibase
            .strip_prefix('z')
            .ok_or_else(|| XrpcError::Key("multibase key must start with 'z'".into()))?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| XrpcError::Key(format!("base58 decode failed: {e}")))?;
        let scalar = match bytes.len() {
            32 => &bytes[..],
            34 => &bytes[2..],
            n => return Err(XrpcError::Key(format!("unexpected key length {n}"))),
        };
        let secret = SecretKey::from_slice(scalar)
            .map_err(|e| XrpcError::Key(format!("invalid P-256 scalar: {e}")))?;
        Ok(Self {
            secret,
            multibase: multibase.to_string(),
        })
    }

    /// Generate a fresh key (one per OAuth session).
    pub fn generate() -> Self {
        let mut scalar = [0u8; 32];
        loop {
            rand::thread_rng().fill_bytes(&mut scalar);
            if let Ok(secret) = SecretKey::from_slice(&scalar) {
                let multibase = format!("z{}", bs58::encode(scalar).into_string());
                return Self { secret, multibase };
            }
        }
    }

    pub fn multibase(&self) -> &str {
        &self.multibase
    }

    /// The public half as a JWK object.
    pub fn public_jwk(&self, kid: Option<&str>) -> serde_json::Value {
        let point = self.secret.public_key().to_encoded_point(false);
        let x = URL_SAFE_NO_PAD.encode(point.x().expect("uncompressed point has x"));
        let y = URL_SAFE_NO_PAD.encode(point.y().expect("uncompressed point has y"));
        let mut jwk = serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": x,
            "y": y,
            "alg": "ES256",
            "use": "sig",
        });
        if let Some(kid) = kid {
            jwk["kid"] = serde_json::Value::String(kid.to_string());
        }
        jwk
    }

    fn encoding_key(&self) -> Result<EncodingKey, XrpcError> {
        let der = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| XrpcError::Key(format!("pkcs8 export failed: {e}")))?;
        Ok(EncodingKey::from_ec_der(der.as_bytes()))
    }

    fn sign<C: Serialize>(&self, header: &Header, claims: &C) -> Result<String, XrpcError> {
        jsonwebtoken::encode(header, claims, &self.encoding_key()?)
            .map_err(|e| XrpcError::Key(format!("jwt signing failed: {e}")))
    }
}

#[derive(Serialize)]
struct DpopClaims<'a> {
    jti: String,
    htm: &'a str,
    htu: &'a str,
    iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
}

/// Build a DPoP proof JWT for one request.
///
/// `access_token`, when present, is hashed into the `ath` claim (resource
/// server proofs). `iss` names the authorization server (token endpoint
/// proofs).
pub fn dpop_proof(
    key: &SigningKey,
    htm: &str,
    htu: &str,
    nonce: Option<&str>,
    access_token: Option<&str>,
    iss: Option<&str>,
) -> Result<String, XrpcError> {
    let mut header = Header::new(Algorithm::ES256);
    header.typ = Some("dpop+jwt".to_string());
    let jwk = serde_json::from_value(key.public_jwk(None))
        .map_err(|e| XrpcError::Key(format!("jwk shape error: {e}")))?;
    header.jwk = Some(jwk);

    let ath = access_token.map(|token| {
        use sha2::{Digest, Sha256};
        URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
    });
    let claims = DpopClaims {
        jti: random_token(16),
        htm,
        htu,
        iat: chrono::Utc::now().timestamp(),
        nonce,
        ath,
        iss,
    };
    key.sign(&header, &claims)
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Build a `private_key_jwt` client assertion for the authorization server.
pub fn client_assertion(
    key: &SigningKey,
    kid: &str,
    client_id: &str,
    audience: &str,
) -> Result<String, XrpcError> {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(kid.to_string());
    let now = chrono::Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: client_id,
        sub: client_id,
        aud: audience,
        jti: random_token(16),
        iat: now,
        exp: now + 300,
    };
    key.sign(&header, &claims)
}

/// Url-safe random token of `bytes` entropy bytes.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// PKCE verifier and its S256 challenge.
pub fn pkce_pair() -> (String, String) {
    use sha2::{Digest, Sha256};
    let verifier = random_token(32);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_segment(jwt: &str, index: usize) -> serde_json::Value {
        let segment = jwt.split('.').nth(index).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[test]
    fn multibase_round_trips() {
        let key = SigningKey::generate();
        let parsed = SigningKey::from_multibase(key.multibase()).unwrap();
        assert_eq!(
            parsed.public_jwk(None)["x"],
            key.public_jwk(None)["x"],
        );
    }

    #[test]
    fn multibase_rejects_garbage() {
        assert!(SigningKey::from_multibase("not-multibase").is_err());
        assert!(SigningKey::from_multibase("zzzz").is_err());
    }

    #[test]
    fn dpop_proof_carries_jwk_and_claims() {
        let key = SigningKey::generate();
        let proof = dpop_proof(
            &key,
            "POST",
            "https://pds.test/xrpc/com.atproto.repo.createRecord",
            Some("server-nonce"),
            Some("the-access-token"),
            None,
        )
        .unwrap();

        let header = decode_segment(&proof, 0);
        assert_eq!(header["typ"], "dpop+jwt");
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["crv"], "P-256");

        let claims = decode_segment(&proof, 1);
        assert_eq!(claims["htm"], "POST");
        assert_eq!(claims["nonce"], "server-nonce");
        assert!(claims["ath"].is_string());
        assert!(claims.get("iss").is_none());
    }

    #[test]
    fn client_assertion_binds_client_and_audience() {
        let key = SigningKey::generate();
        let jwt = client_assertion(&key, "key-1", "https://app.test/meta.json", "https://auth.test")
            .unwrap();
        let header = decode_segment(&jwt, 0);
        assert_eq!(header["kid"], "key-1");
        let claims = decode_segment(&jwt, 1);
        assert_eq!(claims["iss"], "https://app.test/meta.json");
        assert_eq!(claims["sub"], "https://app.test/meta.json");
        assert_eq!(claims["aud"], "https://auth.test");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn pkce_challenge_is_s256_of_verifier() {
        use sha2::{Digest, Sha256};
        let (verifier, challenge) = pkce_pair();
        assert_eq!(
            challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
        );
    }
}
