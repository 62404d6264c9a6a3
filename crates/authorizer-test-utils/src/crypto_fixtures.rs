//! Deterministic signing keys for tests.
//!
//! Keys are Ed25519, derived from a one-byte seed so every test run signs
//! with the same material. The matching public key is published as an `OKP`
//! JWK, the shape the authorizer's key cache consumes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Ed25519 keypair with a key ID.
#[derive(Clone)]
pub struct TestKeypair {
    pub kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a deterministic keypair from `seed`.
    ///
    /// Different seeds give different keys; the same seed always gives the
    /// same key.
    pub fn new(seed: u8, kid: &str) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair =
            Ed25519KeyPair::from_seed_unchecked(&seed_bytes).expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Public key as base64url (the JWK `x` value).
    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.public_key_bytes)
    }

    /// Sign `claims` with an `EdDSA` header naming this key's `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with a caller-supplied header.
    ///
    /// The signature is always Ed25519; `header.alg` should be `EdDSA` unless
    /// the test wants a signature that cannot match the declared algorithm.
    pub fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// JWK for this key with `alg` and `use` set.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": self.public_key_b64(),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// JWK for this key without the optional `alg` and `use` members.
    pub fn bare_jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": self.public_key_b64()
        })
    }
}

/// JWKS document publishing `keys`.
pub fn jwks_json(keys: &[&TestKeypair]) -> serde_json::Value {
    serde_json::json!({
        "keys": keys.iter().map(|key| key.jwk_json()).collect::<Vec<_>>()
    })
}

/// Build a PKCS#8 v1 document for an Ed25519 private key seed.
///
/// `jsonwebtoken`'s `EncodingKey::from_ed_der` expects PKCS#8, while ring
/// only hands out the seed-derived keypair.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // PrivateKey: OCTET STRING { OCTET STRING seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
