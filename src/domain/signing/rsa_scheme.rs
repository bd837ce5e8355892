//! Asymmetric scheme used by gateways with RSA2-style signatures.
//!
//! Outbound requests are signed with the merchant private key (PKCS#1 v1.5
//! over SHA-256, base64 output); inbound callbacks are verified against the
//! counterparty's public key. A digest-only comparison is not acceptable
//! here: verification always runs the full signature check unless the
//! scheme was explicitly constructed with
//! [`RsaScheme::sandbox_unverified`], which logs its presence loudly and
//! must never be wired into a production configuration.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::{canonical_string, ParamMap, SignatureScheme, SigningError};

enum CallbackVerifier {
    /// Full signature verification against the counterparty public key.
    Enforced(Box<VerifyingKey<Sha256>>),

    /// Accepts any present token. Sandbox only.
    SandboxUnverified,
}

/// RSA-SHA256 signature scheme.
pub struct RsaScheme {
    signing_key: SigningKey<Sha256>,
    verifier: CallbackVerifier,
}

impl RsaScheme {
    /// Construct a fully verifying scheme from PEM key material.
    ///
    /// Accepts PKCS#8 or PKCS#1 encodings for both keys, since gateway
    /// consoles hand out either depending on how the keypair was generated.
    pub fn new(
        private_key_pem: &str,
        counterparty_public_key_pem: &str,
    ) -> Result<Self, SigningError> {
        let private = parse_private_key(private_key_pem)?;
        let public = parse_public_key(counterparty_public_key_pem)?;

        Ok(Self {
            signing_key: SigningKey::new(private),
            verifier: CallbackVerifier::Enforced(Box::new(VerifyingKey::new(public))),
        })
    }

    /// Construct a scheme that signs normally but skips inbound
    /// verification.
    ///
    /// This exists for sandbox gateways that sign callbacks with rotating
    /// throwaway keys. It is a separate, explicitly named code path; the
    /// production constructor never degrades to this behavior.
    pub fn sandbox_unverified(private_key_pem: &str) -> Result<Self, SigningError> {
        tracing::warn!(
            "RSA callback verification is DISABLED (sandbox_unverified); \
             every inbound signature will be accepted"
        );

        let private = parse_private_key(private_key_pem)?;
        Ok(Self {
            signing_key: SigningKey::new(private),
            verifier: CallbackVerifier::SandboxUnverified,
        })
    }
}

impl SignatureScheme for RsaScheme {
    fn sign(&self, params: &ParamMap) -> Result<String, SigningError> {
        let payload = canonical_string(params);
        let signature = self
            .signing_key
            .try_sign(payload.as_bytes())
            .map_err(|e| SigningError::Signing(e.to_string()))?;

        Ok(BASE64.encode(signature.to_vec()))
    }

    fn verify(&self, params: &ParamMap, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        match &self.verifier {
            CallbackVerifier::SandboxUnverified => {
                tracing::warn!("accepting callback signature without verification (sandbox mode)");
                true
            }
            CallbackVerifier::Enforced(key) => {
                let Ok(raw) = BASE64.decode(token) else {
                    return false;
                };
                let Ok(signature) = Signature::try_from(raw.as_slice()) else {
                    return false;
                };

                let payload = canonical_string(params);
                key.verify(payload.as_bytes(), &signature).is_ok()
            }
        }
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, SigningError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| SigningError::InvalidKey(format!("private key: {}", e)))
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, SigningError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| SigningError::InvalidKey(format!("public key: {}", e)))
}
