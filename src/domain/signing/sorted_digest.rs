//! Sorted-key digest scheme used by aggregator-style gateways.
//!
//! Tag = MD5 over `canonical_string(params) + "&key=" + secret`, hex
//! encoded. Comparison is case-insensitive: some platforms send uppercase
//! digests, some lowercase.

use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};

use super::{canonical_string, constant_time_eq, ParamMap, SignatureScheme, SigningError};

/// Hex casing the gateway expects for outbound tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestCasing {
    /// Aggregator platforms typically require lowercase.
    Lower,

    /// XML-document gateways require uppercase.
    Upper,
}

/// Shared-secret digest scheme.
pub struct SortedDigestScheme {
    secret: SecretString,
    casing: DigestCasing,
}

impl SortedDigestScheme {
    pub fn new(secret: SecretString, casing: DigestCasing) -> Self {
        Self { secret, casing }
    }

    fn digest(&self, params: &ParamMap) -> String {
        let mut payload = canonical_string(params);
        payload.push_str("&key=");
        payload.push_str(self.secret.expose_secret());

        let mut hasher = Md5::new();
        hasher.update(payload.as_bytes());
        let encoded = hex::encode(hasher.finalize());

        match self.casing {
            DigestCasing::Lower => encoded,
            DigestCasing::Upper => encoded.to_uppercase(),
        }
    }
}

impl SignatureScheme for SortedDigestScheme {
    fn sign(&self, params: &ParamMap) -> Result<String, SigningError> {
        Ok(self.digest(params))
    }

    fn verify(&self, params: &ParamMap, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        let expected = self.digest(params).to_lowercase();
        let provided = token.to_lowercase();
        constant_time_eq(expected.as_bytes(), provided.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(casing: DigestCasing) -> SortedDigestScheme {
        SortedDigestScheme::new(SecretString::new("merchant-secret".into()), casing)
    }

    fn params(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn payment_params() -> ParamMap {
        params(&[
            ("out_trade_no", "ORDER20260301120000AB12CD34"),
            ("money", "19.00"),
            ("trade_status", "TRADE_SUCCESS"),
            ("pid", "1001"),
        ])
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let scheme = scheme(DigestCasing::Lower);
        let p = payment_params();

        let token = scheme.sign(&p).unwrap();

        assert!(scheme.verify(&p, &token));
    }

    #[test]
    fn sign_is_deterministic() {
        let scheme = scheme(DigestCasing::Lower);
        let p = payment_params();

        assert_eq!(scheme.sign(&p).unwrap(), scheme.sign(&p).unwrap());
    }

    #[test]
    fn verify_is_case_insensitive() {
        let lower = scheme(DigestCasing::Lower);
        let upper = scheme(DigestCasing::Upper);
        let p = payment_params();

        let token = upper.sign(&p).unwrap();
        assert_eq!(token, token.to_uppercase());
        assert!(lower.verify(&p, &token));
    }

    #[test]
    fn tampered_value_fails_verification() {
        let scheme = scheme(DigestCasing::Lower);
        let p = payment_params();
        let token = scheme.sign(&p).unwrap();

        let mut tampered = p.clone();
        tampered.insert("money".to_string(), "19.01".to_string());

        assert!(!scheme.verify(&tampered, &token));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signer = scheme(DigestCasing::Lower);
        let p = payment_params();
        let token = signer.sign(&p).unwrap();

        let other =
            SortedDigestScheme::new(SecretString::new("other-secret".into()), DigestCasing::Lower);

        assert!(!other.verify(&p, &token));
    }

    #[test]
    fn empty_token_fails_verification() {
        let scheme = scheme(DigestCasing::Lower);
        assert!(!scheme.verify(&payment_params(), ""));
    }

    #[test]
    fn garbage_token_fails_verification() {
        let scheme = scheme(DigestCasing::Lower);
        assert!(!scheme.verify(&payment_params(), "not-a-digest"));
    }

    #[test]
    fn sign_ignores_existing_signature_fields() {
        let scheme = scheme(DigestCasing::Lower);
        let p = payment_params();

        let mut with_sign = p.clone();
        let token = scheme.sign(&p).unwrap();
        with_sign.insert("sign".to_string(), token.clone());
        with_sign.insert("sign_type".to_string(), "MD5".to_string());

        assert_eq!(scheme.sign(&with_sign).unwrap(), token);
        assert!(scheme.verify(&with_sign, &token));
    }
}
