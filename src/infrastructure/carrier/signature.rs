//! Carrier webhook signatures
//!
//! HMAC-SHA1 keyed with the carrier auth token over the full public URL,
//! followed by form parameters sorted by name as `name` + `value`. Requests
//! that are not form-encoded sign the raw body instead. The result is base64
//! encoded and sent in `X-Carrier-Signature`.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "X-Carrier-Signature";

#[derive(Debug, Clone)]
pub struct SignatureValidator {
    auth_token: String,
    public_base_url: String,
}

impl SignatureValidator {
    pub fn new(auth_token: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Public URL the carrier called, as it signed it
    pub fn full_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.public_base_url, path_and_query)
    }

    /// Bytes covered by the signature
    pub fn signing_payload(url: &str, body: &[u8], is_form: bool) -> Vec<u8> {
        let mut payload = url.as_bytes().to_vec();
        if is_form {
            let mut params: Vec<(String, String)> = url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            params.sort();
            for (name, value) in params {
                payload.extend_from_slice(name.as_bytes());
                payload.extend_from_slice(value.as_bytes());
            }
        } else {
            payload.extend_from_slice(body);
        }
        payload
    }

    fn mac(&self) -> Option<HmacSha1> {
        HmacSha1::new_from_slice(self.auth_token.as_bytes()).ok()
    }

    /// Base64 signature for a request
    pub fn sign(&self, path_and_query: &str, body: &[u8], is_form: bool) -> String {
        let payload = Self::signing_payload(&self.full_url(path_and_query), body, is_form);
        match self.mac() {
            Some(mut mac) => {
                mac.update(&payload);
                STANDARD.encode(mac.finalize().into_bytes())
            }
            None => String::new(),
        }
    }

    /// Constant-time check of a presented signature
    pub fn verify(&self, path_and_query: &str, body: &[u8], is_form: bool, presented: &str) -> bool {
        let Ok(expected) = STANDARD.decode(presented.trim()) else {
            return false;
        };
        let Some(mut mac) = self.mac() else {
            return false;
        };
        mac.update(&Self::signing_payload(
            &self.full_url(path_and_query),
            body,
            is_form,
        ));
        mac.verify_slice(&expected).is_ok()
    }
}
