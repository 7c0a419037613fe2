use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Sign and verify unsubscribe links without per-link persisted state
#[derive(Clone)]
pub struct LinkSigner {
    secret: SecretString,
}

impl LinkSigner {
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Compute the base64-encoded HMAC-SHA256 of an email address
    pub fn sign(&self, email: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take a key of any size");
        mac.update(email.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Check a supplied hash against the expected one in constant time
    pub fn verify(&self, email: &str, supplied_hash: &str) -> bool {
        let expected = self.sign(email);
        expected.as_bytes().ct_eq(supplied_hash.as_bytes()).into()
    }

    /// Build the query string of an unsubscribe link for an email address
    pub fn unsubscribe_query(&self, email: &str) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("email", email)
            .append_pair("hash", &self.sign(email))
            .finish()
    }
}
