use std::fmt;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Subscription token
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    /// Token length in characters (~190 bits of entropy)
    pub const LENGTH: usize = 32;

    /// Generate a random subscription token using the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut rng = thread_rng();
        Self(
            std::iter::repeat_with(|| rng.sample(Alphanumeric))
                .map(char::from)
                .take(Self::LENGTH)
                .collect(),
        )
    }

    /// Parse subscription token
    pub fn parse(token: String) -> Result<Self, String> {
        let has_valid_length = token.chars().count() == Self::LENGTH;
        let is_alphanumeric = token.chars().all(|c| c.is_ascii_alphanumeric());

        if has_valid_length && is_alphanumeric {
            Ok(Self(token))
        } else {
            Err("The subscription token is malformed".into())
        }
    }
}

impl AsRef<str> for SubscriptionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials: keep them out of logs
impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubscriptionToken(..)")
    }
}
