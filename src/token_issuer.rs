use crate::domain::SubscriptionToken;

/// Source of confirmation tokens
pub trait TokenIssuer: Send + Sync {
    /// Issue a fresh token that is infeasible to guess
    fn issue(&self) -> SubscriptionToken;
}

/// Token issuer backed by the thread-local CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenIssuer;

impl TokenIssuer for RandomTokenIssuer {
    fn issue(&self) -> SubscriptionToken {
        SubscriptionToken::generate()
    }
}
