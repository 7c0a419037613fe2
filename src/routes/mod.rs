mod healthcheck;
mod helpers;
mod subscriptions;
mod subscriptions_confirm;
mod unsubscribe;

pub use healthcheck::*;
pub use helpers::MessageBody;
pub use subscriptions::*;
pub use subscriptions_confirm::*;
pub use unsubscribe::*;
