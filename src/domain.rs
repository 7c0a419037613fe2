mod email_address;
mod newsletter_issue;
mod subscriber;
mod subscriber_status;
mod subscription_token;

pub use email_address::EmailAddress;
pub use newsletter_issue::NewsletterIssue;
pub use subscriber::Subscriber;
pub use subscriber_status::SubscriberStatus;
pub use subscription_token::SubscriptionToken;
