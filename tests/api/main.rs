mod healthcheck;
mod helpers;
mod subscriptions;
