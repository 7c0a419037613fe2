use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::routes::helpers::message_response;
use crate::subscription::{SubscriptionError, SubscriptionService};

/// Web query parameters
#[derive(serde::Deserialize)]
pub struct UnsubscribeParameters {
    email: String,
    hash: String,
}

/// Unsubscribe handler
#[tracing::instrument(name = "Unsubscribe request", skip_all)]
pub async fn unsubscribe(
    parameters: web::Query<UnsubscribeParameters>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let UnsubscribeParameters { email, hash } = parameters.into_inner();
    service.unsubscribe(&email, &hash).await?;
    Ok(message_response(StatusCode::OK, "Unsubscribed"))
}
