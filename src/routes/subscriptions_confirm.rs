use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::routes::helpers::message_response;
use crate::subscription::{SubscriptionError, SubscriptionService};

/// Web query parameters
#[derive(serde::Deserialize)]
pub struct ConfirmParameters {
    token: String,
}

/// Subscription confirmation handler
#[tracing::instrument(name = "Confirmation request", skip_all)]
pub async fn confirm(
    parameters: web::Query<ConfirmParameters>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    service.confirm(parameters.into_inner().token).await?;
    Ok(message_response(
        StatusCode::OK,
        format!("Thank you for subscribing to {}.", service.product_name()),
    ))
}
