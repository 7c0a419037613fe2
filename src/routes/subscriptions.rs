use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::routes::helpers::message_response;
use crate::subscription::{SubscribeOutcome, SubscriptionError, SubscriptionService};

/// Subscription request body
#[derive(serde::Deserialize)]
pub struct SubscribeBody {
    email: String,
}

/// Subscriptions handler
#[tracing::instrument(name = "Subscription request", skip_all)]
pub async fn subscribe(
    body: web::Json<SubscribeBody>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let email = body.into_inner().email;
    let response = match service.subscribe(email.clone()).await? {
        SubscribeOutcome::Created => message_response(
            StatusCode::OK,
            format!(
                "A confirmation email has been sent to {email}. \
                Click the link in the email to confirm and activate your subscription. \
                Check your spam folder if you don't see it within a couple of minutes."
            ),
        ),
        SubscribeOutcome::AlreadyPending => message_response(
            StatusCode::OK,
            "Your subscription status is pending. \
            Please click the confirmation link in your email.",
        ),
        SubscribeOutcome::AlreadyActive => message_response(
            StatusCode::BAD_REQUEST,
            format!(
                "You had been subscribed to {} already.",
                service.product_name()
            ),
        ),
    };
    Ok(response)
}
