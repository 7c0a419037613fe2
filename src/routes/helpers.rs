use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::subscription::SubscriptionError;

/// JSON body of every response
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// Build a JSON `{"message": ...}` response
pub fn message_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(MessageBody {
        message: message.into(),
    })
}

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid(_) | Self::InvalidLink => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal causes only go to the logs
        let message = match self {
            Self::UnexpectedError(_) => "Something went wrong, please try again later.".to_string(),
            other => other.to_string(),
        };
        message_response(self.status_code(), message)
    }
}
