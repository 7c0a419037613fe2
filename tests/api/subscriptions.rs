use claim::{assert_none, assert_some};
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, ResponseTemplate};

use postbox::domain::SubscriberStatus;

use crate::helpers::{message_of, TestApp};

#[tokio::test]
async fn subscribe_returns_a_200_for_a_valid_email() {
    let app = TestApp::spawn().await;
    let email: String = SafeEmail().fake();

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.subscribe(&email).await;

    assert_eq!(response.status(), 200);
    let message = message_of(response).await;
    assert!(message.starts_with(&format!("A confirmation email has been sent to {email}.")));
}

#[tokio::test]
async fn subscribe_persists_a_pending_subscriber() {
    let app = TestApp::spawn().await;
    app.accept_all_emails().await;

    app.subscribe("ursula_le_guin@gmail.com").await;

    let saved = assert_some!(app.subscriber("ursula_le_guin@gmail.com").await);
    assert_eq!(saved.status, SubscriberStatus::PendingConfirmation);
    assert_some!(saved.token);
}

#[tokio::test]
async fn subscribe_sends_a_confirmation_email_with_a_link() {
    let app = TestApp::spawn().await;
    app.accept_all_emails().await;

    app.subscribe("ursula_le_guin@gmail.com").await;

    let link = app.last_email_link().await;
    assert_eq!(link.path(), "/subscriptions/confirm");
    let saved = app.subscriber("ursula_le_guin@gmail.com").await.unwrap();
    let token = link
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(token, saved.token.unwrap().as_ref());
}

#[tokio::test]
async fn subscribe_returns_a_400_when_the_email_is_missing_or_invalid() {
    let app = TestApp::spawn().await;
    let test_cases = vec![
        (serde_json::json!({}), "missing the email"),
        (serde_json::json!({ "email": "" }), "empty email"),
        (serde_json::json!({ "email": "definitely-not-an-email" }), "invalid email"),
        (serde_json::json!({ "email": 42 }), "email of the wrong type"),
    ];

    for (body, description) in test_cases {
        let response = app.post_subscriptions(&body).await;

        assert_eq!(
            response.status(),
            400,
            "The API did not fail with 400 Bad Request when the payload was {description}."
        );
    }
    assert_eq!(app.sent_emails().await, 0);
}

#[tokio::test]
async fn subscribing_twice_while_pending_does_not_resend_the_email() {
    let app = TestApp::spawn().await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    app.subscribe("ursula_le_guin@gmail.com").await;
    let response = app.subscribe("ursula_le_guin@gmail.com").await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        message_of(response).await,
        "Your subscription status is pending. Please click the confirmation link in your email."
    );
}

#[tokio::test]
async fn subscribing_an_active_email_returns_a_400() {
    let app = TestApp::spawn().await;
    app.accept_all_emails().await;
    app.create_confirmed_subscriber("ursula_le_guin@gmail.com")
        .await;
    let sent_before = app.sent_emails().await;

    let response = app.subscribe("ursula_le_guin@gmail.com").await;

    assert_eq!(response.status(), 400);
    assert_eq!(
        message_of(response).await,
        "You had been subscribed to this blog already."
    );
    assert_eq!(app.sent_emails().await, sent_before);
    assert_eq!(
        app.status_of("ursula_le_guin@gmail.com").await,
        SubscriberStatus::Active
    );
}

#[tokio::test]
async fn subscribe_fails_without_a_record_if_the_email_cannot_be_sent() {
    let app = TestApp::spawn().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.subscribe("ursula_le_guin@gmail.com").await;

    assert_eq!(response.status(), 500);
    assert_none!(app.subscriber("ursula_le_guin@gmail.com").await);
}

#[tokio::test]
async fn resubscribing_after_unsubscribing_sends_a_new_confirmation_link() {
    let app = TestApp::spawn().await;
    app.accept_all_emails().await;
    let unsubscribe_link = app
        .create_confirmed_subscriber("ursula_le_guin@gmail.com")
        .await;
    app.follow(unsubscribe_link)
        .await
        .error_for_status()
        .unwrap();

    let response = app.subscribe("ursula_le_guin@gmail.com").await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        app.status_of("ursula_le_guin@gmail.com").await,
        SubscriberStatus::PendingConfirmation
    );
    let link = app.last_email_link().await;
    let response = app.follow(link).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        app.status_of("ursula_le_guin@gmail.com").await,
        SubscriberStatus::Active
    );
}
