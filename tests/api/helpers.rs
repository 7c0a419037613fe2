use std::sync::Arc;
use std::{env, io, sync};

use linkify::{LinkFinder, LinkKind};
use reqwest::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use postbox::configuration::{DispatchTrigger, Settings, StoreBackend};
use postbox::domain::{Subscriber, SubscriberStatus};
use postbox::link_signer::LinkSigner;
use postbox::routes::MessageBody;
use postbox::startup::Application;
use postbox::store::SubscriberStore;
use postbox::telemetry::{get_subscriber, init_subscriber};

/// Ensure the tracing stack is initialized only once
static TRACING: sync::LazyLock<()> = sync::LazyLock::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    if env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(
            subscriber_name,
            default_filter_level,
            io::stdout,
        ));
    } else {
        init_subscriber(get_subscriber(
            subscriber_name,
            default_filter_level,
            io::sink,
        ));
    };
});

/// Test application data
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub email_server: MockServer,
    pub store: Arc<dyn SubscriberStore>,
    pub link_signer: LinkSigner,
    pub api_client: reqwest::Client,
}

impl TestApp {
    /// Spin up a test application backed by an in-memory store and return its data
    pub async fn spawn() -> Self {
        // Initialize logging
        sync::LazyLock::force(&TRACING);

        // Launch a mock server to stand in for Postmark's API
        let email_server = MockServer::start().await;

        // Get settings and modify them for testing
        let config = {
            let mut c = Settings::get_config().expect("Failed to read configuration");
            // Listen on a random TCP port
            c.application.app_host = "127.0.0.1".to_string();
            c.application.app_port = 0;
            c.application.base_url = "http://127.0.0.1".to_string();
            // Keep subscribers in memory
            c.database.backend = StoreBackend::Memory;
            // Use the mock server as email API
            c.email_client.base_url = email_server.uri();
            c.newsletter.trigger = DispatchTrigger::Disabled;
            c
        };
        let link_signer = config.application.link_signer();

        // Build the application and get its address
        let app = Application::build(config)
            .await
            .expect("Failed to build application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{port}");
        let store = app.store();

        // Run the application and return its data
        #[allow(clippy::let_underscore_future)]
        let _ = tokio::spawn(app.run_until_stopped());
        Self {
            address,
            port,
            email_server,
            store,
            link_signer,
            api_client: reqwest::Client::new(),
        }
    }

    /// POST a JSON body to the subscriptions endpoint
    pub async fn post_subscriptions(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/subscriptions", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Subscribe an email address through the public API
    pub async fn subscribe(&self, email: &str) -> reqwest::Response {
        self.post_subscriptions(&serde_json::json!({ "email": email }))
            .await
    }

    /// GET the confirmation endpoint with a raw query string
    pub async fn get_confirm(&self, query: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/subscriptions/confirm{query}", &self.address))
            .send()
            .await
            .expect("Failed to send request")
    }

    /// GET the unsubscribe endpoint with properly encoded parameters
    pub async fn get_unsubscribe(&self, email: &str, hash: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/unsubscribe", &self.address))
            .query(&[("email", email), ("hash", hash)])
            .send()
            .await
            .expect("Failed to send request")
    }

    /// GET a link extracted from an email
    pub async fn follow(&self, link: Url) -> reqwest::Response {
        self.api_client
            .get(link)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Extract the link embedded in a request to the email API
    pub fn email_link(&self, email_request: &wiremock::Request) -> Url {
        // Parse the request body as JSON
        let body: serde_json::Value = serde_json::from_slice(&email_request.body).unwrap();

        // Extract the link
        let links: Vec<_> = LinkFinder::new()
            .links(body["HtmlBody"].as_str().unwrap())
            .filter(|l| *l.kind() == LinkKind::Url)
            .collect();
        assert_eq!(links.len(), 1);
        let mut link = Url::parse(links[0].as_str()).unwrap();
        assert_eq!(link.host_str().unwrap(), "127.0.0.1");
        link.set_port(Some(self.port)).unwrap();
        link
    }

    /// Link carried by the most recent email sent to the API
    pub async fn last_email_link(&self) -> Url {
        let email_request = self
            .email_server
            .received_requests()
            .await
            .unwrap()
            .pop()
            .unwrap();
        self.email_link(&email_request)
    }

    /// Number of requests received by the email API so far
    pub async fn sent_emails(&self) -> usize {
        self.email_server.received_requests().await.unwrap().len()
    }

    /// Let the email API accept every request
    pub async fn accept_all_emails(&self) {
        Mock::given(path("/email"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.email_server)
            .await;
    }

    /// Create an unconfirmed subscriber using the public API and return its confirmation link
    pub async fn create_unconfirmed_subscriber(&self, email: &str) -> Url {
        self.subscribe(email).await.error_for_status().unwrap();
        self.last_email_link().await
    }

    /// Create a confirmed subscriber using the public API and return its unsubscribe link
    pub async fn create_confirmed_subscriber(&self, email: &str) -> Url {
        let confirmation_link = self.create_unconfirmed_subscriber(email).await;
        self.follow(confirmation_link)
            .await
            .error_for_status()
            .unwrap();
        self.last_email_link().await
    }

    /// Stored record for an email address
    pub async fn subscriber(&self, email: &str) -> Option<Subscriber> {
        self.store.find_by_email(email).await.unwrap()
    }

    /// Stored status for an email address that must exist
    pub async fn status_of(&self, email: &str) -> SubscriberStatus {
        self.subscriber(email).await.unwrap().status
    }
}

/// Extract the message from a JSON response
pub async fn message_of(response: reqwest::Response) -> String {
    response.json::<MessageBody>().await.unwrap().message
}
