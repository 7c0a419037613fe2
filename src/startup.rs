use std::sync::Arc;
use std::{io, net};

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use secrecy::ExposeSecret;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_actix_web::TracingLogger;

use crate::configuration::{DispatchTrigger, NewsletterSettings, Settings};
use crate::delivery_worker::run_worker_until_stopped;
use crate::dispatcher::NewsletterDispatcher;
use crate::email_client::MailTransport;
use crate::event_source::RabbitMqEventSource;
use crate::routes::{confirm, healthcheck, subscribe, unsubscribe};
use crate::scheduler::Scheduler;
use crate::store::SubscriberStore;
use crate::subscription::SubscriptionService;
use crate::token_issuer::RandomTokenIssuer;

/// Application
pub struct Application {
    server: Server,
    port: u16,
    store: Arc<dyn SubscriberStore>,
    mail: Arc<dyn MailTransport>,
}

impl Application {
    /// Build an application based on settings
    pub async fn build(config: Settings) -> anyhow::Result<Self> {
        let store = config.database.store();
        Self::build_with_store(config, store).await
    }

    /// Build an application based on settings and an unopened subscriber store
    pub async fn build_with_store(
        config: Settings,
        store: Arc<dyn SubscriberStore>,
    ) -> anyhow::Result<Self> {
        // Without a store there is no valid degraded mode
        store
            .open()
            .await
            .context("Failed to open the subscriber store")?;

        // Build the email client
        let mail: Arc<dyn MailTransport> = Arc::new(
            config
                .email_client
                .client()
                .context("Invalid email client settings")?,
        );

        let service = SubscriptionService::new(
            Arc::clone(&store),
            Arc::clone(&mail),
            Arc::new(RandomTokenIssuer),
            config.application.link_signer(),
            config.application.base_url,
            config.newsletter.product_name,
        );

        // Run the HTTP server and return its data
        let listener = net::TcpListener::bind(format!(
            "{}:{}",
            config.application.app_host, config.application.app_port
        ))?;
        let port = listener.local_addr()?.port();
        let server = run_server(listener, service)?;
        Ok(Self {
            server,
            port,
            store,
            mail,
        })
    }

    /// Get application port
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Subscriber store shared with the HTTP handlers
    pub fn store(&self) -> Arc<dyn SubscriberStore> {
        Arc::clone(&self.store)
    }

    /// Dispatcher reading from the same store and sending through the same transport
    pub fn dispatcher(&self) -> NewsletterDispatcher {
        NewsletterDispatcher::new(Arc::clone(&self.store), Arc::clone(&self.mail))
    }

    /// Start the configured dispatch trigger
    ///
    /// The store is closed before a startup failure is returned, since the
    /// caller never reaches its own shutdown path.
    pub async fn start_dispatch(
        &self,
        settings: &NewsletterSettings,
        shutdown: &broadcast::Sender<()>,
    ) -> anyhow::Result<DispatchLoop> {
        match DispatchLoop::start(settings, self.dispatcher(), shutdown).await {
            Ok(dispatch) => Ok(dispatch),
            Err(e) => {
                if let Err(close_error) = self.store.close().await {
                    tracing::warn!(
                        error.message = %close_error,
                        "Failed to close the subscriber store"
                    );
                }
                Err(e.context("Failed to start the newsletter dispatch trigger"))
            }
        }
    }

    /// Run application until it is stopped
    pub async fn run_until_stopped(self) -> io::Result<()> {
        self.server.await
    }
}

/// Run the HTTP server
pub fn run_server(listener: net::TcpListener, service: SubscriptionService) -> io::Result<Server> {
    // Prepare data to be added the application context
    let service = web::Data::new(service);

    // Start the HTTP server
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/healthcheck", web::get().to(healthcheck))
            .route("/subscriptions", web::post().to(subscribe))
            .route("/subscriptions/confirm", web::get().to(confirm))
            .route("/unsubscribe", web::get().to(unsubscribe))
            .app_data(service.clone())
    })
    .listen(listener)?
    .run())
}

/// Running dispatch trigger
pub enum DispatchLoop {
    Worker {
        handle: JoinHandle<anyhow::Result<()>>,
        source: Arc<RabbitMqEventSource>,
    },
    Scheduler(Scheduler),
    Disabled,
}

impl DispatchLoop {
    /// Start the dispatch trigger selected in the settings
    ///
    /// The queue worker listens to `shutdown`, the scheduler is stopped by `stop`.
    pub async fn start(
        settings: &NewsletterSettings,
        dispatcher: NewsletterDispatcher,
        shutdown: &broadcast::Sender<()>,
    ) -> anyhow::Result<Self> {
        match settings.trigger {
            DispatchTrigger::Queue => {
                let source = Arc::new(
                    RabbitMqEventSource::connect(settings.queue.uri.expose_secret()).await?,
                );
                let handle = tokio::spawn(run_worker_until_stopped(
                    source.clone(),
                    settings.queue.topic.clone(),
                    dispatcher,
                    shutdown.subscribe(),
                ));
                Ok(Self::Worker { handle, source })
            }
            DispatchTrigger::Schedule => {
                let trigger = settings.schedule.trigger()?;
                let issue = settings.schedule.issue();
                let mut scheduler = Scheduler::new();
                scheduler.start(trigger, move || {
                    let dispatcher = dispatcher.clone();
                    let issue = issue.clone();
                    async move {
                        let result = match issue.load().await {
                            Ok(issue) => dispatcher.dispatch(&issue).await.map(|_| ()),
                            Err(e) => Err(e),
                        };
                        if let Err(e) = result {
                            tracing::error!(
                                error.cause_chain = ?e,
                                error.message = %e,
                                "Scheduled dispatch failed"
                            );
                        }
                    }
                });
                Ok(Self::Scheduler(scheduler))
            }
            DispatchTrigger::Disabled => {
                tracing::info!("Newsletter dispatch is disabled");
                Ok(Self::Disabled)
            }
        }
    }

    /// Wait for the trigger to wind down, letting an in-flight dispatch finish
    pub async fn stop(self) {
        match self {
            Self::Worker { handle, source } => {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(
                        error.cause_chain = ?e,
                        error.message = %e,
                        "Delivery worker failed"
                    ),
                    Err(e) => tracing::error!(error.message = %e, "Delivery worker panicked"),
                }
                if let Err(e) = source.close().await {
                    tracing::warn!(error.message = %e, "Failed to close the event source");
                }
            }
            Self::Scheduler(mut scheduler) => scheduler.stop().await,
            Self::Disabled => {}
        }
    }
}
