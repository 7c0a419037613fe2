use std::future::Future;
use std::path::PathBuf;
use std::time;

use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone, Weekday};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::NewsletterIssue;

const WEEK: time::Duration = time::Duration::from_secs(7 * 24 * 60 * 60);

/// Fixed instant of the week, e.g. Saturday 07:00
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyTrigger {
    weekday: Weekday,
    time: NaiveTime,
}

impl WeeklyTrigger {
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> anyhow::Result<Self> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .with_context(|| format!("{hour:02}:{minute:02} is not a valid time of day"))?;
        Ok(Self { weekday, time })
    }

    /// Next occurrence strictly after `now`, in the time zone of `now`
    ///
    /// Occurrences falling in a DST gap are skipped to the following week.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let today = now.date_naive();
        (0..=14)
            .map(|days| today + Duration::days(days))
            .filter(|date| date.weekday() == self.weekday)
            .filter_map(|date| {
                now.timezone()
                    .from_local_datetime(&date.and_time(self.time))
                    .earliest()
            })
            .find(|candidate| candidate > now)
            .unwrap_or_else(|| now.clone() + Duration::weeks(1))
    }

    /// Time left until the next occurrence in local time
    pub fn delay_from_now(&self) -> time::Duration {
        let now = Local::now();
        (self.next_after(&now) - now).to_std().unwrap_or_default()
    }
}

/// Weekly ticker firing an async callback
///
/// Ticks never overlap, a tick missed while the callback runs is delayed
/// instead of bursting, and `stop` waits for an in-flight callback.
pub struct Scheduler {
    shutdown: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shutdown,
            handle: None,
        }
    }

    /// Fire `callback` at the next occurrence of `trigger`, then every 7 days
    pub fn start<F, Fut>(&mut self, trigger: WeeklyTrigger, callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = trigger.delay_from_now();
        tracing::info!(
            weekday = %trigger.weekday,
            time = %trigger.time,
            first_tick_in_secs = delay.as_secs(),
            "Starting weekly scheduler"
        );
        self.start_with_delay(delay, WEEK, callback);
    }

    fn start_with_delay<F, Fut>(
        &mut self,
        delay: time::Duration,
        period: time::Duration,
        mut callback: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.handle.is_some() {
            tracing::warn!("Scheduler already running");
            return;
        }

        let mut shutdown = self.shutdown.subscribe();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {}
                }
                callback().await;
            }
            tracing::info!("Scheduler stopped");
        }));
    }

    /// Stop ticking and wait for an in-flight callback to return
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.shutdown.send(());
        if let Err(e) = handle.await {
            tracing::error!(error.message = %e, "Scheduler task failed");
        }
    }
}

/// Issue sent on every scheduled tick, with a body read from disk
#[derive(Debug, Clone)]
pub struct ScheduledIssue {
    pub subject: String,
    pub content_path: PathBuf,
}

impl ScheduledIssue {
    /// Read the current content, so it can change between ticks
    pub async fn load(&self) -> anyhow::Result<NewsletterIssue> {
        let body = tokio::fs::read_to_string(&self.content_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read the newsletter content from {}",
                    self.content_path.display()
                )
            })?;
        if body.trim().is_empty() {
            anyhow::bail!("The newsletter content at {} is empty", self.content_path.display());
        }
        Ok(NewsletterIssue {
            subject: self.subject.clone(),
            body,
        })
    }
}
