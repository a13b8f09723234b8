use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::SqlitePool;

use crate::config::{Config, ReminderConfig};
use crate::db::models::Appointment;
use crate::db::AppointmentRepository;
use crate::error::AppResult;

/// Which of the two reminders is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Initial,
    FollowUp,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Initial => "initial",
            ReminderKind::FollowUp => "follow-up",
        }
    }
}

/// Delivery channel abstraction. Production implementations are the SendGrid
/// and Twilio senders; tests substitute a recording fake.
#[async_trait]
pub trait ReminderNotifier: Send + Sync + 'static {
    async fn send(
        &self,
        kind: ReminderKind,
        appointment: &Appointment,
        review_url: &str,
    ) -> AppResult<()>;
}

/// Summary of one cycle pass, used for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Rows returned by the eligibility fetch.
    pub candidates: usize,
    /// Sends that completed without a delivery error.
    pub sent: usize,
    /// Sends that failed; their rows stay eligible for the next tick.
    pub failed: usize,
    /// Rows not yet past their send threshold.
    pub waiting: usize,
}

/// Orchestrates the two reminder cycles: fetch candidates, evaluate the time
/// threshold per row against a single `now` captured at tick start, then send
/// and mark (or log the remaining wait). Rows are processed sequentially;
/// a delivery failure never aborts the rest of the tick.
pub struct ReminderService {
    pool: SqlitePool,
    notifier: Arc<dyn ReminderNotifier>,
    settings: ReminderConfig,
    frontend_url: String,
}

impl ReminderService {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn ReminderNotifier>, config: &Config) -> Self {
        Self {
            pool,
            notifier,
            settings: config.reminders.clone(),
            frontend_url: config.server.frontend_url.clone(),
        }
    }

    /// One pass of the initial-reminder cycle at the current instant.
    pub async fn run_initial_cycle(&self) -> AppResult<CycleOutcome> {
        self.run_initial_cycle_at(Utc::now().naive_utc()).await
    }

    /// One pass of the follow-up cycle at the current instant.
    pub async fn run_follow_up_cycle(&self) -> AppResult<CycleOutcome> {
        self.run_follow_up_cycle_at(Utc::now().naive_utc()).await
    }

    pub(crate) async fn run_initial_cycle_at(&self, now: NaiveDateTime) -> AppResult<CycleOutcome> {
        tracing::info!("Checking appointments for initial reminders");

        let candidates = AppointmentRepository::find_pending_initial(&self.pool).await?;
        let offset = self.settings.initial_offset_hours;
        self.process_candidates(candidates, ReminderKind::Initial, offset, now)
            .await
    }

    pub(crate) async fn run_follow_up_cycle_at(
        &self,
        now: NaiveDateTime,
    ) -> AppResult<CycleOutcome> {
        tracing::info!("Checking appointments for follow-up reminders");

        let candidates = AppointmentRepository::find_pending_follow_up(&self.pool).await?;
        let offset = self.settings.follow_up_offset_hours;
        self.process_candidates(candidates, ReminderKind::FollowUp, offset, now)
            .await
    }

    async fn process_candidates(
        &self,
        candidates: Vec<Appointment>,
        kind: ReminderKind,
        offset_hours: i64,
        now: NaiveDateTime,
    ) -> AppResult<CycleOutcome> {
        let mut outcome = CycleOutcome {
            candidates: candidates.len(),
            ..Default::default()
        };

        for appointment in candidates {
            let send_at = appointment.appointment_date + Duration::hours(offset_hours);

            if now < send_at {
                outcome.waiting += 1;
                self.log_time_remaining(kind, &appointment.id, send_at, now);
                continue;
            }

            let review_url = self.review_url(&appointment.id);
            match self.notifier.send(kind, &appointment, &review_url).await {
                Ok(()) => {
                    outcome.sent += 1;
                    self.record_sent(kind, &appointment.id, now).await;
                }
                Err(e) => {
                    // Marker stays unset so the row is retried next tick.
                    outcome.failed += 1;
                    tracing::warn!(
                        "Failed to send {} reminder for appointment {}: {:?}",
                        kind.as_str(),
                        appointment.id,
                        e
                    );
                }
            }
        }

        Ok(outcome)
    }

    /// Write the marker for a successful send. A lost conditional update means
    /// an overlapping tick marked the row first; a write failure leaves the
    /// row eligible again, so the same reminder may go out twice. Both are
    /// logged, neither aborts the tick.
    async fn record_sent(&self, kind: ReminderKind, id: &str, now: NaiveDateTime) {
        let marked = match kind {
            ReminderKind::Initial => {
                AppointmentRepository::mark_initial_sent(&self.pool, id, now).await
            }
            ReminderKind::FollowUp => {
                AppointmentRepository::mark_follow_up_sent(&self.pool, id, now).await
            }
        };

        match marked {
            Ok(true) => {
                tracing::info!("{} reminder sent for appointment {}", kind.as_str(), id);
            }
            Ok(false) => {
                tracing::warn!(
                    "{} reminder for appointment {} was already marked by a concurrent tick; \
                     this send was a duplicate",
                    kind.as_str(),
                    id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Sent {} reminder for appointment {} but failed to record it: {:?}; \
                     the row stays eligible and may be re-sent",
                    kind.as_str(),
                    id,
                    e
                );
            }
        }
    }

    fn review_url(&self, appointment_id: &str) -> String {
        format!(
            "{}/review?appointmentId={}",
            self.frontend_url.trim_end_matches('/'),
            appointment_id
        )
    }

    fn log_time_remaining(
        &self,
        kind: ReminderKind,
        id: &str,
        send_at: NaiveDateTime,
        now: NaiveDateTime,
    ) {
        let local_send_at = DateTime::<Utc>::from_naive_utc_and_offset(send_at, Utc)
            .with_timezone(&self.settings.utc_offset);
        tracing::info!(
            "{} reminder for appointment {} will be sent in {} (due {})",
            kind.as_str(),
            id,
            format_remaining(send_at - now),
            local_send_at.format("%Y-%m-%d %H:%M %:z")
        );
    }
}

/// Render a remaining wait as "N min S sec", matching the operator-facing
/// log line format.
fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.num_minutes();
    let seconds = remaining.num_seconds() - minutes * 60;
    format!("{} min {} sec", minutes, seconds)
}
