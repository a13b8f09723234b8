use async_trait::async_trait;

use crate::config::{Config, ConfigError};
use crate::db::models::Appointment;
use crate::error::{AppError, AppResult};
use crate::services::reminders::{ReminderKind, ReminderNotifier};

/// Twilio SMS sender. Message bodies carry the customer name, the review link
/// and the appointment id so replies can be matched back to a booking.
pub struct SmsSender {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl SmsSender {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let account_sid = config
            .sms
            .account_sid
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("TWILIO_ACCOUNT_SID".to_string()))?;
        let auth_token = config
            .sms
            .auth_token
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("TWILIO_AUTH_TOKEN".to_string()))?;
        let from_number = config
            .sms
            .from_number
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("TWILIO_FROM_NUMBER".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|_| ConfigError::InvalidValue("HTTP client".to_string()))?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            from_number,
        })
    }

    fn api_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }
}

fn message_body(kind: ReminderKind, appointment: &Appointment, review_url: &str) -> String {
    match kind {
        ReminderKind::Initial => format!(
            "Hi {}, thanks for visiting {}! We'd love your feedback: {} (ref {})",
            appointment.customer_name,
            appointment.merchant_name,
            review_url,
            appointment.id
        ),
        ReminderKind::FollowUp => format!(
            "Hi {}, just a reminder from {} - your review link is still open: {} (ref {})",
            appointment.customer_name,
            appointment.merchant_name,
            review_url,
            appointment.id
        ),
    }
}

#[async_trait]
impl ReminderNotifier for SmsSender {
    async fn send(
        &self,
        kind: ReminderKind,
        appointment: &Appointment,
        review_url: &str,
    ) -> AppResult<()> {
        let to = appointment.phone_number.as_deref().ok_or_else(|| {
            AppError::Sms(format!(
                "Appointment {} has no phone number",
                appointment.id
            ))
        })?;

        tracing::info!(
            "Sending {} SMS for appointment {} to {}",
            kind.as_str(),
            appointment.id,
            to
        );

        let body = message_body(kind, appointment, review_url);
        let form = [
            ("From", self.from_number.as_str()),
            ("To", to),
            ("Body", body.as_str()),
        ];

        let response = self
            .client
            .post(self.api_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Sms(format!(
                "Twilio API error ({}): {}",
                status, error_text
            )));
        }

        tracing::info!(
            "{} SMS sent for appointment {}: {}",
            kind.as_str(),
            appointment.id,
            response.status()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn appointment(phone: Option<&str>) -> Appointment {
        Appointment {
            id: "appt-1".to_string(),
            customer_name: "Ayesha".to_string(),
            phone_number: phone.map(|p| p.to_string()),
            appointment_date: Utc::now().naive_utc(),
            initial_sent_at: None,
            opened_at: None,
            follow_up_sent_at: None,
            merchant_email: "owner@glowsalon.test".to_string(),
            merchant_name: "Glow Salon".to_string(),
        }
    }

    #[test]
    fn body_interpolates_name_link_and_id() {
        let body = message_body(
            ReminderKind::Initial,
            &appointment(Some("+15550100")),
            "http://localhost:3000/review?appointmentId=appt-1",
        );
        assert!(body.contains("Ayesha"));
        assert!(body.contains("Glow Salon"));
        assert!(body.contains("review?appointmentId=appt-1"));
        assert!(body.contains("(ref appt-1)"));
    }

    #[test]
    fn follow_up_body_differs_from_initial() {
        let appt = appointment(Some("+15550100"));
        let url = "http://localhost:3000/review?appointmentId=appt-1";
        assert_ne!(
            message_body(ReminderKind::Initial, &appt, url),
            message_body(ReminderKind::FollowUp, &appt, url)
        );
    }

    #[tokio::test]
    async fn missing_phone_number_is_a_delivery_error() {
        let sender = SmsSender {
            client: reqwest::Client::new(),
            account_sid: "AC_test".to_string(),
            auth_token: "token".to_string(),
            from_number: "+15550000".to_string(),
        };

        let err = sender
            .send(
                ReminderKind::Initial,
                &appointment(None),
                "http://localhost:3000/review?appointmentId=appt-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Sms(_)));
    }
}
