use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{Config, ConfigError};
use crate::db::models::Appointment;
use crate::error::{AppError, AppResult};
use crate::services::reminders::{ReminderKind, ReminderNotifier};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// SendGrid dynamic-template sender. The same template serves both reminder
/// kinds; it receives the customer name and the review link as template data.
pub struct EmailSender {
    client: reqwest::Client,
    api_key: String,
    from_address: String,
    template_id: String,
}

impl EmailSender {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let api_key = config
            .email
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("SENDGRID_API_KEY".to_string()))?;
        let from_address = config
            .email
            .from_address
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("EMAIL_FROM_ADDRESS".to_string()))?;
        let template_id = config
            .email
            .template_id
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("EMAIL_TEMPLATE_ID".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|_| ConfigError::InvalidValue("HTTP client".to_string()))?;

        Ok(Self {
            client,
            api_key,
            from_address,
            template_id,
        })
    }

    fn payload(&self, appointment: &Appointment, review_url: &str) -> Value {
        json!({
            "from": { "email": self.from_address },
            "template_id": self.template_id,
            "personalizations": [{
                "to": [{ "email": appointment.merchant_email }],
                "dynamic_template_data": {
                    "reviewUrl": review_url,
                    "name": appointment.customer_name,
                },
            }],
        })
    }
}

#[async_trait]
impl ReminderNotifier for EmailSender {
    async fn send(
        &self,
        kind: ReminderKind,
        appointment: &Appointment,
        review_url: &str,
    ) -> AppResult<()> {
        tracing::info!(
            "Sending {} email for appointment {} to {}",
            kind.as_str(),
            appointment.id,
            appointment.merchant_email
        );

        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&self.payload(appointment, review_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Email(format!(
                "SendGrid API error ({}): {}",
                status, error_text
            )));
        }

        tracing::info!(
            "{} email sent for appointment {}: {}",
            kind.as_str(),
            appointment.id,
            response.status()
        );
        Ok(())
    }
}
