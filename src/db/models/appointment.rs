use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An appointment joined with the contact fields of its merchant.
///
/// Rows are created and updated by the booking system; the reminder service
/// only ever writes `initial_sent_at` and `follow_up_sent_at`. `opened_at`
/// is written by the review front-end when the customer follows the link.
/// All timestamps are naive UTC.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Appointment {
    /// Primary key (UUID)
    pub id: String,

    /// Customer display name, interpolated into the message body.
    pub customer_name: String,

    /// Customer phone number in E.164 form. Only present for bookings taken
    /// with a phone contact; required by the SMS channel.
    pub phone_number: Option<String>,

    /// When the appointment took place.
    pub appointment_date: NaiveDateTime,

    /// Set once the initial reminder has been delivered.
    pub initial_sent_at: Option<NaiveDateTime>,

    /// Set externally when the customer opens the review link.
    pub opened_at: Option<NaiveDateTime>,

    /// Set once the follow-up reminder has been delivered. Only ever set on
    /// rows whose `initial_sent_at` is already set.
    pub follow_up_sent_at: Option<NaiveDateTime>,

    /// Merchant contact fields (joined from `merchants`).
    pub merchant_email: String,
    pub merchant_name: String,
}
