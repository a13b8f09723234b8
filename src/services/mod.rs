pub mod email;
pub mod init;
pub mod reminders;
pub mod sms;
