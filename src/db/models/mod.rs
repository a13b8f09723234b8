//! Database models split into separate files.

pub mod appointment;

pub use self::appointment::*;
