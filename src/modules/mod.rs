pub mod admin;
pub mod registration;
pub mod student;
pub mod uploads;
