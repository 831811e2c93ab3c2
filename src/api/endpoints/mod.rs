//! API endpoint handlers, one module per resource.

pub mod accounts;
pub mod appointments;
pub mod auth;
pub mod clinics;
pub mod health;
pub mod maintenance;
pub mod patients;
pub mod records;
pub mod reviews;
pub mod rooms;
pub mod webhook;
