//! HTTP handlers shared by every service.

pub mod health;

pub use health::{HealthBody, router as health_router};
