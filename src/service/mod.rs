//! Service layer for the tictac-parlor service
//!
//! This module contains the application state, service coordination,
//! health checks and background task management.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceComponents, ServiceError};
pub use health::{HealthCheck, HealthStatus};
