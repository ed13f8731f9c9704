//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate mapping, reconciliation and validation around repository
//!   calls.
//! - Keep boundary layers decoupled from storage details.

pub mod entity_service;
pub mod error;

pub use entity_service::EntityService;
pub use error::{ServiceError, ServiceResult, ValidationFailure};
