//! `gatehouse-core`: identifiers and the error taxonomy shared by every layer.
//!
//! This crate contains no IO and no framework code.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult, FieldError};
pub use id::{DeadLetterId, JobId, UserId};
