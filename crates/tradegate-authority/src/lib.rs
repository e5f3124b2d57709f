//! # tradegate-authority
//!
//! Typed REST client for the external OAuth2/UMA policy authority that backs
//! the tradegate authorization manager.
//!
//! The authority (a Keycloak-compatible server) owns all durable state:
//! resources, regex and aggregate policies, permissions, and the policy
//! evaluation engine. This crate only drives its Admin and Protection APIs;
//! it never evaluates anything locally and caches nothing between calls.
//!
//! ## Modules
//!
//! - [`config`] - Authority connection settings
//! - [`client`] - The [`AuthorityClient`] executing Admin/Protection calls
//! - [`token`] - Token grants and local JWT payload inspection
//! - [`types`] - Wire representations of authority objects
//! - [`error`] - Transport and upstream error types

pub mod client;
pub mod config;
pub mod error;
pub mod token;
pub mod types;

pub use client::{AuthorityClient, PolicyKind};
pub use config::AuthoritySettings;
pub use error::AuthorityError;
pub use token::subject_from_token;
pub use types::{
    ClientRepresentation, Decision, EvaluatedSubject, EvaluationResponse, EvaluationResult,
    PermissionRepresentation, PolicyRepresentation, PolicyResult, ResourceRepresentation,
    TokenResponse,
};

/// Type alias for authority call results.
pub type AuthorityResult<T> = Result<T, AuthorityError>;
