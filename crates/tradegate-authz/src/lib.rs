//! # tradegate-authz
//!
//! Attribute-based access rule management for data-trade connectors, built
//! on the primitives of an external OAuth2/UMA policy authority.
//!
//! A rule says "this subject (by user / org / assurance-level / extra claim)
//! may fetch this resource URL, optionally under a commercial contract". The
//! authority only knows atomic claim-regex policies, aggregate policies and
//! resource permissions, so rules are encoded into those objects:
//!
//! - one **resource** and one **permission** per resource URL,
//! - one **regex policy** per distinct `claim|value` constraint (shared),
//! - one **aggregate policy** per rule signature (AND over its claims),
//! - the permission OR-ing the aggregate policies that currently grant
//!   access.
//!
//! The crate registers and deletes such rules, garbage-collects policy
//! objects once unreferenced, and runs the request-time confirmation flow
//! that turns a subject token plus resource URL into a permit/deny decision
//! and the matching contract.
//!
//! ## Modules
//!
//! - [`codec`] - rule signature / description string codec
//! - [`manager`] - rule registration, deletion and listing
//! - [`cleanup`] - reference-counted deletion of detached policies
//! - [`confirm`] - the authorization confirmation flow
//! - [`service`] - the `{status, content}` surface for the REST layer
//! - [`error`] - caller-facing error taxonomy

pub mod cleanup;
pub mod codec;
pub mod confirm;
pub mod error;
pub mod manager;
pub mod service;

pub use codec::{Claim, Contract, DecodedRule, RuleAttributes};
pub use error::AuthzError;
pub use manager::{Assignee, AuthorizationEntry, PermissionView, RuleSelector};
pub use service::{AuthzService, ServiceReply};

/// Type alias for rule-management results.
pub type AuthzResult<T> = Result<T, AuthzError>;
