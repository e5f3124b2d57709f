//! Wire representations of authority objects.
//!
//! Field names follow the authority's JSON (camelCase, `_id` on resources).
//! Only the fields the manager actually reads are modelled; everything else
//! is ignored on deserialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response of the token endpoint for any grant type.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The issued access token (PAT, admin token or RPT depending on grant).
    #[serde(default)]
    pub access_token: String,

    /// Token type, usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Refresh token, when the grant produces one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A client registered in the realm.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRepresentation {
    /// Internal UUID of the client.
    pub id: String,

    /// The public client id.
    #[serde(rename = "clientId")]
    pub client_id: String,
}

/// A protected resource of the resource server.
///
/// One resource exists per distinct (canonically encoded) resource URL; its
/// `name` and single URI both carry that encoded URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRepresentation {
    /// Internal UUID. The authority serializes it as `_id`.
    #[serde(rename = "_id")]
    pub id: String,

    /// Resource name (the canonically encoded resource URL).
    #[serde(default)]
    pub name: String,

    /// URIs the resource covers.
    #[serde(default)]
    pub uris: Vec<String>,
}

/// A policy object (regex or aggregate) of the resource server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRepresentation {
    /// Internal UUID.
    #[serde(default)]
    pub id: String,

    /// Policy name. Regex policies are named `claim|value`; aggregate
    /// policies carry the full rule signature.
    #[serde(default)]
    pub name: String,

    /// Free-text description. Aggregate policies pack the contract CSV and
    /// registration timestamp here.
    #[serde(default)]
    pub description: String,

    /// Policy type as reported by the authority.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A resource-type permission of the resource server.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRepresentation {
    /// Internal UUID.
    pub id: String,

    /// Permission name (the canonically encoded resource URL).
    #[serde(default)]
    pub name: String,
}

/// Outcome of a single policy during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Decision {
    /// The policy granted access.
    #[serde(rename = "PERMIT")]
    Permit,
    /// The policy denied access.
    #[serde(rename = "DENY")]
    Deny,
}

/// One policy result within an evaluation, possibly nesting the results of
/// its constituent policies.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyResult {
    /// The evaluated policy.
    pub policy: PolicyRepresentation,

    /// Outcome for this policy.
    #[serde(default)]
    pub status: Option<Decision>,

    /// Results of the policies aggregated by this one.
    #[serde(default, rename = "associatedPolicies")]
    pub associated_policies: Vec<PolicyResult>,
}

/// Per-resource entry of an evaluation response.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationResult {
    /// Policy results for the evaluated resource. With a single resource and
    /// its single permission this list has one entry whose
    /// `associated_policies` are the aggregate policies of that permission.
    #[serde(default)]
    pub policies: Vec<PolicyResult>,
}

/// The subject attributes the authority resolved while simulating the
/// requesting party token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluatedSubject {
    /// Subject's user identifier claim.
    #[serde(default)]
    pub user: Option<String>,

    /// Subject's organisation claim (comma-separated memberships).
    #[serde(default)]
    pub org: Option<String>,

    /// Subject's authenticator assurance level claim.
    #[serde(default)]
    pub aal: Option<String>,

    /// Remaining token claims, untouched.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Response of the policy evaluation simulation.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationResponse {
    /// Per-resource results.
    #[serde(default)]
    pub results: Vec<EvaluationResult>,

    /// The simulated requesting party token's claims.
    #[serde(default)]
    pub rpt: EvaluatedSubject,
}
