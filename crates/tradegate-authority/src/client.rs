//! The authority REST client.
//!
//! [`AuthorityClient`] executes every Admin/Protection API call the
//! authorization manager needs: token grants, resource and policy CRUD,
//! permission CRUD, association/dependency traversal and the policy
//! evaluation simulation.
//!
//! Every method performs exactly one HTTP round trip with the configured
//! timeout; there are no retries and no caching. A non-2xx answer becomes
//! [`AuthorityError::Upstream`] with the body kept verbatim.

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::AuthoritySettings;
use crate::error::AuthorityError;
use crate::types::{
    ClientRepresentation, EvaluationResponse, PermissionRepresentation, PolicyRepresentation,
    ResourceRepresentation, TokenResponse,
};

/// Policy types the resource server materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Atomic claim-matching policy.
    Regex,
    /// Conjunction of atomic policies (UNANIMOUS strategy).
    Aggregate,
}

impl PolicyKind {
    /// Path segment used by the authority for this policy type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Aggregate => "aggregate",
        }
    }
}

/// Client for the authority's Admin and Protection REST APIs.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http: reqwest::Client,
    settings: AuthoritySettings,
}

impl AuthorityClient {
    /// Builds a client with the configured request timeout.
    ///
    /// A plain-HTTP base URL is rejected unless the settings opt in with
    /// `allow_http`: every call carries a credential of some kind.
    pub fn new(settings: AuthoritySettings) -> Result<Self, AuthorityError> {
        if settings.base_url.scheme() != "https" && !settings.allow_http {
            return Err(AuthorityError::Configuration(format!(
                "refusing {} base URL without allow_http",
                settings.base_url.scheme()
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AuthorityError::Configuration(e.to_string()))?;
        Ok(Self { http, settings })
    }

    /// The settings this client was built with.
    #[must_use]
    pub fn settings(&self) -> &AuthoritySettings {
        &self.settings
    }

    fn realm_url(&self, tail: &str) -> String {
        format!(
            "{}/realms/{}/{tail}",
            self.settings.base(),
            self.settings.realm
        )
    }

    fn admin_url(&self, tail: &str) -> String {
        format!(
            "{}/admin/realms/{}/{tail}",
            self.settings.base(),
            self.settings.realm
        )
    }

    fn resource_server_url(&self, client_uuid: &str, tail: &str) -> String {
        self.admin_url(&format!(
            "clients/{client_uuid}/authz/resource-server/{tail}"
        ))
    }

    // ----- Token grants -----

    /// Obtains a Protection API Token via the client-credentials grant.
    pub async fn obtain_pat(&self) -> Result<String, AuthorityError> {
        tracing::debug!("requesting protection api token");
        let response = self
            .http
            .post(self.realm_url("protocol/openid-connect/token"))
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        access_token(response).await
    }

    /// Obtains an admin token via the password grant on the master realm.
    pub async fn admin_token(&self) -> Result<String, AuthorityError> {
        tracing::debug!("requesting admin token");
        let response = self
            .http
            .post(format!(
                "{}/realms/master/protocol/openid-connect/token",
                self.settings.base()
            ))
            .form(&[
                ("client_id", self.settings.admin_client_id.as_str()),
                ("username", self.settings.admin_username.as_str()),
                ("password", self.settings.admin_password.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .await?;
        access_token(response).await
    }

    /// Requests a UMA ticket for one resource with the subject's own token,
    /// returning the requesting party token on success.
    pub async fn uma_ticket(
        &self,
        subject_token: &str,
        resource_id: &str,
    ) -> Result<String, AuthorityError> {
        tracing::debug!(resource_id, "requesting uma ticket");
        let response = self
            .http
            .post(self.realm_url("protocol/openid-connect/token"))
            .bearer_auth(subject_token)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:uma-ticket"),
                ("permission", resource_id),
                ("audience", self.settings.client_id.as_str()),
            ])
            .send()
            .await?;
        access_token(response).await
    }

    // ----- Protection API -----

    /// Resolves the resource ids registered for a canonically encoded
    /// resource URL via the Protection API.
    pub async fn resource_ids_by_uri(
        &self,
        pat: &str,
        canonical_url: &str,
    ) -> Result<Vec<String>, AuthorityError> {
        let response = self
            .http
            .get(self.realm_url("authz/protection/resource_set"))
            .query(&[("uri", canonical_url)])
            .bearer_auth(pat)
            .send()
            .await?;
        expect_json(response).await
    }

    // ----- Admin API: clients -----

    /// Resolves the internal UUID of the configured resource-server client.
    pub async fn client_uuid(&self, admin_token: &str) -> Result<String, AuthorityError> {
        let response = self
            .http
            .get(self.admin_url("clients"))
            .bearer_auth(admin_token)
            .send()
            .await?;
        let clients: Vec<ClientRepresentation> = expect_json(response).await?;
        clients
            .into_iter()
            .find(|c| c.client_id == self.settings.client_id)
            .map(|c| c.id)
            .ok_or_else(|| AuthorityError::ClientNotFound(self.settings.client_id.clone()))
    }

    // ----- Admin API: resources -----

    /// Searches resources by exact URI.
    pub async fn search_resources(
        &self,
        admin_token: &str,
        client_uuid: &str,
        canonical_url: &str,
    ) -> Result<Vec<ResourceRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(client_uuid, "resource"))
            .query(&[("uri", canonical_url)])
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Creates a resource named by (and covering) the canonical URL.
    pub async fn create_resource(
        &self,
        admin_token: &str,
        client_uuid: &str,
        canonical_url: &str,
    ) -> Result<ResourceRepresentation, AuthorityError> {
        tracing::debug!(name = canonical_url, "creating resource");
        let response = self
            .http
            .post(self.resource_server_url(client_uuid, "resource"))
            .bearer_auth(admin_token)
            .json(&json!({
                "name": canonical_url,
                "uris": [canonical_url],
            }))
            .send()
            .await?;
        expect_json(response).await
    }

    /// Deletes a resource. The authority cascades the deletion to the
    /// permission bound to it.
    pub async fn delete_resource(
        &self,
        admin_token: &str,
        client_uuid: &str,
        resource_id: &str,
    ) -> Result<(), AuthorityError> {
        tracing::debug!(resource_id, "deleting resource");
        let response = self
            .http
            .delete(self.resource_server_url(client_uuid, &format!("resource/{resource_id}")))
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_success(response).await
    }

    /// Lists the permissions that depend on a resource.
    pub async fn resource_permissions(
        &self,
        admin_token: &str,
        client_uuid: &str,
        resource_id: &str,
    ) -> Result<Vec<PermissionRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(
                client_uuid,
                &format!("resource/{resource_id}/permissions"),
            ))
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    // ----- Admin API: policies -----

    /// Searches policies of one type by name. The authority matches by
    /// substring, so callers must still compare names exactly.
    pub async fn search_policies(
        &self,
        admin_token: &str,
        client_uuid: &str,
        kind: PolicyKind,
        name: &str,
    ) -> Result<Vec<PolicyRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(client_uuid, &format!("policy/{}", kind.as_str())))
            .query(&[("name", name)])
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Creates an atomic claim-matching policy.
    pub async fn create_regex_policy(
        &self,
        admin_token: &str,
        client_uuid: &str,
        name: &str,
        claim: &str,
        pattern: &str,
    ) -> Result<PolicyRepresentation, AuthorityError> {
        tracing::debug!(name, claim, pattern, "creating regex policy");
        let response = self
            .http
            .post(self.resource_server_url(client_uuid, "policy/regex"))
            .bearer_auth(admin_token)
            .json(&json!({
                "name": name,
                "description": "",
                "type": "regex",
                "targetClaim": claim,
                "pattern": pattern,
                "decisionStrategy": "UNANIMOUS",
                "logic": "POSITIVE",
            }))
            .send()
            .await?;
        expect_json(response).await
    }

    /// Creates an aggregate policy over existing atomic policies.
    pub async fn create_aggregate_policy(
        &self,
        admin_token: &str,
        client_uuid: &str,
        name: &str,
        description: &str,
        member_ids: &[String],
    ) -> Result<PolicyRepresentation, AuthorityError> {
        tracing::debug!(name, members = member_ids.len(), "creating aggregate policy");
        let response = self
            .http
            .post(self.resource_server_url(client_uuid, "policy/aggregate"))
            .bearer_auth(admin_token)
            .json(&json!({
                "name": name,
                "description": description,
                "type": "aggregate",
                "policies": member_ids,
                "decisionStrategy": "UNANIMOUS",
                "logic": "POSITIVE",
            }))
            .send()
            .await?;
        expect_json(response).await
    }

    /// Deletes a policy (regex or aggregate) by id.
    pub async fn delete_policy(
        &self,
        admin_token: &str,
        client_uuid: &str,
        policy_id: &str,
    ) -> Result<(), AuthorityError> {
        tracing::debug!(policy_id, "deleting policy");
        let response = self
            .http
            .delete(self.resource_server_url(client_uuid, &format!("policy/{policy_id}")))
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_success(response).await
    }

    /// Lists the policies a policy object references. For a permission id
    /// this yields its aggregate policies; for an aggregate policy id its
    /// atomic policies.
    pub async fn associated_policies(
        &self,
        admin_token: &str,
        client_uuid: &str,
        policy_id: &str,
    ) -> Result<Vec<PolicyRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(
                client_uuid,
                &format!("policy/{policy_id}/associatedPolicies"),
            ))
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Lists the policy objects that still reference a policy. An empty
    /// answer means the policy can be deleted safely.
    pub async fn dependent_policies(
        &self,
        admin_token: &str,
        client_uuid: &str,
        policy_id: &str,
    ) -> Result<Vec<PolicyRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(
                client_uuid,
                &format!("policy/{policy_id}/dependentPolicies"),
            ))
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    // ----- Admin API: permissions -----

    /// Lists every permission of the resource server.
    pub async fn list_permissions(
        &self,
        admin_token: &str,
        client_uuid: &str,
    ) -> Result<Vec<PermissionRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(client_uuid, "permission"))
            .query(&[("max", "10000")])
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Searches resource-type permissions by name.
    pub async fn search_permissions(
        &self,
        admin_token: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<Vec<PermissionRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(client_uuid, "permission/resource"))
            .query(&[("name", name)])
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Creates a resource-type permission referencing a single policy.
    /// AFFIRMATIVE strategy: any referenced policy suffices.
    pub async fn create_permission(
        &self,
        admin_token: &str,
        client_uuid: &str,
        name: &str,
        resource_id: &str,
        policy_id: &str,
    ) -> Result<PermissionRepresentation, AuthorityError> {
        tracing::debug!(name, resource_id, "creating permission");
        let response = self
            .http
            .post(self.resource_server_url(client_uuid, "permission"))
            .bearer_auth(admin_token)
            .json(&json!({
                "name": name,
                "resources": [resource_id],
                "policies": [policy_id],
                "type": "resource",
                "logic": "POSITIVE",
                "decisionStrategy": "AFFIRMATIVE",
            }))
            .send()
            .await?;
        expect_json(response).await
    }

    /// Replaces a permission's policy list.
    pub async fn update_permission(
        &self,
        admin_token: &str,
        client_uuid: &str,
        permission_id: &str,
        name: &str,
        resource_id: &str,
        policy_ids: &[String],
    ) -> Result<(), AuthorityError> {
        tracing::debug!(permission_id, policies = policy_ids.len(), "updating permission");
        let response = self
            .http
            .put(self.resource_server_url(
                client_uuid,
                &format!("permission/resource/{permission_id}"),
            ))
            .bearer_auth(admin_token)
            .json(&json!({
                "id": permission_id,
                "name": name,
                "resources": [resource_id],
                "policies": policy_ids,
                "type": "resource",
                "logic": "POSITIVE",
                "decisionStrategy": "AFFIRMATIVE",
            }))
            .send()
            .await?;
        expect_success(response).await
    }

    /// Fetches the resource a permission is bound to (a 1:1 relation).
    pub async fn permission_resources(
        &self,
        admin_token: &str,
        client_uuid: &str,
        permission_id: &str,
    ) -> Result<Vec<ResourceRepresentation>, AuthorityError> {
        let response = self
            .http
            .get(self.resource_server_url(
                client_uuid,
                &format!("permission/{permission_id}/resources"),
            ))
            .bearer_auth(admin_token)
            .send()
            .await?;
        expect_json(response).await
    }

    // ----- Admin API: evaluation -----

    /// Runs the policy evaluation simulation for one subject and resource,
    /// returning matched policies with outcomes and the subject's resolved
    /// attributes.
    pub async fn evaluate(
        &self,
        admin_token: &str,
        client_uuid: &str,
        user_id: &str,
        resource_name: &str,
        resource_id: &str,
    ) -> Result<EvaluationResponse, AuthorityError> {
        tracing::debug!(user_id, resource_id, "running policy evaluation");
        let response = self
            .http
            .post(self.resource_server_url(client_uuid, "policy/evaluate"))
            .bearer_auth(admin_token)
            .json(&json!({
                "clientId": client_uuid,
                "userId": user_id,
                "resources": [{
                    "name": resource_name,
                    "_id": resource_id,
                }],
            }))
            .send()
            .await?;
        expect_json(response).await
    }
}

/// Reads a 2xx JSON body into `T`, turning any other status into
/// [`AuthorityError::Upstream`] with the raw body attached.
async fn expect_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AuthorityError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AuthorityError::upstream(status.as_u16(), body));
    }
    serde_json::from_str(&body)
        .map_err(|e| AuthorityError::Decode(format!("{e} in body: {body}")))
}

/// Accepts any 2xx answer, discarding the body.
async fn expect_success(response: reqwest::Response) -> Result<(), AuthorityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await?;
    Err(AuthorityError::upstream(status.as_u16(), body))
}

/// Reads a token response and enforces a non-empty access token.
async fn access_token(response: reqwest::Response) -> Result<String, AuthorityError> {
    let token: TokenResponse = expect_json(response).await?;
    if token.access_token.is_empty() {
        return Err(AuthorityError::Decode(
            "token response has no access_token".to_string(),
        ));
    }
    Ok(token.access_token)
}
