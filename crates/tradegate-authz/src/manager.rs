//! Rule registration, deletion and listing.
//!
//! A rule maps onto the authority as: one resource and one permission per
//! canonical resource URL, one regex policy per `claim|value` constraint
//! (shared across rules), one aggregate policy per rule signature, and the
//! permission OR-ing the aggregate policies that currently grant access.
//!
//! Registration is resolve-or-create at every level, which makes it
//! idempotent and lets concurrent registrations share atomic policies.
//! Deletion detaches the aggregate policy from the permission first, so the
//! rule stops granting access even if the follow-up sweep fails.

use serde::Serialize;
use tradegate_authority::{AuthorityClient, AuthorityError, PolicyKind, PolicyRepresentation};

use crate::cleanup;
use crate::codec::{self, Contract, RuleAttributes};
use crate::error::AuthzError;
use crate::AuthzResult;

/// Keycloak seeds every resource server with this permission; it is not a
/// rule and never appears in listings.
const DEFAULT_PERMISSION: &str = "Default Permission";

/// Which aggregate policies a deletion detaches from the permission.
#[derive(Debug, Clone)]
pub enum RuleSelector {
    /// Contract-free rule with exactly these attributes.
    ByAttributes(RuleAttributes),
    /// Any rule bound to this trade id.
    ByTradeId(String),
}

impl RuleSelector {
    fn matches(&self, policy_name: &str) -> bool {
        match self {
            Self::ByAttributes(attrs) => match codec::decode(policy_name) {
                Ok(rule) => rule.trade_id.is_none() && rule.attrs == *attrs,
                Err(_) => false,
            },
            Self::ByTradeId(trade_id) => {
                policy_name.ends_with(&format!("#{trade_id}"))
            }
        }
    }
}

/// The subject constraints of one listed rule, absent claims omitted.
#[derive(Debug, Clone, Serialize)]
pub struct Assignee {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aal: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<String>,
}

/// The grant part of a listed rule.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionView {
    /// Who the rule applies to.
    pub assignee: Assignee,
    /// The plain (decoded) resource URL.
    pub target: String,
    /// The realm that issued the rule.
    pub assigner: String,
}

/// One rule as returned by the listing operations.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationEntry {
    pub permission: PermissionView,
    /// Present only for contract-bound rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<Contract>,
}

/// Registers a rule for a resource URL, creating whatever authority objects
/// do not exist yet. Registering the same rule twice is a no-op.
pub async fn register(
    authority: &AuthorityClient,
    resource_url: &str,
    attrs: &RuleAttributes,
    contract: Option<&Contract>,
) -> AuthzResult<()> {
    attrs.validate()?;
    let canonical = codec::canonical_resource_name(resource_url);

    let admin = admin_token(authority).await?;
    let client_uuid = client_uuid(authority, &admin).await?;

    // Resource, one per canonical URL.
    let resources = authority
        .search_resources(&admin, &client_uuid, &canonical)
        .await
        .map_err(|e| AuthzError::step("search resources error", 500, e))?;
    let resource_id = match resources.into_iter().next() {
        Some(resource) => resource.id,
        None => {
            authority
                .create_resource(&admin, &client_uuid, &canonical)
                .await
                .map_err(|e| AuthzError::step("create resource error", 500, e))?
                .id
        }
    };

    // One regex policy per declared claim, shared across rules.
    let mut member_ids = Vec::new();
    for (claim, value) in attrs.declared() {
        let name = codec::atomic_name(claim, &value);
        let existing = authority
            .search_policies(&admin, &client_uuid, PolicyKind::Regex, &name)
            .await
            .map_err(|e| AuthzError::step("search policy error", 500, e))?;
        let id = match exact_policy(&existing, &name) {
            Some(policy) => policy.id.clone(),
            None => {
                let pattern = codec::pattern(claim, &value)?;
                authority
                    .create_regex_policy(&admin, &client_uuid, &name, claim.as_str(), &pattern)
                    .await
                    .map_err(|e| AuthzError::step("create regex policy error", 500, e))?
                    .id
            }
        };
        member_ids.push(id);
    }

    // Aggregate policy named by the rule signature.
    let signature = codec::signature(attrs, contract);
    let existing = authority
        .search_policies(&admin, &client_uuid, PolicyKind::Aggregate, &signature)
        .await
        .map_err(|e| AuthzError::step("search policy error", 500, e))?;
    let aggregate_id = match exact_policy(&existing, &signature) {
        Some(policy) => {
            tracing::debug!(name = %signature, "aggregate policy already registered");
            policy.id.clone()
        }
        None => {
            let description = codec::description_now(contract);
            authority
                .create_aggregate_policy(
                    &admin,
                    &client_uuid,
                    &signature,
                    &description,
                    &member_ids,
                )
                .await
                .map_err(|e| AuthzError::step("create aggregated policy error", 500, e))?
                .id
        }
    };

    // Permission named by the canonical URL, OR-ing the aggregates.
    let permissions = authority
        .search_permissions(&admin, &client_uuid, &canonical)
        .await
        .map_err(|e| AuthzError::step("search permission error", 500, e))?;
    match permissions.iter().find(|p| p.name == canonical) {
        Some(permission) => {
            let attached = authority
                .associated_policies(&admin, &client_uuid, &permission.id)
                .await
                .map_err(|e| AuthzError::step("get policies in permission error", 500, e))?;
            let mut ids: Vec<String> = attached.into_iter().map(|p| p.id).collect();
            if !ids.contains(&aggregate_id) {
                ids.push(aggregate_id);
            }
            authority
                .update_permission(&admin, &client_uuid, &permission.id, &canonical, &resource_id, &ids)
                .await
                .map_err(|e| AuthzError::step("update permission error", 500, e))?;
        }
        None => {
            authority
                .create_permission(&admin, &client_uuid, &canonical, &resource_id, &aggregate_id)
                .await
                .map_err(|e| AuthzError::step("create permissions error", 500, e))?;
        }
    }

    tracing::info!(resource_url, signature = %signature, "registered authorization rule");
    Ok(())
}

/// Detaches the selected rule(s) from the resource URL's permission and
/// sweeps the detached policy objects.
///
/// When the permission would be left with no aggregate policy, the resource
/// is deleted instead and the authority cascades the permission away.
pub async fn delete(
    authority: &AuthorityClient,
    resource_url: &str,
    selector: &RuleSelector,
) -> AuthzResult<()> {
    let canonical = codec::canonical_resource_name(resource_url);

    let admin = admin_token(authority).await?;
    let client_uuid = client_uuid(authority, &admin).await?;

    let permissions = authority
        .search_permissions(&admin, &client_uuid, &canonical)
        .await
        .map_err(|e| AuthzError::step("search permission error", 500, e))?;
    let permission = permissions
        .iter()
        .find(|p| p.name == canonical)
        .ok_or_else(|| {
            AuthzError::not_found("not found permission", format!("no permission named {canonical}"))
        })?;

    let resources = authority
        .permission_resources(&admin, &client_uuid, &permission.id)
        .await
        .map_err(|e| AuthzError::step("get resource in permission error", 500, e))?;
    let resource = resources.into_iter().next().ok_or_else(|| {
        AuthzError::not_found(
            "not found resource in permission",
            format!("permission {canonical} is bound to no resource"),
        )
    })?;

    let attached = authority
        .associated_policies(&admin, &client_uuid, &permission.id)
        .await
        .map_err(|e| AuthzError::step("get policy in permission error", 500, e))?;

    let mut kept = Vec::new();
    let mut removed = Vec::new();
    for policy in attached {
        if selector.matches(&policy.name) {
            removed.push(policy.id);
        } else {
            kept.push(policy.id);
        }
    }
    if removed.is_empty() {
        return Err(AuthzError::not_found(
            "not found policy in permission",
            format!("no matching rule on permission {canonical}"),
        ));
    }

    if kept.is_empty() {
        // Deleting the resource cascades to the now-empty permission.
        authority
            .delete_resource(&admin, &client_uuid, &resource.id)
            .await
            .map_err(|e| AuthzError::step("delete permissions error", 500, e))?;
    } else {
        authority
            .update_permission(
                &admin,
                &client_uuid,
                &permission.id,
                &resource.name,
                &resource.id,
                &kept,
            )
            .await
            .map_err(|e| AuthzError::step("update permissions error", 500, e))?;
    }

    for aggregate_id in &removed {
        cleanup::gc(authority, &admin, &client_uuid, aggregate_id).await;
    }

    tracing::info!(resource_url, detached = removed.len(), "deleted authorization rule");
    Ok(())
}

/// Lists every registered rule of the resource server.
pub async fn list_rules(authority: &AuthorityClient) -> AuthzResult<Vec<AuthorizationEntry>> {
    let admin = admin_token(authority).await?;
    let client_uuid = client_uuid(authority, &admin).await?;

    let permissions = authority
        .list_permissions(&admin, &client_uuid)
        .await
        .map_err(|e| AuthzError::step("get permissions error", 500, e))?;

    let mut entries = Vec::new();
    for permission in permissions {
        if permission.name == DEFAULT_PERMISSION {
            continue;
        }
        collect_entries(authority, &admin, &client_uuid, &permission.id, &permission.name, &mut entries)
            .await?;
    }
    Ok(entries)
}

/// Lists the rules registered for one resource URL. An unknown URL yields an
/// empty list, not an error.
pub async fn list_rules_for(
    authority: &AuthorityClient,
    resource_url: &str,
) -> AuthzResult<Vec<AuthorizationEntry>> {
    let canonical = codec::canonical_resource_name(resource_url);

    let admin = admin_token(authority).await?;
    let client_uuid = client_uuid(authority, &admin).await?;

    let permissions = authority
        .list_permissions(&admin, &client_uuid)
        .await
        .map_err(|e| AuthzError::step("get permissions error", 500, e))?;

    let mut entries = Vec::new();
    for permission in permissions {
        if permission.name != canonical {
            continue;
        }
        collect_entries(authority, &admin, &client_uuid, &permission.id, &permission.name, &mut entries)
            .await?;
    }
    Ok(entries)
}

/// Decodes every aggregate policy of one permission into listing entries.
async fn collect_entries(
    authority: &AuthorityClient,
    admin: &str,
    client_uuid: &str,
    permission_id: &str,
    permission_name: &str,
    entries: &mut Vec<AuthorizationEntry>,
) -> AuthzResult<()> {
    let target = codec::display_resource_url(permission_name);
    let assigner = authority.settings().realm.clone();

    let policies = authority
        .associated_policies(admin, client_uuid, permission_id)
        .await
        .map_err(|e| AuthzError::step("get policies error", 500, e))?;

    for policy in policies {
        let rule = match codec::decode(&policy.name) {
            Ok(rule) => rule,
            Err(_) => {
                tracing::warn!(name = %policy.name, "skipping policy with unreadable name");
                continue;
            }
        };
        let contract = rule
            .trade_id
            .is_some()
            .then(|| codec::contract_from_description(&policy.description));
        entries.push(AuthorizationEntry {
            permission: PermissionView {
                assignee: Assignee {
                    user: rule.attrs.user,
                    org: rule.attrs.org,
                    aal: rule.attrs.aal,
                    extras: rule.attrs.extras,
                },
                target: target.clone(),
                assigner: assigner.clone(),
            },
            contract,
        });
    }
    Ok(())
}

/// Admin token step shared by every management flow.
pub(crate) async fn admin_token(authority: &AuthorityClient) -> AuthzResult<String> {
    authority
        .admin_token()
        .await
        .map_err(|e| AuthzError::step("get admin token error", 403, e))
}

/// Client UUID step shared by every management flow. A realm without the
/// configured resource-server client is a 404, not an upstream failure.
pub(crate) async fn client_uuid(
    authority: &AuthorityClient,
    admin: &str,
) -> AuthzResult<String> {
    authority.client_uuid(admin).await.map_err(|e| match e {
        AuthorityError::ClientNotFound(client_id) => AuthzError::not_found(
            "not found client",
            format!("client {client_id} is not registered in the realm"),
        ),
        other => AuthzError::step("not found client", 404, other),
    })
}

fn exact_policy<'a>(
    policies: &'a [PolicyRepresentation],
    name: &str,
) -> Option<&'a PolicyRepresentation> {
    // The authority searches by substring; only an exact name is a hit.
    policies.iter().find(|p| p.name == name)
}
