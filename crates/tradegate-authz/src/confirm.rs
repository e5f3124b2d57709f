//! The authorization confirmation flow.
//!
//! Given a subject's own access token and a resource URL, the flow asks the
//! authority whether the subject may fetch the resource and, when the grant
//! is contract-bound, which contract applies:
//!
//! 1. obtain a PAT and resolve the resource id for the canonical URL,
//! 2. request an RPT for that resource with the subject's token (this is
//!    the actual permit/deny decision; a denial fails the flow here),
//! 3. re-run the decision through the evaluation simulation with an admin
//!    token to learn which aggregate policies granted access,
//! 4. select the newest matching contract among the permitting policies.
//!
//! Step 4 exists because the permission ORs the aggregate policies of every
//! rule on the resource: several rules can permit at once and the evaluation
//! alone does not say which of them applies to this particular subject.

use tradegate_authority::{
    AuthorityClient, Decision, EvaluatedSubject, EvaluationResponse, subject_from_token,
};

use crate::codec::{self, Contract};
use crate::error::AuthzError;
use crate::manager;
use crate::AuthzResult;

/// Runs the confirmation flow. On success returns the applicable contract,
/// with empty fields when the permitting rule is not contract-bound.
pub async fn confirm(
    authority: &AuthorityClient,
    subject_token: &str,
    resource_url: &str,
) -> AuthzResult<Contract> {
    let canonical = codec::canonical_resource_name(resource_url);

    let pat = authority
        .obtain_pat()
        .await
        .map_err(|e| AuthzError::step("obtain pat error", 403, e))?;

    let resource_ids = authority
        .resource_ids_by_uri(&pat, &canonical)
        .await
        .map_err(|e| AuthzError::step("get resource id error", 404, e))?;
    let resource_id = resource_ids.into_iter().next().ok_or_else(|| {
        AuthzError::not_found(
            "get resource id error",
            format!("no resource registered for {resource_url}"),
        )
    })?;

    // The permit/deny decision itself: the grant fails for a denied subject.
    let rpt = authority
        .uma_ticket(subject_token, &resource_id)
        .await
        .map_err(|e| AuthzError::step("confirm authorization error", 403, e))?;

    let user_id = subject_from_token(&rpt).map_err(|e| AuthzError::Step {
        status: 403,
        message: "invalid RPT".to_string(),
        detail: e.to_string(),
    })?;

    let admin = manager::admin_token(authority).await?;
    let client_uuid = manager::client_uuid(authority, &admin).await?;

    let evaluation = authority
        .evaluate(&admin, &client_uuid, &user_id, &canonical, &resource_id)
        .await
        .map_err(|e| AuthzError::step("evaluate error", 404, e))?;

    let contract = select_contract(&evaluation);
    tracing::info!(resource_url, trade_id = %contract.trade_id, "authorization confirmed");
    Ok(contract)
}

/// Picks the newest contract among the permitting, contract-bound aggregate
/// policies that match the subject's resolved attributes. No match yields an
/// empty contract; the access itself was already granted.
fn select_contract(evaluation: &EvaluationResponse) -> Contract {
    let subject = &evaluation.rpt;

    let mut best: Option<(String, &str)> = None;
    for result in &evaluation.results {
        for permission in &result.policies {
            for aggregate in &permission.associated_policies {
                if aggregate.status != Some(Decision::Permit) {
                    continue;
                }
                let Ok(rule) = codec::decode(&aggregate.policy.name) else {
                    continue;
                };
                if rule.trade_id.is_none() || !rule_applies(&rule.attrs, subject) {
                    continue;
                }

                let key = codec::description_sort_key(&aggregate.policy.description);
                // Ties go to the later policy, matching registration order.
                let newer = best.as_ref().is_none_or(|(b, _)| key >= *b);
                if newer {
                    best = Some((key, aggregate.policy.description.as_str()));
                }
            }
        }
    }

    match best {
        Some((_, description)) => codec::contract_from_description(description),
        None => Contract::default(),
    }
}

/// Whether one rule's claim constraints cover the subject's resolved
/// attributes. A constraint on an attribute the subject lacks, or an
/// assurance level that does not parse on either side, means no match.
fn rule_applies(attrs: &codec::RuleAttributes, subject: &EvaluatedSubject) -> bool {
    if let Some(required) = &attrs.user {
        if subject.user.as_deref() != Some(required.as_str()) {
            return false;
        }
    }
    if let Some(required) = &attrs.org {
        let member = subject
            .org
            .as_deref()
            .is_some_and(|orgs| orgs.split(',').any(|org| org.trim() == required));
        if !member {
            return false;
        }
    }
    if let Some(required) = attrs.aal {
        let satisfied = subject
            .aal
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u8>().ok())
            .is_some_and(|level| level >= required);
        if !satisfied {
            return false;
        }
    }
    true
}
