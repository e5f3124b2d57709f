//! Reference-counted deletion of detached policy objects.
//!
//! Atomic policies are shared between rules and aggregate policies can be
//! referenced by several permissions, so nothing is deleted eagerly. After a
//! rule is detached from its permission, [`gc`] walks the aggregate policy
//! and its members and deletes whatever nothing references anymore.
//!
//! The sweep is best-effort by design: the rule itself no longer grants
//! access once detached, so a failed deletion only leaves an orphaned policy
//! behind. Failures are logged and a later sweep over the same objects picks
//! them up.

use tradegate_authority::AuthorityClient;

/// Deletes an aggregate policy and its atomic members when nothing
/// references them anymore. Never fails; every skipped object is logged.
pub async fn gc(
    authority: &AuthorityClient,
    admin_token: &str,
    client_uuid: &str,
    aggregate_id: &str,
) {
    let dependents = match authority
        .dependent_policies(admin_token, client_uuid, aggregate_id)
        .await
    {
        Ok(dependents) => dependents,
        Err(err) => {
            tracing::warn!(aggregate_id, error = %err, "dependency lookup failed, skipping sweep");
            return;
        }
    };
    if !dependents.is_empty() {
        tracing::debug!(
            aggregate_id,
            dependents = dependents.len(),
            "aggregate policy still referenced, keeping"
        );
        return;
    }

    // Members must be read before the aggregate disappears.
    let members = match authority
        .associated_policies(admin_token, client_uuid, aggregate_id)
        .await
    {
        Ok(members) => members,
        Err(err) => {
            tracing::warn!(aggregate_id, error = %err, "member lookup failed, skipping sweep");
            return;
        }
    };

    if let Err(err) = authority
        .delete_policy(admin_token, client_uuid, aggregate_id)
        .await
    {
        tracing::warn!(aggregate_id, error = %err, "aggregate policy deletion failed");
        return;
    }
    tracing::info!(aggregate_id, "deleted detached aggregate policy");

    for member in members {
        match authority
            .dependent_policies(admin_token, client_uuid, &member.id)
            .await
        {
            Ok(dependents) if dependents.is_empty() => {
                if let Err(err) = authority
                    .delete_policy(admin_token, client_uuid, &member.id)
                    .await
                {
                    tracing::warn!(
                        policy_id = %member.id,
                        error = %err,
                        "atomic policy deletion failed"
                    );
                } else {
                    tracing::info!(policy_id = %member.id, name = %member.name, "deleted atomic policy");
                }
            }
            Ok(_) => {
                tracing::debug!(policy_id = %member.id, "atomic policy still shared, keeping");
            }
            Err(err) => {
                tracing::warn!(
                    policy_id = %member.id,
                    error = %err,
                    "dependency lookup failed, keeping atomic policy"
                );
            }
        }
    }
}
