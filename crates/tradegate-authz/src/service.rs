//! The `{status, content}` surface consumed by the REST layer.
//!
//! Every operation returns a [`ServiceReply`] instead of a `Result`: the
//! HTTP framework on top only needs to forward the status code and serialize
//! the content, without knowing the error taxonomy.

use serde_json::{Value, json};
use tradegate_authority::AuthorityClient;

use crate::codec::{Contract, RuleAttributes};
use crate::confirm;
use crate::error::AuthzError;
use crate::manager::{self, RuleSelector};

/// Status code plus ready-to-serialize body of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply {
    /// HTTP status the caller should answer with.
    pub status: u16,
    /// JSON body.
    pub content: Value,
}

impl ServiceReply {
    fn ok(content: Value) -> Self {
        Self {
            status: 200,
            content,
        }
    }

    fn success() -> Self {
        Self::ok(json!({"message": "success"}))
    }
}

impl From<AuthzError> for ServiceReply {
    fn from(err: AuthzError) -> Self {
        tracing::warn!(status = err.status(), message = err.message(), detail = err.detail(), "operation failed");
        Self {
            status: err.status(),
            content: json!({
                "message": err.message(),
                "detail": err.detail(),
            }),
        }
    }
}

/// Rule management and confirmation operations over one authority.
#[derive(Debug, Clone)]
pub struct AuthzService {
    authority: AuthorityClient,
}

impl AuthzService {
    /// Wraps an authority client.
    #[must_use]
    pub fn new(authority: AuthorityClient) -> Self {
        Self { authority }
    }

    /// The underlying authority client.
    #[must_use]
    pub fn authority(&self) -> &AuthorityClient {
        &self.authority
    }

    /// Registers a rule for a resource URL.
    pub async fn register(
        &self,
        resource_url: &str,
        attrs: &RuleAttributes,
        contract: Option<&Contract>,
    ) -> ServiceReply {
        match manager::register(&self.authority, resource_url, attrs, contract).await {
            Ok(()) => ServiceReply::success(),
            Err(err) => err.into(),
        }
    }

    /// Deletes the contract-free rule with exactly these attributes.
    pub async fn delete_by_attributes(
        &self,
        resource_url: &str,
        attrs: &RuleAttributes,
    ) -> ServiceReply {
        let selector = RuleSelector::ByAttributes(attrs.clone());
        match manager::delete(&self.authority, resource_url, &selector).await {
            Ok(()) => ServiceReply::success(),
            Err(err) => err.into(),
        }
    }

    /// Deletes the rule(s) bound to a trade id.
    pub async fn delete_by_trade_id(&self, resource_url: &str, trade_id: &str) -> ServiceReply {
        let selector = RuleSelector::ByTradeId(trade_id.to_string());
        match manager::delete(&self.authority, resource_url, &selector).await {
            Ok(()) => ServiceReply::success(),
            Err(err) => err.into(),
        }
    }

    /// Confirms a subject's access to a resource URL and reports the
    /// applicable contract.
    pub async fn confirm(&self, subject_token: &str, resource_url: &str) -> ServiceReply {
        match confirm::confirm(&self.authority, subject_token, resource_url).await {
            Ok(contract) => ServiceReply::ok(json!({"contract": contract})),
            Err(err) => err.into(),
        }
    }

    /// Lists every registered rule.
    pub async fn get_authorization_list(&self) -> ServiceReply {
        match manager::list_rules(&self.authority).await {
            Ok(entries) => ServiceReply::ok(json!(entries)),
            Err(err) => err.into(),
        }
    }

    /// Lists the rules registered for one resource URL.
    pub async fn get_authorization(&self, resource_url: &str) -> ServiceReply {
        match manager::list_rules_for(&self.authority, resource_url).await {
            Ok(entries) => ServiceReply::ok(json!(entries)),
            Err(err) => err.into(),
        }
    }
}
