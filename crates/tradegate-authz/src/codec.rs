//! Rule signature and description codec.
//!
//! The authority has no native ABAC rule object, so a rule is packed into
//! the string fields of the policy objects that implement it:
//!
//! - an aggregate policy's **name** carries the rule signature:
//!   `user|{user}|org|{org}|aal|{aal}` in fixed claim order, absent claims
//!   as the literal `None`, an `|extras|{extras}` segment only when that
//!   claim is declared, and a `#{trade_id}` suffix for contract-bound rules;
//! - its **description** carries the contract CSV plus the registration
//!   timestamp: `trade_id,contract_url,contract_type, YYYYMMDDHHMMSSmmmmmm`;
//! - a regex policy's **name** is `claim|value` with the raw value, while
//!   its **pattern** is derived per claim (see [`pattern`]).
//!
//! This module is the only place that produces or consumes those string
//! forms; everything else works with [`RuleAttributes`] and [`Contract`].

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::AuthzError;

/// Placeholder written into the signature for an undeclared claim.
const NONE_LITERAL: &str = "None";

/// Sort key assumed for descriptions that carry no timestamp field.
pub const TIMESTAMP_SENTINEL: &str = "19700101000000000000";

/// Registration timestamp layout: seconds precision date-time plus
/// microseconds, zero padded so lexicographic order is chronological order.
const STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second][subsecond digits:6]");

/// Everything except unreserved characters is percent-encoded, so the
/// canonical form survives being used as an authority object name.
const CANONICAL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Encoding or decoding failure of the packed string forms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The assurance level is outside the supported 1..=3 range.
    #[error("specify aal between 1 and 3")]
    InvalidAal(String),

    /// A policy name does not follow the signature layout.
    #[error("malformed rule signature: {0}")]
    Malformed(String),
}

impl From<CodecError> for AuthzError {
    fn from(err: CodecError) -> Self {
        AuthzError::Validation(err.to_string())
    }
}

/// The claims a rule may constrain, in their fixed signature order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Exact user identifier.
    User,
    /// Organisation membership (substring match).
    Org,
    /// Minimum authenticator assurance level.
    Aal,
    /// Free-form extra claim (verbatim pattern).
    Extras,
}

impl Claim {
    /// The claim name as it appears in signatures and token payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Org => "org",
            Self::Aal => "aal",
            Self::Extras => "extras",
        }
    }
}

/// Subject-attribute constraints of one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAttributes {
    /// Exact user the rule applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Organisation the subject must belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// Minimum assurance level (1..=3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aal: Option<u8>,

    /// Additional verbatim constraint on the `extras` claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<String>,
}

impl RuleAttributes {
    /// Attributes with no constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrains the user claim.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Constrains the org claim.
    #[must_use]
    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    /// Constrains the minimum assurance level.
    #[must_use]
    pub fn with_aal(mut self, aal: u8) -> Self {
        self.aal = Some(aal);
        self
    }

    /// Constrains the extras claim.
    #[must_use]
    pub fn with_extras(mut self, extras: impl Into<String>) -> Self {
        self.extras = Some(extras.into());
        self
    }

    /// Rejects attribute sets that could not be materialized as policies.
    /// Runs before any authority call.
    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(aal) = self.aal {
            if !(1..=3).contains(&aal) {
                return Err(CodecError::InvalidAal(aal.to_string()));
            }
        }
        Ok(())
    }

    /// Declared claims with their raw values, in fixed signature order.
    #[must_use]
    pub fn declared(&self) -> Vec<(Claim, String)> {
        let mut claims = Vec::new();
        if let Some(user) = &self.user {
            claims.push((Claim::User, user.clone()));
        }
        if let Some(org) = &self.org {
            claims.push((Claim::Org, org.clone()));
        }
        if let Some(aal) = self.aal {
            claims.push((Claim::Aal, aal.to_string()));
        }
        if let Some(extras) = &self.extras {
            claims.push((Claim::Extras, extras.clone()));
        }
        claims
    }
}

/// The commercial contract a rule may be bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Trade identifier, also used as the signature suffix.
    #[serde(default)]
    pub trade_id: String,

    /// Where the contract document lives.
    #[serde(default)]
    pub contract_url: String,

    /// Kind of contract.
    #[serde(default)]
    pub contract_type: String,
}

/// A rule decoded back from an aggregate policy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRule {
    /// The claim constraints.
    pub attrs: RuleAttributes,

    /// Trade id suffix, when the rule is contract-bound.
    pub trade_id: Option<String>,
}

/// Name of the atomic policy matching one claim constraint. Always uses the
/// raw value, even where the materialized pattern differs.
#[must_use]
pub fn atomic_name(claim: Claim, value: &str) -> String {
    format!("{}|{value}", claim.as_str())
}

/// Derives the regex pattern materialized for one claim constraint.
///
/// `org` becomes a substring match with dots escaped; `aal` level N becomes
/// the character class accepting N and above; `user` and `extras` are used
/// verbatim. Assurance levels outside 1..=3 are rejected here, before any
/// policy is created.
pub fn pattern(claim: Claim, value: &str) -> Result<String, CodecError> {
    match claim {
        Claim::Org => Ok(format!("^.*{}.*$", value.replace('.', "\\."))),
        Claim::Aal => match value {
            "1" => Ok("[123]".to_string()),
            "2" => Ok("[23]".to_string()),
            "3" => Ok("[3]".to_string()),
            other => Err(CodecError::InvalidAal(other.to_string())),
        },
        Claim::User | Claim::Extras => Ok(value.to_string()),
    }
}

/// Canonical signature of a rule, used as the aggregate policy name.
#[must_use]
pub fn signature(attrs: &RuleAttributes, contract: Option<&Contract>) -> String {
    let field = |value: Option<&str>| value.unwrap_or(NONE_LITERAL).to_string();
    let aal = attrs.aal.map(|a| a.to_string());

    let mut name = format!(
        "user|{}|org|{}|aal|{}",
        field(attrs.user.as_deref()),
        field(attrs.org.as_deref()),
        field(aal.as_deref()),
    );
    if let Some(extras) = &attrs.extras {
        name.push_str("|extras|");
        name.push_str(extras);
    }
    if let Some(contract) = contract {
        name.push('#');
        name.push_str(&contract.trade_id);
    }
    name
}

/// Decodes an aggregate policy name back into a rule.
pub fn decode(name: &str) -> Result<DecodedRule, CodecError> {
    let (body, trade_id) = match name.split_once('#') {
        Some((body, trade)) => (body, Some(trade.to_string())),
        None => (name, None),
    };

    let parts: Vec<&str> = body.split('|').collect();
    if parts.len() != 6 && parts.len() != 8 {
        return Err(CodecError::Malformed(name.to_string()));
    }
    let expected = ["user", "org", "aal", "extras"];
    for (i, key) in parts.iter().step_by(2).enumerate() {
        if *key != expected[i] {
            return Err(CodecError::Malformed(name.to_string()));
        }
    }

    let value = |i: usize| -> Option<String> {
        let v = parts[i];
        (v != NONE_LITERAL).then(|| v.to_string())
    };

    let aal = match value(5) {
        Some(raw) => Some(
            raw.parse::<u8>()
                .map_err(|_| CodecError::Malformed(name.to_string()))?,
        ),
        None => None,
    };

    Ok(DecodedRule {
        attrs: RuleAttributes {
            user: value(1),
            org: value(3),
            aal,
            extras: if parts.len() == 8 { value(7) } else { None },
        },
        trade_id,
    })
}

/// Description stored on a new aggregate policy: the contract CSV (empty
/// fields when unbound) followed by the registration timestamp.
#[must_use]
pub fn description(contract: Option<&Contract>, now: OffsetDateTime) -> String {
    let stamp = now
        .format(STAMP_FORMAT)
        .expect("registration timestamp format");
    match contract {
        Some(c) => format!(
            "{},{},{}, {stamp}",
            c.trade_id, c.contract_url, c.contract_type
        ),
        None => format!(",,, {stamp}"),
    }
}

/// [`description`] at the current instant.
#[must_use]
pub fn description_now(contract: Option<&Contract>) -> String {
    description(contract, OffsetDateTime::now_utc())
}

/// The contract packed into a description's first three CSV fields.
#[must_use]
pub fn contract_from_description(description: &str) -> Contract {
    let mut fields = description.split(',').map(str::trim);
    let mut next = || fields.next().unwrap_or("").to_string();
    Contract {
        trade_id: next(),
        contract_url: next(),
        contract_type: next(),
    }
}

/// Sort key for the latest-contract selection: the description's fourth CSV
/// field, or [`TIMESTAMP_SENTINEL`] when absent. Compared lexicographically;
/// the zero-padded layout makes that chronological.
#[must_use]
pub fn description_sort_key(description: &str) -> String {
    let fields: Vec<&str> = description.split(',').collect();
    if fields.len() > 3 {
        fields[3].trim().to_string()
    } else {
        TIMESTAMP_SENTINEL.to_string()
    }
}

/// Canonical percent-encoded form of a resource URL. This form names the
/// authority's resource and permission objects.
#[must_use]
pub fn canonical_resource_name(resource_url: &str) -> String {
    utf8_percent_encode(resource_url, CANONICAL).to_string()
}

/// Decodes a canonical name back to the plain resource URL for display.
#[must_use]
pub fn display_resource_url(canonical: &str) -> String {
    percent_decode_str(canonical)
        .decode_utf8_lossy()
        .into_owned()
}
