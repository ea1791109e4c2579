//! IAM policy documents for API Gateway custom authorizers.
//!
//! An authorizer answers with a principal id and a policy listing which
//! `execute-api:Invoke` resources the caller may reach. Resources are built
//! from the method ARN of the incoming request:
//!
//! ```text
//! arn:aws:execute-api:{region}:{account}:{api-id}/{stage}/{verb}/{resource}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::G8Error;

/// Wildcard matching any verb, resource, region, API or stage.
pub const ALL: &str = "*";

/// IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// The only action an API Gateway authorizer grants or denies.
pub const EXECUTE_API_INVOKE: &str = "execute-api:Invoke";

/// Effect of a policy statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("Allow"),
            Effect::Deny => f.write_str("Deny"),
        }
    }
}

/// Parts of an API Gateway method ARN needed to build resource ARNs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodArn {
    /// The region where the API is deployed.
    pub region: String,

    /// The AWS account id the policy is generated for.
    pub account_id: String,

    /// The API Gateway API id.
    pub api_id: String,

    /// The name of the stage used in the policy.
    pub stage: String,
}

impl MethodArn {
    /// Parse a method ARN such as
    /// `arn:aws:execute-api:eu-west-1:123456789012:oy1e34abcd/main/GET/test-endpoint`.
    pub fn parse(raw: &str) -> Result<Self, G8Error> {
        let invalid = || G8Error::InvalidMethodArn {
            arn: raw.to_string(),
        };

        let parts: Vec<&str> = raw.splitn(6, ':').collect();
        if parts.len() < 6 {
            return Err(invalid());
        }

        let mut gateway = parts[5].split('/');
        let api_id = gateway.next().ok_or_else(invalid)?;
        let stage = gateway.next().ok_or_else(invalid)?;

        Ok(Self {
            region: parts[3].to_string(),
            account_id: parts[4].to_string(),
            api_id: api_id.to_string(),
            stage: stage.to_string(),
        })
    }

    /// Method ARN for `account_id` with every other part set to `*`.
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            region: ALL.to_string(),
            account_id: account_id.into(),
            api_id: ALL.to_string(),
            stage: ALL.to_string(),
        }
    }

    /// Build the resource ARN for a verb and resource path.
    ///
    /// Leading slashes are trimmed from `resource`.
    pub fn resource_arn(&self, verb: &str, resource: &str) -> String {
        format!(
            "arn:aws:execute-api:{}:{}:{}/{}/{}/{}",
            self.region,
            self.account_id,
            self.api_id,
            self.stage,
            verb,
            resource.trim_start_matches('/')
        )
    }
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub action: Vec<String>,
    pub effect: Effect,
    pub resource: Vec<String>,
}

/// IAM policy document returned by an authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: Vec::new(),
        }
    }
}

/// Custom authorizer response with a policy builder.
///
/// # Example
///
/// ```
/// use g8::{AuthorizerResponse, MethodArn};
///
/// let arn = MethodArn::parse("arn:aws:execute-api:eu-west-1:123456789012:oy1e34abcd/main/GET/pets")?;
/// let mut response = AuthorizerResponse::new(arn);
/// response.set_principal_id("customer-42");
/// response.allow_method("GET", "/pets/*");
/// response.deny_all_methods();
///
/// assert!(response.has_allowing_method());
/// # Ok::<(), g8::G8Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
    #[serde(skip)]
    method_arn: MethodArn,
}

impl AuthorizerResponse {
    /// Empty response building resources from `method_arn`.
    pub fn new(method_arn: MethodArn) -> Self {
        Self {
            principal_id: String::new(),
            policy_document: PolicyDocument::default(),
            context: Value::Null,
            method_arn,
        }
    }

    /// Empty response for `account_id` with wildcard region, API and stage.
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self::new(MethodArn::for_account(account_id))
    }

    /// Method ARN parts used to build resources.
    pub fn method_arn(&self) -> &MethodArn {
        &self.method_arn
    }

    pub fn set_principal_id(&mut self, principal_id: impl Into<String>) {
        self.principal_id = principal_id.into();
    }

    pub fn allow_all_methods(&mut self) {
        self.add_method(Effect::Allow, ALL, ALL);
    }

    pub fn deny_all_methods(&mut self) {
        self.add_method(Effect::Deny, ALL, ALL);
    }

    pub fn allow_method(&mut self, verb: &str, resource: &str) {
        self.add_method(Effect::Allow, verb, resource);
    }

    pub fn deny_method(&mut self, verb: &str, resource: &str) {
        self.add_method(Effect::Deny, verb, resource);
    }

    /// Whether at least one statement allows access.
    pub fn has_allowing_method(&self) -> bool {
        self.policy_document
            .statement
            .iter()
            .any(|s| s.effect == Effect::Allow)
    }

    fn add_method(&mut self, effect: Effect, verb: &str, resource: &str) {
        self.policy_document.statement.push(PolicyStatement {
            action: vec![EXECUTE_API_INVOKE.to_string()],
            effect,
            resource: vec![self.method_arn.resource_arn(verb, resource)],
        });
    }
}
