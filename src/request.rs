//! Outgoing request and response shapes plus the per-call `quota` parameter.
//!
//! Every request carries a templated endpoint URL (for example
//! `https://www.googleapis.com/analytics/v3/data/ga`) and a JSON parameter map. The optional
//! `quota` parameter controls this layer:
//!
//! - `false` disables quota handling for the call.
//! - An object with any subset of `managerName`, `scope`, `resources`, and `options` overrides
//!   the values a policy rule would derive.
//! - `null`, `true`, or an absent key mean "no override".

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, error::MalformedRequest};

/// Name of the per-call quota parameter.
pub const QUOTA_PARAM: &str = "quota";

/// Scope key identifying which quota bucket instance a request consumes from.
pub type ScopeKey = BTreeMap<String, String>;
/// Amount of each resource kind a single call consumes.
pub type ResourceCost = BTreeMap<String, u64>;

/// One outgoing API call as seen by the interceptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
	/// Templated endpoint URL (not the resolved URI).
	pub url: String,
	/// Call parameters, including the optional `quota` entry.
	#[serde(default)]
	pub params: Map<String, Value>,
}
impl ApiRequest {
	/// Creates a request for the provided URL template and parameters.
	pub fn new(url: impl Into<String>, params: Map<String, Value>) -> Self {
		Self { url: url.into(), params }
	}

	/// Returns a string parameter, if present.
	pub fn param_str(&self, name: &str) -> Option<&str> {
		self.params.get(name).and_then(Value::as_str)
	}

	/// Interprets the `quota` parameter.
	pub fn quota_directive(&self) -> Result<QuotaDirective, MalformedRequest> {
		QuotaDirective::from_value(self.params.get(QUOTA_PARAM))
	}
}

/// Response returned by the wrapped dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
	/// HTTP status code reported by the host client.
	pub status: u16,
	/// Decoded response body.
	pub body: Value,
}
impl ApiResponse {
	/// Creates a response from a status and body.
	pub fn new(status: u16, body: Value) -> Self {
		Self { status, body }
	}
}

/// Caller-supplied values that take precedence over policy-derived ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuotaOverride {
	/// Manager name (without prefix).
	pub manager_name: Option<String>,
	/// Scope key.
	pub scope: Option<ScopeKey>,
	/// Resource cost.
	pub resources: Option<ResourceCost>,
	/// Extra options forwarded to the gateway.
	pub options: Option<Map<String, Value>>,
}

/// Parsed form of the `quota` parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaDirective {
	/// Quota handling is disabled for this call.
	Disabled,
	/// Policy-derived values apply, overridden by any fields set here.
	Apply(QuotaOverride),
}
impl QuotaDirective {
	fn from_value(value: Option<&Value>) -> Result<Self, MalformedRequest> {
		match value {
			None | Some(Value::Null) | Some(Value::Bool(true)) =>
				Ok(Self::Apply(QuotaOverride::default())),
			Some(Value::Bool(false)) => Ok(Self::Disabled),
			Some(value @ Value::Object(_)) => serde_path_to_error::deserialize(value)
				.map(Self::Apply)
				.map_err(|source| MalformedRequest::InvalidQuotaParam { source }),
			Some(other) => Err(MalformedRequest::UnsupportedQuotaParam { found: json_type(other) }),
		}
	}
}

fn json_type(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn request(params: Value) -> ApiRequest {
		let Value::Object(params) = params else { panic!("Fixture params must be an object.") };

		ApiRequest::new("/data/ga", params)
	}

	#[test]
	fn quota_false_disables_and_absent_applies() {
		assert_eq!(
			request(json!({ "quota": false })).quota_directive().expect("False should parse."),
			QuotaDirective::Disabled
		);

		for params in [json!({}), json!({ "quota": null }), json!({ "quota": true })] {
			assert_eq!(
				request(params).quota_directive().expect("Empty directives should parse."),
				QuotaDirective::Apply(QuotaOverride::default())
			);
		}
	}

	#[test]
	fn partial_overrides_keep_unset_fields_empty() {
		let directive =
			request(json!({ "quota": { "managerName": "custom", "resources": { "requests": 5 } } }))
				.quota_directive()
				.expect("Partial override should parse.");
		let QuotaDirective::Apply(over) = directive else { panic!("Override should apply.") };

		assert_eq!(over.manager_name.as_deref(), Some("custom"));
		assert_eq!(over.resources, Some(ResourceCost::from([("requests".into(), 5)])));
		assert!(over.scope.is_none());
		assert!(over.options.is_none());
	}

	#[test]
	fn malformed_quota_reports_the_offending_path() {
		let err = request(json!({ "quota": { "resources": { "requests": "many" } } }))
			.quota_directive()
			.expect_err("Non-numeric resources should be rejected.");
		let MalformedRequest::InvalidQuotaParam { source } = err else {
			panic!("Expected an InvalidQuotaParam error.");
		};

		assert_eq!(source.path().to_string(), "resources.requests");

		let err = request(json!({ "quota": "off" }))
			.quota_directive()
			.expect_err("String directives should be rejected.");

		assert!(matches!(err, MalformedRequest::UnsupportedQuotaParam { found: "a string" }));
	}
}
