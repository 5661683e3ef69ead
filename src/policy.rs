//! Declarative quota policies keyed by request URL templates.
//!
//! A [`PolicyRule`] pairs a URL matcher with the manager it charges and two pure extractors that
//! derive the scope and resource cost of a request. [`PolicyTable`] evaluates rules in
//! registration order and returns the first match; [`PolicyCache`] memoizes that lookup per URL.

pub mod analytics;
pub mod cache;

pub use cache::PolicyCache;

// crates.io
use regex::Regex;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, MalformedRequest},
	request::{ApiRequest, ResourceCost, ScopeKey},
};

/// Pure function deriving the scope key of a request.
pub type ScopeExtractor =
	Arc<dyn Fn(&ApiRequest) -> Result<ScopeKey, MalformedRequest> + Send + Sync>;
/// Pure function deriving the resource cost of a request.
pub type ResourceExtractor =
	Arc<dyn Fn(&ApiRequest) -> Result<ResourceCost, MalformedRequest> + Send + Sync>;

/// Maps a request route template to its manager, scope, and resource cost.
#[derive(Clone)]
pub struct PolicyRule {
	manager_name: String,
	matcher: Regex,
	scope: ScopeExtractor,
	resources: ResourceExtractor,
}
impl PolicyRule {
	/// Starts a rule for `manager_name` matching URLs against `pattern`.
	pub fn builder(manager_name: impl Into<String>, pattern: impl AsRef<str>) -> PolicyRuleBuilder {
		PolicyRuleBuilder {
			manager_name: manager_name.into(),
			pattern: pattern.as_ref().to_owned(),
			scope: None,
			resources: None,
		}
	}

	/// Manager name charged by this rule (without prefix).
	pub fn manager_name(&self) -> &str {
		&self.manager_name
	}

	/// Returns `true` when the rule applies to `url`.
	pub fn matches(&self, url: &str) -> bool {
		self.matcher.is_match(url)
	}

	/// Derives the scope key for `request`.
	pub fn scope_for(&self, request: &ApiRequest) -> Result<ScopeKey, MalformedRequest> {
		(self.scope)(request)
	}

	/// Derives the resource cost for `request`.
	pub fn resources_for(&self, request: &ApiRequest) -> Result<ResourceCost, MalformedRequest> {
		(self.resources)(request)
	}
}
impl Debug for PolicyRule {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PolicyRule")
			.field("manager_name", &self.manager_name)
			.field("matcher", &self.matcher.as_str())
			.finish()
	}
}

/// Builder for [`PolicyRule`].
///
/// Unset extractors default to an empty scope and a cost of one request.
pub struct PolicyRuleBuilder {
	manager_name: String,
	pattern: String,
	scope: Option<ScopeExtractor>,
	resources: Option<ResourceExtractor>,
}
impl PolicyRuleBuilder {
	/// Sets the scope extractor.
	pub fn scope<F>(mut self, extractor: F) -> Self
	where
		F: 'static + Fn(&ApiRequest) -> Result<ScopeKey, MalformedRequest> + Send + Sync,
	{
		self.scope = Some(Arc::new(extractor));

		self
	}

	/// Sets the resource extractor.
	pub fn resources<F>(mut self, extractor: F) -> Self
	where
		F: 'static + Fn(&ApiRequest) -> Result<ResourceCost, MalformedRequest> + Send + Sync,
	{
		self.resources = Some(Arc::new(extractor));

		self
	}

	/// Compiles the matcher and finalizes the rule.
	pub fn build(self) -> Result<PolicyRule, ConfigError> {
		if self.manager_name.trim().is_empty() {
			return Err(ConfigError::MissingManagerName);
		}

		let matcher = Regex::new(&self.pattern).map_err(|source| ConfigError::InvalidMatcher {
			manager: self.manager_name.clone(),
			source,
		})?;

		Ok(PolicyRule {
			manager_name: self.manager_name,
			matcher,
			scope: self.scope.unwrap_or_else(|| Arc::new(empty_scope)),
			resources: self.resources.unwrap_or_else(|| Arc::new(one_request)),
		})
	}
}
impl Debug for PolicyRuleBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PolicyRuleBuilder")
			.field("manager_name", &self.manager_name)
			.field("pattern", &self.pattern)
			.finish()
	}
}

/// Ordered, first-match-wins list of policy rules.
#[derive(Clone, Debug, Default)]
pub struct PolicyTable {
	rules: Vec<Arc<PolicyRule>>,
}
impl PolicyTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a rule; earlier rules take precedence.
	pub fn register(&mut self, rule: PolicyRule) -> &mut Self {
		self.rules.push(Arc::new(rule));

		self
	}

	/// Builder-style variant of [`PolicyTable::register`].
	pub fn with_rule(mut self, rule: PolicyRule) -> Self {
		self.register(rule);

		self
	}

	/// Returns the first rule whose matcher accepts `url`.
	pub fn find_rule(&self, url: &str) -> Option<Arc<PolicyRule>> {
		self.rules.iter().find(|rule| rule.matches(url)).cloned()
	}

	/// Number of registered rules.
	pub fn len(&self) -> usize {
		self.rules.len()
	}

	/// Returns `true` when no rules are registered.
	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}
}

/// Resource cost of exactly one request.
pub fn single_request() -> ResourceCost {
	ResourceCost::from([("requests".to_owned(), 1)])
}

fn empty_scope(_: &ApiRequest) -> Result<ScopeKey, MalformedRequest> {
	Ok(ScopeKey::new())
}

fn one_request(_: &ApiRequest) -> Result<ResourceCost, MalformedRequest> {
	Ok(single_request())
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::_preludet::api_request;

	fn rule(manager: &str, pattern: &str) -> PolicyRule {
		PolicyRule::builder(manager, pattern).build().expect("Fixture rule should build.")
	}

	#[test]
	fn first_registered_match_wins() {
		let table = PolicyTable::new()
			.with_rule(rule("specific", r"/data/ga$"))
			.with_rule(rule("fallback", r"/data/.+$"));

		let manager = |url: &str| table.find_rule(url).map(|rule| rule.manager_name().to_owned());

		assert_eq!(
			manager("https://www.googleapis.com/analytics/v3/data/ga").as_deref(),
			Some("specific")
		);
		assert_eq!(
			manager("https://www.googleapis.com/analytics/v3/data/mcf").as_deref(),
			Some("fallback")
		);
		assert_eq!(manager("https://www.googleapis.com/analytics/v3/management/accounts"), None);
	}

	#[test]
	fn builder_defaults_to_single_request_and_empty_scope() {
		let rule = rule("core", r"/data/ga$");
		let request = api_request("/data/ga", json!({}));

		let scope = rule.scope_for(&request).expect("Default scope should not fail.");
		let resources = rule.resources_for(&request).expect("Default cost should not fail.");

		assert_eq!(scope, ScopeKey::new());
		assert_eq!(resources, single_request());
	}

	#[test]
	fn builder_rejects_bad_patterns_and_names() {
		assert!(matches!(
			PolicyRule::builder("core", "(").build(),
			Err(ConfigError::InvalidMatcher { .. })
		));
		assert!(matches!(
			PolicyRule::builder(" ", "/data").build(),
			Err(ConfigError::MissingManagerName)
		));
	}
}
