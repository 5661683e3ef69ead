//! Built-in policy rules for the Google Analytics reporting and management APIs.
//!
//! Managers registered here (`core`, `real-time`, `mcf`, `management`, `provisioning`) mirror the
//! quota buckets Google documents for Analytics v3. Every call costs one `requests` unit.

// std
use std::sync::LazyLock;
// crates.io
use regex::Regex;
// self
use crate::{
	_prelude::*,
	error::MalformedRequest,
	policy::{PolicyRule, PolicyTable, ScopeExtractor},
	request::{ApiRequest, ScopeKey},
};

const VIEW_ID_PATTERN: &str = "ga:([0-9]+)";

static VIEW_ID: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(VIEW_ID_PATTERN).expect("View id pattern must compile."));
static CORE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"/data/ga$").expect("Core route pattern must compile."));
static REAL_TIME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"/data/realtime$").expect("Real-time route pattern must compile.")
});
static MCF: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"/data/mcf$").expect("MCF route pattern must compile."));
static MANAGEMENT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"/management/.+$").expect("Management route pattern must compile.")
});
static PROVISIONING: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"/provisioning/.+$").expect("Provisioning route pattern must compile.")
});

impl PolicyTable {
	/// Reporting-only table: the `core` manager for `/data/ga`.
	pub fn analytics() -> Self {
		Self::new().with_rule(core())
	}

	/// Full Analytics table covering reporting, real-time, multi-channel funnels, management, and
	/// provisioning routes.
	pub fn analytics_extended() -> Self {
		Self::new()
			.with_rule(core())
			.with_rule(builtin("real-time", &REAL_TIME, Arc::new(view_scope)))
			.with_rule(builtin("mcf", &MCF, Arc::new(view_scope)))
			.with_rule(builtin("management", &MANAGEMENT, Arc::new(account_scope)))
			.with_rule(builtin("provisioning", &PROVISIONING, Arc::new(super::empty_scope)))
	}
}

/// The `core` reporting rule: `/data/ga`, scoped by the view id carried in `ids`.
pub fn core() -> PolicyRule {
	builtin("core", &CORE, Arc::new(view_scope))
}

/// Parses `{viewId}` out of an `ids` parameter shaped like `ga:12345`.
pub fn view_scope(request: &ApiRequest) -> Result<ScopeKey, MalformedRequest> {
	let ids = request
		.param_str("ids")
		.ok_or_else(|| MalformedRequest::MissingParam { url: request.url.clone(), param: "ids" })?;
	let view_id = VIEW_ID.captures(ids).and_then(|caps| caps.get(1)).ok_or_else(|| {
		MalformedRequest::PatternMismatch {
			url: request.url.clone(),
			param: "ids",
			pattern: VIEW_ID_PATTERN,
		}
	})?;

	Ok(ScopeKey::from([("viewId".to_owned(), view_id.as_str().to_owned())]))
}

/// Scopes management calls by `accountId` when the route carries one.
fn account_scope(request: &ApiRequest) -> Result<ScopeKey, MalformedRequest> {
	Ok(request
		.param_str("accountId")
		.map(|account| ScopeKey::from([("accountId".to_owned(), account.to_owned())]))
		.unwrap_or_default())
}

fn builtin(manager: &str, matcher: &LazyLock<Regex>, scope: ScopeExtractor) -> PolicyRule {
	PolicyRule {
		manager_name: manager.to_owned(),
		matcher: Regex::clone(matcher),
		scope,
		resources: Arc::new(super::one_request),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{_preludet::api_request, policy::single_request, request::ResourceCost};

	const GA: &str = "https://www.googleapis.com/analytics/v3/data/ga";

	#[test]
	fn core_rule_derives_view_scope_and_single_request() {
		let table = PolicyTable::analytics();
		let request = api_request(GA, json!({ "ids": "ga:12345", "metrics": "ga:sessions" }));
		let rule = table.find_rule(&request.url).expect("Core rule should match /data/ga.");

		assert_eq!(rule.manager_name(), "core");
		assert_eq!(
			rule.scope_for(&request).expect("Scope should parse."),
			ScopeKey::from([("viewId".into(), "12345".into())])
		);
		assert_eq!(
			rule.resources_for(&request).expect("Cost should derive."),
			ResourceCost::from([("requests".into(), 1)])
		);
	}

	#[test]
	fn view_scope_surfaces_malformed_ids() {
		let missing = api_request(GA, json!({}));

		assert!(matches!(
			view_scope(&missing),
			Err(MalformedRequest::MissingParam { param: "ids", .. })
		));

		let mismatch = api_request(GA, json!({ "ids": "view-12345" }));

		assert!(matches!(
			view_scope(&mismatch),
			Err(MalformedRequest::PatternMismatch { param: "ids", .. })
		));
	}

	#[test]
	fn extended_table_routes_each_manager() {
		let table = PolicyTable::analytics_extended();
		let manager = |url: &str| table.find_rule(url).map(|rule| rule.manager_name().to_owned());

		assert_eq!(manager(GA).as_deref(), Some("core"));
		assert_eq!(
			manager("https://www.googleapis.com/analytics/v3/data/realtime").as_deref(),
			Some("real-time")
		);
		assert_eq!(
			manager("https://www.googleapis.com/analytics/v3/data/mcf").as_deref(),
			Some("mcf")
		);
		let webproperties =
			"https://www.googleapis.com/analytics/v3/management/accounts/{accountId}/webproperties";

		assert_eq!(manager(webproperties).as_deref(), Some("management"));
		assert_eq!(
			manager("https://www.googleapis.com/analytics/v3/provisioning/createAccountTicket")
				.as_deref(),
			Some("provisioning")
		);
		assert_eq!(manager("https://www.googleapis.com/analytics/v3/metadata/ga/columns"), None);
	}

	#[test]
	fn management_scope_is_optional() {
		let table = PolicyTable::analytics_extended();
		let url = "https://www.googleapis.com/analytics/v3/management/accounts";
		let rule = table.find_rule(url).expect("Management rule should match.");
		let scoped = api_request(url, json!({ "accountId": "998" }));
		let unscoped = api_request(url, json!({}));

		assert_eq!(
			rule.scope_for(&scoped).expect("Scoped management call should derive a scope."),
			ScopeKey::from([("accountId".into(), "998".into())])
		);
		assert!(rule.scope_for(&unscoped).expect("Unscoped call should not fail.").is_empty());
		assert_eq!(rule.resources_for(&unscoped).expect("Cost should derive."), single_request());
	}
}
