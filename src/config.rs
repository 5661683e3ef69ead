//! Session configuration consumed by the lifecycle controller.

// self
use crate::{_prelude::*, error::ConfigError, policy::PolicyTable};

/// Manager prefix applied when none is configured.
pub const DEFAULT_MANAGER_PREFIX: &str = "ga";

/// Settings for one quota session.
///
/// Deserializes from camelCase keys (`servers`, `managerPrefix`, `requestTimeoutMs`). The policy
/// table holds closures and is therefore attached in code via [`QuotaConfig::with_policies`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaConfig {
	/// Quota gateway server addresses.
	#[serde(default)]
	pub servers: Vec<Url>,
	/// Prefix joined to manager names as `{prefix}-{manager}`.
	#[serde(default = "default_manager_prefix")]
	pub manager_prefix: String,
	/// Per-request timeout for gateway HTTP calls, in milliseconds.
	#[serde(default)]
	pub request_timeout_ms: Option<u64>,
	/// Rules used to derive quota decisions.
	#[serde(skip, default = "PolicyTable::analytics")]
	pub policies: PolicyTable,
}
impl QuotaConfig {
	/// Creates a configuration for the given server addresses with default settings.
	pub fn new<I, S>(servers: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let servers = servers
			.into_iter()
			.map(|raw| {
				let address = raw.as_ref();

				Url::parse(address).map_err(|source| ConfigError::InvalidServer {
					address: address.to_owned(),
					source,
				})
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self { servers, ..Default::default() })
	}

	/// Overrides the manager prefix.
	pub fn with_manager_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.manager_prefix = prefix.into();

		self
	}

	/// Overrides the gateway request timeout.
	pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));

		self
	}

	/// Replaces the policy table.
	pub fn with_policies(mut self, policies: PolicyTable) -> Self {
		self.policies = policies;

		self
	}

	/// Gateway request timeout, if configured.
	pub fn request_timeout(&self) -> Option<std::time::Duration> {
		self.request_timeout_ms.map(std::time::Duration::from_millis)
	}

	/// Checks settings that do not depend on the gateway kind.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let prefix = &self.manager_prefix;

		if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
			return Err(ConfigError::InvalidManagerPrefix { prefix: prefix.clone() });
		}

		Ok(())
	}
}
impl Default for QuotaConfig {
	fn default() -> Self {
		Self {
			servers: Vec::new(),
			manager_prefix: default_manager_prefix(),
			request_timeout_ms: None,
			policies: PolicyTable::analytics(),
		}
	}
}

fn default_manager_prefix() -> String {
	DEFAULT_MANAGER_PREFIX.to_owned()
}
