//! reqwest-backed [`QuotaGateway`] talking to one or more quota servers over JSON/HTTP.
//!
//! # Wire Format
//!
//! - `POST {server}/v1/managers/{manager_id}/grants` with `{scope, resources, options}` returns
//!   `{"id": "..."}` on success. `429` and `503` mean the allotment is exhausted (with an
//!   optional `Retry-After` hint), `404` means the manager is unknown.
//! - `POST {server}/v1/grants/{id}/dismiss` with `{outcome, error}` settles a grant on the server
//!   that issued it.
//!
//! Grant requests start at a random server and fail over to the next one on transport errors
//! only; any HTTP answer is final.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use reqwest::{
	StatusCode,
	header::{HeaderMap, RETRY_AFTER},
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	config::QuotaConfig,
	error::{ConfigError, QuotaError},
	gateway::{Grant, GrantFuture, GrantOutcome, GrantRequest, QuotaGateway},
	obs,
};

/// Multi-server HTTP quota gateway.
#[derive(Clone, Debug)]
pub struct HttpQuotaGateway {
	client: ReqwestClient,
	servers: Arc<[Url]>,
	disposed: Arc<AtomicBool>,
}
impl HttpQuotaGateway {
	/// Builds a gateway with a default reqwest client.
	pub fn new(servers: impl IntoIterator<Item = Url>) -> Result<Self, ConfigError> {
		Self::with_client(ReqwestClient::default(), servers)
	}

	/// Builds a gateway that reuses an existing reqwest client.
	pub fn with_client(
		client: ReqwestClient,
		servers: impl IntoIterator<Item = Url>,
	) -> Result<Self, ConfigError> {
		let servers = servers.into_iter().collect::<Vec<_>>();

		if servers.is_empty() {
			return Err(ConfigError::NoServers);
		}
		if let Some(server) = servers.iter().find(|server| server.cannot_be_a_base()) {
			return Err(ConfigError::UnsupportedServer { address: server.to_string() });
		}

		Ok(Self { client, servers: servers.into(), disposed: Default::default() })
	}

	/// Builds a gateway from session configuration, honoring the request timeout.
	pub fn from_config(config: &QuotaConfig) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder();

		if let Some(timeout) = config.request_timeout() {
			builder = builder.timeout(timeout);
		}

		Self::with_client(builder.build()?, config.servers.iter().cloned())
	}

	/// Configured server addresses.
	pub fn servers(&self) -> &[Url] {
		&self.servers
	}

	async fn request_from(&self, server: &Url, request: &GrantRequest) -> Attempt {
		let endpoint = endpoint(server, &["v1", "managers", &request.manager_id, "grants"]);
		let body = GrantBody {
			scope: &request.scope,
			resources: &request.resources,
			options: &request.options,
		};
		let response = match self.client.post(endpoint).json(&body).send().await {
			Ok(response) => response,
			Err(e) => return Attempt::Transport(e),
		};
		let status = response.status();
		let manager_id = request.manager_id.clone();

		if status.is_success() {
			return match response.json::<GrantIssued>().await {
				Ok(issued) => Attempt::Granted(HttpGrant {
					id: issued.id,
					manager_id,
					server: server.clone(),
					client: self.client.clone(),
				}),
				Err(e) => Attempt::Refused(QuotaError::Rejected {
					manager_id,
					reason: format!("malformed grant response ({e})"),
				}),
			};
		}

		let retry_after = parse_retry_after(response.headers());
		let error = match status {
			StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE =>
				QuotaError::Exhausted { manager_id, retry_after },
			StatusCode::NOT_FOUND => QuotaError::UnknownManager { manager_id },
			_ => QuotaError::Rejected { manager_id, reason: format!("HTTP {}", status.as_u16()) },
		};

		Attempt::Refused(error)
	}
}
impl QuotaGateway for HttpQuotaGateway {
	fn request_grant<'a>(&'a self, request: &'a GrantRequest) -> GrantFuture<'a> {
		Box::pin(async move {
			if self.disposed.load(Ordering::Acquire) {
				return Err(QuotaError::Disposed);
			}

			let count = self.servers.len();
			let start = rand::random_range(0..count);
			let mut last_failure = None;

			for offset in 0..count {
				let server = &self.servers[(start + offset) % count];

				match self.request_from(server, request).await {
					Attempt::Granted(grant) => {
						let grant: Box<dyn Grant> = Box::new(grant);

						return Ok(grant);
					},
					Attempt::Refused(e) => return Err(e),
					Attempt::Transport(e) => {
						obs::report_server_failure(server.as_str(), &e);

						last_failure = Some(e);
					},
				}
			}

			match last_failure {
				Some(e) => Err(QuotaError::unreachable(e)),
				None => Err(QuotaError::Disposed),
			}
		})
	}

	fn dispose(&self) {
		self.disposed.store(true, Ordering::Release);
	}
}

enum Attempt {
	Granted(HttpGrant),
	Refused(QuotaError),
	Transport(ReqwestError),
}

#[derive(Serialize)]
struct GrantBody<'a> {
	scope: &'a crate::request::ScopeKey,
	resources: &'a crate::request::ResourceCost,
	options: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct GrantIssued {
	id: String,
}

#[derive(Serialize)]
struct DismissBody {
	outcome: &'static str,
	error: Option<String>,
}

/// Grant issued by a specific quota server.
#[derive(Debug)]
struct HttpGrant {
	id: String,
	manager_id: String,
	server: Url,
	client: ReqwestClient,
}
impl Grant for HttpGrant {
	fn dismiss(self: Box<Self>, outcome: GrantOutcome<'_>) {
		let body = DismissBody {
			outcome: outcome.as_str(),
			error: match outcome {
				GrantOutcome::Failure(e) => Some(e.to_string()),
				_ => None,
			},
		};
		let endpoint = endpoint(&self.server, &["v1", "grants", &self.id, "dismiss"]);
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			obs::report_dismiss_failure(&self.manager_id, &"no async runtime available");

			return;
		};

		runtime.spawn(async move {
			let result = self
				.client
				.post(endpoint)
				.json(&body)
				.send()
				.await
				.and_then(reqwest::Response::error_for_status);

			if let Err(e) = result {
				obs::report_dismiss_failure(&self.manager_id, &e);
			}
		});
	}
}

fn endpoint(server: &Url, segments: &[&str]) -> Url {
	let mut url = server.clone();

	// Servers are validated as base URLs at construction.
	if let Ok(mut path) = url.path_segments_mut() {
		path.pop_if_empty().extend(segments);
	}

	url
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return i64::try_from(secs).ok().map(Duration::seconds);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Fixture URL should parse.")
	}

	#[test]
	fn endpoints_append_segments_and_escape_ids() {
		assert_eq!(
			endpoint(&url("http://quota:7070"), &["v1", "managers", "ga-core", "grants"]).as_str(),
			"http://quota:7070/v1/managers/ga-core/grants"
		);
		assert_eq!(
			endpoint(&url("http://quota:7070/base/"), &["v1", "grants", "a/b", "dismiss"]).as_str(),
			"http://quota:7070/base/v1/grants/a%2Fb/dismiss"
		);
	}

	#[test]
	fn retry_after_accepts_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("18446744073709551615"));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn construction_requires_base_urls() {
		assert!(matches!(HttpQuotaGateway::new(Vec::new()), Err(ConfigError::NoServers)));
		assert!(matches!(
			HttpQuotaGateway::new([url("mailto:quota@example.com")]),
			Err(ConfigError::UnsupportedServer { .. })
		));
		assert_eq!(
			HttpQuotaGateway::new([url("http://quota:7070")])
				.expect("HTTP server should be accepted.")
				.servers()
				.len(),
			1
		);
	}
}
