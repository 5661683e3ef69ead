//! Crate-level error types shared by the interceptor, gateways, and lifecycle controller.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for opaque dispatch and transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Quota-layer failures ([`Error::QuotaUnavailable`], [`Error::MalformedRequest`]) are raised
/// before the wrapped call is attempted. [`Error::Call`] carries the wrapped call's own error.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The quota gateway could not issue a grant; the call was not attempted.
	#[error(transparent)]
	QuotaUnavailable(#[from] QuotaError),
	/// A policy extractor or the `quota` parameter rejected the request shape.
	#[error(transparent)]
	MalformedRequest(#[from] MalformedRequest),
	/// Failure reported by the underlying dispatch, passed through verbatim.
	#[error(transparent)]
	Call(#[from] CallError),
}
impl Error {
	/// Returns `true` when the error originated in the quota layer rather than the wrapped call.
	pub fn is_quota_layer(&self) -> bool {
		matches!(self, Self::QuotaUnavailable(_) | Self::MalformedRequest(_))
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// No quota servers were configured.
	#[error("At least one quota server address is required.")]
	NoServers,
	/// A quota server address cannot be parsed.
	#[error("Quota server address `{address}` is invalid.")]
	InvalidServer {
		/// Raw address supplied by the caller.
		address: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A quota server address cannot serve as a base URL.
	#[error("Quota server address `{address}` cannot be used as a base URL.")]
	UnsupportedServer {
		/// Rejected address.
		address: String,
	},
	/// Manager prefix is empty or contains whitespace.
	#[error("Manager prefix `{prefix}` must be non-empty and free of whitespace.")]
	InvalidManagerPrefix {
		/// Rejected prefix.
		prefix: String,
	},
	/// A policy matcher failed to compile.
	#[error("Policy matcher for manager `{manager}` is invalid.")]
	InvalidMatcher {
		/// Manager the rule was registered for.
		manager: String,
		/// Regex compilation failure.
		#[source]
		source: regex::Error,
	},
	/// A policy rule was built without a manager name.
	#[error("Policy rule requires a non-empty manager name.")]
	MissingManagerName,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Reasons a quota gateway could not issue a grant.
#[derive(Debug, ThisError)]
pub enum QuotaError {
	/// The manager has no remaining allotment for the scope.
	#[error("Quota exhausted for manager `{manager_id}`.")]
	Exhausted {
		/// Fully prefixed manager identifier.
		manager_id: String,
		/// Retry hint reported by the gateway, if any.
		retry_after: Option<Duration>,
	},
	/// The gateway refused the request for a reason other than exhaustion.
	#[error("Quota gateway rejected the request for manager `{manager_id}`: {reason}.")]
	Rejected {
		/// Fully prefixed manager identifier.
		manager_id: String,
		/// Gateway-supplied reason string.
		reason: String,
	},
	/// The manager is not known to the gateway.
	#[error("Quota manager `{manager_id}` is not registered.")]
	UnknownManager {
		/// Fully prefixed manager identifier.
		manager_id: String,
	},
	/// The gateway has been disposed and refuses new grants.
	#[error("Quota gateway has been disposed.")]
	Disposed,
	/// Every configured server failed at the transport level.
	#[error("Quota gateway is unreachable.")]
	Unreachable {
		/// Last transport failure observed.
		#[source]
		source: BoxError,
	},
}
impl QuotaError {
	/// Wraps a transport failure as [`QuotaError::Unreachable`].
	pub fn unreachable(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Unreachable { source: Box::new(src) }
	}

	/// Returns the retry hint attached to an exhaustion error.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Exhausted { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}

/// Request shapes rejected by policy extractors or by `quota` parameter parsing.
#[derive(Debug, ThisError)]
pub enum MalformedRequest {
	/// A parameter required by the matched policy is absent.
	#[error("Request to `{url}` is missing the `{param}` parameter.")]
	MissingParam {
		/// Request URL template.
		url: String,
		/// Parameter name.
		param: &'static str,
	},
	/// A parameter is present but does not match the expected pattern.
	#[error("Parameter `{param}` of request to `{url}` does not match `{pattern}`.")]
	PatternMismatch {
		/// Request URL template.
		url: String,
		/// Parameter name.
		param: &'static str,
		/// Expected pattern.
		pattern: &'static str,
	},
	/// The `quota` parameter is neither `false` nor a valid override object.
	#[error("The `quota` parameter is invalid.")]
	InvalidQuotaParam {
		/// Structured parsing failure including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The `quota` parameter has an unsupported JSON type.
	#[error("The `quota` parameter must be `false` or an object, found {found}.")]
	UnsupportedQuotaParam {
		/// JSON type label of the rejected value.
		found: &'static str,
	},
}

/// Opaque failure reported by the wrapped dispatch.
#[derive(Debug, ThisError)]
#[error(transparent)]
pub struct CallError(pub BoxError);
impl CallError {
	/// Wraps any dispatch error without altering it.
	pub fn new(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self(Box::new(src))
	}

	/// Borrows the wrapped error as a concrete type.
	pub fn downcast_ref<E>(&self) -> Option<&E>
	where
		E: 'static + std::error::Error,
	{
		self.0.downcast_ref::<E>()
	}

	/// Returns the wrapped error.
	pub fn into_inner(self) -> BoxError {
		self.0
	}
}
impl From<BoxError> for CallError {
	fn from(e: BoxError) -> Self {
		Self(e)
	}
}
