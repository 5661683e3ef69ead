//! Optional observability helpers for intercepted calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `googleapis_quota.call` with the `manager` and `stage`
//!   fields, plus warning events for dismissal and server failures.
//! - Enable `metrics` to increment the `googleapis_quota_grant_total` counter for every quota
//!   decision, labeled by `event`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Quota decisions observed by the interceptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantEvent {
	/// The call skipped quota handling (`quota: false` or no manager).
	Bypassed,
	/// A grant was issued.
	Granted,
	/// The gateway refused the grant.
	Denied,
	/// The request shape was rejected before asking the gateway.
	Malformed,
	/// A grant was dismissed after a successful call.
	DismissedSuccess,
	/// A grant was dismissed after a failed or abandoned call.
	DismissedFailure,
}
impl GrantEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantEvent::Bypassed => "bypassed",
			GrantEvent::Granted => "granted",
			GrantEvent::Denied => "denied",
			GrantEvent::Malformed => "malformed",
			GrantEvent::DismissedSuccess => "dismissed_success",
			GrantEvent::DismissedFailure => "dismissed_failure",
		}
	}
}
impl Display for GrantEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reports a grant dismissal that could not be delivered. Never panics.
pub fn report_dismiss_failure(manager_id: &str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		::tracing::warn!(manager = manager_id, error = %error, "failed to dismiss quota grant");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (manager_id, error);
	}
}

/// Reports a quota server that failed at the transport level before failing over.
pub fn report_server_failure(server: &str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		::tracing::warn!(server, error = %error, "quota server unreachable");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (server, error);
	}
}

/// Reports a lifecycle transition (`started`, `replaced`, `stopped`).
pub fn report_lifecycle(transition: &'static str, manager_prefix: &str) {
	#[cfg(feature = "tracing")]
	{
		::tracing::info!(transition, manager_prefix, "quota interception lifecycle");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (transition, manager_prefix);
	}
}
