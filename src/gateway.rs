//! Quota gateway contracts and the scoped guard that settles grants.
//!
//! A [`QuotaGateway`] issues [`Grant`]s against named managers. Every grant must be dismissed
//! exactly once: [`Grant::dismiss`] consumes the boxed handle so a second dismissal cannot be
//! expressed, and [`GrantGuard`] dismisses with [`GrantOutcome::Abandoned`] when dropped before
//! the caller settles it (for example, when the call future is cancelled).

pub mod memory;
#[cfg(feature = "reqwest")] pub mod http;

#[cfg(feature = "reqwest")] pub use http::HttpQuotaGateway;
pub use memory::MemoryGateway;

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	error::QuotaError,
	request::{ResourceCost, ScopeKey},
};

/// Boxed future returned by [`QuotaGateway::request_grant`].
pub type GrantFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Box<dyn Grant>, QuotaError>> + 'a + Send>>;

/// Connection to a quota-granting service.
///
/// Implementations are shared process-wide and must support concurrent outstanding grant
/// requests.
pub trait QuotaGateway
where
	Self: Send + Sync,
{
	/// Reserves `request.resources` from `request.manager_id` for `request.scope`.
	///
	/// May suspend until the gateway decides. A failure means the wrapped call must not run.
	fn request_grant<'a>(&'a self, request: &'a GrantRequest) -> GrantFuture<'a>;

	/// Releases gateway-owned resources. Safe to call repeatedly or without prior use.
	fn dispose(&self);
}

/// Reserved allotment for one call.
pub trait Grant
where
	Self: Debug + Send,
{
	/// Settles the grant with the call outcome. Must not panic; internal failures are reported
	/// through logging only.
	fn dismiss(self: Box<Self>, outcome: GrantOutcome<'_>);
}

/// Everything a gateway needs to decide on a grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrantRequest {
	/// Fully prefixed manager identifier (`{prefix}-{manager_name}`).
	pub manager_id: String,
	/// Scope key of the quota bucket.
	pub scope: ScopeKey,
	/// Resource cost of the call.
	pub resources: ResourceCost,
	/// Extra gateway options.
	pub options: Map<String, Value>,
}

/// How the guarded call ended.
#[derive(Clone, Copy, Debug)]
pub enum GrantOutcome<'a> {
	/// The call completed successfully.
	Success,
	/// The call failed with the given error.
	Failure(&'a (dyn StdError + 'static)),
	/// The call future was dropped before completion.
	Abandoned,
}
impl GrantOutcome<'_> {
	/// Stable label suitable for wire payloads and metric fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failure(_) => "failure",
			Self::Abandoned => "abandoned",
		}
	}
}

type DismissHook<'a> = Box<dyn FnOnce(GrantOutcome<'_>) + 'a + Send>;

/// RAII guard that dismisses its grant exactly once.
///
/// An optional hook registered with [`GrantGuard::on_dismiss`] observes that single dismissal,
/// whether it comes from [`GrantGuard::settle`] or from dropping the guard.
pub struct GrantGuard<'a> {
	grant: Option<Box<dyn Grant>>,
	on_dismiss: Option<DismissHook<'a>>,
}
impl<'a> GrantGuard<'a> {
	/// Takes ownership of `grant`.
	pub fn new(grant: Box<dyn Grant>) -> Self {
		Self { grant: Some(grant), on_dismiss: None }
	}

	/// Runs `hook` with the outcome right after the grant is dismissed.
	pub fn on_dismiss<F>(mut self, hook: F) -> Self
	where
		F: 'a + FnOnce(GrantOutcome<'_>) + Send,
	{
		self.on_dismiss = Some(Box::new(hook));

		self
	}

	/// Dismisses with an outcome derived from `result`, consuming the guard.
	pub fn settle<T, E>(mut self, result: &Result<T, E>)
	where
		E: 'static + StdError,
	{
		let outcome = match result {
			Ok(_) => GrantOutcome::Success,
			Err(e) => GrantOutcome::Failure(e),
		};

		self.dismiss(outcome);
	}

	fn dismiss(&mut self, outcome: GrantOutcome<'_>) {
		let Some(grant) = self.grant.take() else { return };

		grant.dismiss(outcome);

		if let Some(hook) = self.on_dismiss.take() {
			hook(outcome);
		}
	}
}
impl Debug for GrantGuard<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GrantGuard")
			.field("grant", &self.grant)
			.field("observed", &self.on_dismiss.is_some())
			.finish()
	}
}
impl Drop for GrantGuard<'_> {
	fn drop(&mut self) {
		self.dismiss(GrantOutcome::Abandoned);
	}
}
