//! Per-call quota orchestration.
//!
//! [`RequestInterceptor::handle`] resolves the policy for a request, merges it with the
//! caller's `quota` override, acquires a grant, runs the wrapped dispatch, and settles the grant
//! with the call outcome. Quota-layer failures abort the call before dispatch; dispatch results
//! pass through unchanged.
//!
//! # Merge Precedence
//!
//! Caller-supplied override fields always win. Rule-derived values only fill fields the caller
//! left unset, and a rule's extractors run only for those fields. When neither side names a
//! manager, or the caller names an empty one, the call proceeds without quota.

// crates.io
use serde_json::Map;
// self
use crate::{
	_prelude::*,
	config::DEFAULT_MANAGER_PREFIX,
	dispatch::{Dispatch, DispatchFuture},
	gateway::{GrantGuard, GrantOutcome, GrantRequest, QuotaGateway},
	obs::{GrantEvent, InterceptorMetrics, QuotaSpan},
	policy::{PolicyCache, PolicyTable},
	request::{ApiRequest, ApiResponse, QuotaDirective, QuotaOverride},
};

/// Fully resolved quota parameters for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct QuotaDecision {
	/// Manager name without prefix.
	pub manager_name: String,
	/// Gateway request derived from the decision.
	pub grant: GrantRequest,
}

/// Applies quota policies around a wrapped dispatch.
pub struct RequestInterceptor {
	gateway: Arc<dyn QuotaGateway>,
	policies: PolicyCache,
	manager_prefix: String,
	metrics: InterceptorMetrics,
}
impl RequestInterceptor {
	/// Creates an interceptor using `policies` and the default `ga` prefix.
	pub fn new(gateway: Arc<dyn QuotaGateway>, policies: PolicyTable) -> Self {
		Self {
			gateway,
			policies: PolicyCache::new(policies),
			manager_prefix: DEFAULT_MANAGER_PREFIX.to_owned(),
			metrics: Default::default(),
		}
	}

	/// Overrides the manager prefix.
	pub fn with_manager_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.manager_prefix = prefix.into();

		self
	}

	/// Prefix joined to manager names.
	pub fn manager_prefix(&self) -> &str {
		&self.manager_prefix
	}

	/// Policy cache consulted per call.
	pub fn policies(&self) -> &PolicyCache {
		&self.policies
	}

	/// Counters for decisions taken by this interceptor.
	pub fn metrics(&self) -> &InterceptorMetrics {
		&self.metrics
	}

	/// Computes the quota decision for `request`, or `None` when quota does not apply.
	///
	/// Fails with [`Error::MalformedRequest`] when the `quota` parameter or a policy extractor
	/// rejects the request.
	pub fn decide(&self, request: &ApiRequest) -> Result<Option<QuotaDecision>> {
		let over = match request.quota_directive()? {
			QuotaDirective::Disabled => return Ok(None),
			QuotaDirective::Apply(over) => over,
		};
		let rule = self.policies.resolve(&request.url);
		let QuotaOverride { manager_name, scope, resources, options } = over;
		// An empty caller-supplied name clears the rule's manager.
		let Some(manager_name) = manager_name
			.or_else(|| rule.as_ref().map(|rule| rule.manager_name().to_owned()))
			.filter(|name| !name.is_empty())
		else {
			return Ok(None);
		};
		let scope = match (scope, &rule) {
			(Some(scope), _) => scope,
			(None, Some(rule)) => rule.scope_for(request)?,
			(None, None) => Default::default(),
		};
		let resources = match (resources, &rule) {
			(Some(resources), _) => resources,
			(None, Some(rule)) => rule.resources_for(request)?,
			(None, None) => Default::default(),
		};
		let manager_id = format!("{}-{manager_name}", self.manager_prefix);

		Ok(Some(QuotaDecision {
			manager_name,
			grant: GrantRequest {
				manager_id,
				scope,
				resources,
				options: options.unwrap_or_else(Map::new),
			},
		}))
	}

	/// Runs `request` through `dispatch` under quota control.
	pub async fn handle(
		&self,
		request: ApiRequest,
		dispatch: &dyn Dispatch,
	) -> Result<ApiResponse> {
		let decision = match self.decide(&request) {
			Ok(decision) => decision,
			Err(e) => {
				self.metrics.record(GrantEvent::Malformed);

				return Err(e);
			},
		};
		let Some(decision) = decision else {
			self.metrics.record(GrantEvent::Bypassed);

			return dispatch.dispatch(request).await;
		};
		let span = QuotaSpan::new(&decision.grant.manager_id, "handle");

		span.instrument(async move {
			let grant = match self.gateway.request_grant(&decision.grant).await {
				Ok(grant) => grant,
				Err(e) => {
					self.metrics.record(GrantEvent::Denied);

					return Err(Error::from(e));
				},
			};

			self.metrics.record(GrantEvent::Granted);

			let metrics = &self.metrics;
			// Dropping this future mid-dispatch dismisses the grant as abandoned.
			let guard = GrantGuard::new(grant).on_dismiss(move |outcome| {
				metrics.record(match outcome {
					GrantOutcome::Success => GrantEvent::DismissedSuccess,
					GrantOutcome::Failure(_) | GrantOutcome::Abandoned =>
						GrantEvent::DismissedFailure,
				})
			});
			let result = dispatch.dispatch(request).await;

			guard.settle(&result);

			result
		})
		.await
	}

	/// Continuation-style variant of [`RequestInterceptor::handle`].
	pub async fn handle_with_callback<F>(
		&self,
		request: ApiRequest,
		dispatch: &dyn Dispatch,
		callback: F,
	)
	where
		F: FnOnce(Result<ApiResponse>),
	{
		callback(self.handle(request, dispatch).await)
	}
}
impl Debug for RequestInterceptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestInterceptor")
			.field("manager_prefix", &self.manager_prefix)
			.field("policies", &self.policies)
			.finish()
	}
}

/// [`Dispatch`] shim installed on a [`DispatchHook`](crate::dispatch::DispatchHook) that routes
/// each call through an interceptor before delegating to the saved original.
pub struct InterceptedDispatch {
	interceptor: Arc<RequestInterceptor>,
	original: Arc<dyn Dispatch>,
}
impl InterceptedDispatch {
	/// Wraps `original` with `interceptor`.
	pub fn new(interceptor: Arc<RequestInterceptor>, original: Arc<dyn Dispatch>) -> Self {
		Self { interceptor, original }
	}

	/// Interceptor applied to each call.
	pub fn interceptor(&self) -> &Arc<RequestInterceptor> {
		&self.interceptor
	}
}
impl Dispatch for InterceptedDispatch {
	fn dispatch(&self, request: ApiRequest) -> DispatchFuture<'_> {
		Box::pin(self.interceptor.handle(request, self.original.as_ref()))
	}
}
impl Debug for InterceptedDispatch {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InterceptedDispatch").field("interceptor", &self.interceptor).finish()
	}
}
