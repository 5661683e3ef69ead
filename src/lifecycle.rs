//! Installs and removes quota interception on a shared [`DispatchHook`].
//!
//! A session pairs one gateway with one interceptor. Starting installs an
//! [`InterceptedDispatch`] that delegates to the hook's original handler; stopping restores that
//! original and disposes the gateway. Starting again while a session is active replaces it and
//! disposes the previous gateway. Stopping without a session does nothing.
//!
//! A hook is meant to have a single controller. When several share one, stopping a controller
//! leaves the hook alone unless its own shim is still installed.

// self
use crate::{
	_prelude::*,
	config::QuotaConfig,
	dispatch::{Dispatch, DispatchHook},
	gateway::QuotaGateway,
	interceptor::{InterceptedDispatch, RequestInterceptor},
	obs,
};
#[cfg(feature = "reqwest")] use crate::gateway::HttpQuotaGateway;

struct Session {
	gateway: Arc<dyn QuotaGateway>,
	interceptor: Arc<RequestInterceptor>,
	shim: Arc<dyn Dispatch>,
}

/// Process-wide start/stop control over quota interception.
pub struct QuotaController {
	hook: Arc<DispatchHook>,
	session: Mutex<Option<Session>>,
}
impl QuotaController {
	/// Creates a controller for `hook` with no active session.
	pub fn new(hook: Arc<DispatchHook>) -> Self {
		Self { hook, session: Mutex::new(None) }
	}

	/// Starts a session backed by an [`HttpQuotaGateway`] built from `config.servers`.
	#[cfg(feature = "reqwest")]
	pub fn start(&self, config: QuotaConfig) -> Result<Arc<RequestInterceptor>> {
		config.validate()?;

		let gateway = HttpQuotaGateway::from_config(&config)?;

		self.start_with_gateway(Arc::new(gateway), config)
	}

	/// Starts a session backed by a caller-supplied gateway.
	///
	/// Returns the installed interceptor so callers can inspect its metrics and policy cache.
	pub fn start_with_gateway(
		&self,
		gateway: Arc<dyn QuotaGateway>,
		config: QuotaConfig,
	) -> Result<Arc<RequestInterceptor>> {
		config.validate()?;

		let QuotaConfig { manager_prefix, policies, .. } = config;
		let interceptor = Arc::new(
			RequestInterceptor::new(gateway.clone(), policies)
				.with_manager_prefix(manager_prefix.clone()),
		);
		let shim: Arc<dyn Dispatch> =
			Arc::new(InterceptedDispatch::new(interceptor.clone(), self.hook.original()));
		let mut session = self.session.lock();

		self.hook.install(shim.clone());

		match session.replace(Session { gateway, interceptor: interceptor.clone(), shim }) {
			Some(previous) => {
				previous.gateway.dispose();
				obs::report_lifecycle("replaced", &manager_prefix);
			},
			None => obs::report_lifecycle("started", &manager_prefix),
		}

		Ok(interceptor)
	}

	/// Restores the original dispatch and disposes the gateway. No-op without a session.
	///
	/// The hook is only restored while this controller's shim is still installed.
	pub fn stop(&self) {
		let mut session = self.session.lock();
		let Some(Session { gateway, interceptor, shim }) = session.take() else { return };

		self.hook.restore_if_current(&shim);
		gateway.dispose();
		obs::report_lifecycle("stopped", interceptor.manager_prefix());
	}

	/// Returns `true` while a session is installed.
	pub fn is_active(&self) -> bool {
		self.session.lock().is_some()
	}

	/// Interceptor of the active session, if any.
	pub fn interceptor(&self) -> Option<Arc<RequestInterceptor>> {
		self.session.lock().as_ref().map(|session| session.interceptor.clone())
	}

	/// Hook controlled by this instance.
	pub fn hook(&self) -> &Arc<DispatchHook> {
		&self.hook
	}
}
impl Debug for QuotaController {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("QuotaController")
			.field("hook", &self.hook)
			.field("active", &self.is_active())
			.finish()
	}
}
