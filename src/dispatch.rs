//! The shared "perform one API call" entry point and its handler registry.
//!
//! [`DispatchHook`] owns two slots: the original dispatch, captured once when the hook is
//! created, and the current handler that every call site goes through. The lifecycle controller
//! swaps the current handler; restoring always reinstalls the captured original, so repeated
//! installs can never mistake an interceptor for the original.

// self
use crate::{
	_prelude::*,
	request::{ApiRequest, ApiResponse},
};

/// Boxed future returned by [`Dispatch::dispatch`].
///
/// Host dispatches report their own failures as [`Error::Call`](crate::error::Error::Call).
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + 'a + Send>>;

/// Performs one API call.
pub trait Dispatch
where
	Self: Send + Sync,
{
	/// Executes `request` and resolves to the host client's response or error.
	fn dispatch(&self, request: ApiRequest) -> DispatchFuture<'_>;
}

/// Adapts an async closure into a [`Dispatch`].
pub struct FnDispatch<F>(pub F);
impl<F, Fut> Dispatch for FnDispatch<F>
where
	F: Fn(ApiRequest) -> Fut + Send + Sync,
	Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
	fn dispatch(&self, request: ApiRequest) -> DispatchFuture<'_> {
		Box::pin((self.0)(request))
	}
}
impl<F> Debug for FnDispatch<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FnDispatch(..)")
	}
}

/// Process-wide call entry point with a swappable handler slot.
pub struct DispatchHook {
	original: Arc<dyn Dispatch>,
	current: RwLock<Arc<dyn Dispatch>>,
}
impl DispatchHook {
	/// Creates a hook whose original (and initial) handler is `original`.
	pub fn new(original: Arc<dyn Dispatch>) -> Self {
		Self { current: RwLock::new(original.clone()), original }
	}

	/// Routes `request` through the current handler.
	pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
		let handler = self.current();

		handler.dispatch(request).await
	}

	/// Continuation-style variant of [`DispatchHook::call`]; `callback` receives the result.
	pub async fn call_with_callback<F>(&self, request: ApiRequest, callback: F)
	where
		F: FnOnce(Result<ApiResponse>),
	{
		callback(self.call(request).await)
	}

	/// Original handler captured when the hook was created.
	pub fn original(&self) -> Arc<dyn Dispatch> {
		self.original.clone()
	}

	/// Handler currently installed.
	pub fn current(&self) -> Arc<dyn Dispatch> {
		self.current.read().clone()
	}

	/// Returns `true` when a handler other than the original is installed.
	pub fn is_intercepted(&self) -> bool {
		!Arc::ptr_eq(&*self.current.read(), &self.original)
	}

	pub(crate) fn install(&self, handler: Arc<dyn Dispatch>) {
		*self.current.write() = handler;
	}

	/// Reinstalls the original only while `handler` is still the current handler.
	pub(crate) fn restore_if_current(&self, handler: &Arc<dyn Dispatch>) -> bool {
		let mut current = self.current.write();

		if !Arc::ptr_eq(&*current, handler) {
			return false;
		}

		*current = self.original.clone();

		true
	}
}
impl Debug for DispatchHook {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DispatchHook").field("intercepted", &self.is_intercepted()).finish()
	}
}
