//! Quota reservation layer for generated Google API clients: match outgoing calls to policies,
//! acquire grants from a quota service, and settle every grant exactly once.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod interceptor;
pub mod lifecycle;
pub mod obs;
pub mod policy;
pub mod request;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		dispatch::{Dispatch, DispatchFuture},
		error::{BoxError, QuotaError},
		gateway::{Grant, GrantFuture, GrantOutcome, GrantRequest, QuotaGateway},
		request::{ApiRequest, ApiResponse},
	};

	/// Dismissal recorded by a [`RecordingGateway`].
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub enum RecordedOutcome {
		/// The call succeeded.
		Success,
		/// The call failed with the rendered error message.
		Failure(String),
		/// The call future was dropped before completion.
		Abandoned,
	}

	/// Gateway double that records every grant request and dismissal.
	#[derive(Clone, Debug, Default)]
	pub struct RecordingGateway {
		requests: Arc<Mutex<Vec<GrantRequest>>>,
		dismissals: Arc<Mutex<Vec<(u64, RecordedOutcome)>>>,
		deny: Arc<Mutex<bool>>,
		disposals: Arc<AtomicUsize>,
	}
	impl RecordingGateway {
		/// Makes every subsequent grant request fail with [`QuotaError::Exhausted`].
		pub fn deny_all(&self) {
			*self.deny.lock() = true;
		}

		/// Grant requests observed so far.
		pub fn requests(&self) -> Vec<GrantRequest> {
			self.requests.lock().clone()
		}

		/// Dismissals observed so far, keyed by grant sequence number.
		pub fn dismissals(&self) -> Vec<(u64, RecordedOutcome)> {
			self.dismissals.lock().clone()
		}

		/// Number of times [`QuotaGateway::dispose`] was called.
		pub fn disposals(&self) -> usize {
			self.disposals.load(Ordering::SeqCst)
		}
	}
	impl QuotaGateway for RecordingGateway {
		fn request_grant<'a>(&'a self, request: &'a GrantRequest) -> GrantFuture<'a> {
			Box::pin(async move {
				if *self.deny.lock() {
					return Err(QuotaError::Exhausted {
						manager_id: request.manager_id.clone(),
						retry_after: None,
					});
				}

				let seq = {
					let mut requests = self.requests.lock();

					requests.push(request.clone());

					requests.len() as u64
				};
				let grant: Box<dyn Grant> =
					Box::new(RecordingGrant { seq, dismissals: self.dismissals.clone() });

				Ok(grant)
			})
		}

		fn dispose(&self) {
			self.disposals.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[derive(Debug)]
	struct RecordingGrant {
		seq: u64,
		dismissals: Arc<Mutex<Vec<(u64, RecordedOutcome)>>>,
	}
	impl Grant for RecordingGrant {
		fn dismiss(self: Box<Self>, outcome: GrantOutcome<'_>) {
			let recorded = match outcome {
				GrantOutcome::Success => RecordedOutcome::Success,
				GrantOutcome::Failure(e) => RecordedOutcome::Failure(e.to_string()),
				GrantOutcome::Abandoned => RecordedOutcome::Abandoned,
			};

			self.dismissals.lock().push((self.seq, recorded));
		}
	}

	/// Dispatch double that echoes the request parameters back as the response body.
	///
	/// Requests whose `fail` parameter is `true` resolve to an error instead.
	#[derive(Clone, Debug, Default)]
	pub struct EchoDispatch {
		calls: Arc<Mutex<Vec<ApiRequest>>>,
	}
	impl EchoDispatch {
		/// Requests observed so far.
		pub fn calls(&self) -> Vec<ApiRequest> {
			self.calls.lock().clone()
		}
	}
	impl Dispatch for EchoDispatch {
		fn dispatch(&self, request: ApiRequest) -> DispatchFuture<'_> {
			Box::pin(async move {
				self.calls.lock().push(request.clone());

				if request.params.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
					let error: BoxError = format!("Dispatch to `{}` failed.", request.url).into();

					return Err(Error::Call(error.into()));
				}

				Ok(ApiResponse::new(200, serde_json::Value::Object(request.params)))
			})
		}
	}

	/// Builds an [`ApiRequest`] from a URL template and a JSON object literal.
	pub fn api_request(url: &str, params: serde_json::Value) -> ApiRequest {
		let serde_json::Value::Object(params) = params else {
			panic!("Test request parameters must be a JSON object.");
		};

		ApiRequest::new(url, params)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {serde_json, url};
#[cfg(test)] use {color_eyre as _, httpmock as _};
