//! In-process [`QuotaGateway`] that enforces concurrency budgets for local development and tests.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	error::QuotaError,
	gateway::{Grant, GrantFuture, GrantOutcome, GrantRequest, QuotaGateway},
	request::{ResourceCost, ScopeKey},
};

type BucketKey = (String, ScopeKey);
type UsageMap = Arc<Mutex<HashMap<BucketKey, ResourceCost>>>;

/// Gateway that keeps per-scope outstanding usage in memory.
///
/// Each manager may declare a maximum number of outstanding units per resource kind; a grant
/// holds its units until dismissed. Managers without limits are unbounded unless the gateway is
/// [`strict`](MemoryGateway::strict), in which case they are rejected as unknown.
#[derive(Clone, Debug, Default)]
pub struct MemoryGateway {
	limits: Arc<RwLock<HashMap<String, ResourceCost>>>,
	usage: UsageMap,
	strict: bool,
	disposed: Arc<AtomicBool>,
}
impl MemoryGateway {
	/// Rejects managers that have no registered limits.
	pub fn strict(mut self) -> Self {
		self.strict = true;

		self
	}

	/// Caps outstanding `resource` units for every scope of `manager_id`.
	pub fn with_limit(
		self,
		manager_id: impl Into<String>,
		resource: impl Into<String>,
		max: u64,
	) -> Self {
		self.limits.write().entry(manager_id.into()).or_default().insert(resource.into(), max);

		self
	}

	/// Outstanding units of `resource` held for `manager_id` + `scope`.
	pub fn in_flight(&self, manager_id: &str, scope: &ScopeKey, resource: &str) -> u64 {
		self.usage
			.lock()
			.get(&(manager_id.to_owned(), scope.clone()))
			.and_then(|held| held.get(resource).copied())
			.unwrap_or(0)
	}

	fn reserve_now(&self, request: &GrantRequest) -> Result<MemoryGrant, QuotaError> {
		if self.disposed.load(Ordering::Acquire) {
			return Err(QuotaError::Disposed);
		}

		let limits = self.limits.read().get(&request.manager_id).cloned();

		if limits.is_none() && self.strict {
			return Err(QuotaError::UnknownManager { manager_id: request.manager_id.clone() });
		}

		let key = (request.manager_id.clone(), request.scope.clone());
		let mut usage = self.usage.lock();

		if let Some(limits) = limits {
			let held = usage.get(&key);
			let exhausted = request.resources.iter().any(|(resource, amount)| {
				limits.get(resource).is_some_and(|max| {
					let current = held.and_then(|held| held.get(resource)).copied().unwrap_or(0);

					current.saturating_add(*amount) > *max
				})
			});

			if exhausted {
				return Err(QuotaError::Exhausted {
					manager_id: request.manager_id.clone(),
					retry_after: None,
				});
			}
		}

		let held = usage.entry(key.clone()).or_default();

		for (resource, amount) in &request.resources {
			*held.entry(resource.clone()).or_default() += amount;
		}

		Ok(MemoryGrant { key, resources: request.resources.clone(), usage: self.usage.clone() })
	}
}
impl QuotaGateway for MemoryGateway {
	fn request_grant<'a>(&'a self, request: &'a GrantRequest) -> GrantFuture<'a> {
		Box::pin(async move {
			let grant: Box<dyn Grant> = Box::new(self.reserve_now(request)?);

			Ok(grant)
		})
	}

	fn dispose(&self) {
		self.disposed.store(true, Ordering::Release);
		self.usage.lock().clear();
	}
}

#[derive(Debug)]
struct MemoryGrant {
	key: BucketKey,
	resources: ResourceCost,
	usage: UsageMap,
}
impl Grant for MemoryGrant {
	fn dismiss(self: Box<Self>, _outcome: GrantOutcome<'_>) {
		let mut usage = self.usage.lock();

		// Disposal clears usage, so the bucket may already be gone.
		let Some(held) = usage.get_mut(&self.key) else { return };

		for (resource, amount) in &self.resources {
			if let Some(current) = held.get_mut(resource) {
				*current = current.saturating_sub(*amount);
			}
		}

		held.retain(|_, amount| *amount > 0);

		if held.is_empty() {
			usage.remove(&self.key);
		}
	}
}
