// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::GrantEvent;

/// Records a quota decision via the global metrics recorder (when enabled).
pub fn record_grant_event(event: GrantEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("googleapis_quota_grant_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}

/// Thread-safe per-interceptor counters, available without the `metrics` feature.
#[derive(Debug, Default)]
pub struct InterceptorMetrics {
	bypassed: AtomicU64,
	granted: AtomicU64,
	denied: AtomicU64,
	malformed: AtomicU64,
	dismissed: AtomicU64,
}
impl InterceptorMetrics {
	/// Calls that skipped quota handling.
	pub fn bypassed(&self) -> u64 {
		self.bypassed.load(Ordering::Relaxed)
	}

	/// Grants issued.
	pub fn granted(&self) -> u64 {
		self.granted.load(Ordering::Relaxed)
	}

	/// Grant requests refused by the gateway.
	pub fn denied(&self) -> u64 {
		self.denied.load(Ordering::Relaxed)
	}

	/// Requests rejected before reaching the gateway.
	pub fn malformed(&self) -> u64 {
		self.malformed.load(Ordering::Relaxed)
	}

	/// Grants dismissed, whatever the outcome.
	pub fn dismissed(&self) -> u64 {
		self.dismissed.load(Ordering::Relaxed)
	}

	pub(crate) fn record(&self, event: GrantEvent) {
		let counter = match event {
			GrantEvent::Bypassed => &self.bypassed,
			GrantEvent::Granted => &self.granted,
			GrantEvent::Denied => &self.denied,
			GrantEvent::Malformed => &self.malformed,
			GrantEvent::DismissedSuccess | GrantEvent::DismissedFailure => &self.dismissed,
		};

		counter.fetch_add(1, Ordering::Relaxed);
		record_grant_event(event);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn dismissals_share_one_counter() {
		let metrics = InterceptorMetrics::default();

		metrics.record(GrantEvent::Granted);
		metrics.record(GrantEvent::DismissedSuccess);
		metrics.record(GrantEvent::DismissedFailure);

		assert_eq!(metrics.granted(), 1);
		assert_eq!(metrics.dismissed(), 2);
		assert_eq!(metrics.bypassed(), 0);
	}
}
