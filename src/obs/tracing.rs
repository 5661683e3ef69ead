// self
use crate::_prelude::*;

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// Span wrapping one intercepted call.
#[derive(Clone, Debug)]
pub struct QuotaSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl QuotaSpan {
	/// Creates a new span tagged with the manager identifier + stage.
	pub fn new(manager_id: &str, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("googleapis_quota.call", manager = manager_id, stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (manager_id, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
