// crates.io
use tracing::instrument::Instrumented;
// self
use crate::{_prelude::*, upstream::UpstreamKind};

/// Span wrapper used by every executor operation.
#[derive(Clone, Debug)]
pub struct CallSpan {
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the upstream and operation name.
	pub fn new(upstream: UpstreamKind, operation: &'static str) -> Self {
		let span = tracing::info_span!("armory_gateway.call", upstream = upstream.as_str(), operation);

		Self { span }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}
