//! Observability helpers for upstream calls.
//!
//! # Feature Flags
//!
//! - Spans named `armory_gateway.call` carry the `upstream` and `operation` fields and are always
//!   emitted through `tracing`.
//! - Enable `metrics` to increment `armory_gateway_call_total` (labeled by `upstream` +
//!   `outcome`), `armory_gateway_admission_denied_total`, and `armory_gateway_cache_lookup_total`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Outcome labels recorded for each upstream call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to an executor operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}

	/// Picks the terminal outcome for a result.
	pub fn of<T>(result: &Result<T>) -> Self {
		if result.is_ok() { CallOutcome::Success } else { CallOutcome::Failure }
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
