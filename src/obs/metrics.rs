// self
use crate::{obs::CallOutcome, upstream::UpstreamKind};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(upstream: UpstreamKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"armory_gateway_call_total",
			"upstream" => upstream.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (upstream, outcome);
	}
}

/// Records a local admission denial.
pub fn record_admission_denied(upstream: UpstreamKind) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("armory_gateway_admission_denied_total", "upstream" => upstream.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = upstream;
	}
}

/// Records a cache lookup as a hit or a miss.
pub fn record_cache_lookup(hit: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"armory_gateway_cache_lookup_total",
			"result" => if hit { "hit" } else { "miss" }
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = hit;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_call_outcome(UpstreamKind::Account, CallOutcome::Failure);
		record_admission_denied(UpstreamKind::Analytics);
		record_cache_lookup(true);
	}
}
