//! The one hook the core requires from its embedding application: computing a custom rate for
//! a single (process, site) match (§4.4 step 3, §6).

use super::coordinate::Coordinate;

/// Everything the rate callback needs to evaluate a custom rate for one matching site.
pub struct RateRequest<'a> {
    /// Flat `x, y, z` triples of every neighbor within the process's cutoff, relative to the
    /// lattice's own coordinate frame (not the match origin).
    pub geometry: &'a [f64],
    /// Current species at each neighbor listed in `geometry`, before the process would fire.
    pub types_before: &'a [u32],
    /// Species at each neighbor listed in `geometry` after the process fires.
    pub types_after: &'a [u32],
    /// The process's declared rate constant.
    pub base_rate: f64,
    /// The process's `process_number`.
    pub process_number: usize,
    /// The global coordinate of the match origin.
    pub origin: Coordinate,
}

/// Implemented by whatever computes per-site rates for processes built via
/// [`custom_rate_process`](crate::process::custom_rate_process).
///
/// A blanket implementation covers any `FnMut(RateRequest) -> f64` closure, so callers can pass
/// an ordinary closure without implementing this trait by hand.
pub trait RateCallback {
    /// Computes the rate for the match described by `request`.
    fn rate(&mut self, request: RateRequest<'_>) -> f64;
}

impl<F> RateCallback for F
where
    F: FnMut(RateRequest<'_>) -> f64,
{
    fn rate(&mut self, request: RateRequest<'_>) -> f64 {
        self(request)
    }
}
