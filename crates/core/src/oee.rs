//! Overall equipment effectiveness for one order.
//!
//! Availability is running time over scheduled time (setup + run + stop),
//! performance is produced units over target, quality is good units over
//! all units. Empty inputs degrade to zero instead of failing.

use serde::Serialize;

use crate::accumulators::PhaseAccumulators;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Oee {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        (num as f64 / den as f64).min(1.0)
    }
}

pub fn compute_oee(accumulated: &PhaseAccumulators, good: u64, scrap: u64, target: u64) -> Oee {
    let availability = ratio(accumulated.run_secs, accumulated.total());
    let performance = ratio(good + scrap, target);
    let quality = ratio(good, good + scrap);
    Oee {
        availability,
        performance,
        quality,
        oee: availability * performance * quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oee_multiplies_the_three_factors() {
        let acc = PhaseAccumulators::new(0, 80, 20);
        let oee = compute_oee(&acc, 90, 10, 100);
        assert!((oee.availability - 0.8).abs() < 1e-9);
        assert!((oee.performance - 1.0).abs() < 1e-9);
        assert!((oee.quality - 0.9).abs() < 1e-9);
        assert!((oee.oee - 0.72).abs() < 1e-9);
    }

    #[test]
    fn empty_order_is_all_zero() {
        let oee = compute_oee(&PhaseAccumulators::default(), 0, 0, 0);
        assert_eq!(oee.oee, 0.0);
        assert_eq!(oee.availability, 0.0);
    }

    #[test]
    fn overproduction_caps_performance() {
        let acc = PhaseAccumulators::new(0, 10, 0);
        assert_eq!(compute_oee(&acc, 150, 0, 100).performance, 1.0);
    }
}
