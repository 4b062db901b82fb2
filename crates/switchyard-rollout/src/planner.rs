//! Capacity planner — pure replica arithmetic.
//!
//! Maps (total capacity, candidate weight percent) to a stable/candidate
//! replica split. The rounding rule is load-bearing: round-half-up, with
//! a floor of one candidate replica whenever the weight is non-zero, so
//! a 1% canary on a small pool still gets a real instance. Total
//! capacity is conserved: `stable + candidate == total`, always.

/// A replica split between the stable and candidate pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub stable: u32,
    pub candidate: u32,
}

/// Compute the replica split for a candidate traffic weight.
///
/// `candidate = round_half_up(total * weight / 100)`, floored at 1 when
/// `weight > 0`, capped at `total`. Pure and total: no error cases.
pub fn split(total: u32, candidate_weight: u8) -> Split {
    let weight = u64::from(candidate_weight.min(100));
    let total_w = u64::from(total);

    // Integer round-half-up.
    let mut candidate = ((total_w * weight + 50) / 100) as u32;
    if weight > 0 {
        candidate = candidate.max(1);
    }
    candidate = candidate.min(total);

    Split {
        stable: total - candidate,
        candidate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example_from_six_replicas() {
        // 20% of 6 is 1.2 → rounds to 1.
        assert_eq!(split(6, 20), Split { stable: 5, candidate: 1 });
        // 50% of 6 is exactly 3.
        assert_eq!(split(6, 50), Split { stable: 3, candidate: 3 });
        // 100% hands everything to the candidate.
        assert_eq!(split(6, 100), Split { stable: 0, candidate: 6 });
        // 0% means no candidate replicas at all.
        assert_eq!(split(6, 0), Split { stable: 6, candidate: 0 });
    }

    #[test]
    fn rounds_half_up() {
        // 25% of 10 is 2.5 → rounds up to 3.
        assert_eq!(split(10, 25), Split { stable: 7, candidate: 3 });
        // 25% of 2 is 0.5 → rounds up to 1.
        assert_eq!(split(2, 25), Split { stable: 1, candidate: 1 });
        // 45% of 10 is 4.5 → rounds up to 5.
        assert_eq!(split(10, 45), Split { stable: 5, candidate: 5 });
        // 24% of 10 is 2.4 → rounds down to 2.
        assert_eq!(split(10, 24), Split { stable: 8, candidate: 2 });
    }

    #[test]
    fn small_weights_still_get_one_replica() {
        assert_eq!(split(6, 1), Split { stable: 5, candidate: 1 });
        assert_eq!(split(100, 1), Split { stable: 99, candidate: 1 });
        assert_eq!(split(1, 10), Split { stable: 0, candidate: 1 });
    }

    #[test]
    fn weight_above_100_is_clamped() {
        assert_eq!(split(6, 250), Split { stable: 0, candidate: 6 });
    }

    #[test]
    fn capacity_conservation_holds_everywhere() {
        for total in 1..=50u32 {
            for weight in 0..=100u8 {
                let s = split(total, weight);
                assert_eq!(
                    s.stable + s.candidate,
                    total,
                    "split({total}, {weight}) lost capacity"
                );
                assert_eq!(
                    s.candidate >= 1,
                    weight > 0,
                    "split({total}, {weight}) candidate floor wrong"
                );
            }
        }
    }
}
