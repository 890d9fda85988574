// growth.rs - Rotation-width growth policies and the startup parameters
// that pick between them.

use rand::Rng;

use crate::error::Error;

/// The rule that recomputes `rotwidth` whenever the maximum observed real
/// word width (from a `movd` target) grows.
#[derive(Debug, Clone, Copy)]
pub enum GrowthPolicy {
    /// `step in [4, 12]`, `slack in [0, 5]`.
    Deterministic { step: u64, slack: u64 },
    /// `prob` is the probability (as a fraction in `[0.2, 0.8]`) that growth
    /// triggers even when the width threshold isn't crossed; `slack in [0, 5]`.
    Nondeterministic { prob: f64, slack: u64 },
}

impl GrowthPolicy {
    /// Recomputes `rotwidth` given the new maximum real word width and the
    /// current rotation width. Returns `Error::RotationWidthOverflow` if any
    /// arithmetic needed to grow would exceed `u64::MAX`.
    pub fn recompute(
        &self,
        new_wordwidth: u64,
        old_rotwidth: u64,
        rng: &mut impl Rng,
    ) -> Result<u64, Error> {
        match *self {
            GrowthPolicy::Deterministic { step, slack } => {
                let threshold = old_rotwidth.saturating_sub(slack) / 2;
                if new_wordwidth <= threshold {
                    return Ok(old_rotwidth);
                }
                let grown = old_rotwidth
                    .checked_add(step)
                    .ok_or(Error::RotationWidthOverflow)?;
                let doubled = new_wordwidth
                    .checked_mul(2)
                    .ok_or(Error::RotationWidthOverflow)?;
                Ok(grown.max(doubled))
            }
            GrowthPolicy::Nondeterministic { prob, slack } => {
                let triggered_by_width = new_wordwidth > old_rotwidth / 2;
                let triggered_by_chance = rng.gen::<f64>() < prob;
                if !(triggered_by_width || triggered_by_chance) {
                    return Ok(old_rotwidth);
                }
                let doubled = new_wordwidth
                    .checked_mul(2)
                    .ok_or(Error::RotationWidthOverflow)?;
                let base = old_rotwidth.max(doubled);
                let jitter = rng.gen_range(0..=slack);
                base.checked_add(jitter).ok_or(Error::RotationWidthOverflow)
            }
        }
    }
}

/// The randomized parameters sampled once at machine startup (§6).
#[derive(Debug, Clone, Copy)]
pub struct StartupParams {
    pub rotwidth: u64,
    pub policy: GrowthPolicy,
}

impl StartupParams {
    /// Samples a fresh set of startup parameters from `rng`, following the
    /// ranges in §4.3/§6: initial rotwidth in `[10, 15]`, slack in `[0, 5]`,
    /// step in `[4, 12]`, probability in `[0.2, 0.8]`, policy chosen
    /// uniformly at random.
    pub fn sample(rng: &mut impl Rng) -> StartupParams {
        let rotwidth = rng.gen_range(10..=15);
        let slack = rng.gen_range(0..=5);
        let policy = if rng.gen_bool(0.5) {
            let step = rng.gen_range(4..=12);
            GrowthPolicy::Deterministic { step, slack }
        } else {
            let prob = rng.gen_range(0.2..=0.8);
            GrowthPolicy::Nondeterministic { prob, slack }
        };
        StartupParams { rotwidth, policy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn deterministic_growth_is_nondecreasing_and_obeys_width_bound() {
        let policy = GrowthPolicy::Deterministic { step: 6, slack: 2 };
        let mut rng = StdRng::seed_from_u64(1);
        let mut rotwidth = 10u64;
        for w in [1u64, 2, 8, 20, 50] {
            let next = policy.recompute(w, rotwidth, &mut rng).unwrap();
            assert!(next >= rotwidth);
            assert!(next >= 2 * w || next == rotwidth);
            rotwidth = next;
        }
    }

    #[test]
    fn nondeterministic_growth_is_nondecreasing() {
        let policy = GrowthPolicy::Nondeterministic {
            prob: 0.5,
            slack: 3,
        };
        let mut rng = StdRng::seed_from_u64(42);
        let mut rotwidth = 12u64;
        for w in [1u64, 3, 10, 40] {
            let next = policy.recompute(w, rotwidth, &mut rng).unwrap();
            assert!(next >= rotwidth);
            rotwidth = next;
        }
    }

    #[test]
    fn startup_params_fall_within_spec_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let params = StartupParams::sample(&mut rng);
            assert!((10..=15).contains(&params.rotwidth));
            match params.policy {
                GrowthPolicy::Deterministic { step, slack } => {
                    assert!((4..=12).contains(&step));
                    assert!((0..=5).contains(&slack));
                }
                GrowthPolicy::Nondeterministic { prob, slack } => {
                    assert!((0.2..=0.8).contains(&prob));
                    assert!((0..=5).contains(&slack));
                }
            }
        }
    }

    #[test]
    fn overflow_at_the_host_maximum_is_fatal() {
        let policy = GrowthPolicy::Deterministic {
            step: 4,
            slack: 0,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let err = policy.recompute(u64::MAX / 2 + 1, u64::MAX - 1, &mut rng);
        assert!(matches!(err, Err(Error::RotationWidthOverflow)));
    }
}
