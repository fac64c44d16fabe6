//! Exponential backoff between attempts.

use std::time::Duration;

/// Delay imposed after the `attempts`-th failed attempt: `base^attempts`
/// time units.
///
/// No jitter and no upper bound. Overflow saturates at `Duration::MAX`
/// rather than wrapping; bounding the wait is the operator's job via
/// `max_retries`.
pub fn delay_for(attempts: u32, base: u32, unit: Duration) -> Duration {
    unit.saturating_mul(base.saturating_pow(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn base_two_doubles_each_attempt() {
        assert_eq!(delay_for(1, 2, SECOND), Duration::from_secs(2));
        assert_eq!(delay_for(2, 2, SECOND), Duration::from_secs(4));
        assert_eq!(delay_for(3, 2, SECOND), Duration::from_secs(8));
    }

    #[test]
    fn base_one_is_constant() {
        for attempts in 1..10 {
            assert_eq!(delay_for(attempts, 1, SECOND), SECOND);
        }
    }

    #[test]
    fn unit_scales_the_delay() {
        let unit = Duration::from_millis(10);
        assert_eq!(delay_for(3, 2, unit), Duration::from_millis(80));
    }

    #[test]
    fn huge_exponents_saturate() {
        assert_eq!(delay_for(200, 10, SECOND), SECOND * u32::MAX);
        assert_eq!(
            delay_for(u32::MAX, u32::MAX, Duration::MAX),
            Duration::MAX
        );
    }

    proptest! {
        /// Delays never shrink as attempts grow.
        #[test]
        fn delay_is_monotonic_in_attempts(base in 1u32..16, attempts in 1u32..40) {
            let unit = Duration::from_millis(1);
            prop_assert!(delay_for(attempts + 1, base, unit) >= delay_for(attempts, base, unit));
        }

        /// Small inputs match the closed form exactly.
        #[test]
        fn delay_matches_power(base in 1u32..10, attempts in 1u32..8) {
            let expected = u64::from(base).pow(attempts);
            prop_assert_eq!(delay_for(attempts, base, SECOND), Duration::from_secs(expected));
        }
    }
}
