//! Retry schedule.
//!
//! The base delay steps up with the item's age rather than its attempt
//! count, so it needs no persistent counter and survives restarts for free.
//! Uniform jitter decorrelates retry times across items after a process
//! restart.

use std::time::{Duration, SystemTime};

use rand::Rng as _;

/// Give up sending attempts after this long.
pub const GIVE_UP_AFTER: Duration = Duration::from_secs(12 * 60 * 60);

const MINUTE: Duration = Duration::from_secs(60);

/// Jitter added to every delay, in `[0, 60)` seconds.
const JITTER_SECS: u64 = 60;

/// How long to wait before the next attempt round for an item created at
/// `created_at`, as seen from `now`.
///
/// | age        | base delay |
/// |------------|------------|
/// | < 1 min    | 1 min      |
/// | < 5 min    | 5 min      |
/// | < 10 min   | 10 min     |
/// | otherwise  | 20 min     |
pub fn next_delay(now: SystemTime, created_at: SystemTime) -> Duration {
    base_delay(now, created_at) + Duration::from_secs(rand::rng().random_range(0..JITTER_SECS))
}

fn base_delay(now: SystemTime, created_at: SystemTime) -> Duration {
    let since = now.duration_since(created_at).unwrap_or_default();
    if since < MINUTE {
        MINUTE
    } else if since < 5 * MINUTE {
        5 * MINUTE
    } else if since < 10 * MINUTE {
        10 * MINUTE
    } else {
        20 * MINUTE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(created_at: SystemTime, age: Duration) -> SystemTime {
        created_at + age
    }

    #[test]
    fn test_base_delay_steps() {
        let created = SystemTime::now();
        let cases = [
            (Duration::ZERO, MINUTE),
            (Duration::from_secs(59), MINUTE),
            (Duration::from_secs(60), 5 * MINUTE),
            (Duration::from_secs(4 * 60 + 59), 5 * MINUTE),
            (Duration::from_secs(5 * 60), 10 * MINUTE),
            (Duration::from_secs(9 * 60 + 59), 10 * MINUTE),
            (Duration::from_secs(10 * 60), 20 * MINUTE),
            (Duration::from_secs(11 * 60 * 60), 20 * MINUTE),
        ];
        for (age, expected) in cases {
            assert_eq!(
                base_delay(at(created, age), created),
                expected,
                "age {age:?}"
            );
        }
    }

    #[test]
    fn test_base_delay_is_monotonic_in_age() {
        let created = SystemTime::now();
        let mut previous = Duration::ZERO;
        for minutes in 0..30 {
            let delay = base_delay(at(created, Duration::from_secs(minutes * 60)), created);
            assert!(delay >= previous, "delay regressed at {minutes} minutes");
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_a_minute() {
        let created = SystemTime::now();
        for _ in 0..100 {
            let delay = next_delay(created, created);
            assert!(delay >= MINUTE);
            assert!(delay < MINUTE + Duration::from_secs(JITTER_SECS));
        }
    }

    #[test]
    fn test_clock_regression_is_treated_as_zero_age() {
        let created = SystemTime::now();
        let earlier = created - Duration::from_secs(300);
        assert_eq!(base_delay(earlier, created), MINUTE);
    }
}
