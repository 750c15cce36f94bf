//! Wall-clock source for beacon timestamps and hold durations

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Time elapsed since `earlier`, clamped at zero if the clock stepped back
    fn since(&self, earlier: DateTime<Utc>) -> TimeDelta {
        (self.now() - earlier).max(TimeDelta::zero())
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to, in whole milliseconds
#[cfg(test)]
pub struct ManualClock {
    millis: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            millis: std::sync::atomic::AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        self.millis
            .fetch_add(by.num_milliseconds(), std::sync::atomic::Ordering::SeqCst);
    }

    pub fn rewind(&self, by: TimeDelta) {
        self.advance(-by);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(std::sync::atomic::Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch_plus_days(days: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + TimeDelta::days(days)
    }

    #[test]
    fn test_manual_clock_moves_only_on_advance() {
        let start = epoch_plus_days(20_000);
        let clock = ManualClock::starting_at(start);
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::milliseconds(1500));
        assert_eq!(clock.since(start), TimeDelta::milliseconds(1500));
    }

    #[test]
    fn test_since_never_negative() {
        let start = epoch_plus_days(20_000);
        let clock = ManualClock::starting_at(start);

        clock.rewind(TimeDelta::seconds(3));

        assert_eq!(clock.since(start), TimeDelta::zero());
    }

    #[test]
    fn test_system_clock_since_recent_instant() {
        let clock = SystemClock;
        let earlier = clock.now() - TimeDelta::seconds(1);
        assert!(clock.since(earlier) >= TimeDelta::seconds(1));
    }
}
