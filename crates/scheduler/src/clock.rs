use chrono::{Local, NaiveDate, Timelike};

/// Tracks whether a wall-clock trigger already fired today, so a minute-tick
/// loop firing a job whose time window just passed doesn't refire it on the
/// next tick.
#[derive(Debug, Default)]
pub struct DailyLatch {
    last_fired: Option<NaiveDate>,
}

impl DailyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true (and latches) the first time `now`'s time-of-day is at
    /// or past `(hour, minute)` on a calendar day this latch hasn't already
    /// fired for.
    pub fn should_fire(&mut self, now: chrono::DateTime<Local>, target: (u32, u32)) -> bool {
        let today = now.date_naive();
        if self.last_fired == Some(today) {
            return false;
        }
        let (hour, minute) = target;
        let past_target = (now.hour(), now.minute()) >= (hour, minute);
        if past_target {
            self.last_fired = Some(today);
        }
        past_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 28, h, m, 0).unwrap()
    }

    #[test]
    fn fires_once_past_target_then_stays_quiet() {
        let mut latch = DailyLatch::new();
        assert!(!latch.should_fire(at(8, 0), (8, 30)));
        assert!(latch.should_fire(at(8, 31), (8, 30)));
        assert!(!latch.should_fire(at(8, 45), (8, 30)));
    }

    #[test]
    fn refires_on_a_new_calendar_day() {
        let mut latch = DailyLatch::new();
        assert!(latch.should_fire(at(8, 31), (8, 30)));
        let tomorrow = at(8, 31) + chrono::Duration::days(1);
        assert!(latch.should_fire(tomorrow, (8, 30)));
    }
}
