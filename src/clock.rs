use std::sync::Mutex;

use chrono::{Local, NaiveTime};

/// Wall-clock source for message timestamps and notice stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveTime;

    /// `HH:MM`, the resolution messages carry.
    fn message_timestamp(&self) -> String {
        self.now().format("%H:%M").to_string()
    }

    fn notice_timestamp(&self) -> String {
        self.now().format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<NaiveTime>,
}

impl FixedClock {
    pub fn new(time: NaiveTime) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    pub fn set(&self, time: NaiveTime) {
        if let Ok(mut guard) = self.time.lock() {
            *guard = time;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        match self.time.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        let clock = FixedClock::new(NaiveTime::from_hms_opt(9, 5, 7).unwrap());
        assert_eq!(clock.message_timestamp(), "09:05");
        assert_eq!(clock.notice_timestamp(), "09:05:07");

        clock.set(NaiveTime::from_hms_opt(23, 59, 0).unwrap());
        assert_eq!(clock.message_timestamp(), "23:59");
    }
}
