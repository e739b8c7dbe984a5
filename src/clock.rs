use chrono::{Local, NaiveDate};

/// Abstraction over "today" so appended rows are deterministic in tests.
pub trait Clock: Send + Sync {
    /// The current date in the machine's local time zone.
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }
}
