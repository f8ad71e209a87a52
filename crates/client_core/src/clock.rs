use chrono::Local;

/// Source of the `HH:MM` display time stamped on locally created entries.
pub trait Clock: Send + Sync {
    fn display_time(&self) -> String;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn display_time(&self) -> String {
        Local::now().format("%H:%M").to_string()
    }
}

/// Always reports the same time.
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn display_time(&self) -> String {
        self.0.clone()
    }
}
