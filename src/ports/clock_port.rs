//! Wall-clock port, so live runs can be driven by a fixed time in tests.

use chrono::NaiveDateTime;

pub trait Clock {
    /// Current time in the session timezone.
    fn now(&self) -> NaiveDateTime;
}
