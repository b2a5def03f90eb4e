//! Trade store port: durable, day-ordered persistence of day outcomes.

use crate::domain::error::OrtraderError;
use crate::domain::outcome::DayOutcome;

pub trait TradeStore {
    /// Persists one finished day. Storing a day twice is a storage error.
    fn save_outcome(&self, outcome: &DayOutcome) -> Result<(), OrtraderError>;

    /// All stored outcomes in ascending day order.
    fn load_outcomes(&self) -> Result<Vec<DayOutcome>, OrtraderError>;
}
