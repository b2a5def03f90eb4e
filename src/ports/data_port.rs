//! Bar input ports: a finite historical source and an incremental live feed.

use crate::domain::bar::Bar;
use crate::domain::error::OrtraderError;
use chrono::NaiveDateTime;

/// Historical one-minute bars, in source order.
pub trait BarSource {
    fn load_bars(&self) -> Result<Vec<Bar>, OrtraderError>;
}

/// Live feed polled by the runner.
pub trait BarFeed {
    /// Returns completed bars not handed out by a previous poll.
    fn poll(&mut self) -> Result<Vec<Bar>, OrtraderError>;

    /// Skips everything at or before `watermark` on later polls.
    fn resume_after(&mut self, watermark: NaiveDateTime);
}
