//! Event sink port: order routing and notification consume engine events here.

use crate::domain::error::OrtraderError;
use crate::domain::event::EngineEvent;

pub trait EventSink {
    fn publish(&mut self, event: &EngineEvent) -> Result<(), OrtraderError>;
}

/// Collects events in memory.
impl EventSink for Vec<EngineEvent> {
    fn publish(&mut self, event: &EngineEvent) -> Result<(), OrtraderError> {
        self.push(event.clone());
        Ok(())
    }
}
