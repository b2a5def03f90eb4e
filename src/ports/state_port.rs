//! Engine state persistence between live polls.

use crate::domain::engine::EngineState;
use crate::domain::error::OrtraderError;

pub trait StateStore {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<EngineState>, OrtraderError>;

    fn save(&self, state: &EngineState) -> Result<(), OrtraderError>;
}
