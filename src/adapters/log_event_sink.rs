//! Log-only event sink: every intended order and audit event becomes a
//! structured `tracing` record under the `ortrader::events` target.

use crate::domain::error::OrtraderError;
use crate::domain::event::EngineEvent;
use crate::ports::event_port::EventSink;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct LogEventSink {
    published: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> usize {
        self.published
    }
}

impl EventSink for LogEventSink {
    fn publish(&mut self, event: &EngineEvent) -> Result<(), OrtraderError> {
        self.published += 1;
        match event {
            EngineEvent::RangeFinalized {
                day,
                high,
                low,
                top_cutoff,
                bottom_cutoff,
                ..
            } => info!(target: "ortrader::events", %day, high, low, top_cutoff, bottom_cutoff, "opening range"),
            EngineEvent::SignalDecided { signal } => info!(
                target: "ortrader::events",
                day = %signal.day,
                kind = %signal.kind,
                reference = signal.reference_price,
                pct = signal.position_pct,
                atr = signal.pre_trade_atr,
                "signal"
            ),
            EngineEvent::EntryIntended {
                day,
                direction,
                entry_price,
                stop_price,
                target_price,
                ..
            } => info!(
                target: "ortrader::events",
                %day, %direction, entry_price, stop_price, target_price,
                "enter"
            ),
            EngineEvent::ExitIntended {
                day,
                direction,
                exit_price,
                exit_reason,
                points_gained,
                ..
            } => info!(
                target: "ortrader::events",
                %day, %direction, exit_price, %exit_reason, points_gained,
                "exit"
            ),
            EngineEvent::FlattenRequested { day, direction, at } => {
                warn!(target: "ortrader::events", %day, %direction, %at, "flatten requested")
            }
            EngineEvent::DayExcluded {
                day,
                reason_code,
                detail,
            } => warn!(target: "ortrader::events", %day, %reason_code, %detail, "day excluded"),
            EngineEvent::BarRejected { timestamp, reason } => {
                warn!(target: "ortrader::events", %timestamp, %reason, "bar rejected")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn counts_published_events() {
        let mut sink = LogEventSink::new();
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        sink.publish(&EngineEvent::DayExcluded {
            day,
            reason_code: "no_range_data".into(),
            detail: "no bars observed".into(),
        })
        .unwrap();
        sink.publish(&EngineEvent::BarRejected {
            timestamp: day.and_hms_opt(9, 31, 0).unwrap(),
            reason: "out of order".into(),
        })
        .unwrap();

        assert_eq!(sink.published(), 2);
    }
}
