//! CSV bar file adapters: a historical loader and a tailing live feed.
//!
//! Rows are `datetime, open, high, low, close, volume[, complete]`. Timestamps
//! are converted from the source timezone into the session timezone and
//! truncated to the minute. Rows are handed out in file order.

use crate::domain::bar::Bar;
use crate::domain::config_validation::{parse_bool, parse_timezone};
use crate::domain::error::OrtraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{BarFeed, BarSource};
use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_DATETIME_FORMAT: &str = "%Y%m%d %H%M%S";

#[derive(Debug, Clone, PartialEq)]
enum TimestampFormat {
    Rfc3339,
    Pattern(String),
}

/// How a bar file is laid out and which clock its timestamps use.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFormat {
    delimiter: u8,
    timestamp: TimestampFormat,
    has_header: bool,
    source_timezone: Option<Tz>,
    session_timezone: Tz,
}

impl CsvFormat {
    /// Semicolon-delimited, no header, session-local timestamps.
    pub fn new(session_timezone: Tz) -> Self {
        Self {
            delimiter: b';',
            timestamp: TimestampFormat::Pattern(DEFAULT_DATETIME_FORMAT.to_string()),
            has_header: false,
            source_timezone: None,
            session_timezone,
        }
    }

    /// Reads the `[data]` section.
    pub fn from_config(config: &dyn ConfigPort, session_timezone: Tz) -> Result<Self, OrtraderError> {
        let delimiter = match config.get_string("data", "delimiter") {
            None => b';',
            Some(s) => parse_delimiter(&s)
                .ok_or_else(|| OrtraderError::invalid("data", "delimiter", format!("unsupported delimiter '{s}'")))?,
        };
        let timestamp = match config.get_string("data", "datetime_format") {
            None => TimestampFormat::Pattern(DEFAULT_DATETIME_FORMAT.to_string()),
            Some(s) if s.trim().eq_ignore_ascii_case("rfc3339") => TimestampFormat::Rfc3339,
            Some(s) if s.trim().is_empty() => {
                return Err(OrtraderError::invalid("data", "datetime_format", "must not be empty"));
            }
            Some(s) => TimestampFormat::Pattern(s.trim().to_string()),
        };
        Ok(Self {
            delimiter,
            timestamp,
            has_header: parse_bool(config, "data", "has_header", false)?,
            source_timezone: parse_timezone(config, "data", "source_timezone")?,
            session_timezone,
        })
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_source_timezone(mut self, tz: Tz) -> Self {
        self.source_timezone = Some(tz);
        self
    }

    pub fn with_rfc3339(mut self) -> Self {
        self.timestamp = TimestampFormat::Rfc3339;
        self
    }

    /// Parses every row of `path`. `Ok(None)` marks a row dropped because its
    /// local time is ambiguous or missing across a DST change.
    fn read_rows(&self, path: &Path) -> Result<Vec<Option<Row>>, OrtraderError> {
        let content = fs::read_to_string(path).map_err(|e| data_error(path, format!("failed to read: {e}")))?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_header)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_error(path, format!("CSV parse error: {e}")))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            let line = record.position().map_or(0, |p| p.line());
            let row = self
                .parse_record(&record)
                .map_err(|reason| data_error(path, format!("line {line}: {reason}")))?;
            if row.is_none() {
                warn!(path = %path.display(), line, "dropping row with ambiguous or nonexistent local time");
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn parse_record(&self, record: &StringRecord) -> Result<Option<Row>, String> {
        if record.len() < 6 {
            return Err(format!("expected at least 6 columns, found {}", record.len()));
        }
        let Some(timestamp) = self.parse_timestamp(&record[0])? else {
            return Ok(None);
        };
        let bar = Bar {
            timestamp,
            open: parse_price(record, 1, "open")?,
            high: parse_price(record, 2, "high")?,
            low: parse_price(record, 3, "low")?,
            close: parse_price(record, 4, "close")?,
            volume: parse_volume(&record[5])?,
        };
        let complete = match record.get(6) {
            None | Some("") => true,
            Some(s) => parse_flag(s).ok_or_else(|| format!("invalid complete flag '{s}'"))?,
        };
        Ok(Some(Row { bar, complete }))
    }

    fn parse_timestamp(&self, raw: &str) -> Result<Option<NaiveDateTime>, String> {
        let local = match &self.timestamp {
            TimestampFormat::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| format!("invalid timestamp '{raw}': {e}"))?
                .with_timezone(&self.session_timezone)
                .naive_local(),
            TimestampFormat::Pattern(fmt) => {
                let naive = NaiveDateTime::parse_from_str(raw, fmt)
                    .map_err(|e| format!("invalid timestamp '{raw}' for format '{fmt}': {e}"))?;
                let source = self.source_timezone.unwrap_or(self.session_timezone);
                match source.from_local_datetime(&naive) {
                    LocalResult::Single(dt) => dt.with_timezone(&self.session_timezone).naive_local(),
                    LocalResult::Ambiguous(..) | LocalResult::None => return Ok(None),
                }
            }
        };
        Ok(Some(truncate_to_minute(local)))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Row {
    bar: Bar,
    complete: bool,
}

/// Historical bar file.
pub struct CsvBarAdapter {
    path: PathBuf,
    format: CsvFormat,
}

impl CsvBarAdapter {
    pub fn new(path: impl Into<PathBuf>, format: CsvFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BarSource for CsvBarAdapter {
    fn load_bars(&self) -> Result<Vec<Bar>, OrtraderError> {
        let rows = self.format.read_rows(&self.path)?;
        let total = rows.len();
        let bars: Vec<Bar> = rows
            .into_iter()
            .flatten()
            .filter(|row| row.complete)
            .map(|row| row.bar)
            .collect();
        debug!(path = %self.path.display(), rows = total, bars = bars.len(), "loaded bar file");
        Ok(bars)
    }
}

/// Live feed over a file that another process appends to.
///
/// Each poll re-reads the file and returns the completed rows newer than the
/// watermark, stopping at the first row still marked incomplete.
pub struct CsvTailFeed {
    path: PathBuf,
    format: CsvFormat,
    watermark: Option<NaiveDateTime>,
}

impl CsvTailFeed {
    pub fn new(path: impl Into<PathBuf>, format: CsvFormat) -> Self {
        Self {
            path: path.into(),
            format,
            watermark: None,
        }
    }

    pub fn watermark(&self) -> Option<NaiveDateTime> {
        self.watermark
    }
}

impl BarFeed for CsvTailFeed {
    fn poll(&mut self) -> Result<Vec<Bar>, OrtraderError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "feed file not present yet");
            return Ok(Vec::new());
        }
        let rows = self.format.read_rows(&self.path)?;
        let since = self.watermark;
        let bars: Vec<Bar> = rows
            .into_iter()
            .flatten()
            .take_while(|row| row.complete)
            .map(|row| row.bar)
            .filter(|bar| since.is_none_or(|w| bar.timestamp > w))
            .collect();
        if let Some(latest) = bars.iter().map(|b| b.timestamp).max() {
            self.watermark = Some(self.watermark.map_or(latest, |w| w.max(latest)));
        }
        Ok(bars)
    }

    fn resume_after(&mut self, watermark: NaiveDateTime) {
        self.watermark = Some(self.watermark.map_or(watermark, |w| w.max(watermark)));
    }
}

fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "semicolon" => Some(b';'),
        "comma" => Some(b','),
        "tab" | "\\t" => Some(b'\t'),
        "pipe" => Some(b'|'),
        other => match other.as_bytes() {
            [b] if b.is_ascii() => Some(*b),
            _ => None,
        },
    }
}

fn parse_price(record: &StringRecord, index: usize, name: &str) -> Result<f64, String> {
    let raw = &record[index];
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("invalid {name} value '{raw}'")),
    }
}

fn parse_volume(raw: &str) -> Result<i64, String> {
    raw.parse::<i64>()
        .or_else(|_| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v.round() as i64)
                .ok_or(())
        })
        .map_err(|_| format!("invalid volume value '{raw}'"))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts)
}

fn data_error(path: &Path, reason: String) -> OrtraderError {
    OrtraderError::Data {
        source_name: path.display().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;
    use chrono_tz::UTC;
    use tempfile::TempDir;

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_semicolon_rows_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "nq.csv",
            "20240304 093000;18000.25;18010;17995.5;18005;1200\n\
             20240304 093200;18005;18012;18001;18011;900\n\
             20240304 093100;18005;18008;18002;18004;850\n",
        );
        let bars = CsvBarAdapter::new(path, CsvFormat::new(New_York)).load_bars().unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, ts(4, 9, 30));
        assert_eq!(bars[0].open, 18000.25);
        assert_eq!(bars[0].low, 17995.5);
        assert_eq!(bars[0].volume, 1200);
        assert_eq!(bars[1].timestamp, ts(4, 9, 32));
        assert_eq!(bars[2].timestamp, ts(4, 9, 31));
    }

    #[test]
    fn converts_source_timezone_and_truncates_seconds() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "utc.csv", "20240304 143045;1;2;0.5;1.5;10\n");
        let format = CsvFormat::new(New_York).with_source_timezone(UTC);
        let bars = CsvBarAdapter::new(path, format).load_bars().unwrap();

        assert_eq!(bars[0].timestamp, ts(4, 9, 30));
    }

    #[test]
    fn rfc3339_offsets_are_honoured() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "rfc.csv",
            "datetime,open,high,low,close,volume\n2024-03-04T14:31:00Z,1,2,0.5,1.5,10\n",
        );
        let format = CsvFormat::new(New_York)
            .with_delimiter(b',')
            .with_header(true)
            .with_rfc3339();
        let bars = CsvBarAdapter::new(path, format).load_bars().unwrap();

        assert_eq!(bars[0].timestamp, ts(4, 9, 31));
    }

    #[test]
    fn drops_nonexistent_local_times() {
        let dir = TempDir::new().unwrap();
        // 2024-03-10 02:30 does not exist in New York.
        let path = write_file(
            &dir,
            "dst.csv",
            "20240310 023000;1;2;0.5;1.5;10\n20240311 093000;1;2;0.5;1.5;10\n",
        );
        let bars = CsvBarAdapter::new(path, CsvFormat::new(New_York)).load_bars().unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, ts(11, 9, 30));
    }

    #[test]
    fn malformed_row_is_data_error_with_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.csv", "20240304 093000;1;2;0.5;1.5;10\n20240304 093100;x;2;0.5;1.5;10\n");
        let err = CsvBarAdapter::new(path, CsvFormat::new(New_York)).load_bars().unwrap_err();

        match err {
            OrtraderError::Data { reason, .. } => {
                assert!(reason.contains("line 2"), "{reason}");
                assert!(reason.contains("open"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_data_error() {
        let result = CsvBarAdapter::new("/nonexistent/nq.csv", CsvFormat::new(New_York)).load_bars();
        assert!(matches!(result, Err(OrtraderError::Data { .. })));
    }

    #[test]
    fn format_from_config() {
        let config = FileConfigAdapter::from_string(
            "[data]\ndelimiter = comma\ndatetime_format = %Y-%m-%d %H:%M\nhas_header = true\nsource_timezone = UTC\n",
        )
        .unwrap();
        let format = CsvFormat::from_config(&config, New_York).unwrap();

        assert_eq!(format.delimiter, b',');
        assert!(format.has_header);
        assert_eq!(format.source_timezone, Some(UTC));
        assert_eq!(format.timestamp, TimestampFormat::Pattern("%Y-%m-%d %H:%M".to_string()));
    }

    #[test]
    fn format_from_config_rejects_long_delimiter() {
        let config = FileConfigAdapter::from_string("[data]\ndelimiter = ::\n").unwrap();
        let err = CsvFormat::from_config(&config, New_York).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigInvalid { ref key, .. } if key == "delimiter"));
    }

    #[test]
    fn tail_feed_returns_only_new_complete_bars() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "live.csv",
            "20240304 093000;1;2;0.5;1.5;10;1\n20240304 093100;1;2;0.5;1.5;10;0\n",
        );
        let mut feed = CsvTailFeed::new(&path, CsvFormat::new(New_York));

        let first = feed.poll().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(feed.watermark(), Some(ts(4, 9, 30)));

        fs::write(
            &path,
            "20240304 093000;1;2;0.5;1.5;10;1\n20240304 093100;1;2.5;0.5;2;12;1\n20240304 093200;1;2;0.5;1.5;10\n",
        )
        .unwrap();
        let second = feed.poll().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].timestamp, ts(4, 9, 31));
        assert_eq!(second[0].high, 2.5);

        assert!(feed.poll().unwrap().is_empty());
    }

    #[test]
    fn tail_feed_resumes_from_watermark() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "live.csv",
            "20240304 093000;1;2;0.5;1.5;10\n20240304 093100;1;2;0.5;1.5;10\n",
        );
        let mut feed = CsvTailFeed::new(&path, CsvFormat::new(New_York));
        feed.resume_after(ts(4, 9, 30));
        let bars = feed.poll().unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, ts(4, 9, 31));
    }

    #[test]
    fn tail_feed_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut feed = CsvTailFeed::new(dir.path().join("later.csv"), CsvFormat::new(New_York));
        assert!(feed.poll().unwrap().is_empty());
    }
}
