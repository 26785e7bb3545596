//! ---
//! pulse_section: "02-logging-pipeline"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Human-readable and JSON renderers for enriched records."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use chrono::Local;
use serde::Serialize;

use crate::record::LogRecord;

const HUMAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// ISO-8601 local time with microseconds, no offset.
pub const ISO_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Output encodings supported by the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// `<timestamp> [<LEVEL>] [<name>] [<module>:<line>] [trace_id=<id>] - <message>`
    Human,
    /// One JSON document per line.
    Json,
}

impl RecordFormat {
    /// Render a record as a newline terminated line.
    pub fn render_line(&self, record: &LogRecord) -> serde_json::Result<String> {
        let mut line = match self {
            RecordFormat::Human => render_human(record),
            RecordFormat::Json => render_json(record)?,
        };
        line.push('\n');
        Ok(line)
    }
}

/// Render the human-readable form. A failure trace follows on its own lines.
pub fn render_human(record: &LogRecord) -> String {
    let mut line = format!(
        "{} [{}] [{}] [{}:{}] [trace_id={}] - {}",
        record.timestamp.format(HUMAN_TIME_FORMAT),
        record.level,
        record.name,
        record.module,
        record.line,
        record.trace_id,
        record.message
    );
    if let Some(exception) = &record.exception {
        line.push('\n');
        line.push_str(exception.trim_end());
    }
    line
}

#[derive(Debug, Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    level: &'a str,
    name: &'a str,
    module: &'a str,
    line: u32,
    trace_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
}

/// Render the structured form. The timestamp is taken at render time.
pub fn render_json(record: &LogRecord) -> serde_json::Result<String> {
    let document = JsonRecord {
        timestamp: Local::now().format(ISO_LOCAL_FORMAT).to_string(),
        level: record.level.as_str(),
        name: &record.name,
        module: &record.module,
        line: record.line,
        trace_id: &record.trace_id,
        message: &record.message,
        request_id: record.request_id.as_deref(),
        exception: record.exception.as_deref(),
    };
    serde_json::to_string(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;
    use tracing::Level;

    fn record() -> LogRecord {
        LogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            level: Level::INFO,
            name: "pulse_api::handlers".into(),
            module: "handlers".into(),
            line: 42,
            trace_id: "abc123".into(),
            message: "Health check requested".into(),
            request_id: None,
            exception: None,
        }
    }

    #[test]
    fn human_line_layout() {
        assert_eq!(
            render_human(&record()),
            "2024-03-09 14:05:07 [INFO] [pulse_api::handlers] [handlers:42] [trace_id=abc123] - Health check requested"
        );
    }

    #[test]
    fn human_line_appends_exception() {
        let mut record = record();
        record.level = Level::ERROR;
        record.exception = Some("boom\n\nCaused by:\n    disk full\n".into());
        let rendered = render_human(&record);
        assert!(rendered.starts_with("2024-03-09 14:05:07 [ERROR]"));
        assert!(rendered.ends_with("- Health check requested\nboom\n\nCaused by:\n    disk full"));
    }

    #[test]
    fn json_document_keys_and_order() {
        let json = render_json(&record()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 7);
        assert_eq!(value["line"], 42);

        let order = ["timestamp", "level", "name", "module", "line", "trace_id", "message"];
        let positions: Vec<usize> = order
            .iter()
            .map(|key| json.find(&format!("\"{key}\":")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn json_includes_optional_fields_when_present() {
        let mut record = record();
        record.request_id = Some("req-1".into());
        record.exception = Some("trace text".into());
        let value: Value = serde_json::from_str(&render_json(&record).unwrap()).unwrap();
        assert_eq!(value["request_id"], "req-1");
        assert_eq!(value["exception"], "trace text");
    }

    #[test]
    fn json_timestamp_is_regenerated() {
        let value: Value = serde_json::from_str(&render_json(&record()).unwrap()).unwrap();
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(!timestamp.starts_with("2024-03-09"));
        assert!(chrono::NaiveDateTime::parse_from_str(timestamp, ISO_LOCAL_FORMAT).is_ok());
    }

    #[test]
    fn renderers_agree_on_shared_fields() {
        let record = record();
        let human = render_human(&record);
        let value: Value = serde_json::from_str(&render_json(&record).unwrap()).unwrap();

        let level = value["level"].as_str().unwrap();
        let name = value["name"].as_str().unwrap();
        let module = value["module"].as_str().unwrap();
        let line = value["line"].as_u64().unwrap();
        let trace_id = value["trace_id"].as_str().unwrap();
        let message = value["message"].as_str().unwrap();

        assert!(human.contains(&format!("[{level}]")));
        assert!(human.contains(&format!("[{name}]")));
        assert!(human.contains(&format!("[{module}:{line}]")));
        assert!(human.contains(&format!("[trace_id={trace_id}]")));
        assert!(human.ends_with(&format!(" - {message}")));
    }

    #[test]
    fn render_line_is_newline_terminated() {
        for format in [RecordFormat::Human, RecordFormat::Json] {
            let line = format.render_line(&record()).unwrap();
            assert!(line.ends_with('\n'));
            assert_eq!(line.matches('\n').count(), 1);
        }
    }
}
