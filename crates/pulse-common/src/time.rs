//! ---
//! pulse_section: "01-core-functionality"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Timestamp helpers shared by payloads and renderers."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use chrono::{DateTime, Local};

pub use pulse_logging::format::ISO_LOCAL_FORMAT;

/// Current local time rendered with [`ISO_LOCAL_FORMAT`].
pub fn iso_timestamp() -> String {
    format_iso(&Local::now())
}

pub fn format_iso(at: &DateTime<Local>) -> String {
    at.format(ISO_LOCAL_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};

    #[test]
    fn iso_timestamp_parses_back() {
        let stamp = iso_timestamp();
        assert!(NaiveDateTime::parse_from_str(&stamp, ISO_LOCAL_FORMAT).is_ok());
        assert_eq!(stamp.len(), 26);
    }

    #[test]
    fn payload_and_log_timestamps_share_a_layout() {
        let record = pulse_logging::enrich(pulse_logging::RawRecord::new(
            tracing::Level::INFO,
            "pulse_common::time",
            "stamp",
        ));
        let json = pulse_logging::format::render_json(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let logged = value["timestamp"].as_str().unwrap();
        assert!(NaiveDateTime::parse_from_str(logged, ISO_LOCAL_FORMAT).is_ok());
        assert_eq!(logged.len(), iso_timestamp().len());
    }

    #[test]
    fn format_keeps_microseconds() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_iso(&at), "2024-01-02T03:04:05.000000");
    }
}
