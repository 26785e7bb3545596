//! ---
//! pulse_section: "02-logging-pipeline"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Tracing layer fanning enriched records out to sinks."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::fmt;
use std::io::Write;

use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::format::RecordFormat;
use crate::record::{enrich, RawRecord};

/// One destination for formatted records.
pub struct Sink {
    label: &'static str,
    format: RecordFormat,
    min_level: LevelFilter,
    writer: BoxMakeWriter,
}

impl Sink {
    pub fn new<W>(label: &'static str, format: RecordFormat, min_level: LevelFilter, writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self {
            label,
            format,
            min_level,
            writer: BoxMakeWriter::new(writer),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    fn accepts(&self, level: &tracing::Level) -> bool {
        self.min_level >= *level
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("label", &self.label)
            .field("format", &self.format)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

/// Layer that enriches each event exactly once and hands the same record to
/// every sink whose minimum severity admits it.
#[derive(Debug, Default)]
pub struct PipelineLayer {
    sinks: Vec<Sink>,
}

impl PipelineLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        if !self.sinks.iter().any(|sink| sink.accepts(level)) {
            return;
        }

        let record = enrich(RawRecord::from_event(event));
        for sink in self.sinks.iter().filter(|sink| sink.accepts(level)) {
            match sink.format.render_line(&record) {
                Ok(line) => {
                    let mut writer = sink.writer.make_writer_for(event.metadata());
                    // A failing sink must not take the others down with it.
                    let _ = writer.write_all(line.as_bytes());
                }
                Err(err) => {
                    eprintln!("log sink {} failed to render record: {}", sink.label, err);
                }
            }
        }
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        self.sinks.iter().map(|sink| sink.min_level).max()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    /// In-memory sink writer used by the crate's tests.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}
