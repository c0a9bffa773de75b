use std::fmt;
use std::time::{Duration, Instant};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Wraps each field of a log line in brackets.
/// Format: [TIMESTAMP] [+ELAPSED] [LEVEL] [STEP/SUBSTEP] [TARGET: FILE:LINE]: MESSAGE
/// ELAPSED counts from formatter creation.
pub struct BracketedFormatter {
    started: Instant,
}

impl BracketedFormatter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for BracketedFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// `+4.213s`, `+2m07s`, `+3h05m`
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("+{}.{:03}s", secs, elapsed.subsec_millis())
    } else if secs < 3600 {
        format!("+{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("+{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

impl<S, N> FormatEvent<S, N> for BracketedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let now = chrono::Local::now();
        write!(writer, "[{}] ", now.format("%Y-%m-%dT%H:%M:%S%.3f"))?;
        write!(writer, "[{}] ", format_elapsed(self.started.elapsed()))?;
        write!(writer, "[{:5}] ", metadata.level())?;

        // Pipeline step path from the span stack, else the module the event came from
        let step = match ctx.event_scope() {
            Some(scope) => scope
                .from_root()
                .map(|span| span.name())
                .collect::<Vec<_>>()
                .join("/"),
            None => metadata
                .target()
                .rsplit("::")
                .next()
                .unwrap_or("unknown")
                .to_string(),
        };
        write!(writer, "[{}] ", step)?;

        if let (Some(file), Some(line)) = (metadata.file(), metadata.line()) {
            write!(writer, "[{}: {}:{}]: ", metadata.target(), file, line)?;
        } else {
            write!(writer, "[{}]: ", metadata.target())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span};
    use tracing_subscriber::prelude::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(emit: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(BracketedFormatter::new())
                .with_writer(move || writer.clone())
                .with_ansi(false),
        );
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_format_elapsed_units() {
        assert_eq!(format_elapsed(Duration::from_millis(4213)), "+4.213s");
        assert_eq!(format_elapsed(Duration::from_secs(127)), "+2m07s");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 5 * 60 + 9)), "+3h05m");
    }

    #[test]
    fn test_line_carries_nested_step_path() {
        let output = capture(|| {
            let _run = info_span!("run").entered();
            let _split = info_span!("split").entered();
            info!("moved 3 files");
        });

        assert!(output.contains("] [+0."), "{}", output);
        assert!(output.contains("INFO"), "{}", output);
        assert!(output.contains("[run/split] "), "{}", output);
        assert!(output.trim_end().ends_with("moved 3 files"), "{}", output);
    }

    #[test]
    fn test_line_outside_spans_uses_module_name() {
        let output = capture(|| info!("starting"));
        assert!(output.contains("[tests] "), "{}", output);
    }
}
