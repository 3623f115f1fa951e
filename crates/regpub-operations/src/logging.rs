use std::io::IsTerminal;

use nu_ansi_term::Color::{self, Blue, Magenta, Red, Yellow};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    registry::LookupSpan,
    EnvFilter,
};

/// Environment variable holding an `EnvFilter` directive that overrides the flags.
pub const LOG_ENV: &str = "REGPUB_LOG";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub json: bool,
}

impl LogOptions {
    pub fn level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else if self.verbose >= 2 {
            Level::TRACE
        } else if self.verbose == 1 {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    /// Directive used when [`LOG_ENV`] is unset.
    pub fn default_directive(&self) -> String {
        format!("regpub={}", self.level().as_str().to_ascii_lowercase())
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }
}

/// Level tag, message, then the structured fields.
pub struct CustomFormatter {
    color: bool,
}

impl CustomFormatter {
    fn tag(&self, color: Color, tag: &str) -> String {
        if self.color {
            color.paint(tag).to_string()
        } else {
            tag.to_string()
        }
    }
}

impl<S, N> FormatEvent<S, N> for CustomFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        match *event.metadata().level() {
            Level::TRACE => write!(writer, "{} ", self.tag(Magenta, "[TRACE]")),
            Level::DEBUG => write!(writer, "{} ", self.tag(Blue, "[DEBUG]")),
            Level::INFO => Ok(()),
            Level::WARN => write!(writer, "{} ", self.tag(Yellow, "[WARN]")),
            Level::ERROR => write!(writer, "{} ", self.tag(Red, "[ERROR]")),
        }?;

        write!(writer, "{}", visitor.message.unwrap_or_default())?;
        if !visitor.fields.is_empty() {
            write!(writer, " {}", visitor.fields.join(" "))?;
        }
        writeln!(writer)
    }
}

fn env_filter(options: &LogOptions) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => {
            EnvFilter::try_new(directive.trim())
                .unwrap_or_else(|_| EnvFilter::new(options.default_directive()))
        }
        _ => EnvFilter::new(options.default_directive()),
    }
}

/// Installs the global subscriber. Returns `false` when one was already installed, in which
/// case nothing changes.
pub fn setup_logging(options: &LogOptions) -> bool {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter(options))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .without_time();

    let subscriber: Box<dyn Subscriber + Send + Sync> = if options.json {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        let color = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Box::new(builder.event_format(CustomFormatter { color }).finish())
    };

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
