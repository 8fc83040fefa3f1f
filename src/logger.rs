use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::PathBuf,
};
use nu_ansi_term::{Color, Style};
use serde::Deserialize;
use termcolor::ColorChoice;
use tracing::{field::Visit, Level, Metadata};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::{FilterFn, LevelFilter},
    fmt::FormatEvent,
    prelude::*,
};


use crate::{prelude::*, args::Args};


#[derive(Debug, confique::Config)]
pub(crate) struct LogConfig {
    /// Specifies what log messages to emit, based on the module path and log level.
    ///
    /// This is a map where the key specifies a module path prefix, and the
    /// value specifies a minimum log level. For each log message, the map
    /// entry with the longest prefix matching the log's module path is chosen.
    /// If no such entry exists, the log is not emitted. Otherwise, that
    /// entry's level is used to check whether the log message should be
    /// emitted.
    ///
    /// Example: only ≥"info" logs from Postboard generally, but ≥"trace"
    /// messages from the `auth` module, nothing from `db::client` and
    /// ≥"debug" from the Postgres driver:
    ///
    ///    [log]
    ///    filters.postboard = "info"
    ///    filters."postboard::auth" = "trace"
    ///    filters."postboard::db::client" = "off"
    ///    filters.tokio_postgres = "debug"
    #[config(default = { "postboard": "debug" })]
    pub(crate) filters: Filters,

    /// If this is set, log messages are also written to this file. The string
    /// `${cmd}` in this value is replaced by the subcommand name of the
    /// process, e.g. `serve`, `db` or `other`. Example:
    /// "/var/log/postboard-${cmd}.log".
    pub(crate) file: Option<PathBuf>,

    /// If this is set to `false`, log messages are not written to stdout.
    #[config(default = true)]
    pub(crate) stdout: bool,

    /// If set to `true`, HTTP header of each incoming request are logged
    /// (with 'trace' level). Note that this includes the `Authorization`
    /// header!
    #[config(default = false)]
    pub(crate) log_http_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "HashMap<String, String>")]
pub(crate) struct Filters(HashMap<String, LevelFilter>);

impl TryFrom<HashMap<String, String>> for Filters {
    type Error = String;
    fn try_from(value: HashMap<String, String>) -> Result<Self, Self::Error> {
        value.into_iter()
            .map(|(target_prefix, level)| {
                let level = parse_level_filter(&level)?;
                Ok((target_prefix, level))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl Filters {
    /// Whether an event with the given target and level passes these
    /// filters. The entry with the longest matching prefix decides.
    fn allows(&self, target: &str, level: &Level) -> bool {
        self.0.iter()
            .filter(|(target_prefix, _)| target.starts_with(target_prefix.as_str()))
            .max_by_key(|(target_prefix, _)| target_prefix.len())
            .map(|(_, level_filter)| level <= level_filter)
            .unwrap_or(false)
    }

    fn max_level(&self) -> LevelFilter {
        self.0.values().max().copied().unwrap_or(LevelFilter::OFF)
    }
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    match s {
        "off" => Ok(LevelFilter::OFF),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(format!("invalid log level '{other}'")),
    }
}

/// Installs our own logger globally. Must only be called once!
pub(crate) fn init(config: &LogConfig, args: &Args, cmd: &str) -> Result<()> {
    let filter = {
        let filters = config.filters.clone();
        let max_level = filters.max_level();
        FilterFn::new(move |metadata: &Metadata<'_>| {
            filters.allows(metadata.target(), metadata.level())
        }).with_max_level_hint(max_level)
    };

    macro_rules! subscriber {
        ($writer:expr) => {
            tracing_subscriber::fmt::layer()
                .event_format(EventFormatter(args.color))
                .with_writer($writer)
        };
    }

    let stdout_output = if config.stdout {
        Some(subscriber!(std::io::stdout))
    } else {
        None
    };

    let file_output = config.file.as_ref()
        .map(|path| -> Result<std::fs::File> {
            use std::io::Write;

            let new_path = path.to_str()
                .ok_or_else(|| anyhow!("log file path is not valid UTF-8"))?
                .replace("${cmd}", cmd);

            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(new_path)
                .with_context(|| format!("failed to open/create log file '{}'", path.display()))?;

            // Add an empty line separator to see process restarts easier.
            file.write_all(b"\n").context("could not write to log file")?;

            Ok(file)
        })
        .transpose()?
        .map(|file| subscriber!(file).with_ansi(args.color == ColorChoice::Always));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_output)
        .with(stdout_output)
        .init();

    Ok(())
}

type TracingWriter<'a> = tracing_subscriber::fmt::format::Writer<'a>;

/// Fields that are not printed as `key=value`.
fn ignore_field(name: &str) -> bool {
    name == "message" || name.starts_with("log.") || name.starts_with("postboard.")
}

#[derive(Clone, Copy)]
struct EventFormatter(ColorChoice);

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: TracingWriter<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let use_ansi = self.0 == ColorChoice::Always
            || (writer.has_ansi_escapes() && self.0 != ColorChoice::Never);
        macro_rules! wr {
            ($style:expr, $fmt:literal $($args:tt)*) => {{
                with_style(&mut writer, use_ansi, $style, |w| {
                    write!(w, $fmt $($args)*)
                })?;
            }};
        }

        // Events forwarded from the `log` crate carry their real metadata in
        // special fields.
        let normalized_metadata = event.normalized_metadata();
        let metadata = normalized_metadata.as_ref().unwrap_or(event.metadata());

        let dim_style = Style::new().dimmed();
        let level_style = match *metadata.level() {
            Level::ERROR => Style::new().fg(Color::Red).bold(),
            Level::WARN => Style::new().fg(Color::Yellow).bold(),
            Level::INFO => Style::new().fg(Color::Green),
            Level::DEBUG => Style::new().fg(Color::Blue),
            Level::TRACE => Style::new().fg(Color::Magenta),
        };
        let body_style = match *metadata.level() {
            Level::ERROR => Style::new().fg(Color::Red),
            Level::WARN => Style::new().fg(Color::Yellow),
            Level::INFO => Style::new(),
            Level::DEBUG => Style::new().dimmed(),
            Level::TRACE => Style::new().fg(Color::DarkGray),
        };

        // Time, level and target.
        wr!(dim_style, "{} ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S.%3f"));
        wr!(level_style, "{:5}", metadata.level());
        wr!(dim_style, " {} >  ", metadata.target());


        // We visit all fields first to find the message and to count the
        // fields that are printed after it.
        struct FieldCounter {
            message: Option<String>,
            num_fields: u32,
        }

        impl Visit for FieldCounter {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if !ignore_field(field.name()) {
                    self.num_fields += 1;
                }

                if field.name() == "message" {
                    self.message = Some(format!("{value:?}"));
                }
            }
        }

        let mut fields = FieldCounter { message: None, num_fields: 0 };
        event.record(&mut fields);

        // The padded prefix for continuation lines. Assumes an ASCII target.
        let prefix = {
            let padding = "2021-05-04 19:40:18.270 DEBUG ".len() + 2 + metadata.target().len();
            format!(
                "\n{:padding$}{prefix}>{suffix}  ",
                "",
                padding = padding - 1,
                prefix = if use_ansi { dim_style.prefix() } else { Style::new().prefix() },
                suffix = if use_ansi { dim_style.suffix() } else { Style::new().suffix() },
            )
        };

        if let Some(msg) = &fields.message {
            let mut lines = msg.lines();
            wr!(body_style, "{}", lines.next().unwrap_or(""));
            for line in lines {
                write!(writer, "{}", prefix)?;
                wr!(body_style, "{line}");
            }
        }

        if fields.num_fields > 0 {
            if fields.message.is_some() {
                wr!(level_style, " ~~ ");
            }

            struct Printer<'w> {
                out: TracingWriter<'w>,
                use_ansi: bool,
                body_style: Style,
                needs_separator: bool,
            }

            impl Visit for Printer<'_> {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if ignore_field(field.name()) {
                        return;
                    }

                    let _ = (|| -> std::fmt::Result {
                        if self.needs_separator {
                            write!(self.out, " ")?;
                        }
                        let key_style = self.body_style.italic();
                        with_style(&mut self.out, self.use_ansi, key_style, |out| {
                            write!(out, "{}", field.name())
                        })?;
                        with_style(&mut self.out, self.use_ansi, self.body_style, |out| {
                            write!(out, "={value:?}")
                        })?;
                        self.needs_separator = true;
                        Ok(())
                    })();
                }
            }

            let mut printer = Printer {
                out: writer.by_ref(),
                use_ansi,
                body_style,
                needs_separator: false,
            };
            event.record(&mut printer);
        }

        writeln!(writer, "{}", if use_ansi { nu_ansi_term::ansi::RESET } else { "" })?;

        Ok(())
    }
}

fn with_style(
    out: &mut TracingWriter<'_>,
    use_ansi: bool,
    style: Style,
    f: impl FnOnce(&mut TracingWriter<'_>) -> std::fmt::Result,
) -> std::fmt::Result {
    if use_ansi {
        write!(out, "{}", style.prefix())?;
    }
    f(out)?;
    if use_ansi {
        write!(out, "{}", style.suffix())?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use tracing::Level;

    use super::Filters;

    fn filters(entries: &[(&str, &str)]) -> Filters {
        let raw = entries.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Filters::try_from(raw).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let f = filters(&[
            ("postboard", "info"),
            ("postboard::auth", "trace"),
            ("postboard::db::client", "off"),
        ]);

        assert!(f.allows("postboard::http", &Level::INFO));
        assert!(!f.allows("postboard::http", &Level::DEBUG));
        assert!(f.allows("postboard::auth::jwt", &Level::TRACE));
        assert!(!f.allows("postboard::db::client", &Level::ERROR));
        assert!(f.allows("postboard::db", &Level::WARN));
    }

    #[test]
    fn unknown_targets_are_dropped() {
        let f = filters(&[("postboard", "trace")]);
        assert!(!f.allows("hyper::proto", &Level::ERROR));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let raw = HashMap::from([("postboard".to_string(), "verbose".to_string())]);
        assert!(Filters::try_from(raw).is_err());
    }
}
