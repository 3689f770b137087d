use std::fmt::Write;

use jiff::{Zoned, tz::TimeZone};
use log::Record;
use logforth::{
    append::Stdout,
    layout::{JsonLayout, Layout},
};

use crate::args::{Args, LogStyle};

/// `<timestamp> <level>  <crate>: <message>`, optionally with ANSI colored levels.
#[derive(Debug, Clone)]
struct TallyTextLayout {
    color: bool,
}

impl TallyTextLayout {
    fn colored() -> Self {
        Self { color: true }
    }

    fn plain() -> Self {
        Self { color: false }
    }
}

impl Layout for TallyTextLayout {
    fn format(
        &self,
        record: &Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = record.level();

        if self.color {
            let code = match level {
                log::Level::Error => 31,
                log::Level::Warn => 33,
                log::Level::Info => 32,
                log::Level::Debug => 34,
                log::Level::Trace => 35,
            };

            write!(output, "\x1b[{code}m{level:>5}\x1b[0m  ")?;
        } else {
            write!(output, "{level:>5}  ")?;
        }

        let target = record.target().split("::").next().unwrap_or_default();
        write!(output, "{target}: {}", record.args())?;

        Ok(output.into_bytes())
    }
}

pub(super) fn init(args: &Args) {
    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(args.log_level.env_filter());

            match args.log_style {
                LogStyle::Color => d.append(Stdout::default().with_layout(TallyTextLayout::colored())),
                LogStyle::Text => d.append(Stdout::default().with_layout(TallyTextLayout::plain())),
                LogStyle::Json => d.append(Stdout::default().with_layout(JsonLayout::default())),
            }
        })
        .apply();
}
