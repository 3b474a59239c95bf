//! Output formatting for list and inspect commands
//!
//! A format string is one of the keywords `table`, `raw` and `json`, a
//! `table <template>` with a custom column set, or a free-form template.
//! Resource adapters turn daemon objects into template data and supply
//! the header row and default templates.

pub mod container;
pub mod context;
pub mod image;
pub mod network;
pub mod tabwriter;
pub mod template;
pub mod volume;

use crate::Result;
use serde_json::{Map, Value};
use std::io::Write;
use tabwriter::TabWriter;
pub use template::Template;

pub const TABLE_KEY: &str = "table";
pub const RAW_KEY: &str = "raw";
pub const JSON_KEY: &str = "json";

const JSON_TEMPLATE: &str = "{{json .}}";

/// A parsed `--format` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    /// `table` with the resource's default columns, or `table <template>`
    Table(Option<String>),
    Raw,
    Json,
    Template(String),
}

impl Format {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value {
            "" | TABLE_KEY => Format::Table(None),
            RAW_KEY => Format::Raw,
            JSON_KEY => Format::Json,
            _ => match value.strip_prefix(TABLE_KEY) {
                Some(rest) if rest.starts_with(char::is_whitespace) => {
                    Format::Table(Some(rest.trim().to_string()))
                }
                _ => Format::Template(value.to_string()),
            },
        }
    }

    /// Flag value first, then the config default, then `table`.
    pub fn resolve(flag: Option<&str>, config_default: Option<&str>) -> Self {
        match flag.filter(|f| !f.is_empty()) {
            Some(flag) => Self::parse(flag),
            None => Self::parse(config_default.unwrap_or(TABLE_KEY)),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Format::Table(_))
    }

    pub fn is_json(&self) -> bool {
        *self == Format::Json
    }
}

/// Template data for one record of a resource listing
pub trait Adapter {
    /// Field name to column header, in display order
    const HEADERS: &'static [(&'static str, &'static str)];
    const DEFAULT_TABLE: &'static str;
    const DEFAULT_RAW: &'static str;
    const QUIET: &'static str = "{{.ID}}";
    const QUIET_RAW: &'static str = "id: {{.ID}}";

    /// Fields exposed to templates. `trunc` shortens ids and long text.
    fn data(&self, trunc: bool) -> Map<String, Value>;
}

/// Where and how a listing is written
pub struct FormatContext<W: Write> {
    pub out: W,
    pub format: Format,
    pub quiet: bool,
    /// Defaults to on for tables, off otherwise
    pub trunc: bool,
}

impl<W: Write> FormatContext<W> {
    pub fn new(out: W, format: Format) -> Self {
        let trunc = format.is_table();
        Self {
            out,
            format,
            quiet: false,
            trunc,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn no_trunc(mut self, no_trunc: bool) -> Self {
        if no_trunc {
            self.trunc = false;
        }
        self
    }

    /// Render `records` and flush.
    pub fn write<A: Adapter>(&mut self, records: &[A]) -> Result<()> {
        let (source, header) = match &self.format {
            Format::Table(None) if self.quiet => (A::QUIET.to_string(), false),
            Format::Table(None) => (strip_table(A::DEFAULT_TABLE), true),
            Format::Table(Some(custom)) => (custom.clone(), true),
            Format::Raw if self.quiet => (A::QUIET_RAW.to_string(), false),
            Format::Raw => (A::DEFAULT_RAW.to_string(), false),
            Format::Json => (JSON_TEMPLATE.to_string(), false),
            Format::Template(source) => (source.clone(), false),
        };
        let template = Template::parse(&unescape(&source))?;

        let mut rendered = String::new();
        if header {
            rendered.push_str(&template.execute(&header_context::<A>())?);
            rendered.push('\n');
        }
        for record in records {
            rendered.push_str(&template.execute(&Value::Object(record.data(self.trunc)))?);
            rendered.push('\n');
        }

        if self.format.is_table() {
            let mut tw = TabWriter::new(&mut self.out);
            tw.write_all(rendered.as_bytes())?;
            tw.flush()?;
        } else {
            self.out.write_all(rendered.as_bytes())?;
            self.out.flush()?;
        }
        Ok(())
    }
}

/// Headers keyed by field name, as seen by the header row
pub fn header_context<A: Adapter>() -> Value {
    Value::Object(
        A::HEADERS
            .iter()
            .map(|(field, header)| (field.to_string(), Value::String(header.to_string())))
            .collect(),
    )
}

fn strip_table(source: &str) -> String {
    source
        .strip_prefix(TABLE_KEY)
        .unwrap_or(source)
        .trim()
        .to_string()
}

/// Literal `\t` and `\n` typed on a command line become real tabs and newlines.
fn unescape(source: &str) -> String {
    source.trim_matches(' ').replace("\\t", "\t").replace("\\n", "\n")
}

/// Shorten an id to 12 characters, dropping any algorithm prefix.
pub fn truncate_id(id: &str) -> String {
    let id = id.split_once(':').map_or(id, |(_, hex)| hex);
    id.chars().take(12).collect()
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis.
pub fn ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// `k=v` pairs joined by commas, in key order
pub fn join_labels<'a>(labels: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    labels
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
