//! Multi-target `inspect` rendering
//!
//! Objects are fetched one name at a time through a caller-supplied lookup.
//! Without a template (or with `json`) the raw daemon JSON is re-indented
//! into a single array so fields unknown to this client survive.

use crate::formatter::Template;
use crate::{CliError, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::future::Future;
use std::io::Write;

enum Renderer {
    Indented(Vec<Value>),
    Template(Template),
}

/// Fetch every name and write the results to `out`.
///
/// `fetch` returns the decoded object and the raw JSON it was decoded from.
/// Not-found errors are collected while the remaining names are processed;
/// any other error aborts. When every name fails the first error is
/// returned, otherwise all not-found messages are joined.
pub async fn inspect<W, F, Fut>(out: &mut W, names: &[String], format: &str, mut fetch: F) -> Result<()>
where
    W: Write,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(Value, Vec<u8>)>>,
{
    let format = format.trim();
    let mut renderer = if format.is_empty() || format == "json" {
        Renderer::Indented(Vec::new())
    } else {
        Renderer::Template(Template::parse(format)?)
    };

    let mut missing: Vec<CliError> = Vec::new();
    let mut rendered = String::new();
    for name in names {
        let (value, raw) = match fetch(name.clone()).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                tracing::debug!("inspect {}: {}", name, e);
                missing.push(e);
                continue;
            }
            Err(e) => return Err(e),
        };
        match &mut renderer {
            Renderer::Indented(elements) => {
                let element = if raw.is_empty() {
                    value
                } else {
                    serde_json::from_slice(&raw)?
                };
                elements.push(element);
            }
            Renderer::Template(template) => {
                rendered.push_str(&template.execute(&value)?);
                rendered.push('\n');
            }
        }
    }

    match renderer {
        // An all-missing run prints nothing, not an empty array.
        Renderer::Indented(elements) if elements.is_empty() && !missing.is_empty() => {}
        Renderer::Indented(elements) => write_indented(out, &elements)?,
        Renderer::Template(_) => out.write_all(rendered.as_bytes())?,
    }
    out.flush()?;

    if missing.len() == names.len() && !missing.is_empty() {
        return Err(missing.swap_remove(0));
    }
    if !missing.is_empty() {
        let message = missing
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(CliError::NotFound(message));
    }
    Ok(())
}

fn write_indented<W: Write>(out: &mut W, elements: &[Value]) -> Result<()> {
    if elements.is_empty() {
        out.write_all(b"[]\n")?;
        return Ok(());
    }
    let mut ser = serde_json::Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(b"    "));
    elements.serialize(&mut ser)?;
    out.write_all(b"\n")?;
    Ok(())
}
