//! `docker version` command implementation

use super::CliContext;
use crate::client::version::DEFAULT_VERSION;
use crate::formatter::Template;
use crate::VERSION;
use clap::Args;
use serde_json::{json, Value};
use std::io::Write;

/// Arguments for the `version` command
#[derive(Args)]
pub struct VersionArgs {
    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

const DEFAULT_TEMPLATE: &str = "Client:
 Version:           {{.Client.Version}}
 API version:       {{.Client.APIVersion}}
 OS/Arch:           {{.Client.Os}}/{{.Client.Arch}}
 Context:           {{.Client.Context}}
{{- if .Server}}

Server:
 Engine:
  Version:          {{.Server.Version}}
  API version:      {{.Server.ApiVersion}} (minimum version {{.Server.MinAPIVersion}})
  OS/Arch:          {{.Server.Os}}/{{.Server.Arch}}
{{- end}}";

/// Execute the `version` command
pub async fn execute(cli: &CliContext, args: VersionArgs) -> anyhow::Result<()> {
    let client = cli.client().await?;
    let mut data = json!({
        "Client": {
            "Version": VERSION,
            "APIVersion": DEFAULT_VERSION,
            "Os": std::env::consts::OS,
            "Arch": std::env::consts::ARCH,
            "Context": cli.current_context(),
        },
        "Server": Value::Null,
    });

    let server = client.server_version().await;
    if let Ok(ping) = client.ping().await {
        data["Client"]["APIVersion"] = Value::String(ping.api_version);
    }
    let server_error = match server {
        Ok(server) => {
            data["Server"] = serde_json::to_value(&server)?;
            None
        }
        Err(e) => Some(e),
    };

    let source = match args.format.as_deref().filter(|f| !f.is_empty()) {
        Some("json") => "{{json .}}",
        Some(format) => format,
        None => DEFAULT_TEMPLATE,
    };
    let rendered = Template::parse(source)?.execute(&data)?;
    let mut out = cli.streams.out.clone();
    writeln!(out, "{}", rendered)?;

    match server_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
