//! `docker inspect` command implementation

use super::{require_args, CliContext};
use crate::client::api::DaemonApi;
use crate::inspect::inspect;
use crate::{CliError, Result};
use clap::{Args, ValueEnum};
use serde_json::Value;

/// Arguments for the `inspect` command
#[derive(Args)]
pub struct InspectArgs {
    /// Names or IDs of objects to inspect
    pub names: Vec<String>,

    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,

    /// Only inspect objects of the given type
    #[arg(long = "type", value_enum)]
    pub kind: Option<ObjectType>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ObjectType {
    Container,
    Image,
    Volume,
    Network,
}

/// Lookup order when no type is given
const SEARCH_ORDER: [ObjectType; 4] = [
    ObjectType::Container,
    ObjectType::Image,
    ObjectType::Volume,
    ObjectType::Network,
];

async fn fetch_typed(client: &dyn DaemonApi, kind: ObjectType, name: &str) -> Result<(Value, Vec<u8>)> {
    match kind {
        ObjectType::Container => client.container_inspect_raw(name).await,
        ObjectType::Image => client.image_inspect_raw(name).await,
        ObjectType::Volume => client.volume_inspect_raw(name).await,
        ObjectType::Network => client.network_inspect_raw(name).await,
    }
}

/// First object of any type answering to `name`
async fn fetch_any(client: &dyn DaemonApi, kind: Option<ObjectType>, name: &str) -> Result<(Value, Vec<u8>)> {
    if let Some(kind) = kind {
        return fetch_typed(client, kind, name).await;
    }
    for kind in SEARCH_ORDER {
        match fetch_typed(client, kind, name).await {
            Err(e) if e.is_not_found() => continue,
            other => return other,
        }
    }
    Err(CliError::not_found(format!("Error: No such object: {}", name)))
}

/// Execute the `inspect` command
pub async fn execute(cli: &CliContext, args: InspectArgs) -> anyhow::Result<()> {
    require_args("inspect", args.names.len(), 1)?;
    let client = cli.client().await?;
    let kind = args.kind;
    let mut out = cli.streams.out.clone();
    inspect(
        &mut out,
        &args.names,
        args.format.as_deref().unwrap_or_default(),
        |name| {
            let client = client.clone();
            async move { fetch_any(client.as_ref(), kind, &name).await }
        },
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn daemon() -> Arc<FakeDaemon> {
        Arc::new(
            FakeDaemon::new("1.45")
                .with_object("web", json!({"Id": "abc123", "Name": "/web", "Future": {"x": 1}}))
                .with_object("data", json!({"Name": "data", "Driver": "local"})),
        )
    }

    #[tokio::test]
    async fn test_raw_json_keeps_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let (code, out, _) = run_against(daemon(), &dir, &["inspect", "web"]).await;
        assert_eq!(code, 0);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["Future"]["x"], 1);
    }

    #[tokio::test]
    async fn test_template_over_many_names() {
        let dir = TempDir::new().unwrap();
        let (code, out, _) =
            run_against(daemon(), &dir, &["inspect", "-f", "{{.Name}}", "web", "data"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "/web\ndata\n");
    }

    #[tokio::test]
    async fn test_all_missing_prints_first_error() {
        let dir = TempDir::new().unwrap();
        let (code, out, err) = run_against(daemon(), &dir, &["inspect", "nope", "nada"]).await;
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert_eq!(err, "Error: No such object: nope\n");
    }

    #[tokio::test]
    async fn test_no_names_is_usage_error() {
        let dir = TempDir::new().unwrap();
        let (code, _, _) = run_against(daemon(), &dir, &["inspect"]).await;
        assert_eq!(code, 125);
    }
}
