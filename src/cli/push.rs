//! `docker push` command implementation

use super::pull::{canonical_name, check_content_trust};
use super::CliContext;
use crate::jsonmessage::display_stream;
use crate::registry::ImageReference;
use crate::streams::OutStream;
use crate::CliError;
use clap::Args;
use serde_json::Value;
use std::io::Write;

/// Arguments for the `push` command
#[derive(Args)]
pub struct PushArgs {
    /// Image name to push
    pub image: String,

    /// Push all tags of an image to the repository
    #[arg(short, long)]
    pub all_tags: bool,

    /// Skip image signing
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub disable_content_trust: Option<bool>,

    /// Suppress verbose output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `push` command
pub async fn execute(cli: &CliContext, args: PushArgs) -> anyhow::Result<()> {
    check_content_trust(args.disable_content_trust, &args.image)?;

    let reference = ImageReference::parse(&args.image)?;
    if args.all_tags && (reference.tag.is_some() || reference.digest.is_some()) {
        return Err(CliError::invalid_argument("tag can't be used with --all-tags/-a").into());
    }
    let target = if args.all_tags {
        reference.repository_with_registry()
    } else {
        reference.full_name()
    };

    let registry_auth = cli.registry_auth(&args.image).await?;
    tracing::debug!("pushing {}", target);
    let body = cli.client().await?.image_push(&target, &registry_auth).await?;

    let mut pushed = Vec::new();
    let mut on_aux = |aux: &Value| {
        if let Some(digest) = aux.get("Digest").and_then(Value::as_str) {
            pushed.push(digest.to_string());
        }
    };
    let out = if args.quiet {
        OutStream::from_writer(std::io::sink(), false)
    } else {
        cli.streams.out.clone()
    };
    display_stream(body, out, Some(&mut on_aux)).await?;
    tracing::debug!("pushed digests: {:?}", pushed);

    if args.quiet {
        let mut out = cli.streams.out.clone();
        writeln!(out, "{}", canonical_name(&reference))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use std::sync::Arc;
    use tempfile::TempDir;

    const PUSH_STREAM: &str = concat!(
        r#"{"status":"The push refers to repository [registry.example.com:5000/team/app]"}"#,
        "\n",
        r#"{"status":"Pushed","id":"d4fc045c9e3a"}"#,
        "\n",
        r#"{"status":"v1: digest: sha256:beef size: 528"}"#,
        "\n",
        r#"{"aux":{"Tag":"v1","Digest":"sha256:beef","Size":528}}"#,
        "\n"
    );

    #[tokio::test]
    async fn test_push_renders_progress() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.45");
        daemon.stream = PUSH_STREAM.as_bytes().to_vec();
        let daemon = Arc::new(daemon);
        let (code, out, err) = run_against(
            daemon.clone(),
            &dir,
            &["push", "--disable-content-trust", "registry.example.com:5000/team/app:v1"],
        )
        .await;
        assert_eq!(code, 0, "{}", err);
        assert!(out.contains("d4fc045c9e3a: Pushed"), "{}", out);
        assert!(out.contains("v1: digest: sha256:beef size: 528"), "{}", out);
        assert_eq!(daemon.calls(), vec!["push registry.example.com:5000/team/app:v1"]);
    }

    #[tokio::test]
    async fn test_quiet_push_prints_reference() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.45");
        daemon.stream = PUSH_STREAM.as_bytes().to_vec();
        let (code, out, _) = run_against(
            Arc::new(daemon),
            &dir,
            &["image", "push", "-q", "--disable-content-trust", "alpine"],
        )
        .await;
        assert_eq!(code, 0);
        assert_eq!(out, "docker.io/library/alpine:latest\n");
    }

    #[tokio::test]
    async fn test_trust_enabled_by_flag_value_refuses() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(
            daemon.clone(),
            &dir,
            &["push", "--disable-content-trust=false", "alpine"],
        )
        .await;
        assert_eq!(code, 1);
        assert!(err.contains("content trust"), "{}", err);
        assert!(daemon.calls().is_empty());
    }
}
