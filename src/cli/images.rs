//! `docker images` command implementation

use super::CliContext;
use crate::client::api::ImageListOptions;
use crate::formatter::image::{ImageRecord, DIGEST_TABLE};
use crate::formatter::{Format, FormatContext};
use crate::opts::filters::parse_filter_flag;
use crate::opts::Filters;
use clap::Args;

/// Arguments for the `images` command
#[derive(Args)]
pub struct ImagesArgs {
    /// Repository name to filter by
    pub repository: Option<String>,

    /// Show all images (default hides intermediate images)
    #[arg(short, long)]
    pub all: bool,

    /// Show digests
    #[arg(long)]
    pub digests: bool,

    /// Only show image IDs
    #[arg(short, long)]
    pub quiet: bool,

    /// Don't truncate output
    #[arg(long)]
    pub no_trunc: bool,

    /// Filter output based on conditions provided
    #[arg(short, long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Format output using a custom template
    #[arg(long)]
    pub format: Option<String>,
}

const FILTERS: &[&str] = &["before", "dangling", "label", "reference", "since", "until"];

/// Execute the `images` command
pub async fn execute(cli: &CliContext, args: ImagesArgs) -> anyhow::Result<()> {
    let mut filters = Filters::from_flags(&args.filter)?;
    filters.validate(FILTERS)?;
    if let Some(repository) = &args.repository {
        filters.add("reference", repository.clone());
    }

    let opts = ImageListOptions {
        all: args.all,
        filters,
    };
    let images = cli.client().await?.image_list(&opts).await?;

    let configured = cli.config.lock()?.images_format.clone();
    let mut format = Format::resolve(args.format.as_deref(), configured.as_deref());
    if args.digests && format == Format::Table(None) && !args.quiet {
        format = Format::parse(DIGEST_TABLE);
    }

    let records = ImageRecord::expand(&images);
    let mut ctx = FormatContext::new(cli.streams.out.clone(), format).quiet(args.quiet);
    ctx.trunc = !args.no_trunc;
    ctx.write(&records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use crate::client::api::ImageSummary;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn daemon() -> Arc<FakeDaemon> {
        let mut daemon = FakeDaemon::new("1.45");
        daemon.images = vec![
            ImageSummary {
                id: "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
                repo_tags: vec!["alpine:3.19".into(), "alpine:latest".into()],
                repo_digests: vec!["alpine@sha256:feed".into()],
                size: 7_000_000,
                ..Default::default()
            },
            ImageSummary {
                id: "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
                ..Default::default()
            },
        ];
        Arc::new(daemon)
    }

    #[tokio::test]
    async fn test_one_row_per_tag() {
        let dir = TempDir::new().unwrap();
        let (code, out, _) = run_against(
            daemon(),
            &dir,
            &["images", "--format", "{{.Repository}}:{{.Tag}} {{.Digest}}"],
        )
        .await;
        assert_eq!(code, 0);
        assert_eq!(
            out,
            "alpine:3.19 sha256:feed\nalpine:latest sha256:feed\n<none>:<none> <none>\n"
        );
    }

    #[tokio::test]
    async fn test_digest_table_header() {
        let dir = TempDir::new().unwrap();
        let (_, out, _) = run_against(daemon(), &dir, &["image", "ls", "--digests"]).await;
        let header = out.lines().next().unwrap();
        assert!(header.contains("DIGEST"), "{}", header);
    }

    #[tokio::test]
    async fn test_bad_filter_is_usage_error() {
        let dir = TempDir::new().unwrap();
        let (code, _, err) = run_against(daemon(), &dir, &["images", "-f", "colour=red"]).await;
        assert_eq!(code, 125);
        assert!(err.contains("colour"), "{}", err);
    }
}
