//! `docker pull` command implementation

use super::CliContext;
use crate::client::api::PullOptions;
use crate::jsonmessage::display_stream;
use crate::prompt::parse_bool_env;
use crate::registry::ImageReference;
use crate::streams::OutStream;
use crate::CliError;
use clap::Args;
use std::io::Write;

/// Enables signed-image verification
pub const CONTENT_TRUST_ENV: &str = "DOCKER_CONTENT_TRUST";

/// Default for `--platform`
pub const DEFAULT_PLATFORM_ENV: &str = "DOCKER_DEFAULT_PLATFORM";

/// Arguments for the `pull` command
#[derive(Args)]
pub struct PullArgs {
    /// Image name to pull
    pub image: String,

    /// Download all tagged images in the repository
    #[arg(short, long)]
    pub all_tags: bool,

    /// Skip image verification
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub disable_content_trust: Option<bool>,

    /// Set platform if server is multi-platform capable
    #[arg(long, env = DEFAULT_PLATFORM_ENV)]
    pub platform: Option<String>,

    /// Suppress verbose output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Whether the environment asks for content trust. Unset or empty
/// disables it; a value that is not a boolean enables it.
pub fn content_trust_from_env(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        value => parse_bool_env(value).unwrap_or(true),
    }
}

/// Fail when signature verification was requested for `image`; this client
/// has no trust server to verify against.
pub(crate) fn check_content_trust(disable_flag: Option<bool>, image: &str) -> crate::Result<()> {
    let enabled = match disable_flag {
        Some(disabled) => !disabled,
        None => content_trust_from_env(std::env::var(CONTENT_TRUST_ENV).ok().as_deref()),
    };
    if enabled {
        return Err(CliError::NotImplemented(format!(
            "content trust verification is not available for {}; retry with --disable-content-trust",
            image
        )));
    }
    Ok(())
}

/// Pull `image`, rendering progress to `out` unless `quiet`.
pub(crate) async fn pull_image(
    cli: &CliContext,
    image: &str,
    all_tags: bool,
    platform: Option<String>,
    quiet: bool,
    out: OutStream,
) -> anyhow::Result<()> {
    let reference = ImageReference::parse(image)?;
    if all_tags && (reference.tag.is_some() || reference.digest.is_some()) {
        return Err(CliError::invalid_argument("tag can't be used with --all-tags/-a").into());
    }
    let target = if all_tags {
        reference.repository_with_registry()
    } else {
        reference.full_name()
    };

    let opts = PullOptions {
        all_tags,
        platform,
        registry_auth: cli.registry_auth(image).await?,
    };
    tracing::debug!("pulling {}", target);
    let body = cli.client().await?.image_pull(&target, &opts).await?;

    if quiet {
        display_stream(body, OutStream::from_writer(std::io::sink(), false), None).await?;
    } else {
        display_stream(body, out, None).await?;
    }
    Ok(())
}

/// Execute the `pull` command
pub async fn execute(cli: &CliContext, args: PullArgs) -> anyhow::Result<()> {
    check_content_trust(args.disable_content_trust, &args.image)?;
    pull_image(
        cli,
        &args.image,
        args.all_tags,
        args.platform,
        args.quiet,
        cli.streams.out.clone(),
    )
    .await?;

    if !args.all_tags {
        let reference = ImageReference::parse(&args.image)?;
        let mut out = cli.streams.out.clone();
        writeln!(out, "{}", canonical_name(&reference))?;
    }
    Ok(())
}

/// Fully qualified name as echoed after a pull
pub(crate) fn canonical_name(reference: &ImageReference) -> String {
    let mut name = format!("{}/{}", reference.registry, reference.repository);
    match (&reference.tag, &reference.digest) {
        (_, Some(digest)) => {
            name.push('@');
            name.push_str(digest);
        }
        _ => {
            name.push(':');
            name.push_str(reference.tag());
        }
    }
    name
}
