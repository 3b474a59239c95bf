//! `docker tag` command implementation

use super::CliContext;
use crate::registry::ImageReference;
use crate::CliError;
use clap::Args;

/// Arguments for the `tag` command
#[derive(Args)]
pub struct TagArgs {
    /// Source image (SOURCE_IMAGE[:TAG])
    pub source: String,

    /// Target image (TARGET_IMAGE[:TAG])
    pub target: String,
}

/// Execute the `tag` command
pub async fn execute(cli: &CliContext, args: TagArgs) -> anyhow::Result<()> {
    let target = ImageReference::parse(&args.target)?;
    if target.digest.is_some() {
        return Err(CliError::invalid_argument(format!(
            "refusing to create a tag with a digest reference: {}",
            args.target
        ))
        .into());
    }
    cli.client()
        .await?
        .image_tag(&args.source, &target.repository_with_registry(), target.tag())
        .await?;
    Ok(())
}
