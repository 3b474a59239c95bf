//! Registry of per-resource prune functions
//!
//! Every pruner runs twice: a dry run that describes what would be removed
//! (feeding one combined confirmation prompt) and, once confirmed, the real
//! prune. Types run in dependency order: containers first so the networks,
//! volumes and images they held become unused.

use crate::client::api::{DaemonApi, PruneReport};
use crate::client::version;
use crate::opts::filters::Filters;
use crate::opts::units::human_size;
use crate::prompt;
use crate::streams::Streams;
use crate::{CliError, ErrorKind, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const CONTAINER: &str = "container";
pub const NETWORK: &str = "network";
pub const VOLUME: &str = "volume";
pub const IMAGE: &str = "image";
pub const BUILD_CACHE: &str = "build-cache";

const ORDER: [&str; 5] = [CONTAINER, NETWORK, VOLUME, IMAGE, BUILD_CACHE];

#[derive(Debug, Clone, Default)]
pub struct PruneOptions {
    /// `false` selects the dry run
    pub confirmed: bool,
    pub all: bool,
    pub filters: Filters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub space_reclaimed: u64,
    /// Dry run: what would be removed. Real run: what was removed.
    pub details: String,
}

/// One content type's prune function, called with the daemon client `C`
#[async_trait]
pub trait Pruner<C: ?Sized + Sync>: Send + Sync {
    async fn prune(&self, client: &C, opts: &PruneOptions) -> Result<PruneOutcome>;
}

pub struct PrunerRegistry<C: ?Sized> {
    pruners: BTreeMap<String, Arc<dyn Pruner<C>>>,
}

impl<C: ?Sized + Sync> Default for PrunerRegistry<C> {
    fn default() -> Self {
        Self {
            pruners: BTreeMap::new(),
        }
    }
}

impl<C: ?Sized + Sync> PrunerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, content_type: impl Into<String>, pruner: Arc<dyn Pruner<C>>) {
        self.pruners.insert(content_type.into(), pruner);
    }

    pub fn get(&self, content_type: &str) -> Option<&Arc<dyn Pruner<C>>> {
        self.pruners.get(content_type)
    }

    /// Predefined types in dependency order, then the rest lexically
    pub fn ordered(&self) -> Vec<(&str, &Arc<dyn Pruner<C>>)> {
        let mut ordered: Vec<(&str, &Arc<dyn Pruner<C>>)> = ORDER
            .iter()
            .filter_map(|t| self.pruners.get_key_value(*t))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        ordered.extend(
            self.pruners
                .iter()
                .filter(|(k, _)| !ORDER.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v)),
        );
        ordered
    }
}

/// Options of `docker system prune`
#[derive(Debug, Clone, Default)]
pub struct SystemPruneOptions {
    pub force: bool,
    pub all: bool,
    pub volumes: bool,
    pub filters: Filters,
}

fn confirmation_message(descriptions: &[String], filters: &Filters) -> String {
    let mut message = String::from("WARNING! This will remove:");
    for d in descriptions {
        let _ = write!(message, "\n  - {}", d);
    }
    if !filters.is_empty() {
        message.push_str("\n\n  Items to be pruned will be filtered with:");
        for (k, v) in filters.iter() {
            let _ = write!(message, "\n  - {}={}", k, v);
        }
    }
    message.push_str("\n\nAre you sure you want to continue?");
    message
}

/// Run every registered pruner with a single confirmation.
///
/// Returns the total space reclaimed. A cancelled or declined prompt
/// returns `Ok(0)` without running any pruner.
pub async fn system_prune<C: ?Sized + Sync>(
    registry: &PrunerRegistry<C>,
    client: &C,
    streams: &Streams,
    cancel: &CancellationToken,
    opts: &SystemPruneOptions,
) -> Result<u64> {
    let mut dry = PruneOptions {
        confirmed: false,
        all: opts.all,
        filters: opts.filters.clone(),
    };

    let mut active = Vec::new();
    let mut descriptions = Vec::new();
    for (content_type, pruner) in registry.ordered() {
        if content_type == VOLUME && !opts.volumes {
            continue;
        }
        match pruner.prune(client, &dry).await {
            Ok(outcome) => {
                descriptions.push(outcome.details);
                active.push(pruner);
            }
            Err(e) if e.kind() == ErrorKind::NotImplemented => {
                tracing::debug!("skipping {} prune: {}", content_type, e);
            }
            Err(e) => return Err(e),
        }
    }

    if !opts.force {
        let message = confirmation_message(&descriptions, &opts.filters);
        let mut out = streams.out.clone();
        match prompt::confirm(cancel, &streams.input, &mut out, &message).await {
            Ok(true) => {}
            Ok(false) => return Ok(0),
            Err(e) if e.kind() == ErrorKind::Cancelled => return Ok(0),
            Err(e) => return Err(e),
        }
    }

    dry.confirmed = true;
    let mut out = streams.out.clone();
    let mut total = 0;
    for pruner in active {
        let outcome = pruner.prune(client, &dry).await?;
        total += outcome.space_reclaimed;
        if !outcome.details.is_empty() {
            writeln!(out, "{}", outcome.details)?;
        }
    }
    writeln!(out, "Total reclaimed space: {}", human_size(total))?;
    out.flush()?;
    Ok(total)
}

/// `docker <resource> prune`: one pruner, its own confirmation.
pub async fn prune_one<C: ?Sized + Sync>(
    pruner: &dyn Pruner<C>,
    client: &C,
    streams: &Streams,
    cancel: &CancellationToken,
    force: bool,
    mut opts: PruneOptions,
) -> Result<u64> {
    opts.confirmed = false;
    let description = pruner.prune(client, &opts).await?;
    if !force {
        let message = format!(
            "WARNING! This will remove {}.\nAre you sure you want to continue?",
            description.details
        );
        let mut out = streams.out.clone();
        match prompt::confirm(cancel, &streams.input, &mut out, &message).await {
            Ok(true) => {}
            Ok(false) => return Ok(0),
            Err(e) if e.kind() == ErrorKind::Cancelled => return Ok(0),
            Err(e) => return Err(e),
        }
    }

    opts.confirmed = true;
    let outcome = pruner.prune(client, &opts).await?;
    let mut out = streams.out.clone();
    if !outcome.details.is_empty() {
        writeln!(out, "{}", outcome.details)?;
    }
    writeln!(out, "Total reclaimed space: {}", human_size(outcome.space_reclaimed))?;
    out.flush()?;
    Ok(outcome.space_reclaimed)
}

fn report_details(title: &str, report: &PruneReport) -> String {
    if report.deleted.is_empty() {
        return String::new();
    }
    let mut details = format!("{}:", title);
    for item in &report.deleted {
        details.push('\n');
        details.push_str(item);
    }
    details.push('\n');
    details
}

async fn daemon_version(client: &dyn DaemonApi) -> Result<String> {
    Ok(client.ping().await?.api_version)
}

pub struct ContainerPruner;

#[async_trait]
impl Pruner<dyn DaemonApi> for ContainerPruner {
    async fn prune(&self, client: &dyn DaemonApi, opts: &PruneOptions) -> Result<PruneOutcome> {
        if !opts.confirmed {
            return Ok(PruneOutcome {
                space_reclaimed: 0,
                details: "all stopped containers".to_string(),
            });
        }
        let report = client.containers_prune(&opts.filters).await?;
        Ok(PruneOutcome {
            space_reclaimed: report.space_reclaimed,
            details: report_details("Deleted Containers", &report),
        })
    }
}

pub struct NetworkPruner;

#[async_trait]
impl Pruner<dyn DaemonApi> for NetworkPruner {
    async fn prune(&self, client: &dyn DaemonApi, opts: &PruneOptions) -> Result<PruneOutcome> {
        if !opts.confirmed {
            return Ok(PruneOutcome {
                space_reclaimed: 0,
                details: "all networks not used by at least one container".to_string(),
            });
        }
        let report = client.networks_prune(&opts.filters).await?;
        Ok(PruneOutcome {
            space_reclaimed: 0,
            details: report_details("Deleted Networks", &report),
        })
    }
}

pub struct VolumePruner;

impl VolumePruner {
    async fn filters(client: &dyn DaemonApi, opts: &PruneOptions) -> Result<Filters> {
        let mut filters = opts.filters.clone();
        if opts.all {
            if filters.contains("all") {
                return Err(CliError::invalid_argument(
                    "conflicting options: cannot specify both --all and --filter all=1",
                ));
            }
            // Older daemons prune every unused volume without being asked.
            if version::greater_or_equal(&daemon_version(client).await?, "1.42") {
                filters.add("all", "true");
            }
        }
        Ok(filters)
    }
}

#[async_trait]
impl Pruner<dyn DaemonApi> for VolumePruner {
    async fn prune(&self, client: &dyn DaemonApi, opts: &PruneOptions) -> Result<PruneOutcome> {
        let filters = Self::filters(client, opts).await?;
        if !opts.confirmed {
            let details = if opts.all {
                "all volumes not used by at least one container"
            } else {
                "all anonymous volumes not used by at least one container"
            };
            return Ok(PruneOutcome {
                space_reclaimed: 0,
                details: details.to_string(),
            });
        }
        let report = client.volumes_prune(&filters).await?;
        Ok(PruneOutcome {
            space_reclaimed: report.space_reclaimed,
            details: report_details("Deleted Volumes", &report),
        })
    }
}

pub struct ImagePruner;

#[async_trait]
impl Pruner<dyn DaemonApi> for ImagePruner {
    async fn prune(&self, client: &dyn DaemonApi, opts: &PruneOptions) -> Result<PruneOutcome> {
        if !opts.confirmed {
            let details = if opts.all {
                "all images without at least one container associated to them"
            } else {
                "all dangling images"
            };
            return Ok(PruneOutcome {
                space_reclaimed: 0,
                details: details.to_string(),
            });
        }
        let mut filters = opts.filters.clone();
        if !filters.contains("dangling") {
            filters.add("dangling", if opts.all { "false" } else { "true" });
        }
        let report = client.images_prune(&filters).await?;
        Ok(PruneOutcome {
            space_reclaimed: report.space_reclaimed,
            details: report_details("Deleted Images", &report),
        })
    }
}

pub struct BuildCachePruner;

#[async_trait]
impl Pruner<dyn DaemonApi> for BuildCachePruner {
    async fn prune(&self, client: &dyn DaemonApi, opts: &PruneOptions) -> Result<PruneOutcome> {
        if !opts.confirmed {
            let api = daemon_version(client).await?;
            if version::less_than(&api, "1.31") {
                return Err(CliError::NotImplemented(format!(
                    "build cache prune requires API version 1.31, but the Docker daemon API version is {}",
                    api
                )));
            }
            let details = if opts.all {
                "all build cache"
            } else {
                "unused build cache"
            };
            return Ok(PruneOutcome {
                space_reclaimed: 0,
                details: details.to_string(),
            });
        }
        let report = client.build_cache_prune(&opts.filters, opts.all).await?;
        Ok(PruneOutcome {
            space_reclaimed: report.space_reclaimed,
            details: report_details("Deleted build cache objects", &report),
        })
    }
}

/// Registry holding the five built-in content types
pub fn builtin_registry() -> PrunerRegistry<dyn DaemonApi> {
    let mut registry: PrunerRegistry<dyn DaemonApi> = PrunerRegistry::new();
    registry.register(CONTAINER, Arc::new(ContainerPruner));
    registry.register(NETWORK, Arc::new(NetworkPruner));
    registry.register(VOLUME, Arc::new(VolumePruner));
    registry.register(IMAGE, Arc::new(ImagePruner));
    registry.register(BUILD_CACHE, Arc::new(BuildCachePruner));
    registry
}
