//! Daemon methods used by commands, grouped per resource
//!
//! Each command depends on the narrowest trait it needs, so tests can hand it
//! a fake that implements only that group. [`super::ScopedClient`] implements
//! them all.

use crate::hijack::HijackedConn;
use crate::opts::Filters;
use crate::registry::AuthConfig;
use crate::streams::WindowSize;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::io::AsyncRead;

/// Streaming response body
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Result of `GET /_ping`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingInfo {
    pub api_version: String,
    pub os_type: String,
    pub experimental: bool,
    /// `inactive`, `pending`, `error`, `locked`, `active/worker` or `active/manager`
    pub swarm: Option<String>,
}

impl PingInfo {
    pub fn swarm_active(&self) -> bool {
        self.swarm.as_deref().is_some_and(|s| s.starts_with("active"))
    }

    pub fn swarm_manager(&self) -> bool {
        self.swarm.as_deref() == Some("active/manager")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SwarmInfo {
    pub local_node_state: String,
    pub control_available: bool,
}

/// Subset of `GET /info`; unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemInfo {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub server_version: String,
    pub operating_system: String,
    #[serde(rename = "OSType")]
    pub os_type: String,
    pub architecture: String,
    #[serde(rename = "NCPU")]
    pub ncpu: i64,
    pub mem_total: i64,
    pub containers: i64,
    pub containers_running: i64,
    pub containers_paused: i64,
    pub containers_stopped: i64,
    pub images: i64,
    pub driver: String,
    pub docker_root_dir: String,
    pub experimental_build: bool,
    pub swarm: SwarmInfo,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `GET /version`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServerVersion {
    pub version: String,
    pub api_version: String,
    #[serde(rename = "MinAPIVersion")]
    pub min_api_version: String,
    pub git_commit: String,
    pub go_version: String,
    pub os: String,
    pub arch: String,
    pub kernel_version: String,
    pub build_time: String,
}

/// `POST /auth` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AuthResponse {
    pub status: String,
    pub identity_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortSummary {
    #[serde(rename = "IP")]
    pub ip: String,
    pub private_port: u16,
    pub public_port: u16,
    #[serde(rename = "Type")]
    pub protocol: String,
}

/// One entry of `GET /containers/json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub command: String,
    pub created: i64,
    pub state: String,
    pub status: String,
    pub ports: Vec<PortSummary>,
    pub labels: BTreeMap<String, String>,
    pub size_rw: Option<i64>,
    pub size_root_fs: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerListOptions {
    pub all: bool,
    pub limit: Option<usize>,
    pub size: bool,
    pub filters: Filters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub auto_remove: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub binds: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub network_mode: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extra_hosts: Vec<String>,
    pub privileged: bool,
    pub readonly_rootfs: bool,
}

/// Body of `POST /containers/create`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hostname: Option<String>,
    pub tty: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub exposed_ports: BTreeMap<String, Value>,
    pub host_config: HostConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateResponse {
    pub id: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WaitError {
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WaitResponse {
    pub status_code: i64,
    pub error: Option<WaitError>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub force: bool,
    pub volumes: bool,
    pub link: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    pub stream: bool,
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub logs: bool,
    pub detach_keys: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogsOptions {
    pub follow: bool,
    pub timestamps: bool,
    pub details: bool,
    pub tail: String,
    pub since: Option<String>,
    pub until: Option<String>,
    pub stdout: bool,
    pub stderr: bool,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: false,
            timestamps: false,
            details: false,
            tail: "all".to_string(),
            since: None,
            until: None,
            stdout: true,
            stderr: true,
        }
    }
}

/// Body of `POST /containers/{id}/exec`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecConfig {
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub working_dir: Option<String>,
    pub privileged: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detach_keys: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExecInspect {
    #[serde(rename = "ID")]
    pub id: String,
    pub running: bool,
    pub exit_code: Option<i64>,
    pub pid: i64,
}

/// One entry of `GET /images/json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageSummary {
    pub id: String,
    pub parent_id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    pub created: i64,
    pub size: i64,
    pub shared_size: i64,
    pub containers: i64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageListOptions {
    pub all: bool,
    pub filters: Filters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageDeleteItem {
    pub untagged: Option<String>,
    pub deleted: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub all_tags: bool,
    pub platform: Option<String>,
    /// Encoded `X-Registry-Auth` value
    pub registry_auth: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Volume {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub created_at: String,
    pub labels: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
    pub scope: String,
    /// Present only for swarm cluster volumes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_volume: Option<ClusterVolume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterVolume {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: ObjectVersion,
    pub spec: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObjectVersion {
    pub index: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeList {
    pub volumes: Vec<Volume>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeCreateOptions {
    pub name: String,
    pub driver: String,
    pub driver_opts: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub created: String,
    pub internal: bool,
    pub attachable: bool,
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateOptions {
    pub name: String,
    pub driver: String,
    pub internal: bool,
    pub attachable: bool,
    #[serde(rename = "EnableIPv6")]
    pub enable_ipv6: bool,
    pub options: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkCreateResponse {
    pub id: String,
    pub warning: String,
}

/// Outcome of one prune call, normalised across resource types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub space_reclaimed: u64,
}

#[async_trait]
pub trait SystemApi: Send + Sync {
    /// Cached ping; the first call performs version negotiation.
    async fn ping(&self) -> Result<PingInfo>;
    async fn info(&self) -> Result<SystemInfo>;
    async fn server_version(&self) -> Result<ServerVersion>;
    async fn registry_login(&self, auth: &AuthConfig) -> Result<AuthResponse>;
    /// The address this client talks to
    fn daemon_host(&self) -> String;
    /// API version in use; empty before the first ping unless forced
    fn client_version(&self) -> String;
}

#[async_trait]
pub trait ContainerApi: Send + Sync {
    async fn container_list(&self, opts: &ContainerListOptions) -> Result<Vec<ContainerSummary>>;
    /// Decoded object and the raw JSON it came from
    async fn container_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)>;
    async fn container_create(
        &self,
        config: &ContainerConfig,
        name: Option<&str>,
        platform: Option<&str>,
    ) -> Result<CreateResponse>;
    async fn container_start(&self, id: &str) -> Result<()>;
    async fn container_stop(&self, id: &str, timeout: Option<i64>) -> Result<()>;
    async fn container_remove(&self, id: &str, opts: &RemoveOptions) -> Result<()>;
    async fn container_wait(&self, id: &str, condition: &str) -> Result<WaitResponse>;
    async fn container_attach(&self, id: &str, opts: &AttachOptions) -> Result<HijackedConn>;
    async fn container_resize(&self, id: &str, size: WindowSize) -> Result<()>;
    async fn container_logs(&self, id: &str, opts: &LogsOptions) -> Result<BodyReader>;
    async fn containers_prune(&self, filters: &Filters) -> Result<PruneReport>;

    async fn exec_create(&self, container: &str, config: &ExecConfig) -> Result<IdResponse>;
    async fn exec_attach(&self, exec_id: &str, tty: bool) -> Result<HijackedConn>;
    async fn exec_start_detached(&self, exec_id: &str, tty: bool) -> Result<()>;
    async fn exec_resize(&self, exec_id: &str, size: WindowSize) -> Result<()>;
    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect>;
}

#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn image_list(&self, opts: &ImageListOptions) -> Result<Vec<ImageSummary>>;
    async fn image_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)>;
    /// Progress stream of JSON events
    async fn image_pull(&self, reference: &str, opts: &PullOptions) -> Result<BodyReader>;
    async fn image_push(&self, reference: &str, registry_auth: &str) -> Result<BodyReader>;
    async fn image_tag(&self, source: &str, repository: &str, tag: &str) -> Result<()>;
    async fn image_remove(&self, id: &str, force: bool, no_prune: bool)
        -> Result<Vec<ImageDeleteItem>>;
    async fn images_prune(&self, filters: &Filters) -> Result<PruneReport>;
}

#[async_trait]
pub trait VolumeApi: Send + Sync {
    async fn volume_list(&self, filters: &Filters) -> Result<VolumeList>;
    async fn volume_create(&self, opts: &VolumeCreateOptions) -> Result<Volume>;
    async fn volume_inspect_raw(&self, name: &str) -> Result<(Value, Vec<u8>)>;
    async fn volume_remove(&self, name: &str, force: bool) -> Result<()>;
    /// Replace the spec of a cluster volume at object version `version`
    async fn volume_update(&self, name: &str, version: u64, spec: &Value) -> Result<()>;
    async fn volumes_prune(&self, filters: &Filters) -> Result<PruneReport>;
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn network_list(&self, filters: &Filters) -> Result<Vec<Network>>;
    async fn network_create(&self, opts: &NetworkCreateOptions) -> Result<NetworkCreateResponse>;
    async fn network_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)>;
    async fn network_remove(&self, id: &str) -> Result<()>;
    async fn networks_prune(&self, filters: &Filters) -> Result<PruneReport>;
}

#[async_trait]
pub trait BuildApi: Send + Sync {
    async fn build_cache_prune(&self, filters: &Filters, all: bool) -> Result<PruneReport>;
}

/// Every daemon method the CLI uses
pub trait DaemonApi: SystemApi + ContainerApi + ImageApi + VolumeApi + NetworkApi + BuildApi {}

impl<T> DaemonApi for T where T: SystemApi + ContainerApi + ImageApi + VolumeApi + NetworkApi + BuildApi
{}

/// Decode a prune response body into a [`PruneReport`].
///
/// Each endpoint names its list differently; images report
/// `{Untagged, Deleted}` pairs instead of ids.
pub fn parse_prune_report(body: &[u8]) -> Result<PruneReport> {
    #[derive(Deserialize, Default)]
    #[serde(rename_all = "PascalCase", default)]
    struct Raw {
        containers_deleted: Option<Vec<String>>,
        volumes_deleted: Option<Vec<String>>,
        networks_deleted: Option<Vec<String>>,
        caches_deleted: Option<Vec<String>>,
        images_deleted: Option<Vec<ImageDeleteItem>>,
        space_reclaimed: u64,
    }

    let raw: Raw = serde_json::from_slice(body)?;
    let mut deleted = Vec::new();
    for list in [
        raw.containers_deleted,
        raw.volumes_deleted,
        raw.networks_deleted,
        raw.caches_deleted,
    ]
    .into_iter()
    .flatten()
    {
        deleted.extend(list);
    }
    for item in raw.images_deleted.unwrap_or_default() {
        if let Some(untagged) = item.untagged {
            deleted.push(format!("untagged: {}", untagged));
        }
        if let Some(id) = item.deleted {
            deleted.push(format!("deleted: {}", id));
        }
    }
    Ok(PruneReport {
        deleted,
        space_reclaimed: raw.space_reclaimed,
    })
}
