//! In-memory daemon for command tests

use crate::client::api::*;
use crate::hijack::HijackedConn;
use crate::opts::Filters;
use crate::registry::AuthConfig;
use crate::streams::WindowSize;
use crate::{CliError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Serves canned responses and records every mutating call.
#[derive(Default)]
pub struct FakeDaemon {
    pub ping: PingInfo,
    pub containers: Vec<ContainerSummary>,
    pub images: Vec<ImageSummary>,
    pub volumes: Vec<Volume>,
    pub networks: Vec<Network>,
    /// Inspectable objects by name or id
    pub objects: BTreeMap<String, Value>,
    /// Body of logs, attach and progress streams
    pub stream: Vec<u8>,
    pub exit_code: i64,
    /// The next create fails as if the image were absent.
    pub missing_image: AtomicBool,
    pub prune: PruneReport,
    pub calls: Mutex<Vec<String>>,
}

impl FakeDaemon {
    pub fn new(api_version: &str) -> Self {
        Self {
            ping: PingInfo {
                api_version: api_version.to_string(),
                os_type: "linux".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_object(mut self, name: &str, value: Value) -> Self {
        self.objects.insert(name.to_string(), value);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn object(&self, name: &str) -> Result<(Value, Vec<u8>)> {
        match self.objects.get(name) {
            Some(value) => Ok((value.clone(), serde_json::to_vec(value)?)),
            None => Err(CliError::not_found(format!(
                "Error response from daemon: No such object: {}",
                name
            ))),
        }
    }

    fn body(&self) -> BodyReader {
        Box::new(Cursor::new(self.stream.clone()))
    }
}

#[async_trait]
impl SystemApi for FakeDaemon {
    async fn ping(&self) -> Result<PingInfo> {
        Ok(self.ping.clone())
    }

    async fn info(&self) -> Result<SystemInfo> {
        Ok(SystemInfo {
            name: "fakehost".into(),
            server_version: "27.0.0".into(),
            containers: self.containers.len() as i64,
            images: self.images.len() as i64,
            os_type: self.ping.os_type.clone(),
            ..Default::default()
        })
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        Ok(ServerVersion {
            version: "27.0.0".into(),
            api_version: self.ping.api_version.clone(),
            min_api_version: "1.24".into(),
            os: self.ping.os_type.clone(),
            arch: "amd64".into(),
            ..Default::default()
        })
    }

    async fn registry_login(&self, auth: &AuthConfig) -> Result<AuthResponse> {
        self.record(format!("login {} {}", auth.server_address, auth.username));
        Ok(AuthResponse {
            status: "Login Succeeded".into(),
            identity_token: String::new(),
        })
    }

    fn daemon_host(&self) -> String {
        "unix:///fake.sock".into()
    }

    fn client_version(&self) -> String {
        self.ping.api_version.clone()
    }
}

#[async_trait]
impl ContainerApi for FakeDaemon {
    async fn container_list(&self, opts: &ContainerListOptions) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .containers
            .iter()
            .filter(|c| opts.all || c.state == "running")
            .take(opts.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn container_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)> {
        self.object(id)
    }

    async fn container_create(
        &self,
        config: &ContainerConfig,
        name: Option<&str>,
        _platform: Option<&str>,
    ) -> Result<CreateResponse> {
        self.record(format!("create {} {}", config.image, name.unwrap_or("")));
        if self.missing_image.swap(false, Ordering::SeqCst) {
            return Err(CliError::not_found(format!(
                "Error response from daemon: No such image: {}",
                config.image
            )));
        }
        Ok(CreateResponse {
            id: "4f66ad9a0b2e1c3d5e7f9a0b2c4d6e8f".into(),
            warnings: Vec::new(),
        })
    }

    async fn container_start(&self, id: &str) -> Result<()> {
        self.record(format!("start {}", id));
        Ok(())
    }

    async fn container_stop(&self, id: &str, timeout: Option<i64>) -> Result<()> {
        self.record(format!("stop {} {:?}", id, timeout));
        Ok(())
    }

    async fn container_remove(&self, id: &str, opts: &RemoveOptions) -> Result<()> {
        if !self.objects.contains_key(id) {
            return self.object(id).map(|_| ());
        }
        self.record(format!("rm {} force={}", id, opts.force));
        Ok(())
    }

    async fn container_wait(&self, id: &str, _condition: &str) -> Result<WaitResponse> {
        self.record(format!("wait {}", id));
        Ok(WaitResponse {
            status_code: self.exit_code,
            error: None,
        })
    }

    async fn container_attach(&self, id: &str, _opts: &AttachOptions) -> Result<HijackedConn> {
        self.record(format!("attach {}", id));
        Ok(HijackedConn::SimplexPair {
            reader: self.body(),
            writer: None,
        })
    }

    async fn container_resize(&self, _id: &str, _size: WindowSize) -> Result<()> {
        Ok(())
    }

    async fn container_logs(&self, id: &str, _opts: &LogsOptions) -> Result<BodyReader> {
        self.object(id)?;
        Ok(self.body())
    }

    async fn containers_prune(&self, _filters: &Filters) -> Result<PruneReport> {
        self.record("container prune");
        Ok(self.prune.clone())
    }

    async fn exec_create(&self, container: &str, config: &ExecConfig) -> Result<IdResponse> {
        self.record(format!("exec {} {}", container, config.cmd.join(" ")));
        Ok(IdResponse {
            id: "exec-1".into(),
        })
    }

    async fn exec_attach(&self, exec_id: &str, _tty: bool) -> Result<HijackedConn> {
        self.record(format!("exec attach {}", exec_id));
        Ok(HijackedConn::SimplexPair {
            reader: self.body(),
            writer: None,
        })
    }

    async fn exec_start_detached(&self, exec_id: &str, _tty: bool) -> Result<()> {
        self.record(format!("exec start {}", exec_id));
        Ok(())
    }

    async fn exec_resize(&self, _exec_id: &str, _size: WindowSize) -> Result<()> {
        Ok(())
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        Ok(ExecInspect {
            id: exec_id.to_string(),
            running: false,
            exit_code: Some(self.exit_code),
            pid: 0,
        })
    }
}

#[async_trait]
impl ImageApi for FakeDaemon {
    async fn image_list(&self, _opts: &ImageListOptions) -> Result<Vec<ImageSummary>> {
        Ok(self.images.clone())
    }

    async fn image_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)> {
        self.object(id)
    }

    async fn image_pull(&self, reference: &str, opts: &PullOptions) -> Result<BodyReader> {
        self.record(format!("pull {} auth={}", reference, !opts.registry_auth.is_empty()));
        Ok(self.body())
    }

    async fn image_push(&self, reference: &str, _registry_auth: &str) -> Result<BodyReader> {
        self.record(format!("push {}", reference));
        Ok(self.body())
    }

    async fn image_tag(&self, source: &str, repository: &str, tag: &str) -> Result<()> {
        self.record(format!("tag {} {}:{}", source, repository, tag));
        Ok(())
    }

    async fn image_remove(
        &self,
        id: &str,
        _force: bool,
        _no_prune: bool,
    ) -> Result<Vec<ImageDeleteItem>> {
        self.object(id)?;
        Ok(vec![
            ImageDeleteItem {
                untagged: Some(format!("{}:latest", id)),
                deleted: None,
            },
            ImageDeleteItem {
                untagged: None,
                deleted: Some("sha256:0123456789ab".into()),
            },
        ])
    }

    async fn images_prune(&self, _filters: &Filters) -> Result<PruneReport> {
        self.record("image prune");
        Ok(self.prune.clone())
    }
}

#[async_trait]
impl VolumeApi for FakeDaemon {
    async fn volume_list(&self, _filters: &Filters) -> Result<VolumeList> {
        Ok(VolumeList {
            volumes: self.volumes.clone(),
            warnings: Vec::new(),
        })
    }

    async fn volume_create(&self, opts: &VolumeCreateOptions) -> Result<Volume> {
        self.record(format!("volume create {}", opts.name));
        Ok(Volume {
            name: if opts.name.is_empty() {
                "a1b2c3".into()
            } else {
                opts.name.clone()
            },
            driver: opts.driver.clone(),
            labels: opts.labels.clone(),
            options: opts.driver_opts.clone(),
            ..Default::default()
        })
    }

    async fn volume_inspect_raw(&self, name: &str) -> Result<(Value, Vec<u8>)> {
        self.object(name)
    }

    async fn volume_remove(&self, name: &str, _force: bool) -> Result<()> {
        self.object(name)?;
        self.record(format!("volume rm {}", name));
        Ok(())
    }

    async fn volume_update(&self, name: &str, version: u64, spec: &Value) -> Result<()> {
        self.record(format!("volume update {} v{} {}", name, version, spec));
        Ok(())
    }

    async fn volumes_prune(&self, filters: &Filters) -> Result<PruneReport> {
        self.record(format!("volume prune {}", filters.to_json()?));
        Ok(self.prune.clone())
    }
}

#[async_trait]
impl NetworkApi for FakeDaemon {
    async fn network_list(&self, _filters: &Filters) -> Result<Vec<Network>> {
        Ok(self.networks.clone())
    }

    async fn network_create(&self, opts: &NetworkCreateOptions) -> Result<NetworkCreateResponse> {
        self.record(format!("network create {} {}", opts.name, opts.driver));
        Ok(NetworkCreateResponse {
            id: "9d8c7b6a5f4e3d2c1b0a".into(),
            warning: String::new(),
        })
    }

    async fn network_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)> {
        self.object(id)
    }

    async fn network_remove(&self, id: &str) -> Result<()> {
        self.object(id)?;
        self.record(format!("network rm {}", id));
        Ok(())
    }

    async fn networks_prune(&self, _filters: &Filters) -> Result<PruneReport> {
        self.record("network prune");
        Ok(self.prune.clone())
    }
}

#[async_trait]
impl BuildApi for FakeDaemon {
    async fn build_cache_prune(&self, _filters: &Filters, all: bool) -> Result<PruneReport> {
        self.record(format!("builder prune all={}", all));
        Ok(self.prune.clone())
    }
}
