//! Scoped daemon client
//!
//! One [`ScopedClient`] serves a whole invocation. Every request dials a
//! fresh connection through the [`dialer::Dialer`] and speaks HTTP/1.1 over
//! it with hyper, so unix sockets, TCP, TLS, ssh tunnels and inherited fds
//! share one code path. The API version is negotiated on first use and is
//! prefixed to every later request path.

pub mod api;
pub mod dialer;
pub mod headers;
pub mod tls;
pub mod version;

use crate::context::{TlsMaterial, TlsPolicy};
use crate::hijack::HijackedConn;
use crate::opts::Filters;
use crate::registry::AuthConfig;
use crate::streams::WindowSize;
use crate::{CliError, Result};
use api::*;
use async_trait::async_trait;
use bytes::Bytes;
use dialer::{Connection, DaemonAddr, Dialer};
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;

/// Header carrying encoded registry credentials
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Everything needed to build a [`ScopedClient`]
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub host: String,
    pub tls: TlsPolicy,
    pub material: TlsMaterial,
    pub tls_passphrase: Option<String>,
    /// `HttpHeaders` from the config file
    pub config_headers: BTreeMap<String, String>,
    /// Raw value of the custom-headers environment variable
    pub env_headers: Option<String>,
    pub user_agent: String,
    /// Skips negotiation when set
    pub api_version: Option<String>,
}

/// A request before the version prefix and connection are applied
#[derive(Debug, Default)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Vec<u8>>,
    headers: Vec<(&'static str, String)>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    /// Boolean flags are only sent when set.
    fn flag(self, key: &'static str, set: bool) -> Self {
        if set {
            self.query(key, "1")
        } else {
            self
        }
    }

    fn filters(self, filters: &Filters) -> Result<Self> {
        if filters.is_empty() {
            return Ok(self);
        }
        Ok(self.query("filters", filters.to_json()?))
    }

    fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    fn target(&self, path: &str) -> String {
        if self.query.is_empty() {
            return path.to_string();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        format!("{}?{}", path, query)
    }
}

/// HTTP client bound to one daemon for the duration of an invocation
pub struct ScopedClient {
    host: String,
    dialer: Dialer,
    headers: BTreeMap<String, String>,
    forced_version: Option<String>,
    ping: OnceCell<PingInfo>,
}

impl std::fmt::Debug for ScopedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedClient")
            .field("host", &self.host)
            .field("dialer", &self.dialer)
            .field("forced_version", &self.forced_version)
            .finish()
    }
}

impl ScopedClient {
    pub fn new(opts: ClientOptions) -> Result<Self> {
        let addr = DaemonAddr::parse(&opts.host, opts.tls != TlsPolicy::Off)?;
        let tls = tls::client_config(opts.tls, &opts.material, opts.tls_passphrase.as_deref())?;
        let headers = headers::effective_headers(
            &opts.config_headers,
            opts.env_headers.as_deref(),
            &opts.user_agent,
        )?;
        let forced_version = opts
            .api_version
            .map(|v| v.trim().trim_start_matches('v').to_string())
            .filter(|v| !v.is_empty());

        tracing::debug!("daemon client for {} (tls: {:?})", opts.host, opts.tls);
        Ok(Self {
            host: opts.host,
            dialer: Dialer::new(addr, tls),
            headers,
            forced_version,
            ping: OnceCell::new(),
        })
    }

    /// A raw connection to the daemon, used by `system dial-stdio`.
    pub async fn dial_raw(&self) -> Result<Connection> {
        self.dialer.dial().await
    }

    /// Headers sent with every request
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    async fn negotiated_version(&self) -> String {
        match &self.forced_version {
            Some(v) => v.clone(),
            None => self.cached_ping().await.api_version,
        }
    }

    async fn cached_ping(&self) -> PingInfo {
        self.ping
            .get_or_init(|| async {
                match self.ping_daemon().await {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::debug!("ping failed, assuming API {}: {}", version::DEFAULT_VERSION, e);
                        PingInfo {
                            api_version: self
                                .forced_version
                                .clone()
                                .unwrap_or_else(|| version::DEFAULT_VERSION.to_string()),
                            experimental: true,
                            ..Default::default()
                        }
                    }
                }
            })
            .await
            .clone()
    }

    async fn ping_daemon(&self) -> Result<PingInfo> {
        // Boxed to break the execute -> negotiated_version -> ping cycle.
        let response = Box::pin(self.execute(ApiRequest::get("/_ping"), false, false)).await?;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let server_version = header("API-Version");
        let os_type = header("OSType").unwrap_or_default();
        let experimental = header("Docker-Experimental").as_deref() == Some("true");
        let swarm = header("Swarm");
        if !response.status().is_success() && server_version.is_none() {
            return Err(self.error_for(response).await);
        }

        let api_version = match &self.forced_version {
            Some(forced) => forced.clone(),
            None => version::negotiate(server_version.as_deref().unwrap_or_default()),
        };
        tracing::debug!("negotiated API version {}", api_version);
        Ok(PingInfo {
            api_version,
            os_type,
            experimental,
            swarm,
        })
    }

    async fn execute(
        &self,
        req: ApiRequest,
        versioned: bool,
        upgrade: bool,
    ) -> Result<Response<Incoming>> {
        let path = if versioned {
            format!("/v{}{}", self.negotiated_version().await, req.path)
        } else {
            req.path.clone()
        };
        let target = req.target(&path);
        tracing::debug!("{} {}", req.method, target);

        let conn = self.dialer.dial().await?;
        let (mut sender, connection) = hyper::client::conn::http1::Builder::new()
            .title_case_headers(true)
            .handshake(TokioIo::new(conn))
            .await
            .map_err(|e| CliError::system(format!("HTTP handshake with daemon failed: {}", e)))?;
        if upgrade {
            tokio::spawn(async move {
                if let Err(e) = connection.with_upgrades().await {
                    tracing::debug!("hijacked connection closed: {}", e);
                }
            });
        } else {
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::debug!("daemon connection closed: {}", e);
                }
            });
        }

        let mut builder = Request::builder()
            .method(req.method)
            .uri(target)
            .header(HOST, self.dialer.addr().authority());
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        for (key, value) in req.headers {
            builder = builder.header(key, value);
        }
        let body = match req.body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(body))
            }
            None => Full::new(Bytes::new()),
        };
        let request = builder
            .body(body)
            .map_err(|e| CliError::system(format!("invalid request: {}", e)))?;

        sender.send_request(request).await.map_err(|e| {
            CliError::system(format!(
                "error during connect to {}: {}",
                self.host, e
            ))
        })
    }

    /// Send a versioned request and fail on non-2xx statuses.
    async fn call(&self, req: ApiRequest) -> Result<Response<Incoming>> {
        let response = self.execute(req, true, false).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.error_for(response).await)
        }
    }

    async fn call_bytes(&self, req: ApiRequest) -> Result<Bytes> {
        let response = self.call(req).await?;
        read_body(response).await
    }

    async fn call_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T> {
        let body = self.call_bytes(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn call_empty(&self, req: ApiRequest) -> Result<()> {
        self.call_bytes(req).await.map(|_| ())
    }

    async fn call_stream(&self, req: ApiRequest) -> Result<BodyReader> {
        self.call(req).await.map(body_reader)
    }

    async fn inspect_raw(&self, path: String) -> Result<(Value, Vec<u8>)> {
        let body = self.call_bytes(ApiRequest::get(path)).await?;
        let value = serde_json::from_slice(&body)?;
        Ok((value, body.to_vec()))
    }

    async fn prune(&self, req: ApiRequest) -> Result<PruneReport> {
        let body = self.call_bytes(req).await?;
        parse_prune_report(&body)
    }

    /// Take over the connection after an upgrade request.
    async fn hijack(&self, req: ApiRequest) -> Result<HijackedConn> {
        let req = req.header("Connection", "Upgrade").header("Upgrade", "tcp");
        let response = self.execute(req, true, true).await?;
        let status = response.status();
        if status == StatusCode::SWITCHING_PROTOCOLS {
            let upgraded = hyper::upgrade::on(response)
                .await
                .map_err(|e| CliError::system(format!("failed to hijack connection: {}", e)))?;
            let io = TokioIo::new(upgraded);
            if self.dialer.uses_tls() {
                Ok(HijackedConn::FullDuplex(Box::new(io)))
            } else {
                Ok(HijackedConn::HalfClosable(Box::new(io)))
            }
        } else if status.is_success() {
            // Daemons that skip the upgrade stream output in the body.
            Ok(HijackedConn::SimplexPair {
                reader: body_reader(response),
                writer: None,
            })
        } else {
            Err(self.error_for(response).await)
        }
    }

    async fn error_for(&self, response: Response<Incoming>) -> CliError {
        let status = response.status();
        let body = read_body(response).await.unwrap_or_default();
        status_error(status, &body)
    }

    async fn require_version(&self, min: &str, what: &str) -> Result<()> {
        let current = self.negotiated_version().await;
        if version::less_than(&current, min) {
            return Err(CliError::NotImplemented(format!(
                "{} requires API version {}, but the Docker daemon API version is {}",
                what, min, current
            )));
        }
        Ok(())
    }
}

async fn read_body(response: Response<Incoming>) -> Result<Bytes> {
    response
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| CliError::system(format!("error reading response body: {}", e)))
}

fn body_reader(response: Response<Incoming>) -> BodyReader {
    let stream = BodyStream::new(response.into_body())
        .try_filter_map(|frame| async move { Ok::<_, hyper::Error>(frame.into_data().ok()) })
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    Box::new(StreamReader::new(Box::pin(stream)))
}

/// Classify a non-2xx daemon response.
pub fn status_error(status: StatusCode, body: &[u8]) -> CliError {
    #[derive(serde::Deserialize)]
    struct Message {
        message: String,
    }

    let detail = match serde_json::from_slice::<Message>(body) {
        Ok(m) => m.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    let message = if detail.is_empty() {
        format!("Error response from daemon: {}", status)
    } else {
        format!("Error response from daemon: {}", detail)
    };

    match status {
        StatusCode::BAD_REQUEST => CliError::InvalidArgument(message),
        StatusCode::UNAUTHORIZED => CliError::Unauthorized(message),
        StatusCode::FORBIDDEN => CliError::Forbidden(message),
        StatusCode::NOT_FOUND => CliError::NotFound(message),
        StatusCode::CONFLICT => CliError::Conflict(message),
        StatusCode::NOT_IMPLEMENTED => CliError::NotImplemented(message),
        _ => CliError::System(message),
    }
}

/// `name:tag` → (`name`, `tag`); a registry port is not a tag.
fn split_tag(reference: &str) -> (&str, &str) {
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) if !reference.contains('@') => {
            let at = name_start + i;
            (&reference[..at], &reference[at + 1..])
        }
        _ => (reference, ""),
    }
}

#[async_trait]
impl SystemApi for ScopedClient {
    async fn ping(&self) -> Result<PingInfo> {
        Ok(self.cached_ping().await)
    }

    async fn info(&self) -> Result<SystemInfo> {
        self.call_json(ApiRequest::get("/info")).await
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        self.call_json(ApiRequest::get("/version")).await
    }

    async fn registry_login(&self, auth: &AuthConfig) -> Result<AuthResponse> {
        self.call_json(ApiRequest::post("/auth").json(auth)?).await
    }

    fn daemon_host(&self) -> String {
        self.host.clone()
    }

    fn client_version(&self) -> String {
        self.forced_version
            .clone()
            .or_else(|| self.ping.get().map(|p| p.api_version.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContainerApi for ScopedClient {
    async fn container_list(&self, opts: &ContainerListOptions) -> Result<Vec<ContainerSummary>> {
        let mut req = ApiRequest::get("/containers/json")
            .flag("all", opts.all)
            .flag("size", opts.size)
            .filters(&opts.filters)?;
        if let Some(limit) = opts.limit {
            req = req.query("limit", limit);
        }
        self.call_json(req).await
    }

    async fn container_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)> {
        self.inspect_raw(format!("/containers/{}/json", id)).await
    }

    async fn container_create(
        &self,
        config: &ContainerConfig,
        name: Option<&str>,
        platform: Option<&str>,
    ) -> Result<CreateResponse> {
        let mut req = ApiRequest::post("/containers/create").json(config)?;
        if let Some(name) = name {
            req = req.query("name", name);
        }
        if let Some(platform) = platform {
            self.require_version("1.41", "\"platform\"").await?;
            req = req.query("platform", platform);
        }
        self.call_json(req).await
    }

    async fn container_start(&self, id: &str) -> Result<()> {
        self.call_empty(ApiRequest::post(format!("/containers/{}/start", id)))
            .await
    }

    async fn container_stop(&self, id: &str, timeout: Option<i64>) -> Result<()> {
        let mut req = ApiRequest::post(format!("/containers/{}/stop", id));
        if let Some(t) = timeout {
            req = req.query("t", t);
        }
        self.call_empty(req).await
    }

    async fn container_remove(&self, id: &str, opts: &RemoveOptions) -> Result<()> {
        let req = ApiRequest::delete(format!("/containers/{}", id))
            .flag("force", opts.force)
            .flag("v", opts.volumes)
            .flag("link", opts.link);
        self.call_empty(req).await
    }

    async fn container_wait(&self, id: &str, condition: &str) -> Result<WaitResponse> {
        let mut req = ApiRequest::post(format!("/containers/{}/wait", id));
        if !condition.is_empty() {
            req = req.query("condition", condition);
        }
        self.call_json(req).await
    }

    async fn container_attach(&self, id: &str, opts: &AttachOptions) -> Result<HijackedConn> {
        let mut req = ApiRequest::post(format!("/containers/{}/attach", id))
            .flag("stream", opts.stream)
            .flag("stdin", opts.stdin)
            .flag("stdout", opts.stdout)
            .flag("stderr", opts.stderr)
            .flag("logs", opts.logs);
        if let Some(keys) = &opts.detach_keys {
            req = req.query("detachKeys", keys);
        }
        self.hijack(req).await
    }

    async fn container_resize(&self, id: &str, size: WindowSize) -> Result<()> {
        let req = ApiRequest::post(format!("/containers/{}/resize", id))
            .query("h", size.rows)
            .query("w", size.cols);
        self.call_empty(req).await
    }

    async fn container_logs(&self, id: &str, opts: &LogsOptions) -> Result<BodyReader> {
        let mut req = ApiRequest::get(format!("/containers/{}/logs", id))
            .flag("stdout", opts.stdout)
            .flag("stderr", opts.stderr)
            .flag("follow", opts.follow)
            .flag("timestamps", opts.timestamps)
            .flag("details", opts.details)
            .query("tail", &opts.tail);
        if let Some(since) = &opts.since {
            req = req.query("since", since);
        }
        if let Some(until) = &opts.until {
            self.require_version("1.35", "\"until\"").await?;
            req = req.query("until", until);
        }
        self.call_stream(req).await
    }

    async fn containers_prune(&self, filters: &Filters) -> Result<PruneReport> {
        self.require_version("1.25", "container prune").await?;
        self.prune(ApiRequest::post("/containers/prune").filters(filters)?)
            .await
    }

    async fn exec_create(&self, container: &str, config: &ExecConfig) -> Result<IdResponse> {
        self.call_json(ApiRequest::post(format!("/containers/{}/exec", container)).json(config)?)
            .await
    }

    async fn exec_attach(&self, exec_id: &str, tty: bool) -> Result<HijackedConn> {
        let body = serde_json::json!({ "Detach": false, "Tty": tty });
        self.hijack(ApiRequest::post(format!("/exec/{}/start", exec_id)).json(&body)?)
            .await
    }

    async fn exec_start_detached(&self, exec_id: &str, tty: bool) -> Result<()> {
        let body = serde_json::json!({ "Detach": true, "Tty": tty });
        self.call_empty(ApiRequest::post(format!("/exec/{}/start", exec_id)).json(&body)?)
            .await
    }

    async fn exec_resize(&self, exec_id: &str, size: WindowSize) -> Result<()> {
        let req = ApiRequest::post(format!("/exec/{}/resize", exec_id))
            .query("h", size.rows)
            .query("w", size.cols);
        self.call_empty(req).await
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInspect> {
        self.call_json(ApiRequest::get(format!("/exec/{}/json", exec_id)))
            .await
    }
}

#[async_trait]
impl ImageApi for ScopedClient {
    async fn image_list(&self, opts: &ImageListOptions) -> Result<Vec<ImageSummary>> {
        let req = ApiRequest::get("/images/json")
            .flag("all", opts.all)
            .filters(&opts.filters)?;
        self.call_json(req).await
    }

    async fn image_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)> {
        self.inspect_raw(format!("/images/{}/json", id)).await
    }

    async fn image_pull(&self, reference: &str, opts: &PullOptions) -> Result<BodyReader> {
        let (name, tag) = split_tag(reference);
        let mut req = ApiRequest::post("/images/create")
            .query("fromImage", name)
            .header(REGISTRY_AUTH_HEADER, opts.registry_auth.clone());
        if !opts.all_tags {
            req = req.query("tag", if tag.is_empty() { "latest" } else { tag });
        }
        if let Some(platform) = &opts.platform {
            req = req.query("platform", platform);
        }
        self.call_stream(req).await
    }

    async fn image_push(&self, reference: &str, registry_auth: &str) -> Result<BodyReader> {
        let (name, tag) = split_tag(reference);
        let mut req = ApiRequest::post(format!("/images/{}/push", name))
            .header(REGISTRY_AUTH_HEADER, registry_auth);
        if !tag.is_empty() {
            req = req.query("tag", tag);
        }
        self.call_stream(req).await
    }

    async fn image_tag(&self, source: &str, repository: &str, tag: &str) -> Result<()> {
        let req = ApiRequest::post(format!("/images/{}/tag", source))
            .query("repo", repository)
            .query("tag", tag);
        self.call_empty(req).await
    }

    async fn image_remove(
        &self,
        id: &str,
        force: bool,
        no_prune: bool,
    ) -> Result<Vec<ImageDeleteItem>> {
        let req = ApiRequest::delete(format!("/images/{}", id))
            .flag("force", force)
            .flag("noprune", no_prune);
        self.call_json(req).await
    }

    async fn images_prune(&self, filters: &Filters) -> Result<PruneReport> {
        self.require_version("1.25", "image prune").await?;
        self.prune(ApiRequest::post("/images/prune").filters(filters)?)
            .await
    }
}

#[async_trait]
impl VolumeApi for ScopedClient {
    async fn volume_list(&self, filters: &Filters) -> Result<VolumeList> {
        self.call_json(ApiRequest::get("/volumes").filters(filters)?)
            .await
    }

    async fn volume_create(&self, opts: &VolumeCreateOptions) -> Result<Volume> {
        self.call_json(ApiRequest::post("/volumes/create").json(opts)?)
            .await
    }

    async fn volume_inspect_raw(&self, name: &str) -> Result<(Value, Vec<u8>)> {
        self.inspect_raw(format!("/volumes/{}", name)).await
    }

    async fn volume_remove(&self, name: &str, force: bool) -> Result<()> {
        self.call_empty(ApiRequest::delete(format!("/volumes/{}", name)).flag("force", force))
            .await
    }

    async fn volume_update(&self, name: &str, version: u64, spec: &Value) -> Result<()> {
        self.require_version("1.42", "volume update").await?;
        let body = serde_json::json!({ "Spec": spec });
        self.call_empty(
            ApiRequest::new(Method::PUT, format!("/volumes/{}", name))
                .query("version", version)
                .json(&body)?,
        )
        .await
    }

    async fn volumes_prune(&self, filters: &Filters) -> Result<PruneReport> {
        self.require_version("1.25", "volume prune").await?;
        self.prune(ApiRequest::post("/volumes/prune").filters(filters)?)
            .await
    }
}

#[async_trait]
impl NetworkApi for ScopedClient {
    async fn network_list(&self, filters: &Filters) -> Result<Vec<Network>> {
        self.call_json(ApiRequest::get("/networks").filters(filters)?)
            .await
    }

    async fn network_create(&self, opts: &NetworkCreateOptions) -> Result<NetworkCreateResponse> {
        self.call_json(ApiRequest::post("/networks/create").json(opts)?)
            .await
    }

    async fn network_inspect_raw(&self, id: &str) -> Result<(Value, Vec<u8>)> {
        self.inspect_raw(format!("/networks/{}", id)).await
    }

    async fn network_remove(&self, id: &str) -> Result<()> {
        self.call_empty(ApiRequest::delete(format!("/networks/{}", id)))
            .await
    }

    async fn networks_prune(&self, filters: &Filters) -> Result<PruneReport> {
        self.require_version("1.25", "network prune").await?;
        self.prune(ApiRequest::post("/networks/prune").filters(filters)?)
            .await
    }
}

#[async_trait]
impl BuildApi for ScopedClient {
    async fn build_cache_prune(&self, filters: &Filters, all: bool) -> Result<PruneReport> {
        self.require_version("1.31", "build cache prune").await?;
        let req = ApiRequest::post("/build/prune")
            .flag("all", all)
            .filters(filters)?;
        self.prune(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    type Reply = (u16, Vec<(&'static str, &'static str)>, &'static str);

    /// Minimal HTTP/1.1 responder on a unix socket; records request heads.
    fn fake_daemon(sock: &Path, reply: fn(&str) -> Reply) -> Arc<Mutex<Vec<String>>> {
        let listener = UnixListener::bind(sock).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).to_string();
                    let line = head.lines().next().unwrap_or_default().to_string();
                    log.lock().unwrap().push(head);

                    let (status, headers, body) = reply(&line);
                    let mut resp = format!(
                        "HTTP/1.1 {} Reply\r\nContent-Length: {}\r\nConnection: close\r\n",
                        status,
                        body.len()
                    );
                    for (k, v) in headers {
                        resp.push_str(&format!("{}: {}\r\n", k, v));
                    }
                    resp.push_str("\r\n");
                    resp.push_str(body);
                    let _ = stream.write_all(resp.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        seen
    }

    fn client_for(sock: &Path) -> ScopedClient {
        ScopedClient::new(ClientOptions {
            host: format!("unix://{}", sock.display()),
            user_agent: "Docker-Client/test".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn daemon_140(line: &str) -> Reply {
        if line.starts_with("GET /_ping") {
            (
                200,
                vec![("API-Version", "1.40"), ("OSType", "linux"), ("Swarm", "inactive")],
                "OK",
            )
        } else if line.contains("/containers/missing/json") {
            (404, vec![], r#"{"message":"No such container: missing"}"#)
        } else if line.contains("/info") {
            (200, vec![], r#"{"ID":"d1","Name":"box","OSType":"linux","NCPU":4}"#)
        } else {
            (500, vec![], "boom")
        }
    }

    #[tokio::test]
    async fn test_version_negotiated_once_and_prefixed() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("d.sock");
        let seen = fake_daemon(&sock, daemon_140);
        let client = client_for(&sock);

        let info = client.info().await.unwrap();
        assert_eq!(info.id, "d1");
        assert_eq!(info.ncpu, 4);
        client.info().await.unwrap();

        let ping = client.ping().await.unwrap();
        assert_eq!(ping.api_version, "1.40");
        assert_eq!(ping.os_type, "linux");
        assert!(!ping.experimental);
        assert_eq!(client.client_version(), "1.40");

        let seen = seen.lock().unwrap();
        let pings = seen.iter().filter(|h| h.starts_with("GET /_ping")).count();
        assert_eq!(pings, 1);
        assert!(seen.iter().any(|h| h.starts_with("GET /v1.40/info HTTP/1.1")));
        assert!(seen.iter().all(|h| h.contains("User-Agent: Docker-Client/test")));
    }

    #[tokio::test]
    async fn test_status_mapped_to_kind() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("d.sock");
        fake_daemon(&sock, daemon_140);
        let client = client_for(&sock);

        let err = client.container_inspect_raw("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("No such container: missing"));

        let err = client.server_version().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::System);
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_ping_failure_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("d.sock");
        fake_daemon(&sock, |_| (500, vec![], "down"));
        let client = client_for(&sock);

        let ping = client.ping().await.unwrap();
        assert_eq!(ping.api_version, version::DEFAULT_VERSION);
        assert!(ping.experimental);
    }

    #[tokio::test]
    async fn test_forced_version_skips_ping() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("d.sock");
        let seen = fake_daemon(&sock, daemon_140);
        let client = ScopedClient::new(ClientOptions {
            host: format!("unix://{}", sock.display()),
            api_version: Some("1.30".into()),
            env_headers: Some("X-Meta=v".into()),
            ..Default::default()
        })
        .unwrap();

        client.info().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("GET /v1.30/info"));
        assert!(seen[0].contains("X-Meta: v"));
    }

    #[tokio::test]
    async fn test_old_daemon_reports_not_implemented() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("d.sock");
        fake_daemon(&sock, daemon_140);
        let client = ScopedClient::new(ClientOptions {
            host: format!("unix://{}", sock.display()),
            api_version: Some("1.30".into()),
            ..Default::default()
        })
        .unwrap();

        let err = client
            .build_cache_prune(&Filters::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotImplemented);
    }

    #[test]
    fn test_status_error_messages() {
        let e = status_error(StatusCode::CONFLICT, br#"{"message":"name in use"}"#);
        assert_eq!(e.kind(), crate::ErrorKind::Conflict);
        assert_eq!(e.to_string(), "Error response from daemon: name in use");

        let e = status_error(StatusCode::UNAUTHORIZED, b"");
        assert_eq!(e.kind(), crate::ErrorKind::Unauthorized);
        assert!(e.to_string().contains("401"));
    }

    #[test]
    fn test_split_tag() {
        assert_eq!(split_tag("alpine:3.19"), ("alpine", "3.19"));
        assert_eq!(split_tag("localhost:5000/app"), ("localhost:5000/app", ""));
        assert_eq!(split_tag("localhost:5000/app:v1"), ("localhost:5000/app", "v1"));
        assert_eq!(split_tag("app@sha256:abc"), ("app@sha256:abc", ""));
    }
}
