//! Per-invocation state handed to every command handler

use super::GlobalOptions;
use crate::client::api::{DaemonApi, PingInfo};
use crate::client::headers::CUSTOM_HEADERS_ENV;
use crate::client::version::API_VERSION_ENV;
use crate::client::{tls, ClientOptions, ScopedClient};
use crate::config::credentials::CredentialResolver;
use crate::config::paths::CliPaths;
use crate::config::ConfigStore;
use crate::context::default::{process_env, EnvLookup, HOST_ENV};
use crate::context::{
    ContextStore, ContextStoreWithDefault, DefaultContextOptions, DockerEndpoint,
    FileContextStore, CONTEXT_ENV, DEFAULT_CONTEXT_NAME,
};
use crate::plugin::GlobalFlags;
use crate::prompt::read_password;
use crate::registry::ImageReference;
use crate::streams::Streams;
use crate::{CliError, Result, VERSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

const PASSPHRASE_ATTEMPTS: usize = 3;

/// Everything a command needs: streams, configuration, the context store
/// and a daemon client that is only dialed when first asked for.
pub struct CliContext {
    pub streams: Streams,
    pub config: Arc<ConfigStore>,
    pub contexts: Arc<ContextStoreWithDefault>,
    pub credentials: CredentialResolver,
    pub cancel: CancellationToken,
    globals: GlobalFlags,
    current_context: String,
    scoped: OnceCell<Arc<ScopedClient>>,
    client_override: Option<Arc<dyn DaemonApi>>,
}

impl CliContext {
    pub fn new(streams: Streams, opts: &GlobalOptions, cancel: CancellationToken) -> Result<Self> {
        let paths = CliPaths::resolve(opts.config.as_deref().map(Path::new))?;
        let config = Arc::new(ConfigStore::new(paths.clone()));
        let env = process_env();

        let defaults = DefaultContextOptions {
            hosts: opts.hosts.clone(),
            tls: opts.tls,
            tls_verify: opts.tls_verify,
            ca: opts.tls_ca_cert.as_ref().map(PathBuf::from),
            cert: opts.tls_cert.as_ref().map(PathBuf::from),
            key: opts.tls_key.as_ref().map(PathBuf::from),
        };
        let contexts = Arc::new(ContextStoreWithDefault::new(
            Box::new(FileContextStore::new(&paths)),
            defaults,
            env.clone(),
            paths.root(),
        ));

        let configured = config.lock()?.current_context.clone();
        let current_context = resolve_context_name(
            opts.context.as_deref(),
            &opts.hosts,
            &env,
            configured.as_deref(),
            contexts.as_ref(),
        )
        .map_err(|e| match e {
            CliError::NotFound(msg) => CliError::NotFound(format!(
                "{}, please check your config file at {}",
                msg,
                paths.config_file().display()
            )),
            other => other,
        })?;
        tracing::debug!("using context {}", current_context);

        Ok(Self {
            streams,
            credentials: CredentialResolver::new(config.clone()),
            config,
            contexts,
            cancel,
            globals: opts.into(),
            current_context,
            scoped: OnceCell::new(),
            client_override: None,
        })
    }

    /// Serve daemon calls from `client` instead of dialing.
    pub fn with_client(mut self, client: Arc<dyn DaemonApi>) -> Self {
        self.client_override = Some(client);
        self
    }

    pub fn paths(&self) -> &CliPaths {
        self.config.paths()
    }

    /// Root flags as they were given, for handing on to plugins
    pub fn globals(&self) -> &GlobalFlags {
        &self.globals
    }

    pub fn current_context(&self) -> &str {
        &self.current_context
    }

    pub fn endpoint(&self) -> Result<DockerEndpoint> {
        DockerEndpoint::resolve(self.contexts.as_ref(), &self.current_context)
    }

    pub async fn client(&self) -> Result<Arc<dyn DaemonApi>> {
        if let Some(client) = &self.client_override {
            return Ok(client.clone());
        }
        let client: Arc<dyn DaemonApi> = self.scoped_client().await?;
        Ok(client)
    }

    /// The real HTTP client, needed where a raw connection is dialed.
    pub async fn scoped_client(&self) -> Result<Arc<ScopedClient>> {
        self.scoped
            .get_or_try_init(|| async { self.build_client().await.map(Arc::new) })
            .await
            .cloned()
    }

    pub async fn ping(&self) -> Result<PingInfo> {
        self.client().await?.ping().await
    }

    async fn build_client(&self) -> Result<ScopedClient> {
        let endpoint = self.endpoint()?;
        let mut opts = ClientOptions {
            host: endpoint.host.clone(),
            tls: endpoint.tls,
            material: endpoint.material.clone(),
            tls_passphrase: None,
            config_headers: self.config.lock()?.http_headers.clone(),
            env_headers: std::env::var(CUSTOM_HEADERS_ENV).ok(),
            user_agent: format!("Docker-Client/{} ({})", VERSION, std::env::consts::OS),
            api_version: std::env::var(API_VERSION_ENV).ok(),
        };
        if !tls::key_is_encrypted(&opts.material) {
            return ScopedClient::new(opts);
        }

        let label = format!("Enter passphrase for the TLS key of context {}: ", endpoint.context);
        let mut last_error = None;
        for attempt in 1..=PASSPHRASE_ATTEMPTS {
            let mut err = self.streams.err.clone();
            let passphrase =
                read_password(&self.cancel, &self.streams.input, &mut err, &label).await?;
            opts.tls_passphrase = Some(passphrase);
            match ScopedClient::new(opts.clone()) {
                Ok(client) => return Ok(client),
                Err(e) => {
                    tracing::debug!("passphrase attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CliError::invalid_argument("invalid passphrase")))
    }

    /// Encoded `X-Registry-Auth` value for pulling or pushing `image`
    pub async fn registry_auth(&self, image: &str) -> Result<String> {
        let reference = ImageReference::parse(image)?;
        let auth = self.credentials.resolve(&reference.index_info()).await?;
        auth.encode_header()
    }
}

/// Pick the context for this invocation.
///
/// An explicit `--context` wins (and conflicts with `--host`); a host from
/// flags or the environment selects `default`; then the context
/// environment variable, then the configured current context.
pub fn resolve_context_name(
    flag: Option<&str>,
    hosts: &[String],
    env: &EnvLookup,
    configured: Option<&str>,
    store: &dyn ContextStore,
) -> Result<String> {
    if let Some(name) = flag.filter(|n| !n.is_empty()) {
        if !hosts.is_empty() {
            return Err(CliError::invalid_argument(
                "conflicting options: either specify --host or --context, not both",
            ));
        }
        return Ok(name.to_string());
    }
    if !hosts.is_empty() || env(HOST_ENV).is_some() {
        return Ok(DEFAULT_CONTEXT_NAME.to_string());
    }
    if let Some(name) = env(CONTEXT_ENV) {
        return Ok(name);
    }
    match configured.filter(|n| !n.is_empty()) {
        Some(name) if name != DEFAULT_CONTEXT_NAME && !store.exists(name) => Err(
            CliError::not_found(format!("current context {:?} is not found on the file system", name)),
        ),
        Some(name) => Ok(name.to_string()),
        None => Ok(DEFAULT_CONTEXT_NAME.to_string()),
    }
}

impl From<&GlobalOptions> for GlobalFlags {
    fn from(opts: &GlobalOptions) -> Self {
        Self {
            config: opts.config.clone(),
            context: opts.context.clone(),
            hosts: opts.hosts.clone(),
            log_level: opts.log_level.clone(),
            tls: opts.tls,
            tls_ca_cert: opts.tls_ca_cert.clone(),
            tls_cert: opts.tls_cert.clone(),
            tls_key: opts.tls_key.clone(),
            tls_verify: opts.tls_verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EndpointMeta, Metadata};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> EnvLookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key| map.get(key).cloned())
    }

    fn store_with(dir: &TempDir, name: &str) -> ContextStoreWithDefault {
        let paths = CliPaths::with_root(dir.path());
        let store = ContextStoreWithDefault::new(
            Box::new(FileContextStore::new(&paths)),
            DefaultContextOptions::default(),
            env_of(&[]),
            dir.path(),
        );
        let mut meta = Metadata {
            name: name.to_string(),
            ..Default::default()
        };
        meta.endpoints.insert(
            "docker".into(),
            EndpointMeta {
                host: "tcp://remote:2375".into(),
                ..Default::default()
            },
        );
        store.create_or_update(&meta).unwrap();
        store
    }

    #[test]
    fn test_context_resolution_order() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, "remote");
        let none = env_of(&[]);
        let hosts = vec!["tcp://h:2375".to_string()];

        assert_eq!(
            resolve_context_name(Some("remote"), &[], &none, None, &store).unwrap(),
            "remote"
        );
        assert_eq!(
            resolve_context_name(Some("remote"), &hosts, &none, None, &store)
                .unwrap_err()
                .kind(),
            crate::ErrorKind::InvalidArgument
        );
        assert_eq!(
            resolve_context_name(None, &hosts, &none, Some("remote"), &store).unwrap(),
            "default"
        );
        let host_env = env_of(&[(HOST_ENV, "tcp://h:2375"), (CONTEXT_ENV, "remote")]);
        assert_eq!(
            resolve_context_name(None, &[], &host_env, Some("remote"), &store).unwrap(),
            "default"
        );
        let context_env = env_of(&[(CONTEXT_ENV, "remote")]);
        assert_eq!(
            resolve_context_name(None, &[], &context_env, None, &store).unwrap(),
            "remote"
        );
        assert_eq!(
            resolve_context_name(None, &[], &none, Some("remote"), &store).unwrap(),
            "remote"
        );
        assert_eq!(
            resolve_context_name(None, &[], &none, None, &store).unwrap(),
            "default"
        );
    }

    #[test]
    fn test_missing_configured_context_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, "remote");
        let err = resolve_context_name(None, &[], &env_of(&[]), Some("gone"), &store).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("\"gone\""));
    }

    #[test]
    fn test_globals_converted_for_plugins() {
        let opts = GlobalOptions {
            config: Some("/tmp/cfg".into()),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let flags = GlobalFlags::from(&opts);
        assert_eq!(flags.to_args(), vec!["--config=/tmp/cfg", "--log-level=debug"]);
    }
}
