//! Image reference parsing

use crate::registry::auth::{IndexInfo, DEFAULT_REGISTRY, INDEX_HOSTNAME};
use crate::{CliError, Result};

/// Docker/OCI image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry (e.g., "docker.io", "ghcr.io")
    pub registry: String,
    /// Repository (e.g., "library/alpine", "myuser/myapp")
    pub repository: String,
    /// Explicit tag, if any
    pub tag: Option<String>,
    /// Digest (optional, e.g., "sha256:...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CliError::invalid_argument("invalid reference format: empty"));
        }
        if reference.chars().any(|c| c.is_ascii_uppercase())
            && !reference.contains('/')
            && !reference.contains('@')
        {
            return Err(CliError::invalid_argument(format!(
                "invalid reference format: repository name ({}) must be lowercase",
                reference
            )));
        }

        let (ref_without_digest, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(CliError::invalid_argument(format!(
                        "invalid reference format: bad digest in {}",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A colon after the last slash separates the tag; one before it
        // belongs to a registry port.
        let (ref_without_tag, tag) = match ref_without_digest.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => {
                if tag.is_empty() {
                    return Err(CliError::invalid_argument(format!(
                        "invalid reference format: empty tag in {}",
                        reference
                    )));
                }
                (name, Some(tag.to_string()))
            }
            _ => (ref_without_digest, None),
        };

        let (registry, repository) = match ref_without_tag.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                let registry = if first == INDEX_HOSTNAME {
                    DEFAULT_REGISTRY.to_string()
                } else {
                    first.to_string()
                };
                let repository = if registry == DEFAULT_REGISTRY && !rest.contains('/') {
                    format!("library/{}", rest)
                } else {
                    rest.to_string()
                };
                (registry, repository)
            }
            Some(_) => (DEFAULT_REGISTRY.to_string(), ref_without_tag.to_string()),
            None => (
                DEFAULT_REGISTRY.to_string(),
                format!("library/{}", ref_without_tag),
            ),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(CliError::invalid_argument(format!(
                "invalid reference format: {}",
                reference
            )));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Get the full repository path with registry, in familiar form
    pub fn repository_with_registry(&self) -> String {
        if self.registry == DEFAULT_REGISTRY {
            self.repository
                .strip_prefix("library/")
                .unwrap_or(&self.repository)
                .to_string()
        } else {
            format!("{}/{}", self.registry, self.repository)
        }
    }

    /// Tag to use when talking to the daemon; defaults to `latest` unless a
    /// digest pins the reference.
    pub fn tag(&self) -> &str {
        match (&self.tag, &self.digest) {
            (Some(tag), _) => tag,
            (None, Some(digest)) => digest,
            (None, None) => "latest",
        }
    }

    /// Get the full image name with tag or digest
    pub fn full_name(&self) -> String {
        match (&self.tag, &self.digest) {
            (_, Some(digest)) => format!("{}@{}", self.repository_with_registry(), digest),
            _ => format!("{}:{}", self.repository_with_registry(), self.tag()),
        }
    }

    /// Registry index this reference resolves credentials against
    pub fn index_info(&self) -> IndexInfo {
        IndexInfo::new(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_image() {
        let reference = ImageReference::parse("alpine").unwrap();
        assert_eq!(reference.registry, "docker.io");
        assert_eq!(reference.repository, "library/alpine");
        assert_eq!(reference.tag(), "latest");
        assert!(reference.index_info().official);
    }

    #[test]
    fn test_parse_image_with_tag() {
        let reference = ImageReference::parse("alpine:3.18").unwrap();
        assert_eq!(reference.registry, "docker.io");
        assert_eq!(reference.repository, "library/alpine");
        assert_eq!(reference.tag(), "3.18");
    }

    #[test]
    fn test_parse_image_with_user() {
        let reference = ImageReference::parse("myuser/myapp:v1.0").unwrap();
        assert_eq!(reference.registry, "docker.io");
        assert_eq!(reference.repository, "myuser/myapp");
        assert_eq!(reference.tag(), "v1.0");
    }

    #[test]
    fn test_parse_image_with_registry_port() {
        let reference = ImageReference::parse("localhost:5000/owner/repo").unwrap();
        assert_eq!(reference.registry, "localhost:5000");
        assert_eq!(reference.repository, "owner/repo");
        assert_eq!(reference.tag(), "latest");
        let index = reference.index_info();
        assert_eq!(index.name, "localhost:5000");
        assert!(!index.official);
    }

    #[test]
    fn test_parse_digest_and_full_name() {
        let reference = ImageReference::parse("ghcr.io/owner/repo@sha256:abcd").unwrap();
        assert_eq!(reference.tag(), "sha256:abcd");
        assert_eq!(reference.full_name(), "ghcr.io/owner/repo@sha256:abcd");

        let reference = ImageReference::parse("alpine:3.18").unwrap();
        assert_eq!(reference.full_name(), "alpine:3.18");
    }

    #[test]
    fn test_index_hostname_is_official() {
        let reference = ImageReference::parse("index.docker.io/busybox").unwrap();
        assert_eq!(reference.registry, "docker.io");
        assert_eq!(reference.repository, "library/busybox");
    }

    #[test]
    fn test_parse_rejects_bad_references() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("Alpine").is_err());
        assert!(ImageReference::parse("alpine:").is_err());
    }
}
