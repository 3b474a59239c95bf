//! `docker images` rows, one per repository tag

use super::{join_labels, truncate_id, Adapter};
use crate::client::api::ImageSummary;
use crate::opts::units::{human_size, time_ago};
use chrono::{Local, TimeZone};
use serde_json::{json, Map, Value};

const NONE: &str = "<none>";

/// `docker images --digests` columns
pub const DIGEST_TABLE: &str =
    "table {{.Repository}}\t{{.Tag}}\t{{.Digest}}\t{{.ID}}\t{{.CreatedSince}}\t{{.Size}}";

pub struct ImageRecord<'a> {
    pub image: &'a ImageSummary,
    pub repository: String,
    pub tag: String,
    pub digest: String,
}

impl<'a> ImageRecord<'a> {
    /// Expand summaries into one row per `repo:tag`; untagged images get a
    /// single `<none>` row.
    pub fn expand(images: &'a [ImageSummary]) -> Vec<Self> {
        let mut rows = Vec::new();
        for image in images {
            let tags: Vec<&String> = image
                .repo_tags
                .iter()
                .filter(|t| t.as_str() != "<none>:<none>")
                .collect();
            if tags.is_empty() {
                let (repository, digest) = image
                    .repo_digests
                    .first()
                    .and_then(|d| d.split_once('@'))
                    .map(|(r, d)| (r.to_string(), d.to_string()))
                    .unwrap_or_else(|| (NONE.to_string(), NONE.to_string()));
                rows.push(Self {
                    image,
                    repository,
                    tag: NONE.to_string(),
                    digest,
                });
                continue;
            }
            for tagged in tags {
                let (repository, tag) = split_repo_tag(tagged);
                let digest = image
                    .repo_digests
                    .iter()
                    .filter_map(|d| d.split_once('@'))
                    .find(|(r, _)| *r == repository)
                    .map(|(_, d)| d.to_string())
                    .unwrap_or_else(|| NONE.to_string());
                rows.push(Self {
                    image,
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                    digest,
                });
            }
        }
        rows
    }
}

/// Split at the last `:` that follows the last `/`, so registry ports stay
/// in the repository.
fn split_repo_tag(reference: &str) -> (&str, &str) {
    let slash = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[slash..].rfind(':') {
        Some(i) => (&reference[..slash + i], &reference[slash + i + 1..]),
        None => (reference, NONE),
    }
}

impl Adapter for ImageRecord<'_> {
    const HEADERS: &'static [(&'static str, &'static str)] = &[
        ("Repository", "REPOSITORY"),
        ("Tag", "TAG"),
        ("Digest", "DIGEST"),
        ("ID", "IMAGE ID"),
        ("CreatedSince", "CREATED"),
        ("CreatedAt", "CREATED AT"),
        ("Size", "SIZE"),
        ("Containers", "CONTAINERS"),
        ("Labels", "LABELS"),
    ];
    const DEFAULT_TABLE: &'static str =
        "table {{.Repository}}\t{{.Tag}}\t{{.ID}}\t{{.CreatedSince}}\t{{.Size}}";
    const DEFAULT_RAW: &'static str =
        "repository: {{.Repository}}\ntag: {{.Tag}}\nimage_id: {{.ID}}\ncreated_at: {{.CreatedAt}}\nvirtual_size: {{.Size}}\n";
    const QUIET_RAW: &'static str = "image_id: {{.ID}}";

    fn data(&self, trunc: bool) -> Map<String, Value> {
        let image = self.image;
        let id = if trunc {
            truncate_id(&image.id)
        } else {
            image.id.clone()
        };
        let containers = if image.containers < 0 {
            "N/A".to_string()
        } else {
            image.containers.to_string()
        };
        let created_at = Local
            .timestamp_opt(image.created, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S %z %Z").to_string())
            .unwrap_or_default();

        let Value::Object(map) = json!({
            "Repository": self.repository,
            "Tag": self.tag,
            "Digest": self.digest,
            "ID": id,
            "CreatedSince": time_ago(image.created),
            "CreatedAt": created_at,
            "Size": human_size(image.size.max(0) as u64),
            "Containers": containers,
            "Labels": join_labels(&image.labels),
        }) else {
            return Map::new();
        };
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_repo_tag_keeps_registry_port() {
        assert_eq!(split_repo_tag("nginx:1.25"), ("nginx", "1.25"));
        assert_eq!(
            split_repo_tag("localhost:5000/app:v1"),
            ("localhost:5000/app", "v1")
        );
        assert_eq!(split_repo_tag("localhost:5000/app"), ("localhost:5000/app", NONE));
    }

    #[test]
    fn test_expand_rows() {
        let images = vec![
            ImageSummary {
                id: "sha256:aaaaaaaaaaaaaaaaaaaa".into(),
                repo_tags: vec!["nginx:latest".into(), "web:v1".into()],
                repo_digests: vec!["nginx@sha256:d1".into()],
                size: 187_000_000,
                containers: -1,
                ..Default::default()
            },
            ImageSummary {
                id: "sha256:bbbbbbbbbbbbbbbbbbbb".into(),
                repo_tags: vec!["<none>:<none>".into()],
                ..Default::default()
            },
        ];
        let rows = ImageRecord::expand(&images);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].repository.as_str(), rows[0].digest.as_str()), ("nginx", "sha256:d1"));
        assert_eq!((rows[1].repository.as_str(), rows[1].digest.as_str()), ("web", NONE));
        assert_eq!((rows[2].repository.as_str(), rows[2].tag.as_str()), (NONE, NONE));

        let data = rows[0].data(true);
        assert_eq!(data["ID"], "aaaaaaaaaaaa");
        assert_eq!(data["Size"], "187MB");
        assert_eq!(data["Containers"], "N/A");
    }
}
