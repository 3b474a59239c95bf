//! `docker context ls` rows

use super::Adapter;
use crate::config::paths::DOCKER_ENDPOINT;
use crate::context::Metadata;
use serde_json::{json, Map, Value};

pub struct ContextRecord<'a> {
    pub meta: &'a Metadata,
    pub current: bool,
}

impl Adapter for ContextRecord<'_> {
    // `Current` has an empty header so the marker is absent from the header row.
    const HEADERS: &'static [(&'static str, &'static str)] = &[
        ("Name", "NAME"),
        ("Current", ""),
        ("Description", "DESCRIPTION"),
        ("DockerEndpoint", "DOCKER ENDPOINT"),
        ("Error", "ERROR"),
    ];
    const DEFAULT_TABLE: &'static str =
        "table {{.Name}}{{if .Current}} *{{end}}\t{{.Description}}\t{{.DockerEndpoint}}";
    const DEFAULT_RAW: &'static str =
        "name: {{.Name}}\ncurrent: {{.Current}}\ndescription: {{.Description}}\ndocker_endpoint: {{.DockerEndpoint}}\n";
    const QUIET: &'static str = "{{.Name}}";
    const QUIET_RAW: &'static str = "name: {{.Name}}";

    fn data(&self, _trunc: bool) -> Map<String, Value> {
        let endpoint = self
            .meta
            .endpoints
            .get(DOCKER_ENDPOINT)
            .map(|e| e.host.clone())
            .unwrap_or_default();
        let Value::Object(map) = json!({
            "Name": self.meta.name,
            "Current": self.current,
            "Description": self.meta.metadata.description,
            "DockerEndpoint": endpoint,
            "Error": "",
        }) else {
            return Map::new();
        };
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EndpointMeta;
    use crate::formatter::{Format, FormatContext};

    fn meta(name: &str, host: &str) -> Metadata {
        let mut m = Metadata {
            name: name.into(),
            ..Default::default()
        };
        m.endpoints.insert(
            DOCKER_ENDPOINT.into(),
            EndpointMeta {
                host: host.into(),
                ..Default::default()
            },
        );
        m
    }

    #[test]
    fn test_current_context_marked() {
        let a = meta("default", "unix:///var/run/docker.sock");
        let b = meta("remote", "tcp://h:2376");
        let records = [
            ContextRecord {
                meta: &a,
                current: false,
            },
            ContextRecord {
                meta: &b,
                current: true,
            },
        ];
        let mut ctx = FormatContext::new(Vec::new(), Format::Table(None));
        ctx.write(&records).unwrap();
        let out = String::from_utf8(ctx.out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("NAME "));
        assert!(lines[0].contains("DESCRIPTION"));
        assert!(lines[0].ends_with("DOCKER ENDPOINT"));
        assert!(lines[1].starts_with("default "));
        assert!(lines[2].starts_with("remote * "));
        assert!(lines[2].ends_with("tcp://h:2376"));
    }

    #[test]
    fn test_json_carries_current_flag() {
        let b = meta("remote", "tcp://h:2376");
        let mut ctx = FormatContext::new(Vec::new(), Format::Json);
        ctx.write(&[ContextRecord {
            meta: &b,
            current: true,
        }])
        .unwrap();
        let line = String::from_utf8(ctx.out).unwrap();
        let v: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["Current"], true);
        assert_eq!(v["DockerEndpoint"], "tcp://h:2376");
    }
}
