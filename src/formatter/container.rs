//! `docker ps` rows

use super::{ellipsis, join_labels, truncate_id, Adapter};
use crate::client::api::{ContainerSummary, PortSummary};
use crate::opts::units::{human_size, time_ago};
use chrono::{Local, TimeZone};
use serde_json::{json, Map, Value};

/// Default columns plus the size column for `ps --size`
pub const SIZE_TABLE: &str =
    "table {{.ID}}\t{{.Image}}\t{{.Command}}\t{{.RunningFor}}\t{{.Status}}\t{{.Ports}}\t{{.Names}}\t{{.Size}}";

pub struct ContainerRecord<'a>(pub &'a ContainerSummary);

impl Adapter for ContainerRecord<'_> {
    const HEADERS: &'static [(&'static str, &'static str)] = &[
        ("ID", "CONTAINER ID"),
        ("Image", "IMAGE"),
        ("Command", "COMMAND"),
        ("CreatedAt", "CREATED AT"),
        ("RunningFor", "CREATED"),
        ("Status", "STATUS"),
        ("State", "STATE"),
        ("Ports", "PORTS"),
        ("Names", "NAMES"),
        ("Size", "SIZE"),
        ("Labels", "LABELS"),
    ];
    const DEFAULT_TABLE: &'static str =
        "table {{.ID}}\t{{.Image}}\t{{.Command}}\t{{.RunningFor}}\t{{.Status}}\t{{.Ports}}\t{{.Names}}";
    const DEFAULT_RAW: &'static str = "container_id: {{.ID}}\nimage: {{.Image}}\ncommand: {{.Command}}\ncreated_at: {{.CreatedAt}}\nstate: {{.State}}\nstatus: {{.Status}}\nnames: {{.Names}}\nlabels: {{.Labels}}\nports: {{.Ports}}\n";
    const QUIET_RAW: &'static str = "container_id: {{.ID}}";

    fn data(&self, trunc: bool) -> Map<String, Value> {
        let c = self.0;
        let (id, image, command) = if trunc {
            (
                truncate_id(&c.id),
                short_image(&c.image),
                ellipsis(&c.command, 20),
            )
        } else {
            (c.id.clone(), c.image.clone(), c.command.clone())
        };

        let Value::Object(map) = json!({
            "ID": id,
            "Image": image,
            "Command": format!("\"{}\"", command),
            "CreatedAt": created_at(c.created),
            "RunningFor": time_ago(c.created),
            "Status": c.status,
            "State": c.state,
            "Ports": display_ports(&c.ports),
            "Names": names(&c.names, trunc),
            "Size": size(c),
            "Labels": join_labels(&c.labels),
        }) else {
            return Map::new();
        };
        map
    }
}

/// Strip the digest from `repo@sha256:...` so the column stays narrow.
fn short_image(image: &str) -> String {
    match image.split_once('@') {
        Some((repo, _)) if !repo.is_empty() => repo.to_string(),
        _ => truncate_id(image),
    }
}

fn created_at(unix_seconds: i64) -> String {
    Local
        .timestamp_opt(unix_seconds, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %z %Z").to_string())
        .unwrap_or_default()
}

/// Container names without the leading slash; with `trunc`, links such as
/// `/web/db` are dropped.
fn names(raw: &[String], trunc: bool) -> String {
    raw.iter()
        .map(|n| n.strip_prefix('/').unwrap_or(n))
        .filter(|n| !trunc || !n.contains('/'))
        .collect::<Vec<_>>()
        .join(",")
}

fn size(c: &ContainerSummary) -> String {
    match (c.size_rw, c.size_root_fs) {
        (None, None) => String::new(),
        (rw, Some(virt)) if virt > 0 => format!(
            "{} (virtual {})",
            human_size(rw.unwrap_or(0).max(0) as u64),
            human_size(virt as u64)
        ),
        (rw, _) => human_size(rw.unwrap_or(0).max(0) as u64),
    }
}

/// `0.0.0.0:8080->80/tcp, 443/tcp`
pub fn display_ports(ports: &[PortSummary]) -> String {
    let mut sorted: Vec<&PortSummary> = ports.iter().collect();
    sorted.sort_by(|a, b| {
        (a.private_port, &a.protocol, a.public_port).cmp(&(b.private_port, &b.protocol, b.public_port))
    });
    sorted
        .into_iter()
        .map(|p| {
            if p.public_port == 0 {
                format!("{}/{}", p.private_port, p.protocol)
            } else if p.ip.contains(':') {
                format!("[{}]:{}->{}/{}", p.ip, p.public_port, p.private_port, p.protocol)
            } else {
                format!("{}:{}->{}/{}", p.ip, p.public_port, p.private_port, p.protocol)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{Format, FormatContext};

    fn sample() -> ContainerSummary {
        ContainerSummary {
            id: "4f1c2a3b5d6e7f8091a2b3c4d5e6f708".into(),
            names: vec!["/web".into(), "/app/web".into()],
            image: "nginx@sha256:abcdef".into(),
            command: "nginx -g 'daemon off;'".into(),
            created: chrono::Utc::now().timestamp() - 120,
            state: "running".into(),
            status: "Up 2 minutes".into(),
            ports: vec![
                PortSummary {
                    ip: "0.0.0.0".into(),
                    private_port: 80,
                    public_port: 8080,
                    protocol: "tcp".into(),
                },
                PortSummary {
                    private_port: 443,
                    protocol: "tcp".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_truncated_fields() {
        let c = sample();
        let data = ContainerRecord(&c).data(true);
        assert_eq!(data["ID"], "4f1c2a3b5d6e");
        assert_eq!(data["Image"], "nginx");
        assert_eq!(data["Command"], "\"nginx -g 'daemon of…\"");
        assert_eq!(data["Names"], "web");
        assert_eq!(data["Ports"], "0.0.0.0:8080->80/tcp, 443/tcp");
        assert_eq!(data["RunningFor"], "2 minutes ago");

        let full = ContainerRecord(&c).data(false);
        assert_eq!(full["Names"], "web,app/web");
        assert_eq!(full["Image"], "nginx@sha256:abcdef");
    }

    #[test]
    fn test_table_header() {
        let c = sample();
        let mut ctx = FormatContext::new(Vec::new(), Format::parse("table {{.ID}}\t{{.Status}}"));
        ctx.write(&[ContainerRecord(&c)]).unwrap();
        let out = String::from_utf8(ctx.out).unwrap();
        assert_eq!(out.lines().next().unwrap(), "CONTAINER ID   STATUS");
        assert_eq!(out.lines().nth(1).unwrap(), "4f1c2a3b5d6e   Up 2 minutes");
    }
}
