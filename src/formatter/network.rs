use super::{join_labels, truncate_id, Adapter};
use crate::client::api::Network;
use serde_json::{json, Map, Value};

pub struct NetworkRecord<'a>(pub &'a Network);

impl Adapter for NetworkRecord<'_> {
    const HEADERS: &'static [(&'static str, &'static str)] = &[
        ("ID", "NETWORK ID"),
        ("Name", "NAME"),
        ("Driver", "DRIVER"),
        ("Scope", "SCOPE"),
        ("IPv6", "IPV6"),
        ("Internal", "INTERNAL"),
        ("CreatedAt", "CREATED AT"),
        ("Labels", "LABELS"),
    ];
    const DEFAULT_TABLE: &'static str = "table {{.ID}}\t{{.Name}}\t{{.Driver}}\t{{.Scope}}";
    const DEFAULT_RAW: &'static str =
        "network_id: {{.ID}}\nname: {{.Name}}\ndriver: {{.Driver}}\nscope: {{.Scope}}\n";
    const QUIET_RAW: &'static str = "network_id: {{.ID}}";

    fn data(&self, trunc: bool) -> Map<String, Value> {
        let n = self.0;
        let id = if trunc { truncate_id(&n.id) } else { n.id.clone() };
        let Value::Object(map) = json!({
            "ID": id,
            "Name": n.name,
            "Driver": n.driver,
            "Scope": n.scope,
            "IPv6": n.enable_ipv6.to_string(),
            "Internal": n.internal.to_string(),
            "CreatedAt": n.created,
            "Labels": join_labels(&n.labels),
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
    fn test_id_truncated_only_in_tables() {
        let n = Network {
            id: "7d86d31b1478e7cca9ebed7e73aa0fdeec46c5ca29497431d3007d2d9e15ed99".into(),
            name: "bridge".into(),
            ..Default::default()
        };
        assert_eq!(NetworkRecord(&n).data(true)["ID"], "7d86d31b1478");
        assert_eq!(NetworkRecord(&n).data(false)["ID"].as_str().map(str::len), Some(64));
        assert_eq!(NetworkRecord(&n).data(false)["IPv6"], "false");
    }
}
