use super::{join_labels, Adapter};
use crate::client::api::Volume;
use serde_json::{json, Map, Value};

pub struct VolumeRecord<'a>(pub &'a Volume);

impl Adapter for VolumeRecord<'_> {
    const HEADERS: &'static [(&'static str, &'static str)] = &[
        ("Driver", "DRIVER"),
        ("Name", "VOLUME NAME"),
        ("Scope", "SCOPE"),
        ("Mountpoint", "MOUNTPOINT"),
        ("CreatedAt", "CREATED AT"),
        ("Labels", "LABELS"),
    ];
    const DEFAULT_TABLE: &'static str = "table {{.Driver}}\t{{.Name}}";
    const DEFAULT_RAW: &'static str = "name: {{.Name}}\ndriver: {{.Driver}}\n";
    const QUIET: &'static str = "{{.Name}}";
    const QUIET_RAW: &'static str = "name: {{.Name}}";

    fn data(&self, _trunc: bool) -> Map<String, Value> {
        let v = self.0;
        let Value::Object(map) = json!({
            "Driver": v.driver,
            "Name": v.name,
            "Scope": v.scope,
            "Mountpoint": v.mountpoint,
            "CreatedAt": v.created_at,
            "Labels": join_labels(&v.labels),
        }) else {
            return Map::new();
        };
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{Format, FormatContext};

    #[test]
    fn test_quiet_lists_names() {
        let volumes = [
            Volume {
                name: "data".into(),
                driver: "local".into(),
                ..Default::default()
            },
            Volume {
                name: "cache".into(),
                driver: "local".into(),
                ..Default::default()
            },
        ];
        let records: Vec<_> = volumes.iter().map(VolumeRecord).collect();

        let mut ctx = FormatContext::new(Vec::new(), Format::Table(None)).quiet(true);
        ctx.write(&records).unwrap();
        assert_eq!(String::from_utf8(ctx.out).unwrap(), "data\ncache\n");

        let mut ctx = FormatContext::new(Vec::new(), Format::Table(None));
        ctx.write(&records).unwrap();
        assert_eq!(
            String::from_utf8(ctx.out).unwrap(),
            "DRIVER    VOLUME NAME\nlocal     data\nlocal     cache\n"
        );
    }
}
