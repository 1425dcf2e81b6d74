// Bracketed-group inventory text parser
//
// Format: `[group]` opens a group, `name key=value ...` defines a device in
// the current group, and the reserved `[global]` group takes only
// `key=value` lines that apply inventory-wide.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Device, DeviceGroup, Inventory, GLOBAL_GROUP};
use crate::include::{IncludeMode, IncludeResolver};
use crate::output::errors::ArmadaError;

static GROUP_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([\w\- ]+?)\]").unwrap());

// key=value or key: value, value either a bare token or a double-quoted
// string with \" and \\ escapes
static SETTING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([\w-]+?) ?[=:] ?(?:([^"\s]\S*)|"((?:[^\\"]|\\\\|\\")*)")"#).unwrap()
});

/// Parse an inventory file, resolving `@` and `@!` includes first
pub fn parse_inventory_file(path: &Path) -> Result<Inventory, ArmadaError> {
    match path.metadata() {
        Ok(meta) if !meta.is_dir() => {}
        _ => {
            return Err(ArmadaError::Io {
                message: format!("Inventory file does not exist: {}", path.display()),
                path: Some(path.to_path_buf()),
            });
        }
    }

    let mut resolver = IncludeResolver::new(IncludeMode::FilesAndScripts);
    let resolved = resolver.resolve_file(path)?;
    parse(&resolved, &path.to_string_lossy())
}

/// Parse an inventory from an in-memory string
pub fn parse_inventory(content: &str) -> Result<Inventory, ArmadaError> {
    let mut resolver = IncludeResolver::new(IncludeMode::FilesAndScripts);
    let resolved = resolver.resolve(content, None, "")?;
    parse(&resolved, "")
}

fn parse(content: &str, file: &str) -> Result<Inventory, ArmadaError> {
    let mut inv = Inventory::new();
    let mut current_group = String::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_num = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Start of a group definition
        if line.starts_with('[') {
            let caps = GROUP_NAME_RE.captures(line).ok_or_else(|| {
                ArmadaError::parse("Error defining group", file, line_num)
            })?;
            current_group = caps[1].to_string();

            if inv.has_device(&current_group) {
                return Err(ArmadaError::parse(
                    format!(
                        "Can't define a group with the same name as a device: {}",
                        current_group
                    ),
                    file,
                    line_num,
                ));
            }
            // Re-entering an existing group just switches context
            if inv.has_group(&current_group) {
                continue;
            }
            inv.add_group(DeviceGroup::new(&current_group, line_settings(line)));
            continue;
        }

        // The global group takes only key=value lines, no device definitions
        if current_group == GLOBAL_GROUP {
            let settings = line_settings(line);
            if let Some(group) = inv.group_mut(GLOBAL_GROUP) {
                group.merge_settings(settings);
            }
            continue;
        }

        if current_group.is_empty() {
            return Err(ArmadaError::parse(
                "All devices must be inside a group",
                file,
                line_num,
            ));
        }

        let device_name = line.split_whitespace().next().unwrap_or_default().to_string();

        if inv.has_device(&device_name) {
            // Known device mentioned again: record the extra membership
            if let Some(device) = inv.device_mut(&device_name) {
                device.groups.push(current_group.clone());
            }
            if let Some(group) = inv.group_mut(&current_group) {
                group.devices.push(device_name);
            }
        } else {
            if inv.has_group(&device_name) {
                return Err(ArmadaError::parse(
                    format!(
                        "Can't define a device with the same name as a group: {}",
                        device_name
                    ),
                    file,
                    line_num,
                ));
            }
            let mut device = Device::new(&device_name, line_settings(line));
            device.groups.push(current_group.clone());
            inv.add_device(device);
            if let Some(group) = inv.group_mut(&current_group) {
                group.devices.push(device_name);
            }
        }
    }

    Ok(inv)
}

fn line_settings(line: &str) -> HashMap<String, String> {
    let mut settings = HashMap::new();
    for caps in SETTING_RE.captures_iter(line) {
        let value = match caps.get(2) {
            Some(bare) => bare.as_str().to_string(),
            None => unescape(caps.get(3).map(|m| m.as_str()).unwrap_or_default()),
        };
        settings.insert(caps[1].to_string(), value);
    }
    settings
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"").replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_groups_and_devices() {
        let inv = parse_inventory(
            "[global]\nremote_user=alice\n\n[site]\nd1 address=10.0.0.1\nd2\n",
        )
        .unwrap();

        assert!(inv.has_group("site"));
        assert_eq!(inv.device_count(), 2);

        let d1 = inv.device("d1").unwrap();
        assert_eq!(d1.setting("address"), Some("10.0.0.1"));
        assert_eq!(inv.resolve(d1, "remote_user"), Some("alice"));

        let d2 = inv.device("d2").unwrap();
        assert_eq!(d2.setting("address"), None);
        assert_eq!(inv.resolve(d2, "remote_user"), Some("alice"));
    }

    #[test]
    fn test_group_line_settings_and_colon_form() {
        let inv = parse_inventory(
            "[edge] protocol=telnet\nrtr1 remote_user: bob\n",
        )
        .unwrap();

        assert_eq!(inv.group("edge").unwrap().setting("protocol"), Some("telnet"));
        let rtr1 = inv.device("rtr1").unwrap();
        assert_eq!(rtr1.setting("remote_user"), Some("bob"));
        assert_eq!(inv.resolve(rtr1, "protocol"), Some("telnet"));
    }

    #[test]
    fn test_quoted_values() {
        let inv = parse_inventory(
            r#"[lab]
sw1 banner="hello world" motd="say \"hi\" twice"
"#,
        )
        .unwrap();

        let sw1 = inv.device("sw1").unwrap();
        assert_eq!(sw1.setting("banner"), Some("hello world"));
        assert_eq!(sw1.setting("motd"), Some(r#"say "hi" twice"#));
    }

    #[test]
    fn test_multiple_group_membership() {
        let inv = parse_inventory(
            "[site-a]\nsw1\n\n[maintenance]\nsw1\nsw2\n",
        )
        .unwrap();

        let sw1 = inv.device("sw1").unwrap();
        assert_eq!(sw1.groups, vec!["site-a", "maintenance"]);
        assert_eq!(
            inv.group("maintenance").unwrap().devices,
            vec!["sw1", "sw2"]
        );
        // Mentioning a device again must not register it twice
        assert_eq!(inv.device_count(), 2);
    }

    #[test]
    fn test_reentered_group_accumulates() {
        let inv = parse_inventory(
            "[lab]\nsw1\n\n[other]\nrtr1\n\n[lab]\nsw2\n",
        )
        .unwrap();

        assert_eq!(inv.group("lab").unwrap().devices, vec!["sw1", "sw2"]);
    }

    #[test]
    fn test_device_outside_group_is_error() {
        let err = parse_inventory("sw1 address=10.0.0.1\n").unwrap_err();
        assert!(err.to_string().contains("inside a group"));
    }

    #[test]
    fn test_name_collisions_are_errors() {
        // Device named after an existing group
        assert!(parse_inventory("[lab]\nsw1\n\n[other]\nlab\n").is_err());
        // Group named after an existing device
        assert!(parse_inventory("[lab]\nsw1\n\n[sw1]\n").is_err());
    }

    #[test]
    fn test_malformed_group_is_error() {
        let err = parse_inventory("[lab\nsw1\n").unwrap_err();
        assert!(err.to_string().contains("defining group"));
    }

    #[test]
    fn test_global_takes_no_devices() {
        // Non key=value lines inside global are treated as settings and
        // contribute nothing, never as devices
        let inv = parse_inventory("[global]\nstray\n").unwrap();
        assert_eq!(inv.device_count(), 0);
    }
}
