// Inventory module for device management

mod parser;

pub use parser::{parse_inventory, parse_inventory_file};

use std::collections::HashMap;

use crate::output::errors::ArmadaError;

/// Name of the reserved group carrying inventory-wide defaults
pub const GLOBAL_GROUP: &str = "global";

/// A single device in the inventory
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    /// Groups this device belongs to, in the order encountered while parsing
    pub groups: Vec<String>,
    settings: HashMap<String, String>,
}

impl Device {
    pub fn new(name: impl Into<String>, settings: HashMap<String, String>) -> Self {
        Device {
            name: name.into(),
            groups: Vec::new(),
            settings,
        }
    }

    /// Get one of the device's own settings. Group and global values are
    /// layered in by [`Inventory::resolve`].
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(|s| s.as_str())
    }

    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }
}

/// A named collection of devices sharing settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceGroup {
    pub name: String,
    /// Member device names in insertion order
    pub devices: Vec<String>,
    settings: HashMap<String, String>,
}

impl DeviceGroup {
    pub fn new(name: impl Into<String>, settings: HashMap<String, String>) -> Self {
        DeviceGroup {
            name: name.into(),
            devices: Vec::new(),
            settings,
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(|s| s.as_str())
    }

    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }

    pub(crate) fn merge_settings(&mut self, settings: HashMap<String, String>) {
        self.settings.extend(settings);
    }
}

/// The complete inventory of groups and devices
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    groups: HashMap<String, DeviceGroup>,
    devices: HashMap<String, Device>,
    /// Device names in the order they were first defined. Execution iterates
    /// in this order.
    order: Vec<String>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn add_group(&mut self, group: DeviceGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn add_device(&mut self, device: Device) {
        self.order.push(device.name.clone());
        self.devices.insert(device.name.clone(), device);
    }

    pub fn group(&self, name: &str) -> Option<&DeviceGroup> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut DeviceGroup> {
        self.groups.get_mut(name)
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.devices.get_mut(name)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn has_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    /// Devices in definition order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().filter_map(|n| self.devices.get(n))
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a setting for a device through the override chain:
    /// global value first, then each membership group in order (non-empty
    /// values override), then the device's own non-empty value.
    pub fn resolve<'a>(&'a self, device: &'a Device, key: &str) -> Option<&'a str> {
        let mut value = self
            .groups
            .get(GLOBAL_GROUP)
            .and_then(|g| g.setting(key));

        for group_name in &device.groups {
            if let Some(v) = self.groups.get(group_name).and_then(|g| g.setting(key)) {
                if !v.is_empty() {
                    value = Some(v);
                }
            }
        }

        if let Some(v) = device.setting(key) {
            if !v.is_empty() {
                value = Some(v);
            }
        }

        value
    }

    /// Build a sub-inventory from a list of group and device names.
    ///
    /// A group term selects every member device in member order; a device
    /// term selects that device. Groups a selected device belongs to are
    /// carried over (plus global) so setting resolution keeps working on the
    /// result. An unknown term is an error.
    pub fn filter(&self, terms: &[String]) -> Result<Inventory, ArmadaError> {
        let mut sub = Inventory::new();

        if let Some(global) = self.groups.get(GLOBAL_GROUP) {
            sub.add_group(global.clone());
        }

        for term in terms {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }

            if let Some(group) = self.groups.get(term) {
                for device_name in &group.devices {
                    if let Some(device) = self.devices.get(device_name) {
                        sub.select_device(self, device);
                    }
                }
            } else if let Some(device) = self.devices.get(term) {
                sub.select_device(self, device);
            } else {
                return Err(ArmadaError::Inventory {
                    message: format!("Group or device does not exist: {}", term),
                    suggestion: Some(
                        "Check the devices block of the task against the inventory".to_string(),
                    ),
                });
            }
        }

        Ok(sub)
    }

    fn select_device(&mut self, source: &Inventory, device: &Device) {
        if self.devices.contains_key(&device.name) {
            return;
        }

        for group_name in &device.groups {
            if !self.groups.contains_key(group_name) {
                if let Some(group) = source.groups.get(group_name) {
                    self.groups.insert(group_name.clone(), group.clone());
                }
            }
        }

        self.add_device(device.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample_inventory() -> Inventory {
        let mut inv = Inventory::new();

        inv.add_group(DeviceGroup::new(
            GLOBAL_GROUP,
            settings(&[("remote_user", "alice"), ("protocol", "ssh")]),
        ));

        let mut g1 = DeviceGroup::new("g1", settings(&[("protocol", "telnet")]));
        g1.devices = vec!["a".to_string(), "b".to_string()];
        inv.add_group(g1);

        let mut g2 = DeviceGroup::new("g2", HashMap::new());
        g2.devices = vec!["c".to_string()];
        inv.add_group(g2);

        let mut a = Device::new("a", settings(&[("address", "10.0.0.1")]));
        a.groups = vec!["g1".to_string()];
        inv.add_device(a);

        let mut b = Device::new("b", settings(&[("protocol", "ssh")]));
        b.groups = vec!["g1".to_string()];
        inv.add_device(b);

        let mut c = Device::new("c", HashMap::new());
        c.groups = vec!["g2".to_string()];
        inv.add_device(c);

        inv
    }

    #[test]
    fn test_resolution_chain() {
        let inv = sample_inventory();

        // Device value wins over group and global
        let b = inv.device("b").unwrap();
        assert_eq!(inv.resolve(b, "protocol"), Some("ssh"));

        // Group value wins over global
        let a = inv.device("a").unwrap();
        assert_eq!(inv.resolve(a, "protocol"), Some("telnet"));

        // Global value when nothing closer is set
        assert_eq!(inv.resolve(a, "remote_user"), Some("alice"));

        // Unset everywhere
        assert_eq!(inv.resolve(a, "enable_secret"), None);
    }

    #[test]
    fn test_last_membership_wins() {
        let mut inv = sample_inventory();

        let mut late = DeviceGroup::new("late", settings(&[("protocol", "serial")]));
        late.devices = vec!["a".to_string()];
        inv.add_group(late);
        inv.device_mut("a").unwrap().groups.push("late".to_string());

        let a = inv.device("a").unwrap();
        assert_eq!(inv.resolve(a, "protocol"), Some("serial"));
    }

    #[test]
    fn test_filter_by_group() {
        let inv = sample_inventory();
        let sub = inv.filter(&["g1".to_string()]).unwrap();

        let names: Vec<&str> = sub.devices().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_filter_by_device() {
        let inv = sample_inventory();
        let sub = inv.filter(&["c".to_string()]).unwrap();

        let names: Vec<&str> = sub.devices().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn test_filter_unknown_term_is_error() {
        let inv = sample_inventory();
        assert!(inv.filter(&["missing".to_string()]).is_err());
    }

    #[test]
    fn test_filter_preserves_resolution() {
        let inv = sample_inventory();
        let sub = inv.filter(&["g1".to_string()]).unwrap();

        let a = sub.device("a").unwrap();
        assert_eq!(sub.resolve(a, "remote_user"), Some("alice"));
        assert_eq!(sub.resolve(a, "protocol"), Some("telnet"));
    }

    #[test]
    fn test_filter_dedups_devices() {
        let inv = sample_inventory();
        let sub = inv
            .filter(&["g1".to_string(), "a".to_string()])
            .unwrap();

        assert_eq!(sub.device_count(), 2);
        let names: Vec<&str> = sub.devices().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
