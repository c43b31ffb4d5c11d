//! Devices and the tasks that group them.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::transport::Device;

/// The managed devices, keyed by id, plus named tasks listing device ids.
///
/// Deserialises from
///
/// ```json
/// {
///   "devices": [{"id": "r1", "host": "192.0.2.1", "script": "cisco_ios"}],
///   "tasks": {"nightly": ["r1"]}
/// }
/// ```
///
/// Task membership is taken as given: ids that are not in the inventory
/// are reported as rejections when the task runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "InventoryFile")]
pub struct Inventory {
    devices: IndexMap<String, Device>,
    tasks: IndexMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct InventoryFile {
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    tasks: IndexMap<String, Vec<String>>,
}

impl TryFrom<InventoryFile> for Inventory {
    type Error = String;

    fn try_from(file: InventoryFile) -> Result<Self, Self::Error> {
        let mut inventory = Inventory {
            devices: IndexMap::with_capacity(file.devices.len()),
            tasks: file.tasks,
        };
        for device in file.devices {
            if inventory.devices.contains_key(&device.id) {
                return Err(format!("duplicate device id '{}'", device.id));
            }
            inventory.devices.insert(device.id.clone(), device);
        }
        Ok(inventory)
    }
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an inventory from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Add a device, replacing any device with the same id.
    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.insert(device.id.clone(), device);
        self
    }

    /// Define a task.
    pub fn with_task<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        self
    }

    /// Get a device by id.
    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Device ids of a task.
    pub fn task(&self, name: &str) -> Option<&[String]> {
        self.tasks.get(name).map(Vec::as_slice)
    }

    /// All devices in insertion order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// All task names in insertion order.
    pub fn task_names(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Protocol;

    #[test]
    fn test_from_json() {
        let inventory = Inventory::from_json(
            r#"{
                "devices": [
                    {
                        "id": "r1", "host": "192.0.2.1", "script": "cisco_ios",
                        "username": "admin", "password": "pw"
                    },
                    {"id": "sw1", "host": "192.0.2.2", "protocol": "telnet", "script": "arista_eos"}
                ],
                "tasks": {"core": ["r1", "sw1"], "edge": ["r9"]}
            }"#,
        )
        .unwrap();

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.device("sw1").unwrap().protocol, Protocol::Telnet);
        assert_eq!(inventory.task("core").unwrap(), ["r1", "sw1"]);
        assert_eq!(inventory.task("edge").unwrap(), ["r9"]);
        assert!(inventory.task("missing").is_none());
        let names: Vec<_> = inventory.task_names().collect();
        assert_eq!(names, ["core", "edge"]);
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let result = Inventory::from_json(
            r#"{"devices": [
                {"id": "r1", "host": "a", "script": "cisco_ios"},
                {"id": "r1", "host": "b", "script": "cisco_ios"}
            ]}"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate device id 'r1'"));
    }

    #[test]
    fn test_builder() {
        let inventory = Inventory::new()
            .with_device(Device::new("r1", "192.0.2.1", "cisco_ios"))
            .with_task("all", ["r1"]);

        assert!(inventory.device("r1").is_some());
        assert_eq!(inventory.devices().count(), 1);
        assert_eq!(inventory.task("all").unwrap().len(), 1);
    }
}
