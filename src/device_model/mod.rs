//! The device model: a rooted tree of [`Component`]s each owning [`DataItem`]s.
//!
//! Loading the tree from XML/JSON is external (spec §1); this module only
//! owns the in-memory representation, the Agent Device synthesis, and the
//! adapter-component attachment described in spec §4.1.

mod builder;

pub use builder::{BuildError, DeviceModelBuilder};

use std::collections::HashMap;

/// Category a data item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Category {
    Event,
    Sample,
    Condition,
}

/// How a data item's value is structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Representation {
    #[default]
    Value,
    DataSet,
    TimeSeries,
}

/// A value constraint attached to a data item.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Constraint {
    Enum(Vec<String>),
    Range { min: f64, max: f64 },
    /// Drop the observation if the numeric delta from the previous value is
    /// below this threshold (spec §4.4 ingestion filter stage).
    Filter { minimum_delta: f64 },
}

/// Well-known data item type strings the Agent Device and adapter components
/// require (spec §4.1, grounded on `agent_device.cpp`).
pub mod data_item_type {
    pub const AVAILABILITY: &str = "AVAILABILITY";
    pub const DEVICE_ADDED: &str = "DEVICE_ADDED";
    pub const DEVICE_REMOVED: &str = "DEVICE_REMOVED";
    pub const DEVICE_CHANGED: &str = "DEVICE_CHANGED";
    pub const CONNECTION_STATUS: &str = "CONNECTION_STATUS";
    pub const ADAPTER_URI: &str = "ADAPTER_URI";
    pub const OBSERVATION_UPDATE_RATE: &str = "OBSERVATION_UPDATE_RATE";
    pub const ASSET_UPDATE_RATE: &str = "ASSET_UPDATE_RATE";
    pub const ADAPTER_SOFTWARE_VERSION: &str = "ADAPTER_SOFTWARE_VERSION";
    pub const MTCONNECT_VERSION: &str = "MTCONNECT_VERSION";
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DataItem {
    pub id: String,
    pub data_type: String,
    pub category: Category,
    pub units: Option<String>,
    /// The unit the adapter's raw value is expressed in, when it differs
    /// from `units` (spec §4.4: "if conversionRequired, apply unit
    /// conversion table" converts from this to `units`).
    pub native_units: Option<String>,
    pub representation: Representation,
    pub constraint: Option<Constraint>,
    /// Id of the owning component, resolved back through the model rather
    /// than held as an owning reference (spec §9 design note).
    pub component_id: String,
    pub constant_value: Option<String>,
}

impl DataItem {
    pub fn new(id: impl Into<String>, data_type: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            data_type: data_type.into(),
            category,
            units: None,
            native_units: None,
            representation: Representation::Value,
            constraint: None,
            component_id: String::new(),
            constant_value: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>, native_units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self.native_units = Some(native_units.into());
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn constant(mut self, value: impl Into<String>) -> Self {
        self.constant_value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub element_type: String,
    pub children: Vec<Component>,
    pub data_items: Vec<DataItem>,
}

impl Component {
    pub fn new(id: impl Into<String>, name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            element_type: element_type.into(),
            children: Vec::new(),
            data_items: Vec::new(),
        }
    }

    pub fn add_data_item(&mut self, mut item: DataItem) -> &mut Self {
        item.component_id = self.id.clone();
        self.data_items.push(item);
        self
    }

    pub fn add_child(&mut self, child: Component) -> &mut Self {
        self.children.push(child);
        self
    }

    fn find_data_item<'a>(&'a self, id: &str) -> Option<&'a DataItem> {
        self.data_items
            .iter()
            .find(|item| item.id == id)
            .or_else(|| self.children.iter().find_map(|c| c.find_data_item(id)))
    }

    fn find_by_name<'a>(&'a self, name: &str) -> Option<&'a Component> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_name(name))
    }

    fn walk_data_items<'a>(&'a self, out: &mut Vec<&'a DataItem>) {
        out.extend(self.data_items.iter());
        for child in &self.children {
            child.walk_data_items(out);
        }
    }
}

pub const AGENT_DEVICE_NAME: &str = "Agent";
const ADAPTERS_CONTAINER_ID: &str = "__adapters";

/// The device model proper: a forest of top-level devices (each a root
/// `Component`), one of which is always the synthetic Agent Device.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DeviceModel {
    devices: Vec<Component>,
    /// Index from data-item id to (device index, component id), rebuilt on
    /// every mutation; the model is small and mutations are rare (only at
    /// adapter-registration time per spec §5).
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl DeviceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesize the Agent Device with its required data items (spec §4.1).
    pub fn add_agent_device(&mut self) -> Result<(), BuildError> {
        let mut agent = Component::new("agent", AGENT_DEVICE_NAME, "Device");
        agent.add_data_item(DataItem::new(
            "agent_avail",
            data_item_type::AVAILABILITY,
            Category::Event,
        ));
        agent.add_data_item(DataItem::new(
            "agent_device_added",
            data_item_type::DEVICE_ADDED,
            Category::Event,
        ));
        agent.add_data_item(DataItem::new(
            "agent_device_removed",
            data_item_type::DEVICE_REMOVED,
            Category::Event,
        ));
        agent.add_data_item(DataItem::new(
            "agent_device_changed",
            data_item_type::DEVICE_CHANGED,
            Category::Event,
        ));
        let adapters_container = Component::new(ADAPTERS_CONTAINER_ID, "Adapters", "Components");
        agent.add_child(adapters_container);
        self.add_device(agent)
    }

    pub fn add_device(&mut self, device: Component) -> Result<(), BuildError> {
        self.devices.push(device);
        self.reindex()
    }

    /// Attach a child Adapter component under the Agent Device's "Adapters"
    /// container (spec §4.1). `uri` is `shdr://host:port`, omitted from the
    /// model when `suppress_ip_address` is set.
    pub fn attach_adapter_component(
        &mut self,
        adapter_id: &str,
        adapter_name: &str,
        uri: Option<&str>,
    ) -> Result<(), BuildError> {
        let mut component = Component::new(adapter_id, adapter_name, "Adapter");
        component.add_data_item(DataItem::new(
            format!("{adapter_id}_connection_status"),
            data_item_type::CONNECTION_STATUS,
            Category::Event,
        ));
        if let Some(uri) = uri {
            component.add_data_item(
                DataItem::new(
                    format!("{adapter_id}_uri"),
                    data_item_type::ADAPTER_URI,
                    Category::Event,
                )
                .constant(uri),
            );
        }
        component.add_data_item(DataItem::new(
            format!("{adapter_id}_obs_rate"),
            data_item_type::OBSERVATION_UPDATE_RATE,
            Category::Sample,
        ));
        component.add_data_item(DataItem::new(
            format!("{adapter_id}_asset_rate"),
            data_item_type::ASSET_UPDATE_RATE,
            Category::Sample,
        ));
        component.add_data_item(DataItem::new(
            format!("{adapter_id}_sw_version"),
            data_item_type::ADAPTER_SOFTWARE_VERSION,
            Category::Event,
        ));
        component.add_data_item(DataItem::new(
            format!("{adapter_id}_mtconnect_version"),
            data_item_type::MTCONNECT_VERSION,
            Category::Event,
        ));

        let agent = self
            .devices
            .iter_mut()
            .find(|d| d.name == AGENT_DEVICE_NAME)
            .ok_or_else(|| BuildError::MissingRequiredField {
                field: "Agent device (call add_agent_device first)".into(),
            })?;
        let adapters = agent
            .children
            .iter_mut()
            .find(|c| c.id == ADAPTERS_CONTAINER_ID)
            .ok_or_else(|| BuildError::MissingRequiredField {
                field: "Adapters container".into(),
            })?;
        adapters.add_child(component);
        self.reindex()
    }

    pub fn get_device_by_name(&self, name: &str) -> Option<&Component> {
        self.devices.iter().find_map(|d| d.find_by_name(name))
    }

    pub fn get_data_item(&self, id: &str) -> Option<&DataItem> {
        let device_idx = *self.index.get(id)?;
        self.devices[device_idx].find_data_item(id)
    }

    pub fn devices(&self) -> &[Component] {
        &self.devices
    }

    pub fn all_data_items(&self) -> Vec<&DataItem> {
        let mut out = Vec::new();
        for device in &self.devices {
            device.walk_data_items(&mut out);
        }
        out
    }

    /// Filter data items against an XPath-like `path` selector (spec §4.7
    /// `/current`, `/sample`). Full XPath against the device model is out of
    /// scope here; the last `/`-separated segment (predicates like
    /// `[@type='POSITION']` stripped) is matched case-insensitively against
    /// each item's id or data type. An empty path selects everything.
    pub fn select_by_path(&self, path: &str) -> Vec<&DataItem> {
        let token = path_selector_token(path);
        let all = self.all_data_items();
        if token.is_empty() {
            return all;
        }
        all.into_iter()
            .filter(|item| item.id.eq_ignore_ascii_case(&token) || item.data_type.eq_ignore_ascii_case(&token))
            .collect()
    }

    fn reindex(&mut self) -> Result<(), BuildError> {
        let mut index = HashMap::new();
        for (device_idx, device) in self.devices.iter().enumerate() {
            let mut items = Vec::new();
            device.walk_data_items(&mut items);
            for item in items {
                if index.insert(item.id.clone(), device_idx).is_some() {
                    return Err(BuildError::DuplicateDataItemId { id: item.id.clone() });
                }
            }
        }
        self.index = index;
        Ok(())
    }
}

fn path_selector_token(path: &str) -> String {
    let last = path.split('/').filter(|s| !s.is_empty()).last().unwrap_or("");
    if let Some(start) = last.find('[') {
        let end = last.rfind(']').unwrap_or(last.len());
        let predicate = &last[start + 1..end];
        if let Some((_, value)) = predicate.split_once('=') {
            return value.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        }
    }
    last.trim().to_string()
}
