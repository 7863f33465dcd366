use thiserror::Error;

use super::{Component, DataItem, DeviceModel};

/// Distinctly-typed build failures, grounded on the original's entity-parser
/// error categories ("required property missing" / "unexpected property" /
/// "invalid value" in `xml_parser.cpp`) so an external XML/JSON loader can
/// report precisely what went wrong (spec §4.1: duplicate ids are fatal).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("duplicate data item id: {id}")]
    DuplicateDataItemId { id: String },
    #[error("component ref {component_id:?} does not exist in this model")]
    UnknownComponentRef { component_id: String },
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },
}

/// Incremental, fallible builder for a [`DeviceModel`], used by whatever
/// external loader parses the device description (spec §1: the load path is
/// external, the in-memory representation and its construction errors are
/// not).
#[derive(Debug, Default)]
pub struct DeviceModelBuilder {
    model: DeviceModel,
}

impl DeviceModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_device(mut self) -> Result<Self, BuildError> {
        self.model.add_agent_device()?;
        Ok(self)
    }

    pub fn add_device(mut self, device: Component) -> Result<Self, BuildError> {
        self.model.add_device(device)?;
        Ok(self)
    }

    /// Attach a bare data item to an existing component by id, validating
    /// the component reference exists before mutating anything.
    pub fn add_data_item_to(
        mut self,
        component_id: &str,
        item: DataItem,
    ) -> Result<Self, BuildError> {
        let exists = self
            .model
            .devices()
            .iter()
            .any(|d| component_contains(d, component_id));
        if !exists {
            return Err(BuildError::UnknownComponentRef {
                component_id: component_id.to_string(),
            });
        }
        for device in &mut self.model.devices {
            if attach(device, component_id, item.clone()) {
                break;
            }
        }
        self.model.reindex()?;
        Ok(self)
    }

    pub fn build(self) -> Result<DeviceModel, BuildError> {
        if self.model.devices().is_empty() {
            return Err(BuildError::MissingRequiredField {
                field: "at least one device".into(),
            });
        }
        Ok(self.model)
    }
}

fn component_contains(component: &Component, id: &str) -> bool {
    component.id == id || component.children.iter().any(|c| component_contains(c, id))
}

fn attach(component: &mut Component, id: &str, item: DataItem) -> bool {
    if component.id == id {
        component.add_data_item(item);
        return true;
    }
    component.children.iter_mut().any(|c| attach(c, id, item.clone()))
}
