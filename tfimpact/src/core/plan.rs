//! Typed view of `terraform show -json <planfile>` and read-only queries over it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::value::TfValue;

/// Decoded plan. Sections missing from the JSON default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanDocument {
    pub format_version: Option<String>,
    pub planned_values: PlannedValues,
    pub resource_changes: Vec<ResourceChange>,
}

impl PlanDocument {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedValues {
    pub root_module: PlannedModule,
    pub outputs: BTreeMap<String, PlannedOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedModule {
    pub address: Option<String>,
    pub resources: Vec<PlannedResource>,
    pub child_modules: Vec<PlannedModule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedResource {
    pub address: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedOutput {
    pub value: Value,
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceChange {
    pub address: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub change: Change,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Change {
    pub actions: Vec<Action>,
}

/// Action verb in `change.actions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    Update,
    Delete,
    Read,
    NoOp,
    #[serde(other)]
    Other,
}

/// Read-only queries over a [`PlanDocument`].
#[derive(Debug, Clone, Copy)]
pub struct PlanAnalyzer<'a> {
    plan: &'a PlanDocument,
}

impl<'a> PlanAnalyzer<'a> {
    pub fn new(plan: &'a PlanDocument) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &'a PlanDocument {
        self.plan
    }

    /// Planned resources of the root module and every child module, depth-first.
    pub fn planned_resources(&self) -> Vec<&'a PlannedResource> {
        let mut out = Vec::new();
        collect_resources(&self.plan.planned_values.root_module, &mut out);
        out
    }

    pub fn resource_changes(&self) -> &'a [ResourceChange] {
        &self.plan.resource_changes
    }

    pub fn resources_to_create(&self) -> Vec<&'a ResourceChange> {
        self.changes_with_only(Action::Create)
    }

    pub fn resources_to_update(&self) -> Vec<&'a ResourceChange> {
        self.changes_with_only(Action::Update)
    }

    /// Replacements (`["delete","create"]` or the reverse) are not included.
    pub fn resources_to_delete(&self) -> Vec<&'a ResourceChange> {
        self.changes_with_only(Action::Delete)
    }

    pub fn resources_by_type(&self, resource_type: &str) -> Vec<&'a PlannedResource> {
        self.planned_resources()
            .into_iter()
            .filter(|resource| resource.resource_type == resource_type)
            .collect()
    }

    pub fn has_resource_type(&self, resource_type: &str) -> bool {
        !self.resources_by_type(resource_type).is_empty()
    }

    pub fn resource_count(&self) -> usize {
        self.planned_resources().len()
    }

    /// True if every resource of `resource_type` has every expected attribute value.
    ///
    /// Holds vacuously when the plan has no resource of that type.
    pub fn resource_attributes_match(
        &self,
        resource_type: &str,
        expected: &BTreeMap<String, TfValue>,
    ) -> bool {
        self.resources_by_type(resource_type).iter().all(|resource| {
            expected
                .iter()
                .all(|(key, value)| resource.values.get(key) == Some(&value.to_json()))
        })
    }

    pub fn outputs(&self) -> &'a BTreeMap<String, PlannedOutput> {
        &self.plan.planned_values.outputs
    }

    pub fn output_value(&self, name: &str) -> Option<&'a Value> {
        self.outputs().get(name).map(|output| &output.value)
    }

    fn changes_with_only(&self, action: Action) -> Vec<&'a ResourceChange> {
        self.plan
            .resource_changes
            .iter()
            .filter(|change| change.change.actions == [action])
            .collect()
    }
}

fn collect_resources<'a>(module: &'a PlannedModule, out: &mut Vec<&'a PlannedResource>) {
    out.extend(module.resources.iter());
    for child in &module.child_modules {
        collect_resources(child, out);
    }
}
