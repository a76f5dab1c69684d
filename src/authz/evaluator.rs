use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::resources;

/// Denormalized permission structure attached to a role: resource name to
/// the set of action names the role may perform on it. Keys are plain
/// strings decoupled from the resources/actions tables, so renaming a
/// Resource or Action row does not cascade into existing structures.
///
/// The `ALL` key is a fallback grant: it answers for any resource that is
/// not explicitly keyed. Missing keys are never an error - absence means
/// no permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, BTreeSet<String>>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant, mostly for seeding and tests.
    pub fn grant(mut self, resource: &str, actions: &[&str]) -> Self {
        self.0.insert(
            resource.to_string(),
            actions.iter().map(|action| action.to_string()).collect(),
        );
        self
    }

    fn lookup(&self, resource: &str) -> Option<&BTreeSet<String>> {
        self.0.get(resource).or_else(|| self.0.get(resources::ALL))
    }

    /// Actions granted on `resource`: the explicit entry when present,
    /// otherwise the `ALL` entry, otherwise nothing. Asking for `ALL`
    /// itself hits the explicit branch, so there is no self-recursion.
    pub fn actions_for(&self, resource: &str) -> BTreeSet<String> {
        self.lookup(resource).cloned().unwrap_or_default()
    }

    /// Exact, case-sensitive membership test.
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.lookup(resource)
            .map_or(false, |granted| granted.contains(action))
    }

    /// Enumerate grants across every known resource. A structure holding
    /// `ALL` reports that same action set for each known resource except
    /// the `ALL` pseudo-resource itself; otherwise the explicit structure
    /// is returned verbatim.
    pub fn all_resource_actions(
        &self,
        known_resources: &[String],
    ) -> BTreeMap<String, BTreeSet<String>> {
        match self.0.get(resources::ALL) {
            Some(fallback) => known_resources
                .iter()
                .filter(|name| name.as_str() != resources::ALL)
                .map(|name| (name.clone(), fallback.clone()))
                .collect(),
            None => self.0.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
