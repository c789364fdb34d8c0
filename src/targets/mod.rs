// Targets Module
// "Mark the quarry before the dive"

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a target is a single host or a label grouping many hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    #[serde(rename = "hosts", alias = "host")]
    Host,
    #[serde(rename = "labels", alias = "label")]
    Label,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Host => write!(f, "host"),
            TargetKind::Label => write!(f, "label"),
        }
    }
}

/// A host or label read from the backend catalog. Never mutated by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,
    #[serde(default)]
    pub display_text: String,
    #[serde(rename = "target_type")]
    pub kind: TargetKind,
    #[serde(default)]
    pub selected: bool,
}

impl Target {
    pub fn host(id: u64, hostname: impl Into<String>) -> Self {
        Self {
            id,
            display_text: hostname.into(),
            kind: TargetKind::Host,
            selected: false,
        }
    }

    pub fn label(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            display_text: name.into(),
            kind: TargetKind::Label,
            selected: false,
        }
    }

    fn key(&self) -> (TargetKind, u64) {
        (self.kind, self.id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} ({})", self.kind, self.id, self.display_text)
    }
}

/// Wire shape of a selection: `{hosts: [ids], labels: [ids]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedTargets {
    #[serde(default)]
    pub hosts: Vec<u64>,
    #[serde(default)]
    pub labels: Vec<u64>,
}

impl SelectedTargets {
    pub fn new(hosts: Vec<u64>, labels: Vec<u64>) -> Self {
        let mut selected = Self::default();
        for id in hosts {
            selected.push(TargetKind::Host, id);
        }
        for id in labels {
            selected.push(TargetKind::Label, id);
        }
        selected
    }

    /// Split a mixed target list into host and label ids, keeping order.
    pub fn from_targets<'a, I>(targets: I) -> Self
    where
        I: IntoIterator<Item = &'a Target>,
    {
        let mut selected = Self::default();
        for target in targets {
            selected.push(target.kind, target.id);
        }
        selected
    }

    fn push(&mut self, kind: TargetKind, id: u64) {
        let ids = match kind {
            TargetKind::Host => &mut self.hosts,
            TargetKind::Label => &mut self.labels,
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len() + self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.labels.is_empty()
    }
}

/// Client-owned selection of targets for the next run.
///
/// `start()` takes a [`SelectedTargets`] snapshot by value, so editing the
/// selection afterwards never affects a run that is already streaming.
#[derive(Debug, Clone, Default)]
pub struct TargetSelector {
    selected: Vec<Target>,
}

impl TargetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target. Selecting an already selected target is a no-op.
    pub fn select(&mut self, target: Target) -> bool {
        if self.is_selected(&target) {
            return false;
        }
        self.selected.push(Target {
            selected: true,
            ..target
        });
        true
    }

    pub fn deselect(&mut self, target: &Target) -> bool {
        let before = self.selected.len();
        self.selected.retain(|t| t.key() != target.key());
        before != self.selected.len()
    }

    /// Flip membership; returns whether the target is selected afterwards.
    pub fn toggle(&mut self, target: Target) -> bool {
        if self.deselect(&target) {
            false
        } else {
            self.select(target)
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, target: &Target) -> bool {
        self.selected.iter().any(|t| t.key() == target.key())
    }

    pub fn selected(&self) -> &[Target] {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn snapshot(&self) -> SelectedTargets {
        SelectedTargets::from_targets(&self.selected)
    }
}

/// Result of a target search against the backend catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSearch {
    #[serde(default)]
    pub hosts: Vec<Target>,
    #[serde(default)]
    pub labels: Vec<Target>,
    #[serde(default)]
    pub targets_count: u64,
    #[serde(default)]
    pub targets_online: u64,
    #[serde(default)]
    pub targets_missing_in_action: u64,
}

impl TargetSearch {
    pub fn all(&self) -> impl Iterator<Item = &Target> {
        self.hosts.iter().chain(self.labels.iter())
    }
}
