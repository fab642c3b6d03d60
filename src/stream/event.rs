//! Pending and recorded events.

use std::collections::HashSet;

use super::{EventProperties, Include};

/// An event waiting to be appended.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    id: Option<String>,
    properties: EventProperties,
    includes: Vec<Include>,
}

impl EventData {
    pub fn new(properties: EventProperties) -> Self {
        Self {
            properties,
            ..Default::default()
        }
    }

    /// Set the id used for duplicate detection. An empty id disables it.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.id = (!id.is_empty()).then_some(id);
        self
    }

    /// Add a side-effect operation written in the same batch as this event.
    pub fn include(mut self, include: Include) -> Self {
        self.includes.push(include);
        self
    }

    pub fn with_includes(mut self, includes: impl IntoIterator<Item = Include>) -> Self {
        self.includes.extend(includes);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn properties(&self) -> &EventProperties {
        &self.properties
    }

    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    pub(crate) fn record(self, version: u64) -> RecordedEvent {
        RecordedEvent {
            version,
            id: self.id,
            properties: self.properties,
            includes: self.includes,
        }
    }
}

/// An event with its assigned stream version.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    version: u64,
    id: Option<String>,
    properties: EventProperties,
    includes: Vec<Include>,
}

impl RecordedEvent {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn properties(&self) -> &EventProperties {
        &self.properties
    }

    pub fn includes(&self) -> &[Include] {
        &self.includes
    }

    /// Store operations this event contributes to a batch before include
    /// folding: its event row, its id row (if any) and each include.
    pub fn operations(&self) -> usize {
        1 + usize::from(self.id.is_some()) + self.includes.len()
    }

    /// Upper bound on the operations this event adds once its includes are
    /// folded: every included row counts once, however often it is touched.
    pub fn folded_operations(&self) -> usize {
        let rows: HashSet<&str> = self
            .includes
            .iter()
            .map(|include| include.entity().row_key())
            .collect();
        1 + usize::from(self.id.is_some()) + rows.len()
    }
}

/// An event row read back from a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub version: u64,
    pub id: Option<String>,
    pub properties: EventProperties,
}
