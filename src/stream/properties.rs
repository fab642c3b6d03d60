//! Property maps carried by stream headers and events.
//!
//! Both maps are open, but names the row layout claims for itself are
//! rejected up front so user data can never shadow them.

use crate::error::{Result, StreamError};
use crate::storage::{PropertyMap, PropertyValue};

/// Names every table row reserves.
const SYSTEM_PROPERTIES: &[&str] = &["PartitionKey", "RowKey", "ETag", "Timestamp"];

/// Names reserved on the stream header row.
pub const RESERVED_STREAM_PROPERTIES: &[&str] = &["Version", "Start", "Count"];

/// Names reserved on event rows.
pub const RESERVED_EVENT_PROPERTIES: &[&str] = &["Version", "Id"];

fn check_name(name: &str, reserved: &[&str], owner: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StreamError::invalid_argument(format!(
            "{} property name is empty",
            owner
        )));
    }
    if SYSTEM_PROPERTIES.contains(&name) || reserved.contains(&name) {
        return Err(StreamError::invalid_argument(format!(
            "{:?} is a reserved {} property name",
            name, owner
        )));
    }
    Ok(())
}

/// Strip the reserved names out of a stored row's properties.
fn without_reserved(mut properties: PropertyMap, reserved: &[&str]) -> PropertyMap {
    properties.retain(|name, _| {
        !SYSTEM_PROPERTIES.contains(&name.as_str()) && !reserved.contains(&name.as_str())
    });
    properties
}

/// User properties of a stream header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamProperties(PropertyMap);

impl StreamProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing map, rejecting reserved names.
    pub fn from_map(map: PropertyMap) -> Result<Self> {
        for name in map.keys() {
            check_name(name, RESERVED_STREAM_PROPERTIES, "stream")?;
        }
        Ok(Self(map))
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Result<Self> {
        let name = name.into();
        check_name(&name, RESERVED_STREAM_PROPERTIES, "stream")?;
        self.0.insert(name, value.into());
        Ok(self)
    }

    /// Recover user properties from a stored header row.
    pub(crate) fn from_row(properties: PropertyMap) -> Self {
        Self(without_reserved(properties, RESERVED_STREAM_PROPERTIES))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &PropertyMap {
        &self.0
    }
}

/// User properties of an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventProperties(PropertyMap);

impl EventProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: PropertyMap) -> Result<Self> {
        for name in map.keys() {
            check_name(name, RESERVED_EVENT_PROPERTIES, "event")?;
        }
        Ok(Self(map))
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Result<Self> {
        let name = name.into();
        check_name(&name, RESERVED_EVENT_PROPERTIES, "event")?;
        self.0.insert(name, value.into());
        Ok(self)
    }

    pub(crate) fn from_row(properties: PropertyMap) -> Self {
        Self(without_reserved(properties, RESERVED_EVENT_PROPERTIES))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &PropertyMap {
        &self.0
    }
}
