//! Row keys and row layout of a stream.
//!
//! Every stream lives in one partition and uses three row kinds:
//!
//! | Row | Row key | Properties |
//! |-----|---------|------------|
//! | Header | `{prefix}SS-HEAD` | `Version`, `Start`, `Count` + stream properties |
//! | Event | `{prefix}SS-SE-{version:010}` | `Version`, `Id` (optional) + event properties |
//! | Event id | `{prefix}SS-UID-{id}` | `Version` |
//!
//! `{prefix}` is the virtual-partition prefix (empty for plain partitions).
//! Versions are zero-padded so lexicographic order equals version order,
//! which the range reads rely on. This layout is the persisted contract.

use crate::error::{Result, StreamError};
use crate::storage::{PropertyValue, Row};

use super::{EventProperties, Partition, RecordedEvent, StreamEvent, StreamHeader, StreamProperties};

pub const HEADER_ROW_KEY: &str = "SS-HEAD";
pub const EVENT_ROW_KEY_PREFIX: &str = "SS-SE-";
pub const EVENT_ID_ROW_KEY_PREFIX: &str = "SS-UID-";

/// Digits in the zero-padded version suffix of an event row key.
pub const VERSION_WIDTH: usize = 10;

/// Highest version representable in an event row key.
pub const MAX_VERSION: u64 = 9_999_999_999;

pub const VERSION_PROPERTY: &str = "Version";
pub const START_PROPERTY: &str = "Start";
pub const COUNT_PROPERTY: &str = "Count";
pub const ID_PROPERTY: &str = "Id";

pub fn header_row_key(partition: &Partition) -> String {
    format!("{}{}", partition.row_key_prefix(), HEADER_ROW_KEY)
}

pub fn event_row_key(partition: &Partition, version: u64) -> Result<String> {
    if version == 0 || version > MAX_VERSION {
        return Err(StreamError::invalid_argument(format!(
            "event version must be between 1 and {}, got {}",
            MAX_VERSION, version
        )));
    }
    Ok(format!(
        "{}{}{:0width$}",
        partition.row_key_prefix(),
        EVENT_ROW_KEY_PREFIX,
        version,
        width = VERSION_WIDTH
    ))
}

pub fn event_id_row_key(partition: &Partition, id: &str) -> String {
    format!("{}{}{}", partition.row_key_prefix(), EVENT_ID_ROW_KEY_PREFIX, id)
}

/// Extract the version from an event row key of `partition`.
pub fn parse_event_row_key(partition: &Partition, row_key: &str) -> Result<u64> {
    let invalid = |reason: &str| StreamError::InvalidRowKey {
        row_key: row_key.to_string(),
        reason: reason.to_string(),
    };

    let suffix = row_key
        .strip_prefix(partition.row_key_prefix())
        .and_then(|rest| rest.strip_prefix(EVENT_ROW_KEY_PREFIX))
        .ok_or_else(|| invalid("not an event row key"))?;

    if suffix.len() != VERSION_WIDTH {
        return Err(invalid("version suffix has wrong length"));
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("version suffix is not numeric"));
    }

    let version: u64 = suffix
        .parse()
        .map_err(|_| invalid("version suffix is not numeric"))?;
    if version == 0 {
        return Err(invalid("version must be at least 1"));
    }
    Ok(version)
}

fn version_value(version: u64) -> PropertyValue {
    // MAX_VERSION fits in i64
    PropertyValue::Int64(version as i64)
}

fn read_counter(row: &Row, name: &str) -> Result<u64> {
    match row.property(name) {
        None => Ok(0),
        Some(value) => value
            .as_i64()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| {
                StreamError::UnexpectedBackendResponse(format!(
                    "row {:?} has invalid {} property: {:?}",
                    row.row_key, name, value
                ))
            }),
    }
}

/// Header row for `header`, carrying its etag as the write condition.
pub fn header_row(header: &StreamHeader) -> Row {
    let partition = header.partition();
    let mut row = Row::new(partition.partition_key(), header_row_key(partition));
    row.etag = header.etag().map(str::to_string);
    row.properties = header.properties().as_map().clone();
    row.properties
        .insert(VERSION_PROPERTY.to_string(), version_value(header.version()));
    row.properties
        .insert(START_PROPERTY.to_string(), version_value(header.start()));
    row.properties
        .insert(COUNT_PROPERTY.to_string(), version_value(header.count()));
    row
}

/// Rebuild a persistent header from its stored row.
pub fn header_from_row(partition: &Partition, row: Row) -> Result<StreamHeader> {
    let version = read_counter(&row, VERSION_PROPERTY)?;
    let start = read_counter(&row, START_PROPERTY)?;
    let count = read_counter(&row, COUNT_PROPERTY)?;
    let Row {
        etag, properties, ..
    } = row;
    if etag.as_deref().map_or(true, str::is_empty) {
        return Err(StreamError::UnexpectedBackendResponse(format!(
            "stored header of {} has no etag",
            partition
        )));
    }
    Ok(StreamHeader::stored(
        partition.clone(),
        etag,
        start,
        count,
        version,
        StreamProperties::from_row(properties),
    ))
}

pub fn event_row(partition: &Partition, event: &RecordedEvent) -> Result<Row> {
    let mut row = Row::new(
        partition.partition_key(),
        event_row_key(partition, event.version())?,
    );
    row.properties = event.properties().as_map().clone();
    row.properties
        .insert(VERSION_PROPERTY.to_string(), version_value(event.version()));
    if let Some(id) = event.id() {
        row.properties
            .insert(ID_PROPERTY.to_string(), PropertyValue::from(id));
    }
    Ok(row)
}

pub fn event_id_row(partition: &Partition, event: &RecordedEvent) -> Option<Row> {
    let id = event.id()?;
    Some(
        Row::new(partition.partition_key(), event_id_row_key(partition, id))
            .with_property(VERSION_PROPERTY, version_value(event.version())),
    )
}

/// Decode an event row read back from the store.
pub fn stream_event_from_row(partition: &Partition, row: Row) -> Result<StreamEvent> {
    let version = parse_event_row_key(partition, &row.row_key)?;
    let id = row
        .property(ID_PROPERTY)
        .and_then(PropertyValue::as_str)
        .map(str::to_string);
    Ok(StreamEvent {
        version,
        id,
        properties: EventProperties::from_row(row.properties),
    })
}
