//! Serializers for timestamps as Unix seconds.

use serde::Serializer;
use time::OffsetDateTime;

pub use time::serde::timestamp::serialize;

/// Serializes an optional timestamp as Unix seconds or `null`.
pub fn serialize_option<S: Serializer>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_some(&value.unix_timestamp()),
        None => serializer.serialize_none(),
    }
}
