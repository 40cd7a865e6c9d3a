//! Whole-map blob encoding.
//!
//! The blob is a JSON object. Known attributes come first in schema order,
//! followed by preserved unknown keys in sorted order.

use super::coerce::coerce;
use super::{CodecError, CodecResult};
use crate::model::value::Slot;
use crate::schema::StoreSchema;
use log::warn;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Decoded contents of one attribute blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    /// Values for attributes known to the schema.
    pub values: BTreeMap<String, Slot>,
    /// Keys the schema does not (or no longer) understand, kept verbatim.
    pub extras: BTreeMap<String, Json>,
}

impl AttributeMap {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extras.is_empty()
    }
}

struct OrderedObject<'a>(Vec<(&'a str, Json)>);

impl Serialize for OrderedObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Serializes `map` into one blob.
///
/// Values for names absent from `schema` are ignored; unknown keys must be
/// carried in `extras` to be preserved.
pub fn encode_map(map: &AttributeMap, schema: &StoreSchema) -> CodecResult<Vec<u8>> {
    let mut entries: Vec<(&str, Json)> = Vec::with_capacity(map.values.len() + map.extras.len());

    for definition in schema.attributes() {
        if let Some(slot) = map.values.get(definition.name()) {
            let json = slot.as_ref().map_or(Json::Null, |value| value.to_json());
            entries.push((definition.name(), json));
        }
    }
    for (key, raw) in &map.extras {
        if entries.iter().any(|(name, _)| *name == key.as_str()) {
            continue;
        }
        entries.push((key.as_str(), raw.clone()));
    }

    Ok(serde_json::to_vec(&OrderedObject(entries))?)
}

/// Parses a blob produced by `encode_map`.
///
/// Empty input decodes to an empty map. A stored value that no longer fits
/// its attribute type is kept in `extras` and reads fall back to the default.
pub fn decode_map(blob: &[u8], schema: &StoreSchema) -> CodecResult<AttributeMap> {
    let mut decoded = AttributeMap::default();
    if blob.iter().all(u8::is_ascii_whitespace) {
        return Ok(decoded);
    }

    let object: serde_json::Map<String, Json> =
        serde_json::from_slice(blob).map_err(|err| CodecError::MalformedBlob(err.to_string()))?;

    for (key, raw) in object {
        let Some(definition) = schema.attribute(&key) else {
            decoded.extras.insert(key, raw);
            continue;
        };
        match coerce(&key, &raw, definition.attr_type()) {
            Ok(slot) => {
                decoded.values.insert(key, slot);
            }
            Err(_) => {
                warn!(
                    "event=decode_passthrough module=codec status=warn store={} attribute={} expected_type={}",
                    schema.name(),
                    key,
                    definition.attr_type()
                );
                decoded.extras.insert(key, raw);
            }
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::{decode_map, encode_map, AttributeMap};
    use crate::codec::CodecError;
    use crate::model::value::AttrValue;
    use crate::schema::{AttributeOptions, SchemaRegistry, StoreOptions, StoreSchema};
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Arc<StoreSchema> {
        let mut registry = SchemaRegistry::new();
        registry
            .define("Post", "settings", StoreOptions::inline(), |s| {
                s.string("title", AttributeOptions::new())?;
                s.boolean("allow_comments", AttributeOptions::new().default(true))?;
                s.integer("limit", AttributeOptions::new())?;
                Ok(())
            })
            .expect("schema should build")
    }

    #[test]
    fn encode_orders_keys_by_schema_then_extras() {
        let schema = schema();
        let mut map = AttributeMap::default();
        map.values
            .insert("limit".to_string(), Some(AttrValue::Integer(3)));
        map.values
            .insert("title".to_string(), Some(AttrValue::String("hi".to_string())));
        map.extras.insert("zeta".to_string(), json!([1, 2]));
        map.extras.insert("alpha".to_string(), json!(null));

        let blob = encode_map(&map, &schema).expect("encode");
        assert_eq!(
            String::from_utf8(blob).expect("utf8"),
            r#"{"title":"hi","limit":3,"alpha":null,"zeta":[1,2]}"#
        );
    }

    #[test]
    fn decode_keeps_unknown_keys_and_omits_missing_ones() {
        let schema = schema();
        let decoded = decode_map(br#"{"limit":5,"legacy":{"x":1}}"#, &schema).expect("decode");
        assert_eq!(decoded.values.len(), 1);
        assert_eq!(decoded.values["limit"], Some(AttrValue::Integer(5)));
        assert!(!decoded.values.contains_key("title"));
        assert_eq!(decoded.extras["legacy"], json!({"x": 1}));
    }

    #[test]
    fn decode_moves_mistyped_values_into_extras() {
        let schema = schema();
        let decoded = decode_map(br#"{"limit":"lots"}"#, &schema).expect("decode");
        assert!(decoded.values.is_empty());
        assert_eq!(decoded.extras["limit"], json!("lots"));

        let reencoded = encode_map(&decoded, &schema).expect("encode");
        assert_eq!(reencoded, br#"{"limit":"lots"}"#.to_vec());
    }

    #[test]
    fn empty_blob_decodes_to_empty_map() {
        let schema = schema();
        assert!(decode_map(b"", &schema).expect("empty").is_empty());
        assert!(decode_map(b"  ", &schema).expect("blank").is_empty());
    }

    #[test]
    fn malformed_blob_is_rejected() {
        let schema = schema();
        let err = decode_map(b"[1,2]", &schema).expect_err("array is not a map");
        assert!(matches!(err, CodecError::MalformedBlob(_)));
    }

    #[test]
    fn explicit_null_round_trips() {
        let schema = schema();
        let decoded = decode_map(br#"{"allow_comments":null}"#, &schema).expect("decode");
        assert_eq!(decoded.values["allow_comments"], None);
        assert_eq!(
            encode_map(&decoded, &schema).expect("encode"),
            br#"{"allow_comments":null}"#.to_vec()
        );
    }
}
