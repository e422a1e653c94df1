//! Field renaming between in-memory types and on-disk documents.
//!
//! Settings files spell field names in kebab-case regardless of how the
//! Rust type spells them. The rewrite happens inside the serde layer,
//! where struct fields are distinguishable from map entries: only struct
//! (and struct variant) fields are renamed, so keys in user data maps
//! pass through untouched in both directions.
//!
//! The serializer also drops struct fields that render as `null`, so an
//! absent optional setting is omitted from the file instead of written
//! as an explicit `null`. Unknown incoming fields are ignored by serde's
//! defaults, which keeps old files readable after a field is removed.

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use serde::ser::{self, Impossible, Serialize};
use serde_json::{Error as JsonError, Map, Value};

/// Serialize a value into a JSON tree with kebab-case struct fields.
pub(crate) fn to_document_value<T: Serialize>(value: &T) -> Result<Value, JsonError> {
    value.serialize(ValueSer)
}

/// Deserialize a value from a JSON tree, accepting kebab-case spellings
/// of the target type's struct fields.
pub(crate) fn from_document_value<T: DeserializeOwned>(value: Value) -> Result<T, JsonError> {
    T::deserialize(ValueDe { value })
}

fn outgoing_field_name(field: &'static str) -> String {
    if field.contains('_') {
        field.replace('_', "-")
    } else {
        field.to_string()
    }
}

/// Map an incoming document key onto one of the struct's declared fields.
///
/// Exact matches win, so a field carrying its own `#[serde(rename)]` is
/// never second-guessed; otherwise the kebab spelling is folded back to
/// snake case when that names a declared field. Unmatched keys pass
/// through for serde to ignore.
fn incoming_field_name(key: String, fields: &'static [&'static str]) -> String {
    if fields.is_empty() || fields.contains(&key.as_str()) {
        return key;
    }
    if key.contains('-') {
        let snake = key.replace('-', "_");
        if fields.contains(&snake.as_str()) {
            return snake;
        }
    }
    key
}

fn value_unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                de::Unexpected::Unsigned(u)
            } else if let Some(i) = n.as_i64() {
                de::Unexpected::Signed(i)
            } else {
                de::Unexpected::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => de::Unexpected::Str(s),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
    }
}

// ==================== Serializer ====================

struct ValueSer;

impl ser::Serializer for ValueSer {
    type Ok = Value;
    type Error = JsonError;

    type SerializeSeq = SeqSer;
    type SerializeTuple = SeqSer;
    type SerializeTupleStruct = SeqSer;
    type SerializeTupleVariant = TupleVariantSer;
    type SerializeMap = MapSer;
    type SerializeStruct = StructSer;
    type SerializeStructVariant = StructVariantSer;

    fn serialize_bool(self, v: bool) -> Result<Value, JsonError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, JsonError> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, JsonError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, JsonError> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, JsonError> {
        Ok(Value::Array(v.iter().map(|&b| Value::from(b)).collect()))
    }

    fn serialize_none(self) -> Result<Value, JsonError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, JsonError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, JsonError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, JsonError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, JsonError> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, JsonError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, JsonError> {
        let mut object = Map::new();
        object.insert(variant.to_owned(), value.serialize(ValueSer)?);
        Ok(Value::Object(object))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqSer, JsonError> {
        Ok(SeqSer {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqSer, JsonError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqSer, JsonError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantSer, JsonError> {
        Ok(TupleVariantSer {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapSer, JsonError> {
        Ok(MapSer {
            entries: Map::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<StructSer, JsonError> {
        Ok(StructSer { fields: Map::new() })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructVariantSer, JsonError> {
        Ok(StructVariantSer {
            variant,
            fields: Map::new(),
        })
    }
}

struct SeqSer {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), JsonError> {
        self.items.push(value.serialize(ValueSer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), JsonError> {
        self.items.push(value.serialize(ValueSer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), JsonError> {
        self.items.push(value.serialize(ValueSer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        Ok(Value::Array(self.items))
    }
}

struct TupleVariantSer {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for TupleVariantSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), JsonError> {
        self.items.push(value.serialize(ValueSer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        let mut object = Map::new();
        object.insert(self.variant.to_owned(), Value::Array(self.items));
        Ok(Value::Object(object))
    }
}

struct MapSer {
    entries: Map<String, Value>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MapSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), JsonError> {
        self.pending_key = Some(key.serialize(MapKeySer)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), JsonError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| ser::Error::custom("map value serialized before its key"))?;
        self.entries.insert(key, value.serialize(ValueSer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        Ok(Value::Object(self.entries))
    }
}

struct StructSer {
    fields: Map<String, Value>,
}

impl ser::SerializeStruct for StructSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), JsonError> {
        let rendered = value.serialize(ValueSer)?;
        if !rendered.is_null() {
            self.fields.insert(outgoing_field_name(key), rendered);
        }
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        Ok(Value::Object(self.fields))
    }
}

struct StructVariantSer {
    variant: &'static str,
    fields: Map<String, Value>,
}

impl ser::SerializeStructVariant for StructVariantSer {
    type Ok = Value;
    type Error = JsonError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), JsonError> {
        let rendered = value.serialize(ValueSer)?;
        if !rendered.is_null() {
            self.fields.insert(outgoing_field_name(key), rendered);
        }
        Ok(())
    }

    fn end(self) -> Result<Value, JsonError> {
        let mut object = Map::new();
        object.insert(self.variant.to_owned(), Value::Object(self.fields));
        Ok(Value::Object(object))
    }
}

/// Renders map keys, which must already be string-like.
struct MapKeySer;

fn key_must_be_string() -> JsonError {
    ser::Error::custom("map key must be a string")
}

impl ser::Serializer for MapKeySer {
    type Ok = String;
    type Error = JsonError;

    type SerializeSeq = Impossible<String, JsonError>;
    type SerializeTuple = Impossible<String, JsonError>;
    type SerializeTupleStruct = Impossible<String, JsonError>;
    type SerializeTupleVariant = Impossible<String, JsonError>;
    type SerializeMap = Impossible<String, JsonError>;
    type SerializeStruct = Impossible<String, JsonError>;
    type SerializeStructVariant = Impossible<String, JsonError>;

    fn serialize_bool(self, _v: bool) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_f64(self, _v: f64) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_char(self, v: char) -> Result<String, JsonError> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String, JsonError> {
        Ok(v.to_owned())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_none(self) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_unit(self) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String, JsonError> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, JsonError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, JsonError> {
        Err(key_must_be_string())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, JsonError> {
        Err(key_must_be_string())
    }
}

// ==================== Deserializer ====================

struct ValueDe {
    value: Value,
}

impl<'de> de::Deserializer<'de> for ValueDe {
    type Error = JsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => visit_number(n, visitor),
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => visitor.visit_seq(SeqDe {
                iter: items.into_iter(),
            }),
            Value::Object(map) => visitor.visit_map(MapDe::new(map, &[])),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            value => visitor.visit_some(ValueDe { value }),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        match self.value {
            Value::Object(map) => visitor.visit_map(MapDe::new(map, fields)),
            Value::Array(items) => visitor.visit_seq(SeqDe {
                iter: items.into_iter(),
            }),
            other => Err(de::Error::invalid_type(value_unexpected(&other), &visitor)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        match self.value {
            Value::String(s) => visitor.visit_enum(s.into_deserializer()),
            Value::Object(map) => {
                let mut entries = map.into_iter();
                let (variant, value) = match entries.next() {
                    Some(entry) => entry,
                    None => {
                        return Err(de::Error::custom(
                            "expected an enum variant, got an empty object",
                        ));
                    }
                };
                if entries.next().is_some() {
                    return Err(de::Error::custom(
                        "expected a single-key object for an enum variant",
                    ));
                }
                visitor.visit_enum(EnumDe { variant, value })
            }
            other => Err(de::Error::invalid_type(value_unexpected(&other), &visitor)),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier
        ignored_any
    }
}

fn visit_number<'de, V: Visitor<'de>>(
    n: serde_json::Number,
    visitor: V,
) -> Result<V::Value, JsonError> {
    if let Some(u) = n.as_u64() {
        visitor.visit_u64(u)
    } else if let Some(i) = n.as_i64() {
        visitor.visit_i64(i)
    } else if let Some(f) = n.as_f64() {
        visitor.visit_f64(f)
    } else {
        Err(de::Error::custom("number is out of representable range"))
    }
}

struct SeqDe {
    iter: std::vec::IntoIter<Value>,
}

impl<'de> SeqAccess<'de> for SeqDe {
    type Error = JsonError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, JsonError> {
        match self.iter.next() {
            Some(value) => seed.deserialize(ValueDe { value }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDe {
    iter: serde_json::map::IntoIter,
    pending: Option<Value>,
    fields: &'static [&'static str],
}

impl MapDe {
    fn new(map: Map<String, Value>, fields: &'static [&'static str]) -> Self {
        Self {
            iter: map.into_iter(),
            pending: None,
            fields,
        }
    }
}

impl<'de> MapAccess<'de> for MapDe {
    type Error = JsonError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, JsonError> {
        match self.iter.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                let key = incoming_field_name(key, self.fields);
                seed.deserialize(key.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<T::Value, JsonError> {
        match self.pending.take() {
            Some(value) => seed.deserialize(ValueDe { value }),
            None => Err(de::Error::custom("map value requested before its key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumDe {
    variant: String,
    value: Value,
}

impl<'de> EnumAccess<'de> for EnumDe {
    type Error = JsonError;
    type Variant = VariantDe;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, VariantDe), JsonError> {
        let tag = seed.deserialize(self.variant.into_deserializer())?;
        Ok((tag, VariantDe { value: self.value }))
    }
}

struct VariantDe {
    value: Value,
}

impl<'de> VariantAccess<'de> for VariantDe {
    type Error = JsonError;

    fn unit_variant(self) -> Result<(), JsonError> {
        match self.value {
            Value::Null => Ok(()),
            other => Err(de::Error::invalid_type(
                value_unexpected(&other),
                &"unit variant",
            )),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, JsonError> {
        seed.deserialize(ValueDe { value: self.value })
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, JsonError> {
        match self.value {
            Value::Array(items) => visitor.visit_seq(SeqDe {
                iter: items.into_iter(),
            }),
            other => Err(de::Error::invalid_type(
                value_unexpected(&other),
                &"tuple variant",
            )),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        match self.value {
            Value::Object(map) => visitor.visit_map(MapDe::new(map, fields)),
            other => Err(de::Error::invalid_type(
                value_unexpected(&other),
                &"struct variant",
            )),
        }
    }
}
