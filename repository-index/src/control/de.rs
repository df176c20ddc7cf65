// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Deserialization of records from control file dialects. */

use {
    super::{Codec, Dialect, RawRecord, TIMESTAMP_TOKEN},
    crate::error::{RepositoryError, Result},
    serde::de::{
        value::SeqDeserializer, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess,
        SeqAccess, Visitor,
    },
};

/// Deserializes a parsed document.
///
/// Sequences map to every record. Anything else maps to the first record.
pub(crate) struct DocumentDeserializer<'a> {
    pub(crate) codec: &'a Codec,
    pub(crate) records: Vec<RawRecord>,
}

impl<'a> DocumentDeserializer<'a> {
    fn first(self) -> RecordDeserializer<'a> {
        RecordDeserializer {
            codec: self.codec,
            record: self.records.into_iter().next().unwrap_or_default(),
            nested: false,
        }
    }
}

impl<'de, 'a> Deserializer<'de> for DocumentDeserializer<'a> {
    type Error = RepositoryError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.first().deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.records.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(RecordsAccess {
            codec: self.codec,
            records: self.records.into_iter(),
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.first().deserialize_struct(name, fields, visitor)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct tuple tuple_struct map enum identifier
        ignored_any
    }
}

struct RecordsAccess<'a> {
    codec: &'a Codec,
    records: std::vec::IntoIter<RawRecord>,
}

impl<'de, 'a> SeqAccess<'de> for RecordsAccess<'a> {
    type Error = RepositoryError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.records.next() {
            Some(record) => seed
                .deserialize(RecordDeserializer {
                    codec: self.codec,
                    record,
                    nested: false,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}

/// Deserializes one record as a struct or map.
pub(crate) struct RecordDeserializer<'a> {
    codec: &'a Codec,
    record: RawRecord,
    nested: bool,
}

impl<'a> RecordDeserializer<'a> {
    /// Group values by field name, keeping first appearance order.
    ///
    /// Document keys are mapped to the names serde expects so that
    /// dialect specific casing resolves to the declared field.
    fn group(self, fields: &[&'static str]) -> FieldsAccess<'a> {
        let codec = self.codec;
        let mut groups: Vec<(String, Vec<String>)> = vec![];

        for (key, value) in self.record {
            let name = fields
                .iter()
                .find(|field| codec.matches(**field, &key))
                .map(|field| field.to_string())
                .unwrap_or(key);

            match groups.iter_mut().find(|(existing, _)| existing == &name) {
                Some((_, values)) => values.push(value),
                None => groups.push((name, vec![value])),
            }
        }

        FieldsAccess {
            codec: self.codec,
            nested: self.nested,
            groups: groups.into_iter(),
            pending: None,
        }
    }
}

impl<'de, 'a> Deserializer<'de> for RecordDeserializer<'a> {
    type Error = RepositoryError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_map(self.group(&[]))
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_map(self.group(fields))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map enum identifier
        ignored_any
    }
}

struct FieldsAccess<'a> {
    codec: &'a Codec,
    nested: bool,
    groups: std::vec::IntoIter<(String, Vec<String>)>,
    pending: Option<Vec<String>>,
}

impl<'de, 'a> MapAccess<'de> for FieldsAccess<'a> {
    type Error = RepositoryError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.groups.next() {
            Some((name, values)) => {
                self.pending = Some(values);
                seed.deserialize(name.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let values = self
            .pending
            .take()
            .ok_or_else(|| RepositoryError::Codec("value requested before key".to_string()))?;

        seed.deserialize(ValueDeserializer {
            codec: self.codec,
            values,
            nested: self.nested,
            in_seq: false,
        })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.groups.len())
    }
}

/// Deserializes the values recorded for one field.
struct ValueDeserializer<'a> {
    codec: &'a Codec,
    values: Vec<String>,
    nested: bool,
    in_seq: bool,
}

impl<'a> ValueDeserializer<'a> {
    /// The scalar view of the field. Repeated keys resolve to the last value.
    fn text(&self) -> &str {
        self.values.last().map(|s| s.as_str()).unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.values.iter().all(|value| value.is_empty())
    }
}

macro_rules! deserialize_number {
    ($($method:ident => $visit:ident($ty:ty),)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let text = self.text().trim();
                visitor.$visit(if text.is_empty() {
                    <$ty>::default()
                } else {
                    text.parse::<$ty>()?
                })
            }
        )*
    };
}

impl<'de, 'a> Deserializer<'de> for ValueDeserializer<'a> {
    type Error = RepositoryError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.values.len() > 1 {
            self.deserialize_seq(visitor)
        } else {
            visitor.visit_string(self.text().to_string())
        }
    }

    deserialize_number! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.text().trim() {
            "" | "false" | "0" | "no" => visitor.visit_bool(false),
            "true" | "1" | "yes" => visitor.visit_bool(true),
            other => Err(RepositoryError::InvalidValue("bool", other.to_string())),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.text().chars().next() {
            Some(c) => visitor.visit_char(c),
            None => visitor.visit_char('\0'),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.text().to_string())
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.text().to_string())
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(hex::decode(self.text().trim())?)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == TIMESTAMP_TOKEN {
            let epoch = self.codec.parse_timestamp(self.text())?;
            return visitor.visit_newtype_struct(epoch.into_deserializer());
        }

        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.in_seq {
            return Err(RepositoryError::UnsupportedType("nested sequence"));
        }

        let items = self
            .values
            .iter()
            .flat_map(|value| value.split('\n'))
            .filter(|item| !item.is_empty())
            .map(|item| item.to_string())
            .collect::<Vec<_>>();

        visitor.visit_seq(ItemsAccess {
            codec: self.codec,
            nested: self.nested,
            items: items.into_iter(),
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        let text = self.text().trim();

        if text.len() > len * 2 {
            return Err(RepositoryError::HexOverflow);
        }

        let mut bytes = hex::decode(text)?;
        bytes.resize(len, 0);

        visitor.visit_seq(SeqDeserializer::<_, RepositoryError>::new(bytes.into_iter()))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value> {
        Err(RepositoryError::UnsupportedType("tuple struct"))
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(RepositoryError::UnsupportedType("map"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        if self.codec.dialect() != Dialect::KeyValue {
            return Err(RepositoryError::UnsupportedType("nested struct"));
        }
        if self.nested {
            return Err(RepositoryError::UnsupportedType("deeply nested struct"));
        }

        let record = self
            .values
            .iter()
            .filter(|value| !value.is_empty())
            .map(|value| {
                value
                    .split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .ok_or_else(|| RepositoryError::InvalidLine(value.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Deserializer::deserialize_struct(
            RecordDeserializer {
                codec: self.codec,
                record,
                nested: true,
            },
            name,
            fields,
            visitor,
        )
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(self.text().trim().to_string().into_deserializer())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct ItemsAccess<'a> {
    codec: &'a Codec,
    nested: bool,
    items: std::vec::IntoIter<String>,
}

impl<'de, 'a> SeqAccess<'de> for ItemsAccess<'a> {
    type Error = RepositoryError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.items.next() {
            Some(item) => seed
                .deserialize(ValueDeserializer {
                    codec: self.codec,
                    values: vec![item],
                    nested: self.nested,
                    in_seq: true,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}
