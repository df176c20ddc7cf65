// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serialization of records into control file dialects. */

use {
    super::{Codec, Dialect, TIMESTAMP_TOKEN},
    crate::error::{RepositoryError, Result},
    serde::ser::{self, Impossible, Serialize},
};

/// A field value after rendering, before dialect specific layout is applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Rendered {
    /// A scalar. May span multiple lines.
    Text(String),
    /// A sequence of scalars.
    List(Vec<String>),
    /// A struct nested one level deep, as `name=value` pairs.
    Nested(Vec<(String, String)>),
}

/// Serializes a whole document: a struct or a sequence of structs.
pub(crate) struct DocumentSerializer<'a> {
    pub(crate) codec: &'a Codec,
    pub(crate) out: String,
    records: usize,
}

impl<'a> DocumentSerializer<'a> {
    pub(crate) fn new(codec: &'a Codec) -> Self {
        Self {
            codec,
            out: String::new(),
            records: 0,
        }
    }
}

macro_rules! document_unsupported {
    ($($method:ident($($arg:ty),*) => $name:literal,)*) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<()> {
                Err(RepositoryError::UnsupportedType($name))
            }
        )*
    };
}

impl<'a, 'b> ser::Serializer for &'b mut DocumentSerializer<'a> {
    type Ok = ();
    type Error = RepositoryError;
    type SerializeSeq = Self;
    type SerializeTuple = Impossible<(), RepositoryError>;
    type SerializeTupleStruct = Impossible<(), RepositoryError>;
    type SerializeTupleVariant = Impossible<(), RepositoryError>;
    type SerializeMap = Impossible<(), RepositoryError>;
    type SerializeStruct = RecordSerializer<'a, 'b>;
    type SerializeStructVariant = Impossible<(), RepositoryError>;

    document_unsupported! {
        serialize_bool(bool) => "bool",
        serialize_i8(i8) => "i8",
        serialize_i16(i16) => "i16",
        serialize_i32(i32) => "i32",
        serialize_i64(i64) => "i64",
        serialize_u8(u8) => "u8",
        serialize_u16(u16) => "u16",
        serialize_u32(u32) => "u32",
        serialize_u64(u64) => "u64",
        serialize_f32(f32) => "f32",
        serialize_f64(f64) => "f64",
        serialize_char(char) => "char",
        serialize_str(&str) => "str",
        serialize_bytes(&[u8]) => "bytes",
        serialize_unit_variant(&'static str, u32, &'static str) => "enum",
    }

    fn serialize_none(self) -> Result<()> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()> {
        Err(RepositoryError::UnsupportedType("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(RepositoryError::UnsupportedType("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(RepositoryError::UnsupportedType("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(RepositoryError::UnsupportedType("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(RepositoryError::UnsupportedType("map"))
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        Ok(RecordSerializer {
            document: self,
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(RepositoryError::UnsupportedType("enum"))
    }
}

impl<'a, 'b> ser::SerializeSeq for &'b mut DocumentSerializer<'a> {
    type Ok = ();
    type Error = RepositoryError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

/// Collects the fields of one record and lays them out when complete.
pub(crate) struct RecordSerializer<'a, 'b> {
    document: &'b mut DocumentSerializer<'a>,
    fields: Vec<(String, Rendered)>,
}

impl<'a, 'b> ser::SerializeStruct for RecordSerializer<'a, 'b> {
    type Ok = ();
    type Error = RepositoryError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        let codec = self.document.codec;

        if let Some(rendered) = value.serialize(ValueSerializer::new(codec))? {
            self.fields
                .push((codec.dialect().field_name(key).into_owned(), rendered));
        }

        Ok(())
    }

    fn end(self) -> Result<()> {
        if self.fields.is_empty() {
            return Ok(());
        }

        let document = self.document;
        if document.records > 0 {
            document.out.push_str(document.codec.record_separator());
        }
        for (name, value) in &self.fields {
            document.codec.write_field(&mut document.out, name, value)?;
        }
        document.records += 1;

        Ok(())
    }
}

/// Renders a single field value.
///
/// Produces `None` when the value is empty and the field must be omitted.
#[derive(Clone, Copy)]
pub(crate) struct ValueSerializer<'a> {
    codec: &'a Codec,
    nested: bool,
}

impl<'a> ValueSerializer<'a> {
    pub(crate) fn new(codec: &'a Codec) -> Self {
        Self {
            codec,
            nested: false,
        }
    }

    fn scalar(self, value: &(impl Serialize + ?Sized)) -> Result<Option<String>> {
        match value.serialize(self)? {
            None => Ok(None),
            Some(Rendered::Text(text)) => Ok(Some(text)),
            Some(Rendered::List(_)) => Err(RepositoryError::UnsupportedType("nested sequence")),
            Some(Rendered::Nested(_)) => Err(RepositoryError::UnsupportedType("nested struct")),
        }
    }
}

macro_rules! render_number {
    ($($method:ident($ty:ty),)*) => {
        $(
            fn $method(self, v: $ty) -> Result<Self::Ok> {
                Ok(if v == (0 as $ty) {
                    None
                } else {
                    Some(Rendered::Text(v.to_string()))
                })
            }
        )*
    };
}

impl<'a> ser::Serializer for ValueSerializer<'a> {
    type Ok = Option<Rendered>;
    type Error = RepositoryError;
    type SerializeSeq = ListSerializer<'a>;
    type SerializeTuple = ByteArraySerializer<'a>;
    type SerializeTupleStruct = Impossible<Option<Rendered>, RepositoryError>;
    type SerializeTupleVariant = Impossible<Option<Rendered>, RepositoryError>;
    type SerializeMap = Impossible<Option<Rendered>, RepositoryError>;
    type SerializeStruct = NestedSerializer<'a>;
    type SerializeStructVariant = Impossible<Option<Rendered>, RepositoryError>;

    render_number! {
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_f32(f32),
        serialize_f64(f64),
    }

    fn serialize_bool(self, v: bool) -> Result<Self::Ok> {
        Ok(v.then(|| Rendered::Text("true".to_string())))
    }

    fn serialize_char(self, v: char) -> Result<Self::Ok> {
        Ok(Some(Rendered::Text(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok> {
        Ok(if v.is_empty() {
            None
        } else {
            Some(Rendered::Text(v.to_string()))
        })
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok> {
        Ok(if v.iter().all(|b| *b == 0) {
            None
        } else {
            Some(Rendered::Text(hex::encode(v)))
        })
    }

    fn serialize_none(self) -> Result<Self::Ok> {
        Ok(None)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Self::Ok> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok> {
        Ok(None)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok> {
        Ok(None)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Self::Ok> {
        if name == TIMESTAMP_TOKEN {
            return match self.scalar(value)? {
                Some(epoch) => Ok(Some(Rendered::Text(
                    self.codec.render_timestamp(epoch.parse()?)?,
                ))),
                None => Ok(None),
            };
        }

        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok> {
        Err(RepositoryError::UnsupportedType("enum with data"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(ListSerializer {
            value: self,
            items: Vec::with_capacity(len.unwrap_or_default()),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        Ok(ByteArraySerializer {
            value: self,
            bytes: Vec::with_capacity(len),
        })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(RepositoryError::UnsupportedType("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(RepositoryError::UnsupportedType("enum with data"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(RepositoryError::UnsupportedType("map"))
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        if self.codec.dialect() != Dialect::KeyValue {
            return Err(RepositoryError::UnsupportedType("nested struct"));
        }
        if self.nested {
            return Err(RepositoryError::UnsupportedType("deeply nested struct"));
        }

        Ok(NestedSerializer {
            value: ValueSerializer {
                codec: self.codec,
                nested: true,
            },
            pairs: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(RepositoryError::UnsupportedType("enum with data"))
    }
}

pub(crate) struct ListSerializer<'a> {
    value: ValueSerializer<'a>,
    items: Vec<String>,
}

impl<'a> ser::SerializeSeq for ListSerializer<'a> {
    type Ok = Option<Rendered>;
    type Error = RepositoryError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        if let Some(item) = self.value.scalar(value)? {
            self.items.push(item);
        }

        Ok(())
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(if self.items.is_empty() {
            None
        } else {
            Some(Rendered::List(self.items))
        })
    }
}

/// Fixed size byte arrays, rendered as hex.
pub(crate) struct ByteArraySerializer<'a> {
    value: ValueSerializer<'a>,
    bytes: Vec<u8>,
}

impl<'a> ser::SerializeTuple for ByteArraySerializer<'a> {
    type Ok = Option<Rendered>;
    type Error = RepositoryError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        // Bytes render as decimal text, or nothing when zero.
        let byte = match self.value.scalar(value)? {
            Some(text) => text
                .parse::<u8>()
                .map_err(|_| RepositoryError::UnsupportedType("tuple"))?,
            None => 0,
        };
        self.bytes.push(byte);

        Ok(())
    }

    fn end(self) -> Result<Self::Ok> {
        ser::Serializer::serialize_bytes(self.value, &self.bytes)
    }
}

/// A struct nested inside a `key = value` record.
pub(crate) struct NestedSerializer<'a> {
    value: ValueSerializer<'a>,
    pairs: Vec<(String, String)>,
}

impl<'a> ser::SerializeStruct for NestedSerializer<'a> {
    type Ok = Option<Rendered>;
    type Error = RepositoryError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        if let Some(text) = self.value.scalar(value)? {
            self.pairs.push((
                self.value.codec.dialect().field_name(key).into_owned(),
                text,
            ));
        }

        Ok(())
    }

    fn end(self) -> Result<Self::Ok> {
        Ok(if self.pairs.is_empty() {
            None
        } else {
            Some(Rendered::Nested(self.pairs))
        })
    }
}
