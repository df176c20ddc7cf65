// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Line oriented control file codec.

Package metadata across Linux distributions is stored in a handful of simple
line oriented text formats. This module maps `serde` data structures to and
from three of them:

* [Dialect::Colon]: `Key: value` fields with continuation lines prefixed by a
  single space and a lone `.` standing for an empty line. Records are
  separated by a blank line. This is the Debian control file format, also used
  (without the space after the colon) by Alpine's `APKINDEX`.
* [Dialect::Percent]: `%KEY%` marker lines followed by the value lines and a
  blank line. This is the format of Arch Linux `desc` files.
* [Dialect::KeyValue]: `key = value` lines with `#` comments. This is the format
  of Arch Linux `.PKGINFO` files.

Field names come from the serde name of each field (use `#[serde(rename)]` to
control them and `#[serde(skip)]` to exclude a field). Names are transformed per
dialect: verbatim for [Dialect::Colon], upper-cased for [Dialect::Percent] and
lower-cased for [Dialect::KeyValue]. Decoding matches document keys against the
transformed names; [Dialect::Colon] matching is case-insensitive, as it is for
Debian control files.

Empty values (empty strings, zero numbers, `false`, all-zero byte arrays, empty
sequences and `None`) are omitted on encode. On decode, absent keys leave the
field at its default, so record types should carry `#[serde(default)]`.
Unknown keys are ignored.

Fixed size byte arrays are written as hex. [Timestamp] values are written as
RFC 1123 dates in [Dialect::Colon] and as Unix epoch seconds elsewhere.
Sequences become repeated lines (never nested sequences). A struct may be nested
one level deep in [Dialect::KeyValue] only, written as repeated
`field = name=value` lines.
*/

mod de;
mod ser;

use {
    crate::error::{RepositoryError, Result},
    chrono::{DateTime, TimeZone, Utc},
    serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer},
    std::{
        borrow::Cow,
        io::{Read, Write},
    },
};

pub(crate) use ser::Rendered;

/// Name under which [Timestamp] announces itself to the codec.
pub(crate) const TIMESTAMP_TOKEN: &str = "$repository_index::control::Timestamp";

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// A record as it appears in a document: ordered `(key, value)` pairs.
pub type RawRecord = Vec<(String, String)>;

/// Text layout of a control file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Dialect {
    /// `Key: value` lines.
    Colon,
    /// `%KEY%` blocks.
    Percent,
    /// `key = value` lines.
    KeyValue,
}

impl Dialect {
    /// The name a field is written under.
    pub fn field_name(&self, name: &'static str) -> Cow<'static, str> {
        match self {
            Self::Colon => Cow::Borrowed(name),
            Self::Percent => Cow::Owned(name.to_uppercase()),
            Self::KeyValue => Cow::Owned(name.to_lowercase()),
        }
    }

    /// Whether a document key refers to a field.
    pub fn matches(&self, field: &str, key: &str) -> bool {
        match self {
            Self::Colon => field.eq_ignore_ascii_case(key),
            Self::Percent => field.to_uppercase() == key,
            Self::KeyValue => field.to_lowercase() == key,
        }
    }
}

/// Encoder and decoder for one control file layout.
///
/// Instances are plain values; any number of configurations can coexist.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Codec {
    dialect: Dialect,
    colon_space: bool,
    case_sensitive: bool,
}

/// Debian control files and `Packages`/`Release` indices.
pub const DEB: Codec = Codec::new(Dialect::Colon);

/// Alpine `APKINDEX` records: `K:value` without a space.
///
/// Keys are single letters where case matters (`P` is the name, `p` provides).
pub const APKINDEX: Codec = Codec::new(Dialect::Colon)
    .without_colon_space()
    .case_sensitive();

/// Arch Linux `desc` records.
pub const DESC: Codec = Codec::new(Dialect::Percent);

/// Arch Linux `.PKGINFO` files.
pub const PKGINFO: Codec = Codec::new(Dialect::KeyValue);

impl Codec {
    /// Construct a codec for a dialect.
    pub const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            colon_space: true,
            case_sensitive: false,
        }
    }

    /// Do not emit a space after the colon in [Dialect::Colon].
    pub const fn without_colon_space(mut self) -> Self {
        self.colon_space = false;
        self
    }

    /// Match document keys exactly against field names.
    pub const fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Whether a document key refers to a field.
    pub fn matches(&self, field: &'static str, key: &str) -> bool {
        if self.case_sensitive {
            self.dialect.field_name(field) == key
        } else {
            self.dialect.matches(field, key)
        }
    }

    /// The dialect this codec reads and writes.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Serialize a struct or a sequence of structs to a string.
    pub fn to_string<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let mut serializer = ser::DocumentSerializer::new(self);
        value.serialize(&mut serializer)?;

        Ok(serializer.out)
    }

    /// Serialize a struct or a sequence of structs to bytes.
    pub fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(self.to_string(value)?.into_bytes())
    }

    /// Serialize a struct or a sequence of structs to a writer.
    pub fn to_writer<W: Write, T: Serialize + ?Sized>(&self, mut writer: W, value: &T) -> Result<()> {
        writer.write_all(self.to_string(value)?.as_bytes())?;

        Ok(())
    }

    /// Deserialize a struct or a sequence of structs from text.
    pub fn from_str<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        T::deserialize(de::DocumentDeserializer {
            codec: self,
            records: self.parse(text)?,
        })
    }

    /// Deserialize a struct or a sequence of structs from bytes.
    pub fn from_slice<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(data).map_err(|e| RepositoryError::Codec(e.to_string()))?;

        self.from_str(text)
    }

    /// Deserialize a struct or a sequence of structs from a reader.
    pub fn from_reader<R: Read, T: DeserializeOwned>(&self, mut reader: R) -> Result<T> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        self.from_str(&text)
    }

    /// Parse a document into its raw records.
    pub fn parse(&self, text: &str) -> Result<Vec<RawRecord>> {
        match self.dialect {
            Dialect::Colon => parse_colon(text),
            Dialect::Percent => parse_percent(text),
            Dialect::KeyValue => parse_key_value(text),
        }
    }

    pub(crate) fn record_separator(&self) -> &'static str {
        match self.dialect {
            Dialect::Colon | Dialect::KeyValue => "\n",
            Dialect::Percent => "",
        }
    }

    /// Append one field to a document.
    pub(crate) fn write_field(&self, out: &mut String, name: &str, value: &Rendered) -> Result<()> {
        match (self.dialect, value) {
            (Dialect::Colon, Rendered::Text(text)) => self.write_colon(out, name, text),
            (Dialect::Colon, Rendered::List(items)) => self.write_colon(out, name, &items.join("\n")),
            (Dialect::Percent, Rendered::Text(text)) => {
                write_percent(out, name, text.split('\n'));
                Ok(())
            }
            (Dialect::Percent, Rendered::List(items)) => {
                write_percent(out, name, items.iter().map(|s| s.as_str()));
                Ok(())
            }
            (Dialect::KeyValue, Rendered::Text(text)) => write_key_value(out, name, text),
            (Dialect::KeyValue, Rendered::List(items)) => {
                for item in items {
                    write_key_value(out, name, item)?;
                }
                Ok(())
            }
            (Dialect::KeyValue, Rendered::Nested(pairs)) => {
                for (key, item) in pairs {
                    write_key_value(out, name, &format!("{}={}", key, item))?;
                }
                Ok(())
            }
            (_, Rendered::Nested(_)) => Err(RepositoryError::UnsupportedType("nested struct")),
        }
    }

    fn write_colon(&self, out: &mut String, name: &str, text: &str) -> Result<()> {
        if !self.colon_space && text.contains('\n') {
            return Err(RepositoryError::UnsupportedType("multi-line value"));
        }

        out.push_str(name);
        out.push(':');
        if self.colon_space && !text.starts_with('\n') {
            out.push(' ');
        }

        for (i, line) in text.split('\n').enumerate() {
            if i == 0 {
                out.push_str(line);
            } else if line.is_empty() {
                out.push_str("\n .");
            } else {
                out.push_str("\n ");
                out.push_str(line);
            }
        }
        out.push('\n');

        Ok(())
    }

    /// Render epoch seconds the way this dialect stores dates.
    pub(crate) fn render_timestamp(&self, epoch: i64) -> Result<String> {
        match self.dialect {
            Dialect::Colon => Ok(Timestamp::from_epoch(epoch)?
                .0
                .format(RFC1123_FORMAT)
                .to_string()),
            Dialect::Percent | Dialect::KeyValue => Ok(epoch.to_string()),
        }
    }

    /// Parse a date stored in this dialect into epoch seconds.
    pub(crate) fn parse_timestamp(&self, text: &str) -> Result<i64> {
        let text = text.trim();

        if text.is_empty() {
            return Ok(0);
        }
        if text.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
            return Ok(text.parse()?);
        }

        let normalized = match text.strip_suffix(" UTC").or_else(|| text.strip_suffix(" GMT")) {
            Some(prefix) => format!("{} +0000", prefix),
            None => text.to_string(),
        };

        Ok(DateTime::parse_from_str(&normalized, "%a, %d %b %Y %H:%M:%S %z")?.timestamp())
    }
}

fn parse_colon(text: &str) -> Result<Vec<RawRecord>> {
    let mut records = vec![];
    let mut current = RawRecord::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let (_, value) = current
                .last_mut()
                .ok_or_else(|| RepositoryError::InvalidLine(line.to_string()))?;
            let content = line[1..].trim_end();

            value.push('\n');
            if content != "." {
                value.push_str(content);
            }
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| RepositoryError::InvalidLine(line.to_string()))?;
        current.push((key.trim().to_string(), value.trim().to_string()));
    }

    if !current.is_empty() {
        records.push(current);
    }

    Ok(records)
}

fn parse_percent(text: &str) -> Result<Vec<RawRecord>> {
    fn finish(record: &mut RawRecord, name: String, mut lines: Vec<&str>) {
        while lines.last().map(|line| line.is_empty()).unwrap_or_default() {
            lines.pop();
        }
        record.push((name, lines.join("\n")));
    }

    let mut record = RawRecord::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.len() > 2 && line.starts_with('%') && line.ends_with('%') {
            if let Some((name, lines)) = current.take() {
                finish(&mut record, name, lines);
            }
            current = Some((line[1..line.len() - 1].to_string(), vec![]));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        } else if !line.trim().is_empty() {
            return Err(RepositoryError::InvalidLine(line.to_string()));
        }
    }

    if let Some((name, lines)) = current.take() {
        finish(&mut record, name, lines);
    }

    Ok(if record.is_empty() { vec![] } else { vec![record] })
}

fn parse_key_value(text: &str) -> Result<Vec<RawRecord>> {
    let mut record = RawRecord::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| RepositoryError::InvalidLine(line.to_string()))?;
        record.push((key.trim().to_string(), value.trim().to_string()));
    }

    Ok(if record.is_empty() { vec![] } else { vec![record] })
}

fn write_percent<'a>(out: &mut String, name: &str, lines: impl Iterator<Item = &'a str>) {
    out.push('%');
    out.push_str(name);
    out.push_str("%\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

fn write_key_value(out: &mut String, name: &str, value: &str) -> Result<()> {
    if value.contains('\n') {
        return Err(RepositoryError::UnsupportedType("multi-line value"));
    }

    out.push_str(name);
    out.push_str(" = ");
    out.push_str(value);
    out.push('\n');

    Ok(())
}

/// A point in time stored in a control file.
///
/// The Unix epoch is the zero value and is omitted on encode.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Construct an instance from Unix epoch seconds.
    pub fn from_epoch(seconds: i64) -> Result<Self> {
        Utc.timestamp_opt(seconds, 0)
            .single()
            .map(Self)
            .ok_or_else(|| RepositoryError::InvalidValue("timestamp", seconds.to_string()))
    }

    /// Seconds since the Unix epoch.
    pub fn epoch(&self) -> i64 {
        self.0.timestamp()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(TIMESTAMP_TOKEN, &self.epoch())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EpochVisitor;

        impl<'de> serde::de::Visitor<'de> for EpochVisitor {
            type Value = Timestamp;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("seconds since the Unix epoch")
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> std::result::Result<Self::Value, D::Error> {
                let seconds = i64::deserialize(deserializer)?;
                self.visit_i64(seconds)
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Timestamp::from_epoch(v).map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                self.visit_i64(i64::try_from(v).map_err(E::custom)?)
            }
        }

        deserializer.deserialize_newtype_struct(TIMESTAMP_TOKEN, EpochVisitor)
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(default)]
    struct Record {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Count")]
        count: i64,
        #[serde(rename = "Unsigned")]
        unsigned: u32,
        #[serde(rename = "Ratio")]
        ratio: f64,
        #[serde(rename = "Enabled")]
        enabled: bool,
        #[serde(rename = "Digest")]
        digest: [u8; 32],
        #[serde(rename = "Date")]
        date: Timestamp,
        #[serde(rename = "Lines")]
        lines: Vec<String>,
        #[serde(rename = "Maybe")]
        maybe: Option<String>,
        #[serde(skip)]
        skipped: String,
    }

    fn full_record() -> Record {
        Record {
            name: "hello".into(),
            count: -42,
            unsigned: 7,
            ratio: 1.5,
            enabled: true,
            digest: [0xff; 32],
            date: Timestamp::from_epoch(1633772096).unwrap(),
            lines: vec!["one".into(), "two".into()],
            maybe: Some("present".into()),
            skipped: String::new(),
        }
    }

    #[test]
    fn zero_values_vanish() -> Result<()> {
        for codec in [DEB, DESC, PKGINFO] {
            let encoded = codec.to_string(&Record::default())?;
            assert_eq!(encoded, "", "{:?}", codec.dialect());
            assert_eq!(codec.from_str::<Record>(&encoded)?, Record::default());
        }

        Ok(())
    }

    #[test]
    fn full_values_round_trip() -> Result<()> {
        let record = full_record();

        for codec in [DEB, DESC, PKGINFO] {
            let encoded = codec.to_string(&record)?;
            assert_eq!(codec.from_str::<Record>(&encoded)?, record, "{}", encoded);
        }

        Ok(())
    }

    #[test]
    fn skipped_fields_are_not_written() -> Result<()> {
        let record = Record {
            skipped: "secret".into(),
            ..Default::default()
        };
        assert_eq!(DEB.to_string(&record)?, "");

        Ok(())
    }

    #[test]
    fn colon_layout() -> Result<()> {
        let record = Record {
            name: "hello\n\nworld\n".into(),
            count: 3,
            date: Timestamp::from_epoch(1633772096)?,
            ..Default::default()
        };

        let encoded = DEB.to_string(&record)?;
        assert_eq!(
            encoded,
            indoc! {"
                Name: hello
                 .
                 world
                 .
                Count: 3
                Date: Sat, 09 Oct 2021 09:34:56 UTC
            "}
        );
        assert_eq!(DEB.from_str::<Record>(&encoded)?, record);

        Ok(())
    }

    #[test]
    fn colon_leading_newline_has_no_space() -> Result<()> {
        let record = Record {
            name: "\nfirst\nsecond".into(),
            ..Default::default()
        };

        let encoded = DEB.to_string(&record)?;
        assert_eq!(encoded, "Name:\n first\n second\n");
        assert_eq!(DEB.from_str::<Record>(&encoded)?, record);

        Ok(())
    }

    #[test]
    fn colon_multiple_records() -> Result<()> {
        let records = vec![
            Record {
                name: "a".into(),
                ..Default::default()
            },
            Record {
                name: "b".into(),
                count: 2,
                ..Default::default()
            },
        ];

        let encoded = DEB.to_string(&records)?;
        assert_eq!(encoded, "Name: a\n\nName: b\nCount: 2\n");
        assert_eq!(DEB.from_str::<Vec<Record>>(&encoded)?, records);

        Ok(())
    }

    #[test]
    fn colon_keys_are_case_insensitive() -> Result<()> {
        let record = DEB.from_str::<Record>("name: x\nCOUNT: 4\nUnknown: ignored\n")?;
        assert_eq!(record.name, "x");
        assert_eq!(record.count, 4);

        Ok(())
    }

    #[test]
    fn compact_colon() -> Result<()> {
        let record = Record {
            name: "x".into(),
            count: 1,
            ..Default::default()
        };
        assert_eq!(APKINDEX.to_string(&record)?, "Name:x\nCount:1\n");
        assert_eq!(APKINDEX.from_str::<Record>("Name:x\nCount:1\n")?, record);

        let multi = Record {
            name: "a\nb".into(),
            ..Default::default()
        };
        assert!(matches!(
            APKINDEX.to_string(&multi),
            Err(RepositoryError::UnsupportedType(_))
        ));

        Ok(())
    }

    #[test]
    fn compact_colon_keys_are_case_sensitive() -> Result<()> {
        #[derive(Debug, Default, Deserialize, PartialEq, Serialize)]
        #[serde(default)]
        struct Letters {
            #[serde(rename = "P")]
            name: String,
            #[serde(rename = "p")]
            provides: String,
        }

        let letters = APKINDEX.from_str::<Letters>("p:cmd:hello\nP:hello\n")?;
        assert_eq!(letters.name, "hello");
        assert_eq!(letters.provides, "cmd:hello");

        Ok(())
    }

    #[test]
    fn percent_layout() -> Result<()> {
        let record = Record {
            name: "hello".into(),
            lines: vec!["a".into(), "b".into()],
            date: Timestamp::from_epoch(1700000000)?,
            ..Default::default()
        };

        let encoded = DESC.to_string(&record)?;
        assert_eq!(
            encoded,
            "%NAME%\nhello\n\n%DATE%\n1700000000\n\n%LINES%\na\nb\n\n"
        );
        assert_eq!(DESC.from_str::<Record>(&encoded)?, record);

        Ok(())
    }

    #[test]
    fn percent_multi_line_value() -> Result<()> {
        let record = Record {
            name: "\nfirst\n\nsecond".into(),
            ..Default::default()
        };

        let encoded = DESC.to_string(&record)?;
        assert_eq!(DESC.from_str::<Record>(&encoded)?, record);

        Ok(())
    }

    #[test]
    fn key_value_layout() -> Result<()> {
        let encoded = PKGINFO.to_string(&full_record())?;
        assert!(encoded.starts_with("name = hello\ncount = -42\n"));
        assert!(encoded.contains("lines = one\nlines = two\n"));
        assert!(encoded.contains("date = 1633772096\n"));

        let decoded = PKGINFO.from_str::<Record>(indoc! {"
            # generated
            name = hello

            lines = one
            count = 1
            count = 2
            lines = two
        "})?;
        assert_eq!(decoded.name, "hello");
        assert_eq!(decoded.count, 2);
        assert_eq!(decoded.lines, vec!["one".to_string(), "two".to_string()]);

        Ok(())
    }

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(default)]
    struct Inner {
        key: String,
        level: u8,
    }

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(default)]
    struct Outer {
        name: String,
        inner: Inner,
    }

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(default)]
    struct TooDeep {
        outer: Outer,
    }

    #[test]
    fn key_value_nested_struct() -> Result<()> {
        let value = Outer {
            name: "pkg".into(),
            inner: Inner {
                key: "k".into(),
                level: 3,
            },
        };

        let encoded = PKGINFO.to_string(&value)?;
        assert_eq!(encoded, "name = pkg\ninner = key=k\ninner = level=3\n");
        assert_eq!(PKGINFO.from_str::<Outer>(&encoded)?, value);

        Ok(())
    }

    #[test]
    fn nested_struct_restrictions() {
        let value = Outer {
            name: "pkg".into(),
            inner: Inner {
                key: "k".into(),
                level: 0,
            },
        };
        assert!(matches!(
            DEB.to_string(&value),
            Err(RepositoryError::UnsupportedType(_))
        ));
        assert!(matches!(
            PKGINFO.to_string(&TooDeep { outer: value }),
            Err(RepositoryError::UnsupportedType(_))
        ));
    }

    #[derive(Debug, Default, Deserialize, Serialize)]
    #[serde(default)]
    struct NestedList {
        items: Vec<Vec<String>>,
    }

    #[test]
    fn nested_sequences_rejected() {
        let value = NestedList {
            items: vec![vec!["a".into()]],
        };
        assert!(matches!(
            PKGINFO.to_string(&value),
            Err(RepositoryError::UnsupportedType(_))
        ));
        assert!(matches!(
            PKGINFO.from_str::<NestedList>("items = a\n"),
            Err(RepositoryError::UnsupportedType(_))
        ));
    }

    #[test]
    fn hex_overflow() {
        let overflow = format!("Digest: {}\n", "ab".repeat(33));
        assert!(matches!(
            DEB.from_str::<Record>(&overflow),
            Err(RepositoryError::HexOverflow)
        ));

        let short = DEB.from_str::<Record>("Digest: abcd\n").unwrap();
        assert_eq!(&short.digest[0..2], &[0xab, 0xcd]);
        assert!(short.digest[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn invalid_lines() {
        assert!(matches!(
            DEB.from_str::<Record>("Name: x\nno delimiter\n"),
            Err(RepositoryError::InvalidLine(line)) if line == "no delimiter"
        ));
        assert!(matches!(
            DEB.from_str::<Record>(" leading continuation\n"),
            Err(RepositoryError::InvalidLine(_))
        ));
        assert!(matches!(
            DESC.from_str::<Record>("stray\n%NAME%\nx\n"),
            Err(RepositoryError::InvalidLine(_))
        ));
        assert!(matches!(
            DESC.from_str::<Record>("%%\n"),
            Err(RepositoryError::InvalidLine(_))
        ));
        assert!(matches!(
            PKGINFO.from_str::<Record>("name\n"),
            Err(RepositoryError::InvalidLine(_))
        ));
    }

    #[test]
    fn invalid_numbers_surface() {
        assert!(matches!(
            DEB.from_str::<Record>("Count: lots\n"),
            Err(RepositoryError::ParseInt(_))
        ));
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Upper(String);

    impl Serialize for Upper {
        fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.0.to_uppercase())
        }
    }

    impl<'de> Deserialize<'de> for Upper {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
            Ok(Self(String::deserialize(deserializer)?.to_lowercase()))
        }
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    struct WithOverride {
        value: Upper,
    }

    #[test]
    fn textual_overrides() -> Result<()> {
        let value = WithOverride {
            value: Upper("shout".into()),
        };

        let encoded = DESC.to_string(&value)?;
        assert_eq!(encoded, "%VALUE%\nSHOUT\n\n");
        assert_eq!(DESC.from_str::<WithOverride>(&encoded)?, value);

        Ok(())
    }

    #[test]
    fn codecs_are_independent_values() {
        assert_ne!(DEB, APKINDEX);
        assert_eq!(DEB.dialect(), APKINDEX.dialect());
        assert_eq!(Codec::new(Dialect::Percent), DESC);
    }
}
