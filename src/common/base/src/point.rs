use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;

use influxdb_utils::time::unix_nano_format;

use crate::influxql::{DataType, MAX_TIME, MIN_TIME};

/// ZERO_TIME is the Unix nanosecond timestamp for no time.
/// This time is not used by the query engine or the storage engine as a valid time.
pub const ZERO_TIME: i64 = i64::MIN;

#[derive(Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tag")
            .field("key", &String::from_utf8_lossy(&self.key))
            .field("value", &String::from_utf8_lossy(&self.value))
            .finish()
    }
}

/// Tags is a set of tags ordered by key. Keys are unique, when the same key is
/// given more than once the last value is kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new(mut tags: Vec<Tag>) -> Self {
        tags.sort_by(|a, b| a.key.cmp(&b.key));

        let mut uniq: Vec<Tag> = Vec::with_capacity(tags.len());
        for tag in tags {
            match uniq.last_mut() {
                Some(last) if last.key == tag.key => *last = tag,
                _ => uniq.push(tag),
            }
        }

        Self(uniq)
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.0
            .binary_search_by(|t| t.key.as_slice().cmp(key))
            .ok()
            .map(|i| self.0[i].value.as_slice())
    }

    pub fn size(&self) -> usize {
        self.0.iter().map(|x| x.size()).sum()
    }
}

impl Deref for Tags {
    type Target = [Tag];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

impl<K, V> FromIterator<(K, V)> for Tags
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldValue::Float(_) => DataType::Float,
            FieldValue::Integer(_) => DataType::Integer,
            FieldValue::Boolean(_) => DataType::Boolean,
            FieldValue::String(_) => DataType::String,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// Fields maps field names to values.
pub type Fields = BTreeMap<String, FieldValue>;

/// Point is a single measurement observation: a series (name and tags), a set
/// of field values and a nanosecond timestamp.
#[derive(Clone, PartialEq)]
pub struct Point {
    name: String,
    tags: Tags,
    fields: Fields,
    unix_nano: i64,
}

impl Point {
    pub fn new(
        name: impl Into<String>,
        tags: Tags,
        fields: Fields,
        unix_nano: i64,
    ) -> anyhow::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(anyhow!("missing measurement"));
        }
        if fields.is_empty() {
            return Err(anyhow!("missing fields: {}", name));
        }
        if !(MIN_TIME..=MAX_TIME).contains(&unix_nano) {
            return Err(anyhow!(
                "point time out of range: {}, must be in [{}, {}]",
                unix_nano,
                MIN_TIME,
                MAX_TIME
            ));
        }

        Ok(Self {
            name,
            tags,
            fields,
            unix_nano,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn unix_nano(&self) -> i64 {
        self.unix_nano
    }

    /// key returns the series key: `name,tag1=v1,tag2=v2` with tags in key order.
    pub fn key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.name.len() + self.tags.size() + 2 * self.tags.len());
        escape_into(&mut key, self.name.as_bytes(), b", ");
        for tag in self.tags.iter() {
            key.push(b',');
            escape_into(&mut key, &tag.key, b",= ");
            key.push(b'=');
            escape_into(&mut key, &tag.value, b",= ");
        }
        key
    }
}

fn escape_into(dst: &mut Vec<u8>, src: &[u8], special: &[u8]) {
    for b in src {
        if special.contains(b) {
            dst.push(b'\\');
        }
        dst.push(*b);
    }
}

impl Debug for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Point")
            .field("key", &String::from_utf8_lossy(&self.key()))
            .field("fields", &self.fields)
            .field("time", &unix_nano_format(self.unix_nano))
            .finish()
    }
}
