//! Nested records produced by the composite row reconstructor.

use crate::error::{OrmError, OrmResult};
use crate::row::{Row, RowAccess};
use crate::value::{FromValue, Value};

/// One entry of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A plain column value.
    Value(Value),
    /// A `single` relation; `None` when the join produced no match.
    One(Option<Box<Record>>),
    /// A one-to-many relation in row order.
    Many(Vec<Record>),
}

/// An ordered mapping of field names to values and nested relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Field)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.insert(name, Field::Value(value.into()));
    }

    /// Builder-style [`insert_value`](Self::insert_value).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_value(name, value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, f)| f)
    }

    /// Records of a one-to-many relation (empty when absent).
    pub fn many(&self, name: &str) -> &[Record] {
        match self.field(name) {
            Some(Field::Many(items)) => items,
            _ => &[],
        }
    }

    /// Record of a single relation.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.field(name) {
            Some(Field::One(Some(rec))) => Some(rec),
            _ => None,
        }
    }

    pub fn take(&mut self, name: &str) -> Option<Field> {
        let idx = self.fields.iter().position(|(k, _)| k == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Remove and decode a scalar field.
    pub fn take_value<T: FromValue>(&mut self, name: &str) -> OrmResult<T> {
        match self.take(name) {
            Some(Field::Value(v)) => T::decode(name, v),
            Some(_) => Err(OrmError::decode(name, "expected a value, found a relation")),
            None => Err(OrmError::decode(name, "column not found")),
        }
    }

    /// Remove a one-to-many relation; absent relations decode as empty.
    pub fn take_many(&mut self, name: &str) -> OrmResult<Vec<Record>> {
        match self.take(name) {
            Some(Field::Many(items)) => Ok(items),
            Some(Field::One(one)) => Ok(one.map(|r| vec![*r]).unwrap_or_default()),
            Some(Field::Value(_)) => Err(OrmError::decode(name, "expected a relation")),
            None => Ok(Vec::new()),
        }
    }

    /// Remove a single relation.
    pub fn take_one(&mut self, name: &str) -> OrmResult<Option<Record>> {
        match self.take(name) {
            Some(Field::One(one)) => Ok(one.map(|r| *r)),
            Some(Field::Many(mut items)) => Ok((!items.is_empty()).then(|| items.remove(0))),
            Some(Field::Value(_)) => Err(OrmError::decode(name, "expected a relation")),
            None => Ok(None),
        }
    }

    pub fn fields(&self) -> &[(String, Field)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert into a JSON object, recursing into relations.
    pub fn into_json(self) -> serde_json::Value {
        let map = self
            .fields
            .into_iter()
            .map(|(k, f)| {
                let v = match f {
                    Field::Value(v) => v.to_json(),
                    Field::One(None) => serde_json::Value::Null,
                    Field::One(Some(r)) => r.into_json(),
                    Field::Many(items) => {
                        serde_json::Value::Array(items.into_iter().map(Record::into_json).collect())
                    }
                };
                (k, v)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl RowAccess for Record {
    fn get(&self, name: &str) -> Option<&Value> {
        match self.field(name) {
            Some(Field::Value(v)) => Some(v),
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        Self {
            fields: row
                .into_pairs()
                .into_iter()
                .map(|(k, v)| (k, Field::Value(v)))
                .collect(),
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k, Field::Value(v))).collect(),
        }
    }
}

/// Trait for types that can be hydrated from a reconstructed record.
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> OrmResult<Self>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> OrmResult<Self> {
        Ok(record)
    }
}

impl FromRecord for serde_json::Value {
    fn from_record(record: Record) -> OrmResult<Self> {
        Ok(record.into_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut r = Record::new().with("a", 1).with("b", 2);
        r.insert_value("a", 3);
        assert_eq!(r.keys(), vec!["a", "b"]);
        assert_eq!(r.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn take_helpers_decode_relations() {
        let mut r = Record::new().with("id", 1);
        r.insert("kids", Field::Many(vec![Record::new().with("id", 10)]));
        r.insert("owner", Field::One(None));
        assert_eq!(r.take_value::<i64>("id").unwrap(), 1);
        assert_eq!(r.take_many("kids").unwrap().len(), 1);
        assert_eq!(r.take_one("owner").unwrap(), None);
        assert!(r.take_many("missing").unwrap().is_empty());
        assert!(r.is_empty());
    }

    #[test]
    fn into_json_nests() {
        let mut r = Record::new().with("id", 1);
        r.insert("kids", Field::Many(vec![Record::new().with("id", 10)]));
        assert_eq!(
            r.into_json(),
            serde_json::json!({"id": 1, "kids": [{"id": 10}]})
        );
    }
}
