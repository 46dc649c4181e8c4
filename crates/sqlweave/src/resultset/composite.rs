use crate::driver::Cursor;
use crate::error::{OrmError, OrmResult};
use crate::record::{Field, FromRecord, Record};
use crate::row::{Row, RowAccess};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Converts a reconstructed record before it is attached to its parent.
pub type Loader = Arc<dyn Fn(Record) -> OrmResult<Record> + Send + Sync>;

/// How rows of one relation are recognized as the same entity.
#[derive(Clone)]
pub enum RowId {
    /// Value of a column of the relation.
    Column(String),
    /// Key computed from the relation's own columns.
    Func(Arc<dyn Fn(&Record) -> Value + Send + Sync>),
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Column(name) => f.debug_tuple("Column").field(name).finish(),
            RowId::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Describes how joined columns nest into relations.
///
/// Each level may carry a loader, a `rowid` and a `single` flag. Child maps
/// are keyed by relation name, matching the `relation__` column prefix.
#[derive(Clone, Default)]
pub struct CompositionMap {
    loader: Option<Loader>,
    rowid: Option<RowId>,
    single: bool,
    nested: BTreeMap<String, CompositionMap>,
}

impl fmt::Debug for CompositionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionMap")
            .field("loader", &self.loader.as_ref().map(|_| ".."))
            .field("rowid", &self.rowid)
            .field("single", &self.single)
            .field("nested", &self.nested)
            .finish()
    }
}

impl CompositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify rows of this level by a column.
    pub fn rowid(mut self, column: impl Into<String>) -> Self {
        self.rowid = Some(RowId::Column(column.into()));
        self
    }

    /// Identify rows of this level by a computed key.
    pub fn rowid_with(mut self, f: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        self.rowid = Some(RowId::Func(Arc::new(f)));
        self
    }

    /// Attach one related record instead of a list.
    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }

    pub fn loader(mut self, f: impl Fn(Record) -> OrmResult<Record> + Send + Sync + 'static) -> Self {
        self.loader = Some(Arc::new(f));
        self
    }

    /// Add a child map for `relation`.
    pub fn nest(mut self, relation: impl Into<String>, child: CompositionMap) -> Self {
        self.nested.insert(relation.into(), child);
        self
    }

    /// The map at a dotted path (`"posts.comments"`), created on demand.
    pub fn get(&mut self, path: &str) -> &mut CompositionMap {
        let mut map = self;
        for segment in path.split('.') {
            map = map.nested.entry(segment.to_string()).or_default();
        }
        map
    }

    /// Replace the map at a dotted path.
    pub fn map(&mut self, path: &str, child: CompositionMap) -> &mut Self {
        *self.get(path) = child;
        self
    }

    pub fn child(&self, relation: &str) -> Option<&CompositionMap> {
        self.nested.get(relation)
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn rowid_key(&self) -> Option<&RowId> {
        self.rowid.as_ref()
    }

    fn apply_loader(&self, record: Record) -> OrmResult<Record> {
        match &self.loader {
            Some(loader) => loader(record),
            None => Ok(record),
        }
    }
}

/// A physical row split by column prefix.
#[derive(Debug, Default)]
struct Split {
    own: Vec<(String, Value)>,
    groups: Vec<(String, Split)>,
}

impl Split {
    fn from_row(row: Row, sep: &str) -> Self {
        let mut split = Split::default();
        for (name, value) in row.into_pairs() {
            split.insert(name, value, sep);
        }
        split
    }

    fn insert(&mut self, name: String, value: Value, sep: &str) {
        match name.split_once(sep) {
            Some((head, rest)) if !head.is_empty() && !rest.is_empty() => {
                let rest = rest.to_string();
                let idx = match self.groups.iter().position(|(g, _)| g == head) {
                    Some(idx) => idx,
                    None => {
                        self.groups.push((head.to_string(), Split::default()));
                        self.groups.len() - 1
                    }
                };
                self.groups[idx].1.insert(rest, value, sep);
            }
            _ => self.own.push((name, value)),
        }
    }

    fn all_null(&self) -> bool {
        self.own.iter().all(|(_, v)| v.is_null()) && self.groups.iter().all(|(_, g)| g.all_null())
    }
}

#[derive(Debug, Clone)]
enum Identity {
    /// No own columns: always continues the pending entity.
    Always,
    Key(Value),
    Hash(u64),
    /// Never merges with another row.
    Never,
}

impl Identity {
    fn continues(&self, other: &Identity) -> bool {
        match (self, other) {
            (Identity::Always, _) => true,
            (Identity::Key(a), Identity::Key(b)) => a == b,
            (Identity::Hash(a), Identity::Hash(b)) => a == b,
            _ => false,
        }
    }
}

/// One candidate entity built from a physical row, possibly merged with
/// following rows.
#[derive(Debug)]
struct CompositeRow {
    own: Record,
    identity: Identity,
    groups: Vec<(String, Vec<CompositeRow>)>,
}

impl CompositeRow {
    fn build(split: Split, map: Option<&CompositionMap>) -> OrmResult<Self> {
        let composite = !split.groups.is_empty();
        let own: Record = split.own.into_iter().collect();

        let identity = if own.is_empty() && composite {
            Identity::Always
        } else {
            match map.and_then(CompositionMap::rowid_key) {
                Some(RowId::Column(col)) => match own.get(col) {
                    Some(value) => Identity::Key(value.clone()),
                    None => {
                        return Err(OrmError::composition(format!(
                            "rowid column '{col}' is not part of the row"
                        )));
                    }
                },
                Some(RowId::Func(f)) => Identity::Key(f(&own)),
                None if composite => {
                    let mut hasher = DefaultHasher::new();
                    for (name, field) in own.fields() {
                        name.hash(&mut hasher);
                        if let Field::Value(v) = field {
                            v.hash(&mut hasher);
                        }
                    }
                    Identity::Hash(hasher.finish())
                }
                None => Identity::Never,
            }
        };

        let mut groups = Vec::with_capacity(split.groups.len());
        for (name, sub) in split.groups {
            if sub.all_null() {
                groups.push((name, Vec::new()));
                continue;
            }
            let child_map = map.and_then(|m| m.child(&name));
            let child = CompositeRow::build(sub, child_map)?;
            groups.push((name, vec![child]));
        }

        Ok(Self {
            own,
            identity,
            groups,
        })
    }

    /// Merge `other` into this entity, or hand it back when it starts a new one.
    fn merge(&mut self, other: CompositeRow) -> Result<(), CompositeRow> {
        if !self.identity.continues(&other.identity) {
            return Err(other);
        }
        for (name, children) in other.groups {
            let idx = match self.groups.iter().position(|(g, _)| *g == name) {
                Some(idx) => idx,
                None => {
                    self.groups.push((name, Vec::new()));
                    self.groups.len() - 1
                }
            };
            let siblings = &mut self.groups[idx].1;
            for child in children {
                match siblings.last_mut() {
                    Some(last) => {
                        if let Err(child) = last.merge(child) {
                            siblings.push(child);
                        }
                    }
                    None => siblings.push(child),
                }
            }
        }
        Ok(())
    }

    fn compile(self, map: Option<&CompositionMap>) -> OrmResult<Record> {
        let mut record = self.own;
        for (name, children) in self.groups {
            let child_map = map.and_then(|m| m.child(&name));
            let mut compiled = Vec::with_capacity(children.len());
            for child in children {
                compiled.push(child.compile(child_map)?);
            }
            let field = if child_map.is_some_and(CompositionMap::is_single) {
                Field::One(compiled.into_iter().next().map(Box::new))
            } else {
                Field::Many(compiled)
            };
            record.insert(name, field);
        }
        match map {
            Some(map) => map.apply_loader(record),
            None => Ok(record),
        }
    }
}

enum State {
    /// No pending entity.
    Empty,
    /// A candidate entity that may still grow.
    Accumulating(CompositeRow),
    /// The first row had no relation columns: rows are emitted as-is.
    PassThrough,
    Exhausted,
}

/// Streams nested records out of a joined result.
///
/// Only one logical entity is buffered at a time: rows with the same
/// identity must be adjacent (ordered by the parent key). Non-adjacent rows
/// of the same parent are emitted as separate entities.
pub struct CompositeResultSet<T = Record> {
    cursor: Option<Box<dyn Cursor>>,
    map: CompositionMap,
    separator: String,
    state: State,
    hydrate: Box<dyn FnMut(Record) -> OrmResult<T>>,
}

impl CompositeResultSet<Record> {
    pub fn new(cursor: Box<dyn Cursor>, map: CompositionMap) -> Self {
        Self {
            cursor: Some(cursor),
            map,
            separator: crate::DEFAULT_SEPARATOR.to_string(),
            state: State::Empty,
            hydrate: Box::new(|record: Record| -> OrmResult<Record> { Ok(record) }),
        }
    }

    /// Convert every top-level record with `f`.
    pub fn map_records<U>(
        mut self,
        f: impl FnMut(Record) -> OrmResult<U> + 'static,
    ) -> CompositeResultSet<U> {
        CompositeResultSet {
            cursor: self.cursor.take(),
            map: std::mem::take(&mut self.map),
            separator: std::mem::take(&mut self.separator),
            state: std::mem::replace(&mut self.state, State::Exhausted),
            hydrate: Box::new(f),
        }
    }

    /// Hydrate top-level records into `U`.
    pub fn hydrate<U: FromRecord + 'static>(self) -> CompositeResultSet<U> {
        self.map_records(U::from_record)
    }
}

impl<T> CompositeResultSet<T> {
    /// Column separator between relation name and column (default `__`).
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Whether composition was disabled because the result has no relations.
    pub fn is_pass_through(&self) -> bool {
        matches!(self.state, State::PassThrough)
    }

    /// Next logical entity.
    pub fn fetch(&mut self) -> OrmResult<Option<T>> {
        match self.step() {
            Ok(Some(record)) => (self.hydrate)(record).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                self.state = State::Exhausted;
                self.close();
                Err(e)
            }
        }
    }

    fn step(&mut self) -> OrmResult<Option<Record>> {
        loop {
            let row = match self.cursor.as_mut() {
                Some(cursor) => cursor.fetch_one()?,
                None => None,
            };
            let state = std::mem::replace(&mut self.state, State::Exhausted);

            let Some(row) = row else {
                self.close();
                return match state {
                    State::Accumulating(pending) => pending.compile(Some(&self.map)).map(Some),
                    _ => Ok(None),
                };
            };

            match state {
                State::Exhausted => {
                    self.close();
                    return Ok(None);
                }
                State::PassThrough => {
                    self.state = State::PassThrough;
                    return self.map.apply_loader(Record::from(row)).map(Some);
                }
                State::Empty => {
                    let sep = self.separator.as_str();
                    if !row.columns().iter().any(|c| c.contains(sep)) {
                        self.state = State::PassThrough;
                        return self.map.apply_loader(Record::from(row)).map(Some);
                    }
                    let candidate = CompositeRow::build(Split::from_row(row, sep), Some(&self.map))?;
                    self.state = State::Accumulating(candidate);
                }
                State::Accumulating(mut pending) => {
                    let candidate = CompositeRow::build(
                        Split::from_row(row, &self.separator),
                        Some(&self.map),
                    )?;
                    match pending.merge(candidate) {
                        Ok(()) => self.state = State::Accumulating(pending),
                        Err(next) => {
                            self.state = State::Accumulating(next);
                            return pending.compile(Some(&self.map)).map(Some);
                        }
                    }
                }
            }
        }
    }

    /// The first entity; the rest of the result is discarded.
    pub fn first(mut self) -> OrmResult<Option<T>> {
        let item = self.fetch();
        self.state = State::Exhausted;
        self.close();
        item
    }

    pub fn all(mut self) -> OrmResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.fetch()? {
            out.push(item);
        }
        Ok(out)
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }
}

impl<T> Iterator for CompositeResultSet<T> {
    type Item = OrmResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch().transpose()
    }
}

impl<T> Drop for CompositeResultSet<T> {
    fn drop(&mut self) {
        self.close();
    }
}
