use super::*;
use crate::driver::{Cursor, MemoryCursor};
use crate::error::OrmError;
use crate::record::{Field, Record};
use crate::row::RowAccess;
use crate::value::Value;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

/// Wraps a cursor and counts fetches and closes.
struct CountingCursor {
    inner: MemoryCursor,
    fetched: Rc<Cell<usize>>,
    closed: Rc<Cell<bool>>,
}

impl Cursor for CountingCursor {
    fn fetch_one(&mut self) -> OrmResult<Option<Row>> {
        self.fetched.set(self.fetched.get() + 1);
        self.inner.fetch_one()
    }

    fn rows_affected(&self) -> u64 {
        0
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

fn counting(inner: MemoryCursor) -> (Box<dyn Cursor>, Rc<Cell<usize>>, Rc<Cell<bool>>) {
    let fetched = Rc::new(Cell::new(0));
    let closed = Rc::new(Cell::new(false));
    let cursor = CountingCursor {
        inner,
        fetched: fetched.clone(),
        closed: closed.clone(),
    };
    (Box::new(cursor), fetched, closed)
}

fn cursor(columns: &[&str], rows: Vec<Vec<Value>>) -> Box<dyn Cursor> {
    Box::new(MemoryCursor::from_values(columns.iter().copied(), rows))
}

fn json_all(rs: CompositeResultSet) -> serde_json::Value {
    let records = rs.all().unwrap();
    serde_json::Value::Array(records.into_iter().map(Record::into_json).collect())
}

#[test]
fn parent_with_kids_scenario() {
    let rows = vec![
        vec![Value::Int(1), Value::Int(10)],
        vec![Value::Int(1), Value::Int(11)],
        vec![Value::Int(2), Value::Null],
    ];
    let map = CompositionMap::new()
        .rowid("id")
        .nest("kids", CompositionMap::new().rowid("id").single(false));
    let rs = CompositeResultSet::new(cursor(&["id", "kids__id"], rows), map);

    assert_eq!(
        json_all(rs),
        json!([
            {"id": 1, "kids": [{"id": 10}, {"id": 11}]},
            {"id": 2, "kids": []}
        ])
    );
}

#[test]
fn merge_without_explicit_rowids_hashes_self_columns() {
    let rows = vec![
        vec![Value::Int(1), Value::from("a"), Value::from("x")],
        vec![Value::Int(1), Value::from("a"), Value::from("y")],
        vec![Value::Int(2), Value::from("b"), Value::from("z")],
    ];
    let rs = CompositeResultSet::new(
        cursor(&["id", "name", "tags__label"], rows),
        CompositionMap::new(),
    );
    assert_eq!(
        json_all(rs),
        json!([
            {"id": 1, "name": "a", "tags": [{"label": "x"}, {"label": "y"}]},
            {"id": 2, "name": "b", "tags": [{"label": "z"}]}
        ])
    );
}

#[test]
fn single_relations_unwrap() {
    let rows = vec![
        vec![Value::Int(1), Value::Int(7), Value::from("ann")],
        vec![Value::Int(2), Value::Null, Value::Null],
    ];
    let map = CompositionMap::new()
        .rowid("id")
        .nest("author", CompositionMap::new().single(true));
    let rs = CompositeResultSet::new(
        cursor(&["id", "author__id", "author__name"], rows),
        map,
    );
    let mut records = rs.all().unwrap();
    assert_eq!(records.len(), 2);

    let second = records.pop().unwrap();
    assert_eq!(second.field("author"), Some(&Field::One(None)));

    let first = records.pop().unwrap();
    let author = first.one("author").unwrap();
    assert_eq!(author.get("name"), Some(&Value::from("ann")));
}

#[test]
fn multi_level_nesting() {
    let rows = vec![
        vec![Value::Int(1), Value::Int(10), Value::Int(100)],
        vec![Value::Int(1), Value::Int(10), Value::Int(101)],
        vec![Value::Int(1), Value::Int(11), Value::Null],
        vec![Value::Int(2), Value::Null, Value::Null],
    ];
    let mut map = CompositionMap::new().rowid("id");
    map.map("posts", CompositionMap::new().rowid("id"));
    map.map("posts.comments", CompositionMap::new().rowid("id"));

    let rs = CompositeResultSet::new(
        cursor(&["id", "posts__id", "posts__comments__id"], rows),
        map,
    );
    assert_eq!(
        json_all(rs),
        json!([
            {"id": 1, "posts": [
                {"id": 10, "comments": [{"id": 100}, {"id": 101}]},
                {"id": 11, "comments": []}
            ]},
            {"id": 2, "posts": []}
        ])
    );
}

#[test]
fn rows_without_self_columns_merge_together() {
    let rows = vec![
        vec![Value::Int(10)],
        vec![Value::Int(11)],
        vec![Value::Int(12)],
    ];
    let map = CompositionMap::new().nest("kids", CompositionMap::new().rowid("id"));
    let rs = CompositeResultSet::new(cursor(&["kids__id"], rows), map);
    assert_eq!(
        json_all(rs),
        json!([{"kids": [{"id": 10}, {"id": 11}, {"id": 12}]}])
    );
}

#[test]
fn non_adjacent_parents_stay_distinct() {
    let rows = vec![
        vec![Value::Int(1), Value::Int(10)],
        vec![Value::Int(2), Value::Int(20)],
        vec![Value::Int(1), Value::Int(11)],
    ];
    let map = CompositionMap::new()
        .rowid("id")
        .nest("kids", CompositionMap::new().rowid("id"));
    let rs = CompositeResultSet::new(cursor(&["id", "kids__id"], rows), map);
    let records = rs.all().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].get("id"), Some(&Value::Int(1)));
    assert_eq!(records[2].many("kids").len(), 1);
}

#[test]
fn duplicate_children_with_rowid_collapse() {
    // posts x tags cross product: each post repeats for every tag
    let rows = vec![
        vec![Value::Int(1), Value::Int(10), Value::from("a")],
        vec![Value::Int(1), Value::Int(10), Value::from("b")],
    ];
    let map = CompositionMap::new()
        .rowid("id")
        .nest("posts", CompositionMap::new().rowid("id"))
        .nest("tags", CompositionMap::new().rowid("name"));
    let rs = CompositeResultSet::new(cursor(&["id", "posts__id", "tags__name"], rows), map);
    assert_eq!(
        json_all(rs),
        json!([{"id": 1, "posts": [{"id": 10}], "tags": [{"name": "a"}, {"name": "b"}]}])
    );
}

#[test]
fn pass_through_without_relation_columns() {
    let (cur, fetched, closed) = counting(MemoryCursor::from_values(
        ["id", "name"],
        vec![
            vec![Value::Int(1), Value::from("a")],
            vec![Value::Int(1), Value::from("a")],
        ],
    ));
    let mut rs = CompositeResultSet::new(cur, CompositionMap::new().rowid("id"));

    let first = rs.fetch().unwrap().unwrap();
    assert!(rs.is_pass_through());
    assert_eq!(fetched.get(), 1);
    assert_eq!(first.get("id"), Some(&Value::Int(1)));

    // identical rows are not merged in pass-through mode
    let second = rs.fetch().unwrap().unwrap();
    assert_eq!(second, first);
    assert_eq!(fetched.get(), 2);

    assert!(rs.fetch().unwrap().is_none());
    assert!(closed.get());
}

#[test]
fn cursor_closed_after_final_entity() {
    let (cur, _, closed) = counting(MemoryCursor::from_values(
        ["id", "kids__id"],
        vec![vec![Value::Int(1), Value::Int(10)]],
    ));
    let mut rs = CompositeResultSet::new(cur, CompositionMap::new().rowid("id"));
    let only = rs.fetch().unwrap().unwrap();
    assert_eq!(only.many("kids").len(), 1);
    assert!(closed.get());
    assert!(rs.fetch().unwrap().is_none());
}

#[test]
fn loaders_run_per_level() {
    let rows = vec![
        vec![Value::Int(1), Value::Int(10)],
        vec![Value::Int(1), Value::Int(11)],
    ];
    let kids = CompositionMap::new()
        .rowid("id")
        .loader(|rec| Ok(rec.with("kind", "kid")));
    let map = CompositionMap::new()
        .rowid("id")
        .nest("kids", kids)
        .loader(|mut rec| {
            let count = rec.many("kids").len() as i64;
            rec.insert_value("kid_count", count);
            Ok(rec)
        });
    let rs = CompositeResultSet::new(cursor(&["id", "kids__id"], rows), map);
    assert_eq!(
        json_all(rs),
        json!([{
            "id": 1,
            "kids": [{"id": 10, "kind": "kid"}, {"id": 11, "kind": "kid"}],
            "kid_count": 2
        }])
    );
}

#[test]
fn hydrate_into_typed_entities() {
    #[derive(Debug, PartialEq)]
    struct Parent {
        id: i64,
        kids: Vec<i64>,
    }

    impl crate::FromRecord for Parent {
        fn from_record(mut record: Record) -> OrmResult<Self> {
            let kids = record
                .take_many("kids")?
                .into_iter()
                .map(|mut k| k.take_value::<i64>("id"))
                .collect::<OrmResult<Vec<_>>>()?;
            Ok(Parent {
                id: record.take_value("id")?,
                kids,
            })
        }
    }

    let rows = vec![
        vec![Value::Int(1), Value::Int(10)],
        vec![Value::Int(2), Value::Null],
    ];
    let map = CompositionMap::new()
        .rowid("id")
        .nest("kids", CompositionMap::new().rowid("id"));
    let parents: Vec<Parent> = CompositeResultSet::new(cursor(&["id", "kids__id"], rows), map)
        .hydrate::<Parent>()
        .all()
        .unwrap();
    assert_eq!(
        parents,
        vec![
            Parent { id: 1, kids: vec![10] },
            Parent { id: 2, kids: vec![] }
        ]
    );
}

#[test]
fn missing_rowid_column_is_composition_error() {
    let rows = vec![vec![Value::Int(1), Value::Int(10)]];
    let map = CompositionMap::new().rowid("uuid");
    let mut rs = CompositeResultSet::new(cursor(&["id", "kids__id"], rows), map);
    let err = rs.fetch().unwrap_err();
    assert!(matches!(err, OrmError::Composition(_)));
    assert!(rs.is_closed());
}

#[test]
fn custom_separator_and_rowid_function() {
    let rows = vec![
        vec![Value::Int(1), Value::from("a"), Value::Int(10)],
        vec![Value::Int(1), Value::from("b"), Value::Int(11)],
    ];
    let map = CompositionMap::new().rowid_with(|rec| rec.get("id").cloned().unwrap_or(Value::Null));
    let rs = CompositeResultSet::new(cursor(&["id", "note", "kids.id"], rows), map).separator(".");
    let records = rs.all().unwrap();
    // `note` differs between the rows but the rowid function only looks at `id`
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].many("kids").len(), 2);
    assert_eq!(records[0].get("note"), Some(&Value::from("a")));
}

#[test]
fn composition_map_paths_create_children() {
    let mut map = CompositionMap::new();
    map.get("a.b");
    assert!(!map.child("a").unwrap().child("b").unwrap().is_single());

    map.map("a.b", CompositionMap::new().single(true));
    assert!(map.child("a").unwrap().child("b").unwrap().is_single());
}

#[test]
fn result_set_helpers() {
    let rows = || {
        vec![
            vec![Value::Int(1), Value::from("a")],
            vec![Value::Int(2), Value::from("b")],
        ]
    };

    let rs = ResultSet::new(cursor(&["id", "name"], rows()));
    assert_eq!(rs.scalar().unwrap(), Some(Value::Int(1)));

    let rs = ResultSet::new(cursor(&["id", "name"], rows()));
    assert_eq!(rs.scalars().unwrap(), vec![Value::Int(1), Value::Int(2)]);

    let rs = ResultSet::new(cursor(&["id", "name"], rows()))
        .map(|row| row.try_get_index::<String>(1));
    assert_eq!(rs.all().unwrap(), vec!["a".to_string(), "b".to_string()]);

    let rs = ResultSet::new(cursor(&["id"], vec![]));
    assert_eq!(rs.first().unwrap(), None);
}

#[test]
fn result_set_closes_on_first_and_drop() {
    let (cur, fetched, closed) = counting(MemoryCursor::from_values(
        ["id"],
        vec![vec![Value::Int(1)], vec![Value::Int(2)]],
    ));
    let rs = ResultSet::new(cur);
    let first = rs.first().unwrap().unwrap();
    assert_eq!(first.get("id"), Some(&Value::Int(1)));
    assert_eq!(fetched.get(), 1);
    assert!(closed.get());

    let (cur, _, closed) = counting(MemoryCursor::from_values(["id"], vec![vec![Value::Int(1)]]));
    drop(ResultSet::new(cur));
    assert!(closed.get());
}

#[test]
fn cancelled_cursor_yields_nothing() {
    let rs = ResultSet::new(Box::new(MemoryCursor::cancelled()));
    assert!(rs.is_cancelled());
    assert!(rs.all().unwrap().is_empty());
}
