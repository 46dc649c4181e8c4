//! SQLite driver on `rusqlite`.
//!
//! Connections behave like DB-API connections: the first data statement
//! after a commit or rollback implicitly opens a transaction, so nothing is
//! persisted until [`Connection::commit`] is called.

use crate::driver::{Connection, Cursor, Driver, MemoryCursor};
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::sql::{ParamStyle, Params, starts_with_keyword, strip_sql_prefix};
use crate::value::{TIMESTAMP_FORMAT, Value};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sqlite;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sqlite::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sqlite::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Sqlite::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(Sqlite::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Timestamp(ts) => {
                ToSqlOutput::Owned(Sqlite::Text(ts.format(TIMESTAMP_FORMAT).to_string()))
            }
            Value::Uuid(u) => ToSqlOutput::Owned(Sqlite::Text(u.hyphenated().to_string())),
            Value::Json(j) => ToSqlOutput::Owned(Sqlite::Text(j.to_string())),
        })
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Statements that must not run inside the implicit transaction.
fn manages_transactions(sql: &str) -> bool {
    let s = strip_sql_prefix(sql);
    ["BEGIN", "COMMIT", "END", "ROLLBACK", "SAVEPOINT", "RELEASE", "VACUUM", "PRAGMA"]
        .iter()
        .any(|kw| starts_with_keyword(s, kw))
}

/// Opens SQLite connections to one database.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: String,
    busy_timeout: Option<Duration>,
}

impl SqliteDriver {
    /// A driver for the database file at `path`; `""` and `":memory:"` open a
    /// private in-memory database per connection.
    pub fn open(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: None,
        }
    }

    pub fn memory() -> Self {
        Self::open(":memory:")
    }

    /// Wait up to `timeout` for locks held by other connections.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Build from a URI target and driver options. `busy_timeout` is given in
    /// milliseconds.
    pub fn from_options<I, K, V>(target: &str, options: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut driver = Self::open(target);
        for (key, value) in options {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "busy_timeout" | "timeout" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        OrmError::Config(format!("invalid value '{value}' for option '{key}'"))
                    })?;
                    driver.busy_timeout = Some(Duration::from_millis(ms));
                }
                _ => {
                    return Err(OrmError::Config(format!(
                        "unsupported sqlite option '{key}'"
                    )));
                }
            }
        }
        Ok(driver)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_memory(&self) -> bool {
        self.path.is_empty() || self.path == ":memory:"
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn paramstyle(&self) -> ParamStyle {
        ParamStyle::Qmark
    }

    fn connect(&self) -> OrmResult<Box<dyn Connection>> {
        let conn = if self.is_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(&self.path)?
        };
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        Ok(Box::new(SqliteConnection::spawn(conn)?))
    }
}

/// Work sent to a connection's worker thread.
enum Request {
    Execute { sql: String, params: Params },
    ExecuteMany { sql: String, batch: Vec<Params> },
    Fetch(u64),
    CloseCursor(u64),
    Commit,
    Rollback,
    Close,
}

enum Reply {
    /// A query is open; its first row is already read.
    Opened {
        cursor: u64,
        columns: Arc<[String]>,
        first: Option<Vec<Value>>,
    },
    Affected(u64),
    Row(Option<Vec<Value>>),
    Done,
    Failed(OrmError),
}

/// Both ends of the channel pair to one worker.
///
/// A round trip holds the lock, so replies always reach the caller that
/// sent the request.
struct Link {
    requests: Sender<Request>,
    replies: Receiver<Reply>,
}

type SharedLink = Arc<Mutex<Link>>;

fn worker_gone() -> OrmError {
    OrmError::Connection("sqlite worker has stopped".to_string())
}

fn unexpected_reply() -> OrmError {
    OrmError::driver("unexpected reply from sqlite worker")
}

fn call(link: &SharedLink, request: Request) -> OrmResult<Reply> {
    let link = link.lock().unwrap_or_else(PoisonError::into_inner);
    link.requests.send(request).map_err(|_| worker_gone())?;
    match link.replies.recv().map_err(|_| worker_gone())? {
        Reply::Failed(err) => Err(err),
        reply => Ok(reply),
    }
}

/// A connection opened by [`SqliteDriver`].
///
/// The `rusqlite` connection lives on a dedicated thread. Queries keep their
/// statement open there and hand out one row per fetch, so a result set is
/// never read ahead of its consumer.
pub struct SqliteConnection {
    link: SharedLink,
    worker: Option<JoinHandle<()>>,
}

impl SqliteConnection {
    fn spawn(conn: rusqlite::Connection) -> OrmResult<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("sqlweave-sqlite".to_string())
            .spawn(move || {
                Worker {
                    requests: request_rx,
                    replies: reply_tx,
                    next_cursor: 0,
                    live: Vec::new(),
                    drained: HashMap::new(),
                    closed: HashSet::new(),
                }
                .run(conn)
            })
            .map_err(|e| OrmError::Connection(format!("failed to start sqlite worker: {e}")))?;
        Ok(Self {
            link: Arc::new(Mutex::new(Link {
                requests: request_tx,
                replies: reply_rx,
            })),
            worker: Some(worker),
        })
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &Params) -> OrmResult<Box<dyn Cursor>> {
        let request = Request::Execute {
            sql: sql.to_string(),
            params: params.clone(),
        };
        match call(&self.link, request)? {
            Reply::Affected(n) => Ok(Box::new(MemoryCursor::affected(n))),
            Reply::Opened {
                cursor,
                columns,
                first,
            } => Ok(Box::new(SqliteCursor {
                link: self.link.clone(),
                cursor,
                columns,
                done: first.is_none(),
                first,
            })),
            _ => Err(unexpected_reply()),
        }
    }

    fn execute_many(&mut self, sql: &str, params: &[Params]) -> OrmResult<u64> {
        let request = Request::ExecuteMany {
            sql: sql.to_string(),
            batch: params.to_vec(),
        };
        match call(&self.link, request)? {
            Reply::Affected(n) => Ok(n),
            _ => Err(unexpected_reply()),
        }
    }

    fn commit(&mut self) -> OrmResult<()> {
        call(&self.link, Request::Commit).map(drop)
    }

    fn rollback(&mut self) -> OrmResult<()> {
        call(&self.link, Request::Rollback).map(drop)
    }

    fn close(self: Box<Self>) -> OrmResult<()> {
        let mut this = *self;
        let result = call(&this.link, Request::Close).map(drop);
        if let Some(worker) = this.worker.take() {
            if worker.join().is_err() {
                return Err(OrmError::Connection("sqlite worker panicked".to_string()));
            }
        }
        result
    }
}

/// Rows of one query, read from the worker as they are fetched.
pub struct SqliteCursor {
    link: SharedLink,
    cursor: u64,
    columns: Arc<[String]>,
    first: Option<Vec<Value>>,
    done: bool,
}

impl Cursor for SqliteCursor {
    fn fetch_one(&mut self) -> OrmResult<Option<Row>> {
        if let Some(values) = self.first.take() {
            return Ok(Some(Row::new(self.columns.clone(), values)));
        }
        if self.done {
            return Ok(None);
        }
        match call(&self.link, Request::Fetch(self.cursor)) {
            Ok(Reply::Row(Some(values))) => Ok(Some(Row::new(self.columns.clone(), values))),
            Ok(Reply::Row(None)) => {
                self.done = true;
                Ok(None)
            }
            Ok(_) => {
                self.done = true;
                Err(unexpected_reply())
            }
            Err(err) => {
                self.done = true;
                Err(err)
            }
        }
    }

    fn rows_affected(&self) -> u64 {
        0
    }

    fn close(&mut self) {
        self.first = None;
        if self.done {
            return;
        }
        self.done = true;
        if let Err(err) = call(&self.link, Request::CloseCursor(self.cursor)) {
            tracing::debug!(
                target: "sqlweave.sql",
                cursor = self.cursor,
                error = %err,
                "failed to close sqlite cursor"
            );
        }
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// How a request handler hands control back to its caller.
enum Flow {
    Continue,
    /// A fetch for an outer cursor; frames above it unwind to serve it.
    Resume(Request),
    Shutdown,
    Disconnected,
}

/// Remaining rows of a cursor whose statement was read to the end early.
#[derive(Default)]
struct Drained {
    rows: VecDeque<Vec<Value>>,
    error: Option<OrmError>,
}

/// State of the worker thread, apart from the connection its statements borrow.
///
/// Every open query is a frame on the worker's stack, innermost last in
/// `live`. Fetching from an outer cursor while an inner one is open reads the
/// inner ones to the end into `drained`.
struct Worker {
    requests: Receiver<Request>,
    replies: Sender<Reply>,
    next_cursor: u64,
    live: Vec<u64>,
    drained: HashMap<u64, Drained>,
    closed: HashSet<u64>,
}

impl Worker {
    fn run(mut self, conn: rusqlite::Connection) {
        let mut pending = None;
        loop {
            let request = match pending.take() {
                Some(request) => request,
                None => match self.requests.recv() {
                    Ok(request) => request,
                    Err(_) => return,
                },
            };
            match self.handle(&conn, request) {
                Flow::Continue => {}
                Flow::Resume(request) => pending = Some(request),
                Flow::Shutdown => break,
                Flow::Disconnected => return,
            }
        }
        let result = conn.close().map_err(|(_, e)| OrmError::from(e));
        self.reply_with(result.map(|()| Reply::Done));
    }

    fn reply(&self, reply: Reply) -> Flow {
        match self.replies.send(reply) {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Disconnected,
        }
    }

    fn reply_with(&self, result: OrmResult<Reply>) -> Flow {
        self.reply(result.unwrap_or_else(Reply::Failed))
    }

    fn handle(&mut self, conn: &rusqlite::Connection, request: Request) -> Flow {
        match request {
            Request::Execute { sql, params } => self.execute(conn, &sql, &params),
            Request::ExecuteMany { sql, batch } => {
                let result = execute_many(conn, &sql, &batch).map(Reply::Affected);
                self.reply_with(result)
            }
            Request::Fetch(cursor) if self.live.contains(&cursor) => {
                Flow::Resume(Request::Fetch(cursor))
            }
            Request::Fetch(cursor) => {
                let Some(drained) = self.drained.get_mut(&cursor) else {
                    return self.reply(Reply::Row(None));
                };
                if let Some(values) = drained.rows.pop_front() {
                    return self.reply(Reply::Row(Some(values)));
                }
                let error = drained.error.take();
                self.drained.remove(&cursor);
                match error {
                    Some(err) => self.reply(Reply::Failed(err)),
                    None => self.reply(Reply::Row(None)),
                }
            }
            Request::CloseCursor(cursor) => {
                self.drained.remove(&cursor);
                if self.live.contains(&cursor) {
                    self.closed.insert(cursor);
                }
                self.reply(Reply::Done)
            }
            Request::Commit => self.reply_with(finish(conn, "COMMIT")),
            Request::Rollback => self.reply_with(finish(conn, "ROLLBACK")),
            Request::Close => Flow::Shutdown,
        }
    }

    fn execute(&mut self, conn: &rusqlite::Connection, sql: &str, params: &Params) -> Flow {
        let prepared = begin_if_needed(conn, sql).and_then(|()| {
            let mut stmt = conn.prepare(sql)?;
            bind(&mut stmt, params)?;
            Ok(stmt)
        });
        let mut stmt = match prepared {
            Ok(stmt) => stmt,
            Err(err) => return self.reply(Reply::Failed(err)),
        };

        if stmt.column_count() == 0 {
            let result = stmt
                .raw_execute()
                .map(|n| Reply::Affected(n as u64))
                .map_err(OrmError::from);
            return self.reply_with(result);
        }

        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();
        let mut rows = stmt.raw_query();
        let first = match next_values(&mut rows, width) {
            Ok(first) => first,
            Err(err) => return self.reply(Reply::Failed(err)),
        };
        self.next_cursor += 1;
        let cursor = self.next_cursor;
        let exhausted = first.is_none();
        if let Flow::Disconnected = self.reply(Reply::Opened {
            cursor,
            columns,
            first,
        }) {
            return Flow::Disconnected;
        }
        if exhausted {
            return Flow::Continue;
        }

        self.live.push(cursor);
        let flow = self.stream(conn, &mut rows, width, cursor);
        self.live.retain(|&c| c != cursor);
        self.closed.remove(&cursor);
        flow
    }

    /// Serve requests while the query behind `cursor` is open.
    fn stream(
        &mut self,
        conn: &rusqlite::Connection,
        rows: &mut rusqlite::Rows<'_>,
        width: usize,
        cursor: u64,
    ) -> Flow {
        let mut pending = None;
        loop {
            let request = match pending.take() {
                Some(request) => request,
                None => match self.requests.recv() {
                    Ok(request) => request,
                    Err(_) => return Flow::Disconnected,
                },
            };
            match request {
                Request::Fetch(id) if id == cursor => match next_values(rows, width) {
                    Ok(Some(values)) => {
                        if let Flow::Disconnected = self.reply(Reply::Row(Some(values))) {
                            return Flow::Disconnected;
                        }
                    }
                    Ok(None) => return self.reply(Reply::Row(None)),
                    Err(err) => return self.reply(Reply::Failed(err)),
                },
                Request::CloseCursor(id) if id == cursor => return self.reply(Reply::Done),
                request => match self.handle(conn, request) {
                    Flow::Continue => {
                        if self.closed.contains(&cursor) {
                            return Flow::Continue;
                        }
                    }
                    Flow::Resume(Request::Fetch(id)) if id == cursor => {
                        pending = Some(Request::Fetch(id));
                    }
                    Flow::Resume(request) => {
                        let drained = drain(rows, width);
                        self.drained.insert(cursor, drained);
                        return Flow::Resume(request);
                    }
                    flow => return flow,
                },
            }
        }
    }
}

fn next_values(rows: &mut rusqlite::Rows<'_>, width: usize) -> OrmResult<Option<Vec<Value>>> {
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(width);
    for i in 0..width {
        values.push(from_sqlite(row.get_ref(i)?));
    }
    Ok(Some(values))
}

fn drain(rows: &mut rusqlite::Rows<'_>, width: usize) -> Drained {
    let mut drained = Drained::default();
    loop {
        match next_values(rows, width) {
            Ok(Some(values)) => drained.rows.push_back(values),
            Ok(None) => return drained,
            Err(err) => {
                drained.error = Some(err);
                return drained;
            }
        }
    }
}

fn begin_if_needed(conn: &rusqlite::Connection, sql: &str) -> OrmResult<()> {
    if conn.is_autocommit() && !manages_transactions(sql) {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

fn finish(conn: &rusqlite::Connection, keyword: &str) -> OrmResult<Reply> {
    if !conn.is_autocommit() {
        conn.execute_batch(keyword)?;
    }
    Ok(Reply::Done)
}

fn execute_many(conn: &rusqlite::Connection, sql: &str, batch: &[Params]) -> OrmResult<u64> {
    begin_if_needed(conn, sql)?;
    let mut stmt = conn.prepare(sql)?;
    let mut total = 0u64;
    for params in batch {
        bind(&mut stmt, params)?;
        total += stmt.raw_execute()? as u64;
    }
    Ok(total)
}

fn bind(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> OrmResult<()> {
    let expected = stmt.parameter_count();
    if params.len() != expected {
        return Err(OrmError::parameter(format!(
            "statement expects {expected} parameters, got {}",
            params.len()
        )));
    }
    match params {
        Params::Positional(values) => {
            for (i, value) in values.iter().enumerate() {
                // `:0`, `:1`... bind by name; `?` binds by position
                let idx = stmt.parameter_index(&format!(":{i}"))?.unwrap_or(i + 1);
                stmt.raw_bind_parameter(idx, value)?;
            }
        }
        Params::Named(pairs) => {
            for (name, value) in pairs {
                let idx = stmt
                    .parameter_index(&format!(":{name}"))?
                    .ok_or_else(|| OrmError::parameter(format!("Missing parameter '{name}'")))?;
                stmt.raw_bind_parameter(idx, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn connect() -> Box<dyn Connection> {
        SqliteDriver::memory().connect().unwrap()
    }

    #[test]
    fn implicit_transaction_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let driver = SqliteDriver::open(path.to_string_lossy());

        let mut a = driver.connect().unwrap();
        a.execute("CREATE TABLE t (x INTEGER)", &params!()).unwrap();
        a.commit().unwrap();
        a.execute("INSERT INTO t VALUES (?)", &params![1]).unwrap();

        let mut b = driver.connect().unwrap();
        let count = |conn: &mut Box<dyn Connection>| {
            let mut cur = conn.execute("SELECT count(*) FROM t", &params!()).unwrap();
            let n = cur.fetch_one().unwrap().unwrap().values()[0].clone();
            cur.close();
            n
        };
        assert_eq!(count(&mut b), Value::Int(0));
        b.rollback().unwrap();

        a.commit().unwrap();
        assert_eq!(count(&mut b), Value::Int(1));
    }

    #[test]
    fn rows_are_read_as_they_are_fetched() {
        let mut conn = connect();
        // Row 3 fails to evaluate; the rows before it are still delivered.
        let mut cur = conn
            .execute(
                "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r WHERE n < 3)
                 SELECT n, CASE WHEN n = 3 THEN abs(-9223372036854775807 - 1) ELSE n END FROM r",
                &params!(),
            )
            .unwrap();
        assert_eq!(cur.fetch_one().unwrap().unwrap().values()[0], Value::Int(1));
        assert_eq!(cur.fetch_one().unwrap().unwrap().values()[0], Value::Int(2));
        let err = cur.fetch_one().unwrap_err();
        assert!(matches!(err, OrmError::Sqlite(_)), "{err:?}");
        assert!(cur.fetch_one().unwrap().is_none());
    }

    #[test]
    fn interleaved_cursors_keep_their_rows() {
        let mut conn = connect();
        conn.execute("CREATE TABLE t (x INTEGER)", &params!()).unwrap();
        conn.execute_many("INSERT INTO t VALUES (?)", &[params![1], params![2], params![3]])
            .unwrap();

        let ints = |cur: &mut Box<dyn Cursor>| -> Vec<Value> {
            cur.fetch_all()
                .unwrap()
                .into_iter()
                .map(|r| r.values()[0].clone())
                .collect()
        };

        let mut outer = conn.execute("SELECT x FROM t ORDER BY x", &params!()).unwrap();
        assert_eq!(outer.fetch_one().unwrap().unwrap().values()[0], Value::Int(1));

        let mut inner = conn
            .execute("SELECT x * 10 FROM t ORDER BY x", &params!())
            .unwrap();
        assert_eq!(inner.fetch_one().unwrap().unwrap().values()[0], Value::Int(10));

        // Reading the outer cursor while the inner one is open.
        assert_eq!(outer.fetch_one().unwrap().unwrap().values()[0], Value::Int(2));
        assert_eq!(ints(&mut inner), vec![Value::Int(20), Value::Int(30)]);
        assert_eq!(ints(&mut outer), vec![Value::Int(3)]);
    }

    #[test]
    fn closed_cursors_release_their_statement() {
        let mut conn = connect();
        conn.execute("CREATE TABLE t (x INTEGER)", &params!()).unwrap();
        conn.execute_many("INSERT INTO t VALUES (?)", &[params![1], params![2], params![3]])
            .unwrap();

        let mut first = conn.execute("SELECT x FROM t", &params!()).unwrap();
        first.fetch_one().unwrap();
        let mut second = conn.execute("SELECT x FROM t", &params!()).unwrap();
        second.fetch_one().unwrap();

        // Closed out of order; a pending statement would lock the table.
        drop(first);
        drop(second);
        conn.execute("DROP TABLE t", &params!()).unwrap();
        conn.commit().unwrap();
        conn.close().unwrap();
    }

    #[test]
    fn rollback_discards_changes() {
        let mut conn = connect();
        conn.execute("CREATE TABLE t (x INTEGER)", &params!()).unwrap();
        conn.commit().unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &params!()).unwrap();
        conn.rollback().unwrap();
        let rows = conn
            .execute("SELECT * FROM t", &params!())
            .unwrap()
            .fetch_all()
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn binds_every_paramstyle() {
        let mut conn = connect();
        let row = |cur: &mut Box<dyn Cursor>| cur.fetch_one().unwrap().unwrap().into_values();

        let mut cur = conn.execute("SELECT ?, ?", &params![1, "a"]).unwrap();
        assert_eq!(row(&mut cur), vec![Value::Int(1), Value::from("a")]);

        let mut cur = conn.execute("SELECT :1, :0", &params![1, 2]).unwrap();
        assert_eq!(row(&mut cur), vec![Value::Int(2), Value::Int(1)]);

        let mut cur = conn
            .execute("SELECT :b, :a", &params!(a = 1, b = 2))
            .unwrap();
        assert_eq!(row(&mut cur), vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn parameter_count_mismatch_is_an_error() {
        let mut conn = connect();
        let err = conn.execute("SELECT ?", &params!()).err().unwrap();
        assert!(matches!(err, OrmError::Parameter(_)));
    }

    #[test]
    fn values_round_trip_through_sqlite() {
        let mut conn = connect();
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let mut cur = conn
            .execute(
                "SELECT ?, ?, ?, ?, ?",
                &params![Value::Null, true, 1.5, vec![1u8, 2], ts],
            )
            .unwrap();
        let values = cur.fetch_one().unwrap().unwrap().into_values();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Int(1),
                Value::Float(1.5),
                Value::Blob(vec![1, 2]),
                Value::from("2024-05-01 12:30:00"),
            ]
        );
    }

    #[test]
    fn execute_many_counts_rows() {
        let mut conn = connect();
        conn.execute("CREATE TABLE t (x INTEGER)", &params!()).unwrap();
        let total = conn
            .execute_many("INSERT INTO t VALUES (?)", &[params![1], params![2], params![3]])
            .unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn options_are_validated() {
        let driver = SqliteDriver::from_options("app.db", [("busy_timeout", "250")]).unwrap();
        assert_eq!(driver.busy_timeout, Some(Duration::from_millis(250)));
        assert!(SqliteDriver::from_options("", [("busy_timeout", "soon")]).is_err());
        assert!(SqliteDriver::from_options("", [("journal", "wal")]).is_err());
        assert!(SqliteDriver::from_options("", Vec::<(String, String)>::new()).unwrap().is_memory());
    }
}
