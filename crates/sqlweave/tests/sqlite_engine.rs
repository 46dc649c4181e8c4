#![cfg(feature = "sqlite")]

use sqlweave::sql::{self, Column, ColumnList, Operand, SqlTemplate};
use sqlweave::{
    Engine, EngineConfig, OrmError, OrmResult, ParamStyle, RowExt, Sql, SqliteDriver, Value,
    current_session, params,
};
use tempfile::TempDir;

fn setup(config: EngineConfig) -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let engine = Engine::new(SqliteDriver::open(path.to_string_lossy()), config);
    engine
        .transaction(|tx| {
            tx.execute_script(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);
                 CREATE TABLE audit (msg TEXT);",
            )
        })
        .unwrap();
    (dir, engine)
}

fn count(engine: &Engine, table: &str) -> i64 {
    engine
        .transaction(|tx| {
            let row = tx.fetch_one(format!("SELECT COUNT(*) AS n FROM {table}"), params!())?;
            row.ok_or_else(|| OrmError::not_found(table))?
                .try_get_column::<i64>("n")
        })
        .unwrap()
}

#[test]
fn committed_work_is_visible_to_later_sessions() {
    let (_dir, engine) = setup(EngineConfig::default());

    engine
        .transaction(|tx| {
            tx.execute(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                params!["alice", 30],
            )?;
            tx.execute_many(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[params!["bob", 17], params!["carol", 45]],
            )
        })
        .unwrap();

    assert_eq!(count(&engine, "users"), 3);
    assert_eq!(engine.pool().idle_count(), 1);
}

#[test]
fn failed_transaction_is_rolled_back() {
    let (_dir, engine) = setup(EngineConfig::default());

    let err = engine
        .transaction(|tx| {
            tx.execute("INSERT INTO users (name) VALUES (?)", params!["alice"])?;
            tx.execute("INSERT INTO users (name) VALUES (NULL)", params!())
        })
        .unwrap_err();
    assert!(matches!(err, OrmError::Execution { .. }));
    assert!(matches!(err.root(), OrmError::Sqlite(_)));

    assert_eq!(count(&engine, "users"), 0);
    assert!(current_session().is_none());
}

#[test]
fn nested_failure_only_fails_the_caller() {
    let (_dir, engine) = setup(EngineConfig::default());

    engine
        .transaction(|tx| {
            tx.execute("INSERT INTO users (name) VALUES (?)", params!["alice"])?;
            let inner = tx.transaction(|inner| {
                inner.execute("INSERT INTO users (name) VALUES (?)", params!["bob"])?;
                Err::<(), _>(OrmError::Other("validation failed".into()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

    // Inner transactions are virtual: their statements ride on the outer one.
    assert_eq!(count(&engine, "users"), 2);
}

#[test]
fn dml_helpers_and_templates() {
    let (_dir, engine) = setup(EngineConfig::default().with_paramstyle(ParamStyle::Named));

    engine
        .transaction(|tx| {
            let insert = sql::insert(
                "users",
                [("name", Operand::from("dana")), ("age", Operand::from(28))],
            )
            .ok_or_else(|| OrmError::composition("nothing to insert"))?;
            tx.execute(&insert, params!())?;

            let update = sql::update("users", [("age", 29)])
                .ok_or_else(|| OrmError::composition("nothing to update"))?
                .where_(Column::new("name").eq("dana"));
            assert_eq!(tx.execute(&update, params!())?, 1);

            let tpl = SqlTemplate::parse("SELECT age FROM {table} WHERE name = %(name)s")?
                .with("table", sql::raw("users"))
                .with("name", "dana");
            assert_eq!(tx.fetch_scalar(&tpl, params!())?, Some(Value::Int(29)));

            let delete = sql::delete("users", [("name", "dana")])
                .ok_or_else(|| OrmError::composition("nothing to delete"))?;
            assert_eq!(tx.execute(&delete, params!())?, 1);
            Ok(())
        })
        .unwrap();

    assert_eq!(count(&engine, "users"), 0);
}

#[test]
fn composed_select_maps_rows() {
    let (_dir, engine) = setup(EngineConfig::default());

    let adults = Sql::select(ColumnList::new(["id", "name"]).with_table("u"))
        .from_("users u")
        .where_(sql::and([
            Column::new("u.age").ge(18),
            Column::new("u.name").ne("mallory"),
        ]))
        .order_by("u.id");

    let names: Vec<(i64, String)> = engine
        .transaction(|tx| {
            tx.execute_many(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[
                    params!["alice", 30],
                    params!["bob", 17],
                    params!["mallory", 40],
                    params!["carol", 45],
                ],
            )?;
            tx.fetch_as::<(i64, String)>(&adults, params!())?.all()
        })
        .unwrap();

    assert_eq!(
        names,
        vec![(1, "alice".to_string()), (4, "carol".to_string())]
    );
}

#[test]
fn pool_capacity_applies_to_concurrent_sessions() {
    let (_dir, engine) = setup(EngineConfig::default().with_max_pool_conns(1));

    let first = engine.session();
    first.connect().unwrap();
    let second = engine.session();
    assert!(second.connect().unwrap_err().is_capacity());

    first.close().unwrap();
    second.connect().unwrap();
    second.close().unwrap();
}

#[test]
fn after_commit_runs_once_data_is_durable() {
    let (_dir, engine) = setup(EngineConfig::default());
    let seen = std::rc::Rc::new(std::cell::Cell::new(-1));

    let probe = engine.clone();
    let slot = seen.clone();
    engine
        .transaction(|tx| -> OrmResult<()> {
            tx.execute("INSERT INTO audit (msg) VALUES (?)", params!["hello"])?;
            sqlweave::after_commit(move || slot.set(count(&probe, "audit")))
        })
        .unwrap();

    assert_eq!(seen.get(), 1);
}

#[test]
fn engine_from_uri() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uri.db");
    let uri = format!(
        "sqlite://{}?max_pool_conns=2&busy_timeout=250&log_level=debug",
        path.display()
    );

    let engine = Engine::from_uri(&uri).unwrap();
    assert_eq!(engine.pool().max_conns(), Some(2));
    assert_eq!(engine.paramstyle(), ParamStyle::Qmark);
    assert_eq!(engine.pool().driver().name(), "sqlite");

    engine
        .transaction(|tx| tx.execute("CREATE TABLE t (x INTEGER)", params!()))
        .unwrap();

    let err = Engine::from_uri(&format!("sqlite://{}?cache=shared", path.display())).unwrap_err();
    assert!(matches!(err, OrmError::Config(_)));
}
