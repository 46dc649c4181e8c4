use super::*;
use crate::error::OrmError;
use crate::value::Value;

fn qmark(sql: &Sql) -> Rendered {
    sql.render(ParamStyle::Qmark).unwrap()
}

#[test]
fn values_become_placeholders() {
    let q = Sql::select("*")
        .from_("users")
        .where_(Column::new("id").eq(42));

    let out = qmark(&q);
    assert_eq!(out.sql, "SELECT * FROM users WHERE id = ?");
    assert_eq!(out.params, Params::Positional(vec![Value::Int(42)]));
}

#[test]
fn sql_operands_are_not_bound() {
    let cond = Column::new("a_id").with_table("b").eq(Column::new("id").with_table("a"));
    let out = qmark(&cond);
    assert_eq!(out.sql, "b.a_id = a.id");
    assert!(out.params.is_empty());
}

#[test]
fn rendering_twice_is_identical() {
    let q = Sql::select(ColumnList::new(["id", "name"]))
        .from_("users")
        .where_(and([
            Column::new("age").ge(18),
            Column::new("name").like("a%"),
        ]))
        .limit(10);

    let first = qmark(&q);
    let second = qmark(&q);
    assert_eq!(first, second);
    assert_eq!(
        first.sql,
        "SELECT id, name FROM users WHERE (age >= ? AND name LIKE ?) LIMIT ?"
    );
    assert_eq!(first.params.len(), 3);
}

#[test]
fn numeric_placeholders_are_zero_based() {
    let q = and([Column::new("a").eq(1), Column::new("b").eq(2)]);
    let out = q.render(ParamStyle::Numeric).unwrap();
    assert_eq!(out.sql, "(a = :0 AND b = :1)");
}

#[test]
fn named_styles_collect_a_mapping() {
    let q = and([
        Sql::raw("a").eq(Sql::named_param("x", 1)),
        Sql::raw("b").eq(Sql::named_param("x", 2)),
        Sql::raw("c").eq(3),
    ]);

    let named = q.render(ParamStyle::Named).unwrap();
    assert_eq!(named.sql, "(a = :x AND b = :x_2 AND c = :param_1)");
    assert_eq!(
        named.params,
        Params::Named(vec![
            ("x".into(), Value::Int(1)),
            ("x_2".into(), Value::Int(2)),
            ("param_1".into(), Value::Int(3)),
        ])
    );

    let pyformat = q.render(ParamStyle::Pyformat).unwrap();
    assert_eq!(pyformat.sql, "(a = %(x)s AND b = %(x_2)s AND c = %(param_1)s)");
}

#[test]
fn format_style_uses_percent_s() {
    let out = Sql::raw("a").eq(1).render(ParamStyle::Format).unwrap();
    assert_eq!(out.sql, "a = %s");
}

#[test]
fn empty_boolean_combinators_render_nothing() {
    let empty_and = and(Vec::<Sql>::new());
    let empty_or = or(Vec::<Sql>::new());
    assert!(empty_and.is_empty());
    assert!(empty_or.is_empty());
    assert_eq!(empty_and.to_sql().unwrap(), "");
    assert_eq!(empty_or.to_sql().unwrap(), "");

    let q = Sql::select("*").from_("t").where_(empty_and);
    assert_eq!(q.to_sql().unwrap(), "SELECT * FROM t");
}

#[test]
fn boolean_operators_flatten_and_wrap() {
    let q = Column::new("a").eq(1) & Column::new("b").eq(2) & Column::new("c").eq(3);
    assert_eq!(q.to_sql().unwrap(), "(a = ? AND b = ? AND c = ?)");

    let q = Column::new("a").eq(1) | Column::new("b").eq(2);
    assert_eq!(q.to_sql().unwrap(), "(a = ? OR b = ?)");

    let q = !Column::new("done").eq(true);
    assert_eq!(q.to_sql().unwrap(), "NOT done = ?");
}

#[test]
fn in_values_with_empty_set_is_false() {
    let q = Column::new("id").in_values([1, 2, 3]);
    let out = qmark(&q);
    assert_eq!(out.sql, "id IN (?, ?, ?)");
    assert_eq!(out.params.len(), 3);

    let q = Column::new("id").in_values(Vec::<i64>::new());
    assert_eq!(q.to_sql().unwrap(), "1 = 0");
}

#[test]
fn column_rendering() {
    let col = Column::new("id").with_table("kids").prefixed("kids__");
    assert_eq!(Sql::from_column(&col), "kids.id AS kids__id");

    let col = Column::new("name").aliased("n");
    assert_eq!(Sql::from_column(&col), "name AS n");

    let col = Column::expr(func("count", [Sql::raw("*")]), "total");
    assert_eq!(Sql::from_column(&col), "(COUNT(*)) AS total");

    assert_eq!(col.alias_or_name(), "total");
}

impl Sql {
    fn from_column(col: &Column) -> String {
        Sql::Column(col.clone()).to_sql().unwrap()
    }
}

#[test]
fn column_list_wildcard_rules() {
    assert_eq!(Sql::from(ColumnList::default()).to_sql().unwrap(), "*");
    assert_eq!(
        Sql::from(ColumnList::default().with_table("t")).to_sql().unwrap(),
        "t.*"
    );
    let forced = ColumnList::new(["a"]).with_table("t").wildcard(true);
    assert_eq!(Sql::from(forced).to_sql().unwrap(), "t.*");

    let disabled = ColumnList::default().wildcard(false);
    let sql = Sql::from(disabled);
    assert!(sql.is_empty());
    assert_eq!(sql.to_sql().unwrap(), "");

    let cols = ColumnList::new(["id", "name"]).with_table("p").prefixed("parent__");
    assert_eq!(
        Sql::from(cols.clone()).to_sql().unwrap(),
        "p.id AS parent__id, p.name AS parent__name"
    );
    assert_eq!(cols.names(), vec!["id", "name"]);
    assert!(cols.contains("id"));
    assert!(!cols.contains("missing"));
}

#[test]
fn identifier_alias() {
    let ident = Identifier::new("users").aliased("u");
    assert_eq!(Sql::from(ident.clone()).to_sql().unwrap(), "users AS u");
    assert_eq!(ident.alias_or_name(), "u");
}

#[test]
fn function_binds_plain_arguments() {
    let q = func("coalesce", [Operand::from(Sql::raw("nickname")), Operand::from("anon")]);
    let out = qmark(&q);
    assert_eq!(out.sql, "COALESCE(nickname, ?)");
    assert_eq!(out.params, Params::Positional(vec![Value::from("anon")]));
}

#[test]
fn case_expression() {
    let q = case(
        [(Sql::raw("a > 1"), Operand::from("big"))],
        Some(Operand::from(Sql::raw("'small'"))),
    );
    let out = qmark(&q);
    assert_eq!(out.sql, "CASE WHEN a > 1 THEN ? ELSE 'small' END");
    assert_eq!(out.params.len(), 1);
}

#[test]
fn insert_binds_values_by_column_name() {
    let q = insert("users", [("name", Operand::from("ann")), ("age", Operand::from(30))])
        .unwrap();
    let out = q.render(ParamStyle::Named).unwrap();
    assert_eq!(out.sql, "INSERT INTO users (name, age) VALUES (:name, :age)");
    assert_eq!(out.params.get("age"), Some(&Value::Int(30)));
}

#[test]
fn insert_embeds_sql_values_raw() {
    let q = insert(
        "users",
        [
            ("name", Operand::from("ann")),
            ("created_at", Operand::from(Sql::raw("CURRENT_TIMESTAMP"))),
        ],
    )
    .unwrap();
    let out = qmark(&q);
    assert_eq!(
        out.sql,
        "INSERT INTO users (name, created_at) VALUES (?, CURRENT_TIMESTAMP)"
    );
    assert_eq!(out.params.len(), 1);
}

#[test]
fn empty_mappings_produce_no_statement() {
    let empty: Vec<(&str, Operand)> = Vec::new();
    assert!(insert("users", empty.clone()).is_none());
    assert!(update("users", empty.clone()).is_none());
    assert!(delete("users", empty).is_none());
}

#[test]
fn update_and_delete() {
    let q = update("users", [("name", "bob")])
        .unwrap()
        .where_(Column::new("id").eq(1));
    assert_eq!(q.to_sql().unwrap(), "UPDATE users SET name = ? WHERE id = ?");

    let q = delete("users", [("id", 1), ("org", 2)]).unwrap();
    assert_eq!(q.to_sql().unwrap(), "DELETE FROM users WHERE id = ? AND org = ?");
}

#[test]
fn primary_key_conditions() {
    let single = [Column::new("id")];
    let cond = primary_key_condition(&single, PrimaryKey::single(5)).unwrap();
    assert_eq!(cond.to_sql().unwrap(), "id = ?");

    let composite = [Column::new("a").with_table("t"), Column::new("b").with_table("t")];
    let cond = primary_key_condition(&composite, PrimaryKey::composite([1, 2])).unwrap();
    assert_eq!(cond.to_sql().unwrap(), "(t.a = ? AND t.b = ?)");

    let err = primary_key_condition(&composite, PrimaryKey::single(1)).unwrap_err();
    assert!(matches!(err, OrmError::Composition(ref m) if m.contains("requires a tuple")));

    let err = primary_key_condition(&composite, PrimaryKey::composite([1])).unwrap_err();
    assert!(matches!(err, OrmError::Composition(_)));

    let err = primary_key_condition(&[], PrimaryKey::single(1)).unwrap_err();
    assert!(matches!(err, OrmError::Composition(ref m) if m.contains("Missing primary key")));
}

#[test]
fn placeholders_reference_external_params() {
    let q = Sql::raw("SELECT * FROM t WHERE a =").push_owned(Sql::placeholder("a"));
    let params = Params::Named(vec![("a".into(), Value::Int(1))]);

    let out = q.render_with(params.clone(), ParamStyle::Named).unwrap();
    assert_eq!(out.sql, "SELECT * FROM t WHERE a = :a");
    assert_eq!(out.params, params);

    let out = q.render_with(params, ParamStyle::Numeric).unwrap();
    assert_eq!(out.sql, "SELECT * FROM t WHERE a = :0");
    assert_eq!(out.params, Params::Positional(vec![Value::Int(1)]));

    let err = q.render(ParamStyle::Named).unwrap_err();
    assert!(matches!(err, OrmError::Parameter(_)));
}

impl Sql {
    fn push_owned(mut self, part: Sql) -> Sql {
        self.push(part);
        self
    }
}

#[test]
fn external_params_precede_collected_ones() {
    let q = Sql::raw("a = ?").push_owned(Sql::raw("AND b =")).push_owned(Sql::param(2));
    let out = q
        .render_with(Params::Positional(vec![Value::Int(1)]), ParamStyle::Qmark)
        .unwrap();
    assert_eq!(out.sql, "a = ? AND b = ?");
    assert_eq!(out.params, Params::Positional(vec![Value::Int(1), Value::Int(2)]));
}

#[test]
fn collector_names_are_unique() {
    let mut c = ParameterCollector::new(ParamStyle::Named);
    let placeholders = [
        c.add(1, None),
        c.add(2, Some("id")),
        c.add(3, Some("id")),
        c.add(4, None),
        c.add(5, Some("id")),
    ];
    assert_eq!(placeholders, [":param_1", ":id", ":id_2", ":param_2", ":id_3"]);
    assert_eq!(c.get("id_2").unwrap(), &Value::Int(3));
    assert_eq!(c.index(3).unwrap(), &Value::Int(4));
    assert_eq!(c.len(), 5);
}

#[test]
fn collector_positional_ignores_names() {
    let mut c = ParameterCollector::new(ParamStyle::Qmark);
    assert_eq!(c.add("x", Some("name")), "?");
    assert_eq!(c.add("y", Some("name")), "?");
    assert_eq!(c.get("name_2").unwrap(), &Value::from("y"));
    assert_eq!(
        c.into_params(),
        Params::Positional(vec![Value::from("x"), Value::from("y")])
    );
}

#[test]
fn collector_lookups_fail_descriptively() {
    let c = ParameterCollector::new(ParamStyle::Qmark);
    let err = c.get("missing").unwrap_err();
    assert!(err.to_string().contains("Missing parameter 'missing'"));
    let err = c.index(0).unwrap_err();
    assert!(matches!(err, OrmError::Parameter(_)));
}

#[test]
fn named_style_rejects_positional_seed() {
    let err = ParameterCollector::with_params(
        ParamStyle::Named,
        Params::Positional(vec![Value::Int(1)]),
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::Parameter(_)));

    let seeded =
        ParameterCollector::with_params(ParamStyle::Qmark, Params::Positional(vec![Value::Int(1)]))
            .unwrap();
    assert_eq!(seeded.get("param_1").unwrap(), &Value::Int(1));
}

#[test]
fn paramstyle_parses() {
    assert_eq!("qmark".parse::<ParamStyle>().unwrap(), ParamStyle::Qmark);
    assert_eq!("Numeric".parse::<ParamStyle>().unwrap(), ParamStyle::Numeric);
    assert_eq!("pyformat".parse::<ParamStyle>().unwrap(), ParamStyle::Pyformat);
    assert!("dollar".parse::<ParamStyle>().is_err());
}

#[test]
fn params_macro_shapes() {
    assert_eq!(crate::params![], Params::Positional(vec![]));
    assert_eq!(
        crate::params![1, "a"],
        Params::Positional(vec![Value::Int(1), Value::from("a")])
    );
    assert_eq!(
        crate::params! { id = 1 },
        Params::Named(vec![("id".into(), Value::Int(1))])
    );
}

#[test]
fn template_splices_and_binds() {
    let tpl = SqlTemplate::parse("SELECT * FROM {table} WHERE id = %(id)s")
        .unwrap()
        .with("table", Sql::raw("users"))
        .with("id", 1);
    let out = tpl.render(ParamStyle::Qmark).unwrap();
    assert_eq!(out.sql, "SELECT * FROM users WHERE id = ?");
    assert_eq!(out.params, Params::Positional(vec![Value::Int(1)]));

    let out = tpl.render(ParamStyle::Named).unwrap();
    assert_eq!(out.sql, "SELECT * FROM users WHERE id = :id");
}

#[test]
fn template_nodes_collect_their_params() {
    let cond = Column::new("age").gt(18);
    let tpl = SqlTemplate::parse("SELECT * FROM users WHERE {cond} LIMIT {n}")
        .unwrap()
        .with("cond", cond)
        .with("n", 5);
    let out = Sql::from(tpl).render(ParamStyle::Qmark).unwrap();
    assert_eq!(out.sql, "SELECT * FROM users WHERE age > ? LIMIT 5");
    assert_eq!(out.params, Params::Positional(vec![Value::Int(18)]));
}

#[test]
fn template_overrides_and_escapes() {
    let tpl = SqlTemplate::parse("SELECT '{{}}' AS braces, %(x)s").unwrap().with("x", 1);
    let mut overrides = Locals::new();
    overrides.insert("x".into(), Operand::from(2));
    let out = tpl.render_locals(&overrides, ParamStyle::Qmark).unwrap();
    assert_eq!(out.sql, "SELECT '{}' AS braces, ?");
    assert_eq!(out.params, Params::Positional(vec![Value::Int(2)]));
    assert_eq!(tpl.names(), vec!["x"]);
}

#[test]
fn template_errors_fail_fast() {
    for bad in [
        "SELECT {table",
        "SELECT %(id",
        "SELECT {}",
        "SELECT {a b}",
        "%(1x)s",
        "SELECT * FROM {table:i}",
    ] {
        let err = SqlTemplate::parse(bad).unwrap_err();
        assert!(matches!(err, OrmError::Composition(_)), "{bad}");
    }

    let tpl = SqlTemplate::parse("SELECT {missing}").unwrap();
    let err = tpl.render(ParamStyle::Qmark).unwrap_err();
    assert!(err.to_string().contains("'missing' is not defined"));
}

#[test]
fn template_keeps_percent_literals() {
    let tpl = SqlTemplate::parse("SELECT * FROM t WHERE name LIKE 'a%' AND id = %(id)s")
        .unwrap()
        .with("id", 3);
    let out = tpl.render(ParamStyle::Format).unwrap();
    assert_eq!(out.sql, "SELECT * FROM t WHERE name LIKE 'a%' AND id = %s");
}

#[test]
fn query_builder_orders_components() {
    let qb = QueryBuilder::new()
        .limit(5)
        .where_(Column::new("a").eq(1))
        .order_by(["name"])
        .left_join("posts p", "p.user_id = u.id")
        .select(["u.id", "u.name"])
        .from_(["users u"])
        .where_(Column::new("b").eq(2))
        .where_(and(Vec::<Sql>::new()));

    let out = qb.render(ParamStyle::Qmark).unwrap();
    assert_eq!(
        out.sql,
        "SELECT u.id, u.name FROM users u LEFT JOIN posts p ON p.user_id = u.id \
         WHERE a = ? AND b = ? ORDER BY name LIMIT ?"
    );
    assert_eq!(
        out.params,
        Params::Positional(vec![Value::Int(1), Value::Int(2), Value::Int(5)])
    );
}

#[test]
fn query_builder_replaces_single_components() {
    let qb = QueryBuilder::new()
        .from_(["a"])
        .from_(["b"])
        .group_by(["x"])
        .having(Sql::raw("COUNT(*) > 1"));
    assert_eq!(
        qb.to_sql_node().to_sql().unwrap(),
        "SELECT * FROM b GROUP BY x HAVING COUNT(*) > 1"
    );
}

#[test]
fn plain_text_passes_through() {
    let out = "SELECT ?".render_with(crate::params![1], ParamStyle::Named).unwrap();
    assert_eq!(out.sql, "SELECT ?");
    assert_eq!(out.params, crate::params![1]);
}

#[test]
fn split_statements_respects_quotes() {
    let script = "CREATE TABLE t (a TEXT); INSERT INTO t VALUES ('x;y');\n\n;SELECT 1";
    assert_eq!(
        split_statements(script),
        vec![
            "CREATE TABLE t (a TEXT)",
            "INSERT INTO t VALUES ('x;y')",
            "SELECT 1"
        ]
    );
}

#[test]
fn strips_comments_before_keyword() {
    let s = strip_sql_prefix("  -- note\n/* x */ (SELECT 1)");
    assert!(starts_with_keyword(s, "select"));
}
