//! Integration tests for statement execution, the optimizer and EXPLAIN.

use lodedb_core::catalog::{IndexInfo, TableInfo};
use lodedb_core::document::{BinaryCodec, Document, FieldBuffer, Value};
use lodedb_core::query::{
    ArithOp, CmpOp, CreateIndexStmt, CreateTableStmt, DropTableStmt, ExplainStmt, Expr,
    Operator, Param, ProjectedExpr, Statement, Stream, StreamStmt, NO_EXEC,
};
use lodedb_core::storage::{StorageConfig, StorageEngine};
use lodedb_core::{optimize, Database, Error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn users() -> Database {
    init_tracing();
    let db = Database::open(StorageConfig::temporary()).unwrap();
    db.exec(
        &CreateTableStmt {
            info: TableInfo::new("users").with_primary_key("id"),
            if_not_exists: false,
        },
        &[],
    )
    .unwrap();
    db.exec(
        &CreateIndexStmt {
            info: IndexInfo::new("idx_age", "users", "age"),
            if_not_exists: false,
        },
        &[],
    )
    .unwrap();

    let rows = [(1, "ana", 30), (2, "bob", 20), (3, "cid", 40), (4, "dan", 20)]
        .into_iter()
        .map(|(id, name, age)| {
            Expr::Document(vec![
                ("id".into(), Expr::lit(id)),
                ("name".into(), Expr::lit(name)),
                ("age".into(), Expr::lit(age)),
            ])
        })
        .collect();
    db.exec(&insert("users", rows), &[]).unwrap();
    db
}

fn insert(table: &str, docs: Vec<Expr>) -> StreamStmt {
    StreamStmt::insert(Stream::new(vec![
        Operator::Documents(docs),
        Operator::TableInsert {
            table: table.into(),
        },
    ]))
}

fn scan(table: &str) -> Stream {
    Stream::new(vec![Operator::SeqScan {
        table: table.into(),
    }])
}

fn cmp(op: CmpOp, field: &str, value: impl Into<Value>) -> Expr {
    Expr::compare(op, Expr::field(field), Expr::lit(value))
}

fn names(docs: &[FieldBuffer]) -> Vec<String> {
    docs.iter()
        .map(|doc| doc.get("name").unwrap().as_text().unwrap().to_string())
        .collect()
}

fn select_all(db: &Database) -> Vec<FieldBuffer> {
    db.query(&StreamStmt::select(scan("users")), &[]).unwrap()
}

fn explain(db: &Database, stmt: impl Statement + 'static) -> Result<Vec<FieldBuffer>, Error> {
    db.query(&ExplainStmt::new(stmt), &[])
}

#[test]
fn test_explain_delete_leaves_data_unchanged() {
    let db = users();
    let before = select_all(&db);
    let delete = StreamStmt::delete(
        scan("users")
            .pipe(Operator::Filter(cmp(CmpOp::Gt, "age", 10)))
            .pipe(Operator::TableDelete {
                table: "users".into(),
            }),
    );

    let result = explain(&db, delete).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(
        lodedb_core::document::to_json(&result[0]).unwrap(),
        r#"{"plan":"indexScan(\"idx_age\", (10, +inf)) | filter(age > 10) | tableDelete('users')"}"#
    );

    let after = select_all(&db);
    assert_eq!(after.len(), 4);
    assert_eq!(names(&before), names(&after));
}

#[test]
fn test_explain_update_leaves_data_unchanged() {
    let db = users();
    let update = StreamStmt::update(
        scan("users")
            .pipe(Operator::Filter(cmp(CmpOp::Eq, "name", "bob")))
            .pipe(Operator::Set {
                path: "age".parse().unwrap(),
                expr: Expr::arith(ArithOp::Add, Expr::field("age"), Expr::lit(1)),
            })
            .pipe(Operator::TableReplace {
                table: "users".into(),
            }),
    );
    let plan = explain(&db, update).unwrap();
    assert_eq!(
        plan[0].get("plan"),
        Some(&Value::text(
            "seqScan(users) | filter(name = \"bob\") | set(age, age + 1) | tableReplace('users')"
        ))
    );

    let ages: Vec<Value> = select_all(&db)
        .iter()
        .map(|doc| doc.get("age").cloned().unwrap())
        .collect();
    assert_eq!(
        ages,
        vec![
            Value::Integer(30),
            Value::Integer(20),
            Value::Integer(40),
            Value::Integer(20)
        ]
    );
}

#[test]
fn test_explain_select_and_insert() {
    let db = users();
    let select = StreamStmt::select(
        scan("users")
            .pipe(Operator::Filter(Expr::and(
                Expr::compare(
                    CmpOp::Eq,
                    Expr::field("age"),
                    Expr::arith(ArithOp::Mul, Expr::lit(10), Expr::lit(2)),
                ),
                cmp(CmpOp::Neq, "name", "dan"),
            )))
            .pipe(Operator::Project(vec![ProjectedExpr::Wildcard])),
    );
    let plan = explain(&db, select).unwrap();
    assert_eq!(
        plan[0].get("plan"),
        Some(&Value::text(
            "indexScan(\"idx_age\", [20, 20]) | filter(age = 20) | filter(name != \"dan\")"
        ))
    );

    let plan = explain(
        &db,
        insert(
            "users",
            vec![Expr::Document(vec![("id".into(), Expr::PositionalParam(1))])],
        ),
    )
    .unwrap();
    assert_eq!(
        plan[0].get("plan"),
        Some(&Value::text("documents({id: ?}) | tableInsert('users')"))
    );
    assert_eq!(select_all(&db).len(), 4);
}

#[test]
fn test_explain_no_exec() {
    let db = users();
    let plan = explain(&db, StreamStmt::select(Stream::default())).unwrap();
    assert_eq!(plan[0].get("plan"), Some(&Value::text(NO_EXEC)));

    let falsy = StreamStmt::select(scan("users").pipe(Operator::Filter(Expr::compare(
        CmpOp::Gt,
        Expr::lit(1),
        Expr::lit(2),
    ))));
    let plan = explain(&db, falsy).unwrap();
    assert_eq!(plan[0].get("plan"), Some(&Value::text("<no exec>")));
}

#[test]
fn test_explain_ddl_is_unsupported() {
    let db = users();
    let stmt = DropTableStmt {
        name: "users".into(),
        if_exists: false,
    };
    assert!(matches!(
        explain(&db, stmt),
        Err(Error::UnsupportedStatement(_))
    ));
    let stmt = CreateIndexStmt {
        info: IndexInfo::new("idx_name", "users", "name"),
        if_not_exists: false,
    };
    assert!(matches!(
        explain(&db, stmt),
        Err(Error::UnsupportedStatement(_))
    ));
    assert_eq!(select_all(&db).len(), 4);
}

#[test]
fn test_explain_nested_explain() {
    let db = users();
    let inner = ExplainStmt::new(StreamStmt::select(scan("users")));
    assert!(matches!(
        explain(&db, inner),
        Err(Error::UnsupportedStatement(_))
    ));
}

#[test]
fn test_unique_index() {
    let db = users();
    db.exec(
        &CreateIndexStmt {
            info: IndexInfo::new("idx_name", "users", "name").unique(),
            if_not_exists: false,
        },
        &[],
    )
    .unwrap();

    let dup = insert(
        "users",
        vec![Expr::Document(vec![
            ("id".into(), Expr::lit(5)),
            ("name".into(), Expr::lit("ana")),
        ])],
    );
    assert!(matches!(db.exec(&dup, &[]), Err(Error::DuplicateDocument)));

    let ok = insert(
        "users",
        vec![Expr::Document(vec![
            ("id".into(), Expr::NamedParam("id".into())),
            ("name".into(), Expr::NamedParam("name".into())),
        ])],
    );
    let params = [Param::named("id", 5), Param::named("name", "eve")];
    assert_eq!(db.exec(&ok, &params).unwrap(), 1);
    assert_eq!(select_all(&db).len(), 5);
}

#[test]
fn test_query_result_json() {
    let db = users();
    let engine = db.engine();
    let tx = engine.begin(false);
    let stmt = StreamStmt::select(
        scan("users")
            .pipe(Operator::Sort {
                expr: Expr::field("age"),
                desc: true,
            })
            .pipe(Operator::Take(2))
            .pipe(Operator::Project(vec![
                ProjectedExpr::field("name"),
                ProjectedExpr::named(
                    Expr::arith(ArithOp::Div, Expr::field("age"), Expr::lit(10)),
                    "decades",
                ),
            ])),
    );
    let result = stmt.run(&tx, &[]).unwrap();
    assert_eq!(
        result.to_json().unwrap(),
        serde_json::json!([
            {"name": "cid", "decades": 4},
            {"name": "ana", "decades": 3},
        ])
    );
}

#[test]
fn test_persistence() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(StorageConfig::new(dir.path())).unwrap();
        db.exec(
            &CreateTableStmt {
                info: TableInfo::new("notes"),
                if_not_exists: false,
            },
            &[],
        )
        .unwrap();
        let docs = vec![
            Expr::Document(vec![("text".into(), Expr::lit("first"))]),
            Expr::Document(vec![("text".into(), Expr::lit("second"))]),
        ];
        assert_eq!(db.exec(&insert("notes", docs), &[]).unwrap(), 2);
        db.flush().unwrap();
    }

    let db = Database::open(StorageConfig::new(dir.path())).unwrap();
    let docs = db.query(&StreamStmt::select(scan("notes")), &[]).unwrap();
    let texts: Vec<&Value> = docs.iter().map(|doc| doc.get("text").unwrap()).collect();
    assert_eq!(texts, vec![&Value::text("first"), &Value::text("second")]);
}

#[test]
fn test_codec_conformance() {
    lodedb_core::document::encoding::testing::test_codec(&BinaryCodec);
}

fn random_literal(rng: &mut StdRng) -> Value {
    match rng.gen_range(0..6) {
        0 => Value::Double(rng.gen_range(0..20) as f64 / 2.0),
        1 => Value::text(["a", "b", "c"][rng.gen_range(0..3)]),
        _ => Value::Integer(rng.gen_range(0..10)),
    }
}

fn random_filter(rng: &mut StdRng, depth: usize) -> Expr {
    const OPS: [CmpOp; 6] = [
        CmpOp::Eq,
        CmpOp::Neq,
        CmpOp::Lt,
        CmpOp::Lte,
        CmpOp::Gt,
        CmpOp::Gte,
    ];
    let choice = if depth == 0 { rng.gen_range(0..3) } else { rng.gen_range(0..6) };
    match choice {
        0 => {
            let field = Expr::field(["a", "b", "c"][rng.gen_range(0..3)]);
            let op = OPS[rng.gen_range(0..OPS.len())];
            Expr::compare(op, field, Expr::Literal(random_literal(rng)))
        }
        1 => {
            let field = Expr::field(["a", "b"][rng.gen_range(0..2)]);
            let op = OPS[rng.gen_range(0..OPS.len())];
            Expr::compare(op, Expr::Literal(random_literal(rng)), field)
        }
        2 => {
            let sum = Expr::arith(
                ArithOp::Add,
                Expr::lit(rng.gen_range(0..5)),
                Expr::lit(rng.gen_range(0..5)),
            );
            Expr::compare(OPS[rng.gen_range(0..OPS.len())], Expr::field("b"), sum)
        }
        3 => Expr::and(random_filter(rng, depth - 1), random_filter(rng, depth - 1)),
        4 => Expr::or(random_filter(rng, depth - 1), random_filter(rng, depth - 1)),
        _ => Expr::compare(
            CmpOp::Lt,
            Expr::lit(rng.gen_range(0..3)),
            Expr::lit(rng.gen_range(0..3)),
        ),
    }
}

fn sorted_ids(stream: Option<&Stream>, tx: &lodedb_core::Transaction<'_>) -> Vec<i64> {
    let Some(stream) = stream else {
        return Vec::new();
    };
    let mut ids: Vec<i64> = stream
        .iterate(tx, &[])
        .unwrap()
        .map(|row| {
            let row = row.unwrap();
            row.document.get_by_field("id").unwrap().as_integer().unwrap()
        })
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_optimizer_preserves_results() {
    init_tracing();
    let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    {
        let tx = engine.begin(true);
        let catalog = tx.catalog().unwrap();
        catalog
            .create_table(TableInfo::new("t").with_primary_key("id"))
            .unwrap();
        catalog.create_index(IndexInfo::new("idx_a", "t", "a")).unwrap();
        catalog.create_index(IndexInfo::new("idx_b", "t", "b")).unwrap();

        let table = catalog.get_table("t").unwrap();
        for id in 0..200 {
            let mut doc = FieldBuffer::new().with_field("id", id as i64);
            if rng.gen_bool(0.9) {
                doc.add("a", random_literal(&mut rng));
            }
            if rng.gen_bool(0.9) {
                doc.add("b", random_literal(&mut rng));
            }
            if rng.gen_bool(0.5) {
                doc.add("c", Value::Null);
            }
            table.insert(&doc).unwrap();
        }
        tx.commit().unwrap();
    }

    let tx = engine.begin(false);
    let mut index_plans = 0;
    for _ in 0..300 {
        let mut stream = Stream::new(vec![Operator::SeqScan { table: "t".into() }]);
        for _ in 0..rng.gen_range(1..4) {
            stream = stream.pipe(Operator::Filter(random_filter(&mut rng, 2)));
        }
        let optimized = optimize(stream.clone(), &tx).unwrap();
        if matches!(&optimized, Some(s) if matches!(s.ops[0], Operator::IndexScan { .. })) {
            index_plans += 1;
        }
        assert_eq!(
            sorted_ids(Some(&stream), &tx),
            sorted_ids(optimized.as_ref(), &tx),
            "plan {} rewritten to {:?}",
            stream,
            optimized.as_ref().map(ToString::to_string)
        );
    }
    assert!(index_plans > 0);

    // without a source every stream starts from one empty row
    for _ in 0..100 {
        let mut ops = Vec::new();
        for _ in 0..rng.gen_range(1..4) {
            ops.push(match rng.gen_range(0..4) {
                0 => Operator::Take(rng.gen_range(0..2)),
                1 => Operator::Skip(rng.gen_range(0..2)),
                2 => Operator::Filter(Expr::lit([true, false][rng.gen_range(0..2)])),
                _ => Operator::Filter(Expr::compare(
                    CmpOp::Lt,
                    Expr::lit(rng.gen_range(0..3)),
                    Expr::lit(rng.gen_range(0..3)),
                )),
            });
        }
        let stream = Stream::new(ops);
        let optimized = optimize(stream.clone(), &tx).unwrap();
        let count = |stream: Option<&Stream>| {
            stream.map_or(0, |stream| stream.iterate(&tx, &[]).unwrap().count())
        };
        assert_eq!(
            count(Some(&stream)),
            count(optimized.as_ref()),
            "plan {} rewritten to {:?}",
            stream,
            optimized.as_ref().map(ToString::to_string)
        );
    }
}
