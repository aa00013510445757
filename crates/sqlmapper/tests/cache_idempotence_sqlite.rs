use sqlmapper::prelude::*;
use sqlmapper_sqlite::SqliteConnection;

#[derive(Debug, Default, Clone, PartialEq, sqlmapper::Record)]
#[sqlmapper(table = "People")]
struct Person {
    #[sqlmapper(identity)]
    id: i64,
    name: String,
    age: Option<i32>,
}

fn open() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(
        "create table People (id integer primary key autoincrement, name text not null, age int);
         insert into People (name, age) values ('Fabian', 30), ('Jurian', 40);",
    )
    .expect("seed");
    conn
}

fn names_older_than(mapper: &SqlMapper, conn: &SqliteConnection, age: i32) -> Vec<Person> {
    mapper
        .query::<Person, _>(
            conn,
            "select id, name, age from People where age > @age order by id",
            params! { "age" => age },
            None,
        )
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows")
}

#[test]
fn sqlite_repeated_query_reuses_compiled_plans() {
    let conn = open();
    let mapper = SqlMapper::new();

    assert_eq!(names_older_than(&mapper, &conn, 20).len(), 2);
    let stats = mapper.stats();
    assert_eq!(stats.deserializer_compiles(), 1);
    assert_eq!(stats.binder_compiles(), 1);
    let cached = mapper.cached_queries();

    for age in [25, 35, 45] {
        names_older_than(&mapper, &conn, age);
    }
    assert_eq!(stats.deserializer_compiles(), 1);
    assert_eq!(stats.binder_compiles(), 1);
    assert_eq!(mapper.cached_queries(), cached);
    assert_eq!(names_older_than(&mapper, &conn, 35)[0].name, "Jurian");
}

#[test]
fn sqlite_each_target_type_gets_its_own_plan() {
    let conn = open();
    let mapper = SqlMapper::new();
    let sql = "select name from People order by id";

    let names: Vec<String> = mapper
        .query::<String, _>(&conn, sql, (), None)
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows");
    let rows: Vec<DynamicRow> = mapper
        .query_dynamic(&conn, sql, (), None)
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows");

    assert_eq!(names, ["Fabian", "Jurian"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(mapper.stats().deserializer_compiles(), 2);
    assert_eq!(mapper.cached_queries(), 2);
}

#[test]
fn sqlite_connections_do_not_share_cache_entries() {
    let first = open();
    let second = open();
    let mapper = SqlMapper::new();

    names_older_than(&mapper, &first, 20);
    names_older_than(&mapper, &second, 20);
    assert_eq!(mapper.cached_queries(), 2);
    assert_eq!(mapper.stats().deserializer_compiles(), 2);
}

#[test]
fn sqlite_entity_statements_are_generated_once() {
    let conn = open();
    let mapper = SqlMapper::new();

    for id in [1_i64, 2, 3] {
        let _: Option<Person> = mapper.select_by_id(&conn, id, None).expect("select by id");
    }
    let sql = mapper.entity::<Person>().sql().expect("entity sql").select_all.clone();
    assert_eq!(sql, "select id, name, age from People");
    assert_eq!(mapper.stats().deserializer_compiles(), 1);
}

#[test]
fn sqlite_record_shaped_table_operations_cache_their_statement() {
    let conn = open();
    let mapper = SqlMapper::new();

    for name in ["Marc", "Anna"] {
        let person = Person {
            name: name.into(),
            ..Default::default()
        };
        mapper.delete_where(&conn, "People", &person, None).expect("delete where");
    }
    assert_eq!(mapper.stats().statement_builds(), 1);

    for name in ["Marc", "Anna"] {
        mapper
            .delete_where(&conn, "People", params! { "name" => name }, None)
            .expect("delete where");
    }
    assert_eq!(mapper.stats().statement_builds(), 3);
}

#[test]
fn sqlite_failed_row_mapping_does_not_poison_the_cache() {
    let conn = open();
    let mapper = SqlMapper::new();
    let sql = "select @v";

    let err = mapper
        .scalar::<i32, _>(&conn, sql, params! { "v" => "abc" }, None)
        .expect_err("text is not an integer");
    assert!(err.is_data_error());

    let ok: Option<i32> = mapper
        .scalar(&conn, sql, params! { "v" => 7 }, None)
        .expect("scalar");
    assert_eq!(ok, Some(7));
}
