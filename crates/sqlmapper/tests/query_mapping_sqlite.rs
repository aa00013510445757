use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use sqlmapper::prelude::*;
use sqlmapper::{FromRow, StateErrorKind};
use sqlmapper_sqlite::SqliteConnection;

#[derive(Debug, Default, Clone, PartialEq, sqlmapper::Record)]
struct City {
    name: String,
}

#[derive(Debug, Default, Clone, PartialEq, sqlmapper::Record)]
struct Contact {
    email: Option<String>,
    city: Option<City>,
}

#[derive(Debug, Default, Clone, PartialEq, sqlmapper::Record)]
struct Customer {
    id: i64,
    name: String,
    contact_info1: Option<Contact>,
    contact_info2: Option<Contact>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, sqlmapper::SqlEnum)]
enum Status {
    #[default]
    Active,
    Retired,
    #[sqlmapper(other)]
    Other(i32),
}

#[derive(Debug, Default, Clone, PartialEq, sqlmapper::Record)]
struct Member {
    id: i64,
    status: Status,
    initial: Option<char>,
}

#[derive(Debug, Default, Clone, PartialEq, sqlmapper::Record)]
struct AllTypes {
    flag: bool,
    tiny: u8,
    small: i16,
    number: i32,
    big: i64,
    ratio: f32,
    precise: f64,
    amount: Decimal,
    label: String,
    initial: char,
    guid: Uuid,
    stamp: NaiveDateTime,
    stamp_offset: DateTime<FixedOffset>,
    payload: Vec<u8>,
    maybe_flag: Option<bool>,
    maybe_tiny: Option<u8>,
    maybe_small: Option<i16>,
    maybe_number: Option<i32>,
    maybe_big: Option<i64>,
    maybe_ratio: Option<f32>,
    maybe_precise: Option<f64>,
    maybe_amount: Option<Decimal>,
    maybe_label: Option<String>,
    maybe_initial: Option<char>,
    maybe_guid: Option<Uuid>,
    maybe_stamp: Option<NaiveDateTime>,
    maybe_stamp_offset: Option<DateTime<FixedOffset>>,
    maybe_payload: Option<Vec<u8>>,
}

const ALL_TYPES_ECHO: &str = "select @flag as flag, @tiny as tiny, @small as small, \
    @number as number, @big as big, @ratio as ratio, @precise as precise, \
    @amount as amount, @label as label, @initial as initial, @guid as guid, \
    @stamp as stamp, @stamp_offset as stamp_offset, @payload as payload, \
    @maybe_flag as maybe_flag, @maybe_tiny as maybe_tiny, @maybe_small as maybe_small, \
    @maybe_number as maybe_number, @maybe_big as maybe_big, @maybe_ratio as maybe_ratio, \
    @maybe_precise as maybe_precise, @maybe_amount as maybe_amount, \
    @maybe_label as maybe_label, @maybe_initial as maybe_initial, \
    @maybe_guid as maybe_guid, @maybe_stamp as maybe_stamp, \
    @maybe_stamp_offset as maybe_stamp_offset, @maybe_payload as maybe_payload";

fn all_types() -> AllTypes {
    let amount: Decimal = "12.50".parse().expect("decimal");
    let guid = Uuid::parse_str("6f1c2f1e-8a5e-4c1b-9f0e-0d6d3f7a2b11").expect("uuid");
    let stamp = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(13, 5, 0))
        .expect("date");
    let stamp_offset = DateTime::parse_from_rfc3339("2024-02-29T13:05:00+02:00").expect("rfc3339");
    AllTypes {
        flag: true,
        tiny: 255,
        small: -12,
        number: 123_456,
        big: 1 << 40,
        ratio: 1.5,
        precise: -2.25,
        amount,
        label: "Fabian".into(),
        initial: 'Z',
        guid,
        stamp,
        stamp_offset,
        payload: vec![0, 1, 254],
        maybe_flag: Some(false),
        maybe_tiny: Some(7),
        maybe_small: Some(i16::MIN),
        maybe_number: Some(-1),
        maybe_big: Some(i64::MAX),
        maybe_ratio: Some(-0.75),
        maybe_precise: Some(1e10),
        maybe_amount: Some(amount),
        maybe_label: Some(String::new()),
        maybe_initial: Some('ß'),
        maybe_guid: Some(guid),
        maybe_stamp: Some(stamp),
        maybe_stamp_offset: Some(stamp_offset),
        maybe_payload: Some(vec![9]),
    }
}

fn open() -> SqliteConnection {
    SqliteConnection::open_memory().expect("open sqlite memory db")
}

fn echo<T: FromRow + std::fmt::Debug>(mapper: &SqlMapper, conn: &SqliteConnection, value: Value) -> T {
    mapper
        .scalar::<T, _>(conn, "select @v", params! { "v" => value }, None)
        .expect("scalar query")
        .expect("one row")
}

#[test]
fn sqlite_scalar_round_trips_every_supported_type() {
    let conn = open();
    let mapper = SqlMapper::new();

    assert!(echo::<bool>(&mapper, &conn, true.into()));
    assert_eq!(echo::<u8>(&mapper, &conn, 200_u8.into()), 200);
    assert_eq!(echo::<i16>(&mapper, &conn, (-12_i16).into()), -12);
    assert_eq!(echo::<i32>(&mapper, &conn, 123_456.into()), 123_456);
    assert_eq!(echo::<i64>(&mapper, &conn, (1_i64 << 40).into()), 1 << 40);
    assert_eq!(echo::<f64>(&mapper, &conn, 1.5_f64.into()), 1.5);
    assert_eq!(echo::<String>(&mapper, &conn, "Fabian".into()), "Fabian");
    assert_eq!(echo::<Vec<u8>>(&mapper, &conn, vec![1_u8, 2, 3].into()), vec![1, 2, 3]);

    let amount: Decimal = "12.50".parse().expect("decimal");
    assert_eq!(echo::<Decimal>(&mapper, &conn, amount.into()), amount);

    let id = Uuid::parse_str("6f1c2f1e-8a5e-4c1b-9f0e-0d6d3f7a2b11").expect("uuid");
    assert_eq!(echo::<Uuid>(&mapper, &conn, id.into()), id);

    let at: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(13, 5, 0))
        .expect("date");
    assert_eq!(echo::<NaiveDateTime>(&mapper, &conn, at.into()), at);

    let offset = DateTime::parse_from_rfc3339("2024-02-29T13:05:00+02:00").expect("rfc3339");
    assert_eq!(echo::<DateTime<FixedOffset>>(&mapper, &conn, offset.into()), offset);
}

#[test]
fn sqlite_record_members_round_trip_through_parameters() {
    let conn = open();
    let mapper = SqlMapper::new();
    let echo_record = |record: &AllTypes| -> AllTypes {
        mapper
            .query::<AllTypes, _>(&conn, ALL_TYPES_ECHO, record, None)
            .expect("query")
            .next()
            .expect("one row")
            .expect("mapped row")
    };

    let present = all_types();
    assert_eq!(echo_record(&present), present);

    let absent = AllTypes {
        maybe_flag: None,
        maybe_tiny: None,
        maybe_small: None,
        maybe_number: None,
        maybe_big: None,
        maybe_ratio: None,
        maybe_precise: None,
        maybe_amount: None,
        maybe_label: None,
        maybe_initial: None,
        maybe_guid: None,
        maybe_stamp: None,
        maybe_stamp_offset: None,
        maybe_payload: None,
        ..all_types()
    };
    assert_eq!(echo_record(&absent), absent);
}

#[test]
fn sqlite_scalar_reads_null_into_option_and_empty_result_as_none() {
    let conn = open();
    let mapper = SqlMapper::new();

    let null: Option<Option<i32>> = mapper
        .scalar(&conn, "select @v", params! { "v" => Value::Null }, None)
        .expect("scalar query");
    assert_eq!(null, Some(None));

    let present: Option<Option<i32>> = mapper
        .scalar(&conn, "select @v", params! { "v" => Some(7) }, None)
        .expect("scalar query");
    assert_eq!(present, Some(Some(7)));

    let none: Option<i32> = mapper
        .scalar(&conn, "select 1 where 1 = 0", (), None)
        .expect("scalar query");
    assert_eq!(none, None);
}

#[test]
fn sqlite_scalar_char_takes_first_character() {
    let conn = open();
    let mapper = SqlMapper::new();
    let c: Option<char> = mapper
        .scalar(&conn, "select 'xyz'", (), None)
        .expect("scalar query");
    assert_eq!(c, Some('x'));
}

#[test]
fn sqlite_scalar_cast_failure_names_value_and_types() {
    let conn = open();
    let mapper = SqlMapper::new();
    let err = mapper
        .scalar::<i32, _>(&conn, "select 'abc'", (), None)
        .expect_err("text is not an integer");
    assert!(err.is_data_error());
    assert_eq!(err.to_string(), "Error casting \"abc\" from [TEXT] to [i32]");
}

#[test]
fn sqlite_scalar_with_two_rows_is_an_error() {
    let conn = open();
    let mapper = SqlMapper::new();
    let err = mapper
        .scalar::<i32, _>(&conn, "select 1 union all select 2", (), None)
        .expect_err("two rows");
    assert_eq!(err.state_kind(), Some(StateErrorKind::MultipleRows));
}

#[test]
fn sqlite_dynamic_rows_keep_column_order_and_render_json() {
    let conn = open();
    let mapper = SqlMapper::new();
    let rows: Vec<DynamicRow> = mapper
        .query_dynamic(
            &conn,
            "select 1 as id, 'Fabian' as name, null as age union all select 2, 'Jurian', 40",
            (),
            None,
        )
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Fabian")));
    assert_eq!(rows[0].get("age"), Some(&Value::Null));
    assert_eq!(
        rows[0].to_json().expect("json"),
        r#"{"id":1,"name":"Fabian","age":null}"#
    );
    let parsed: serde_json::Value =
        serde_json::from_str(&rows[1].to_json().expect("json")).expect("valid json");
    assert_eq!(parsed["name"], "Jurian");
    assert_eq!(parsed["age"], 40);
}

#[test]
fn sqlite_nested_columns_fill_only_matched_records() {
    let conn = open();
    let mapper = SqlMapper::new();
    let sql = "select 1 as id, 'Ann' as name, \
               'ann@example.com' as [contact_info1.email], \
               'Utrecht' as [contact_info1.city.name], \
               'bob@example.com' as [contact_info2.email]";
    let customer: Customer = mapper
        .query::<Customer, _>(&conn, sql, (), None)
        .expect("query")
        .next()
        .expect("one row")
        .expect("mapped row");

    assert_eq!(customer.id, 1);
    assert_eq!(customer.name, "Ann");
    let contact = customer.contact_info1.expect("first contact");
    assert_eq!(contact.email.as_deref(), Some("ann@example.com"));
    assert_eq!(contact.city.map(|c| c.name).as_deref(), Some("Utrecht"));
    let second = customer.contact_info2.expect("second contact");
    assert_eq!(second.email.as_deref(), Some("bob@example.com"));
    assert_eq!(second.city, None);
}

#[test]
fn sqlite_nested_record_without_matching_columns_stays_none() {
    let conn = open();
    let mapper = SqlMapper::new();
    let sql = "select 2 as id, 'Bob' as name, 'bob@example.com' as [contact_info2.email]";
    let customer: Customer = mapper
        .query::<Customer, _>(&conn, sql, (), None)
        .expect("query")
        .next()
        .expect("one row")
        .expect("mapped row");

    assert_eq!(customer.contact_info1, None);
    assert_eq!(
        customer.contact_info2.and_then(|c| c.email).as_deref(),
        Some("bob@example.com")
    );
}

#[test]
fn sqlite_enum_columns_accept_numbers_names_and_id_suffix() {
    let conn = open();
    let mapper = SqlMapper::new();

    let read = |sql: &str| -> Member {
        mapper
            .query::<Member, _>(&conn, sql, (), None)
            .expect("query")
            .next()
            .expect("one row")
            .expect("mapped row")
    };

    assert_eq!(read("select 1 as id, 1 as status").status, Status::Retired);
    assert_eq!(read("select 1 as id, 'Retired' as status").status, Status::Retired);
    assert_eq!(read("select 1 as id, 'rEtIrEd' as status").status, Status::Retired);
    assert_eq!(read("select 1 as id, 42 as status").status, Status::Other(42));
    assert_eq!(read("select 1 as id, 1 as statusID").status, Status::Retired);
    assert_eq!(read("select 1 as id, null as status").status, Status::Active);

    let scalar: Option<Status> = mapper
        .scalar(&conn, "select 'retired'", (), None)
        .expect("scalar query");
    assert_eq!(scalar, Some(Status::Retired));
}

#[test]
fn sqlite_bad_member_value_reports_column() {
    let conn = open();
    let mapper = SqlMapper::new();
    let err = mapper
        .query::<Member, _>(&conn, "select 1 as id, 'AB' as initial", (), None)
        .expect("query")
        .next()
        .expect("one row")
        .expect_err("two characters do not fit a char");

    assert!(err.is_data_error());
    assert_eq!(err.to_string(), "Error parsing column: initial = \"AB\" [TEXT]");
}

#[test]
fn sqlite_syntax_error_surfaces_as_query_error() {
    let conn = open();
    let mapper = SqlMapper::new();
    let err = mapper
        .query::<DynamicRow, _>(&conn, "selec nothing", (), None)
        .and_then(|rows| rows.collect::<Result<Vec<_>>>())
        .expect_err("invalid sql");
    assert!(matches!(err, Error::Query(_)), "expected a query error, got {err:?}");
}

#[test]
fn sqlite_record_with_nested_member_cannot_be_parameters() {
    let conn = open();
    let mapper = SqlMapper::new();
    let customer = Customer {
        id: 1,
        name: "Ann".into(),
        ..Default::default()
    };
    let err = mapper
        .execute(&conn, "select @id", &customer, None)
        .expect_err("nested members are not bindable");
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("is not supported"));
}

#[test]
fn sqlite_list_parameter_expands_in_clause() {
    let conn = open();
    conn.execute_raw(
        "create table Numbers (id integer primary key, label text);
         insert into Numbers (id, label) values (1, 'one'), (2, 'two'), (3, 'three');",
    )
    .expect("seed");
    let mapper = SqlMapper::new();
    let sql = "select label from Numbers where id in @ids order by id";

    let labels: Vec<String> = mapper
        .query::<String, _>(&conn, sql, params! { "ids" => vec![1, 3] }, None)
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows");
    assert_eq!(labels, ["one", "three"]);

    let empty: Vec<String> = mapper
        .query::<String, _>(&conn, sql, params! { "ids" => Vec::<i32>::new() }, None)
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows");
    assert!(empty.is_empty());
}

#[test]
fn sqlite_long_strings_bind_past_the_size_limit() {
    let conn = open();
    conn.execute_raw("create table Notes (body text)").expect("create table");
    let mapper = SqlMapper::new();
    let body = "x".repeat(4001);

    let inserted = mapper
        .execute(&conn, "insert into Notes (body) values (@body)", params! { "body" => body.as_str() }, None)
        .expect("insert");
    assert_eq!(inserted, 1);

    let len: Option<i64> = mapper
        .scalar(&conn, "select length(body) from Notes", (), None)
        .expect("scalar query");
    assert_eq!(len, Some(4001));
}

#[test]
fn sqlite_parameter_list_binds_by_name_ignoring_case() {
    let conn = open();
    let mapper = SqlMapper::new();
    let mut list = Parameters::new();
    list.add("Name", "Fabian").add("AGE", 30);

    let row: Option<DynamicRow> = mapper
        .scalar(&conn, "select @name as name, @age as age", &list, None)
        .expect("scalar query");
    let row = row.expect("one row");
    assert_eq!(row.get("name"), Some(&Value::from("Fabian")));
    assert_eq!(row.get("age"), Some(&Value::Int(30)));
}

#[test]
fn sqlite_extension_methods_use_the_global_mapper() {
    let conn = open();
    conn.execute_raw("create table Tags (name text)").expect("create table");

    let inserted = conn
        .execute("insert into Tags (name) values (@name)", params! { "name" => "rust" }, None)
        .expect("insert");
    assert_eq!(inserted, 1);

    let names: Vec<String> = conn
        .query::<String>("select name from Tags", (), None)
        .expect("query")
        .collect::<Result<_>>()
        .expect("rows");
    assert_eq!(names, ["rust"]);
}
