//! End-to-end clone of a small library schema into an in-memory SQLite
//! destination, driving the builder, resolver, transfer, and introspection
//! layers through their public API. The server-side metadata is supplied
//! directly, shaped exactly as catalog introspection yields it.

use chrono::NaiveDate;
use mssql_sqlite_migrate::{
    builder, coerce, Column, DependencyResolver, ForeignKey, InsertMode, Introspect,
    PendingCreation, SqlValue, SqliteEngine,
};
use mssql_sqlite_migrate::transfer::write_rows_embedded;

fn server_column(table: &str, name: &str, ordinal: i32, data_type: &str, nullable: bool) -> Column {
    Column {
        table: table.into(),
        name: name.into(),
        ordinal,
        is_nullable: nullable,
        data_type: data_type.into(),
        max_length: None,
        datetime_precision: None,
        is_primary_key: false,
        default_value: None,
    }
}

fn author_columns() -> Vec<Column> {
    vec![
        server_column("Author", "AuthorId", 1, "int", false),
        server_column("Author", "Name", 2, "nvarchar(80)", false),
        server_column("Author", "Born", 3, "datetime2(7)", true),
    ]
}

fn book_columns() -> Vec<Column> {
    vec![
        server_column("Book", "BookId", 1, "int", false),
        server_column("Book", "Title", 2, "nvarchar(200)", true),
        server_column("Book", "Price", 3, "decimal(18,2)", true),
        server_column("Book", "AuthorId", 4, "int", true),
    ]
}

fn book_fk() -> ForeignKey {
    ForeignKey {
        id: None,
        seq: None,
        table: "Book".into(),
        ref_table: "Author".into(),
        column: "AuthorId".into(),
        ref_column: "AuthorId".into(),
        constraint_name: "FK_Book_AuthorId".into(),
        on_update: None,
        on_delete: None,
        match_clause: None,
    }
}

async fn clone_schema(dest: &mut SqliteEngine) {
    let pending = vec![
        // Dependency-last order on purpose; the resolver must cope.
        PendingCreation {
            table: "Book".into(),
            script: builder::sqlite_create_table(
                "Book",
                &book_columns(),
                Some("BookId"),
                &[book_fk()],
                true,
            )
            .unwrap(),
        },
        PendingCreation {
            table: "Author".into(),
            script: builder::sqlite_create_table(
                "Author",
                &author_columns(),
                Some("AuthorId"),
                &[],
                true,
            )
            .unwrap(),
        },
    ];

    let created = DependencyResolver::new(10)
        .create_all(dest, pending)
        .await
        .unwrap();
    assert_eq!(created, 2);
}

#[tokio::test]
async fn test_schema_clone_round_trips_through_introspection() {
    let mut dest = SqliteEngine::open_in_memory().unwrap();
    clone_schema(&mut dest).await;

    assert_eq!(
        dest.list_tables().await.unwrap(),
        vec!["Author".to_string(), "Book".to_string()]
    );

    let columns = dest.columns("Book").await.unwrap();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns[0].name, "BookId");
    assert_eq!(columns[0].data_type, "INTEGER");
    assert!(columns[0].is_primary_key);
    assert!(!columns[0].is_nullable);
    assert_eq!(columns[1].data_type, "TEXT");
    assert_eq!(columns[2].data_type, "NUMERIC");

    assert_eq!(
        dest.primary_key("Book").await.unwrap().as_deref(),
        Some("BookId")
    );

    let fks = dest.foreign_keys("Book").await.unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].ref_table, "Author");
    assert_eq!(fks[0].constraint_name, "FK_Book_AuthorId");

    // Integer primary keys come out auto-incrementing.
    let sql = dest.create_table_sql("Author").unwrap().unwrap();
    assert!(sql.contains("AUTOINCREMENT"));
}

#[tokio::test]
async fn test_data_clone_skips_bad_rows_and_preserves_values() {
    let mut dest = SqliteEngine::open_in_memory().unwrap();
    clone_schema(&mut dest).await;

    let born = NaiveDate::from_ymd_opt(1920, 8, 22)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    // Primary keys are withheld so the destination assigns its own.
    let columns = vec!["Name".to_string(), "Born".to_string()];
    let rows = vec![
        vec![SqlValue::Text("Ray Bradbury".into()), SqlValue::DateTime(born)],
        vec![SqlValue::Text("Flannery O'Connor".into()), SqlValue::Null],
        vec![SqlValue::Null, SqlValue::Null], // NOT NULL violation
    ];

    let outcome =
        write_rows_embedded(&dest, "Author", &columns, rows, InsertMode::RowByRow).unwrap();
    assert_eq!(outcome.rows_read, 3);
    assert_eq!(outcome.rows_inserted, 2);
    assert_eq!(outcome.rows_skipped, 1);

    let read_columns = dest.columns("Author").await.unwrap();
    let stored = dest.select_all("Author", &read_columns).unwrap();
    assert_eq!(stored.len(), 2);

    // Auto-assigned keys, surviving embedded quote, decoded timestamp.
    assert_eq!(stored[0][0], SqlValue::I64(1));
    assert_eq!(stored[1][0], SqlValue::I64(2));
    assert_eq!(stored[1][1], SqlValue::Text("Flannery O'Connor".into()));
    match stored[0][2] {
        SqlValue::F64(day_count) => {
            assert_eq!(coerce::from_day_count(day_count), Some(born));
        }
        ref other => panic!("expected day-count real, got {:?}", other),
    }
}

#[tokio::test]
async fn test_preserved_keys_keep_foreign_key_rows_valid() {
    let mut dest = SqliteEngine::open_in_memory().unwrap();
    clone_schema(&mut dest).await;

    // Source keys are sparse; they must arrive verbatim so that dependent
    // rows keep pointing at the right authors.
    let author_columns = vec!["AuthorId".to_string(), "Name".to_string()];
    let authors = vec![
        vec![SqlValue::I64(5), SqlValue::Text("Ursula K. Le Guin".into())],
        vec![SqlValue::I64(9), SqlValue::Text("Octavia Butler".into())],
    ];
    let outcome =
        write_rows_embedded(&dest, "Author", &author_columns, authors, InsertMode::RowByRow)
            .unwrap();
    assert_eq!(outcome.rows_inserted, 2);
    assert_eq!(outcome.rows_skipped, 0);

    let book_columns = vec![
        "BookId".to_string(),
        "Title".to_string(),
        "AuthorId".to_string(),
    ];
    let books = vec![vec![
        SqlValue::I64(1),
        SqlValue::Text("Kindred".into()),
        SqlValue::I64(9),
    ]];
    let outcome =
        write_rows_embedded(&dest, "Book", &book_columns, books, InsertMode::RowByRow).unwrap();
    assert_eq!(outcome.rows_inserted, 1);
    assert_eq!(outcome.rows_skipped, 0);

    let author_meta = dest.columns("Author").await.unwrap();
    let stored = dest.select_all("Author", &author_meta).unwrap();
    assert_eq!(stored[0][0], SqlValue::I64(5));
    assert_eq!(stored[1][0], SqlValue::I64(9));
}

#[tokio::test]
async fn test_reintrospected_keys_build_server_constraint_script() {
    let mut dest = SqliteEngine::open_in_memory().unwrap();
    clone_schema(&mut dest).await;

    let fks = dest.foreign_keys("Book").await.unwrap();
    let script = builder::mssql_foreign_key_script(&fks).unwrap().unwrap();

    assert!(script.contains(
        "ALTER TABLE [dbo].[Book] WITH CHECK ADD CONSTRAINT [FK_Book_AuthorId] \
         FOREIGN KEY([AuthorId]) REFERENCES [dbo].[Author] ([AuthorId]);"
    ));
    assert!(script.contains("ALTER TABLE [dbo].[Book] CHECK CONSTRAINT [FK_Book_AuthorId];"));
}
