//! Creation-script builders: turn introspected schema into `CREATE TABLE`
//! (and foreign key) DDL for the destination engine.
//!
//! Scripts carry only quoted identifiers and catalog-translated types; no
//! data values ever flow through here.

use crate::catalog::{self, Engine, TypeCategory};
use crate::error::{MigrateError, Result};
use crate::ident::{quote_mssql, quote_sqlite};
use crate::schema::{Column, ForeignKey};

/// Build a SQLite `CREATE TABLE` script from an introspected SQL Server
/// table.
///
/// Column types collapse to their category keyword. The primary key column
/// additionally gets `UNIQUE`, and the table-level `PRIMARY KEY` clause adds
/// `AUTOINCREMENT` only when the key's category is INTEGER (SQLite rejects
/// it on anything else). Foreign keys are inline table constraints, emitted
/// when `include_fks` is set.
pub fn sqlite_create_table(
    table: &str,
    columns: &[Column],
    primary_key: Option<&str>,
    foreign_keys: &[ForeignKey],
    include_fks: bool,
) -> Result<String> {
    let mut clauses = Vec::with_capacity(columns.len() + foreign_keys.len() + 1);
    let mut pk_category = None;

    for column in columns {
        let category = catalog::category_of(&column.data_type, Engine::SqlServer).ok_or_else(
            || MigrateError::UnmappedType {
                column: format!("{}.{}", table, column.name),
                data_type: column.data_type.clone(),
            },
        )?;
        let concrete = catalog::concrete_for(category, Engine::Sqlite).ok_or_else(|| {
            MigrateError::UnmappedType {
                column: format!("{}.{}", table, column.name),
                data_type: column.data_type.clone(),
            }
        })?;

        let mut clause = format!("    {} {}", quote_sqlite(&column.name)?, concrete);
        if !column.is_nullable {
            clause.push_str(" NOT NULL");
        }
        if primary_key == Some(column.name.as_str()) {
            clause.push_str(" UNIQUE");
            pk_category = Some(category);
        }
        clauses.push(clause);
    }

    if include_fks {
        for fk in foreign_keys {
            clauses.push(format!(
                "    FOREIGN KEY({}) REFERENCES {}({})",
                quote_sqlite(&fk.column)?,
                quote_sqlite(&fk.ref_table)?,
                quote_sqlite(&fk.ref_column)?
            ));
        }
    }

    if let Some(pk) = primary_key {
        let autoincrement = if pk_category == Some(TypeCategory::Integer) {
            " AUTOINCREMENT"
        } else {
            ""
        };
        clauses.push(format!(
            "    PRIMARY KEY({}{})",
            quote_sqlite(pk)?,
            autoincrement
        ));
    }

    Ok(format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_sqlite(table)?,
        clauses.join(",\n")
    ))
}

/// Build an SQL Server `CREATE TABLE` script from an introspected SQLite
/// table.
///
/// Column types expand to the preferred concrete type for their category.
/// The primary key column becomes `int IDENTITY(1,1)` with a named clustered
/// primary key constraint. Foreign keys go out separately through
/// [`mssql_foreign_key_script`] so that creation order stays a
/// table-by-table concern.
pub fn mssql_create_table(
    table: &str,
    columns: &[Column],
    primary_key: Option<&str>,
) -> Result<String> {
    let mut clauses = Vec::with_capacity(columns.len() + 1);

    for column in columns {
        let category = catalog::category_of(&column.data_type, Engine::Sqlite).ok_or_else(
            || MigrateError::UnmappedType {
                column: format!("{}.{}", table, column.name),
                data_type: column.data_type.clone(),
            },
        )?;
        let concrete = catalog::concrete_for(category, Engine::SqlServer).ok_or_else(|| {
            MigrateError::UnmappedType {
                column: format!("{}.{}", table, column.name),
                data_type: column.data_type.clone(),
            }
        })?;

        let mut clause = format!("    {} {}", quote_mssql(&column.name)?, concrete);
        if primary_key == Some(column.name.as_str()) {
            clause.push_str(" IDENTITY(1,1)");
        }
        clause.push_str(if column.is_nullable {
            " NULL"
        } else {
            " NOT NULL"
        });
        clauses.push(clause);
    }

    if let Some(pk) = primary_key {
        clauses.push(format!(
            "    CONSTRAINT {} PRIMARY KEY CLUSTERED ({} ASC)",
            quote_mssql(&format!("PK_{}", table))?,
            quote_mssql(pk)?
        ));
    }

    Ok(format!(
        "CREATE TABLE [dbo].{} (\n{}\n)",
        quote_mssql(table)?,
        clauses.join(",\n")
    ))
}

/// Build the `ALTER TABLE` script adding (and then enabling) one table's
/// foreign key constraints on SQL Server. Returns `None` when the table has
/// none.
pub fn mssql_foreign_key_script(foreign_keys: &[ForeignKey]) -> Result<Option<String>> {
    if foreign_keys.is_empty() {
        return Ok(None);
    }

    let mut statements = Vec::with_capacity(foreign_keys.len() * 2);
    for fk in foreign_keys {
        statements.push(format!(
            "ALTER TABLE [dbo].{table} WITH CHECK ADD CONSTRAINT {name} \
             FOREIGN KEY({column}) REFERENCES [dbo].{ref_table} ({ref_column});",
            table = quote_mssql(&fk.table)?,
            name = quote_mssql(&fk.constraint_name)?,
            column = quote_mssql(&fk.column)?,
            ref_table = quote_mssql(&fk.ref_table)?,
            ref_column = quote_mssql(&fk.ref_column)?
        ));
        statements.push(format!(
            "ALTER TABLE [dbo].{table} CHECK CONSTRAINT {name};",
            table = quote_mssql(&fk.table)?,
            name = quote_mssql(&fk.constraint_name)?
        ));
    }

    Ok(Some(statements.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, name: &str, data_type: &str, nullable: bool, pk: bool) -> Column {
        Column {
            table: table.into(),
            name: name.into(),
            ordinal: 0,
            is_nullable: nullable,
            data_type: data_type.into(),
            max_length: None,
            datetime_precision: None,
            is_primary_key: pk,
            default_value: None,
        }
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

    #[test]
    fn test_sqlite_script_with_pk_and_fk() {
        let columns = vec![
            column("Book", "BookId", "int", false, true),
            column("Book", "Title", "nvarchar(80)", true, false),
            column("Book", "AuthorId", "int", true, false),
        ];

        let sql =
            sqlite_create_table("Book", &columns, Some("BookId"), &[book_fk()], true).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE \"Book\" (\n\
             \x20   \"BookId\" INTEGER NOT NULL UNIQUE,\n\
             \x20   \"Title\" TEXT,\n\
             \x20   \"AuthorId\" INTEGER,\n\
             \x20   FOREIGN KEY(\"AuthorId\") REFERENCES \"Author\"(\"AuthorId\"),\n\
             \x20   PRIMARY KEY(\"BookId\" AUTOINCREMENT)\n\
             )"
        );
    }

    #[test]
    fn test_sqlite_script_without_pk_or_fk() {
        let columns = vec![column("Log", "Message", "nvarchar(max)", true, false)];
        let sql = sqlite_create_table("Log", &columns, None, &[], true).unwrap();
        assert_eq!(sql, "CREATE TABLE \"Log\" (\n    \"Message\" TEXT\n)");
    }

    #[test]
    fn test_sqlite_autoincrement_only_for_integer_pk() {
        let columns = vec![column("Doc", "Code", "nvarchar(20)", false, true)];
        let sql = sqlite_create_table("Doc", &columns, Some("Code"), &[], true).unwrap();
        assert!(sql.contains("PRIMARY KEY(\"Code\")"));
        assert!(!sql.contains("AUTOINCREMENT"));
    }

    #[test]
    fn test_sqlite_fks_can_be_suppressed() {
        let columns = vec![column("Book", "AuthorId", "int", true, false)];
        let sql = sqlite_create_table("Book", &columns, None, &[book_fk()], false).unwrap();
        assert!(!sql.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_unmapped_type_carries_column_context() {
        let columns = vec![column("T", "Shape", "clob", true, false)];
        let err = sqlite_create_table("T", &columns, None, &[], true).unwrap_err();
        match err {
            MigrateError::UnmappedType { column, data_type } => {
                assert_eq!(column, "T.Shape");
                assert_eq!(data_type, "clob");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_mssql_script_with_identity_pk() {
        let columns = vec![
            column("Author", "AuthorId", "INTEGER", false, true),
            column("Author", "Name", "TEXT", false, false),
        ];

        let sql = mssql_create_table("Author", &columns, Some("AuthorId")).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE [dbo].[Author] (\n\
             \x20   [AuthorId] int IDENTITY(1,1) NOT NULL,\n\
             \x20   [Name] nvarchar(max) NOT NULL,\n\
             \x20   CONSTRAINT [PK_Author] PRIMARY KEY CLUSTERED ([AuthorId] ASC)\n\
             )"
        );
    }

    #[test]
    fn test_mssql_foreign_key_script_appends_every_constraint() {
        let mut second = book_fk();
        second.column = "EditorId".into();
        second.ref_column = "AuthorId".into();
        second.constraint_name = "FK_Book_EditorId".into();

        let script = mssql_foreign_key_script(&[book_fk(), second])
            .unwrap()
            .unwrap();

        assert!(script.contains(
            "ALTER TABLE [dbo].[Book] WITH CHECK ADD CONSTRAINT [FK_Book_AuthorId] \
             FOREIGN KEY([AuthorId]) REFERENCES [dbo].[Author] ([AuthorId]);"
        ));
        assert!(script.contains("ALTER TABLE [dbo].[Book] CHECK CONSTRAINT [FK_Book_AuthorId];"));
        assert!(script.contains("[FK_Book_EditorId]"));
        assert_eq!(script.lines().count(), 4);
    }

    #[test]
    fn test_mssql_foreign_key_script_empty() {
        assert!(mssql_foreign_key_script(&[]).unwrap().is_none());
    }
}
