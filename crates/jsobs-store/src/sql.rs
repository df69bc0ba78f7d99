//! SQL text for the PostgreSQL backend.
//!
//! Prefix matching uses `starts_with`, so callers' prefixes need no `LIKE`
//! escaping. Every read filters on the visibility predicate, evaluated
//! against `now()` once per statement. Lists sort with the "C" collation so
//! ordering is plain byte order whatever the database locale. Table and
//! index names are always double-quoted, so reserved words such as `order`
//! work as table names.

const VISIBLE: &str = "(expiry IS NULL OR expiry > now())";

/// Statements for one table, built once when the backend is constructed.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub save: String,
    pub load: String,
    pub load_detail: String,
    pub delete: String,
    pub list: String,
    pub list_detail: String,
    pub count: String,
    pub count_all: String,
    pub purge: String,
    pub schema: String,
}

impl Statements {
    /// `name` must already be validated as an identifier
    pub fn for_table(name: &str) -> Self {
        let quoted = quote_table(name);
        let table = quoted.as_str();
        Self {
            save: format!(
                r#"
        INSERT INTO {table} (path, data, size, expiry, modified)
        VALUES ($1, $2, $3, $4, now())
        ON CONFLICT (path) DO UPDATE SET
            data = EXCLUDED.data,
            size = EXCLUDED.size,
            expiry = EXCLUDED.expiry,
            modified = EXCLUDED.modified
        "#
            ),
            load: format!("SELECT data FROM {table} WHERE path = $1 AND {VISIBLE}"),
            load_detail: format!(
                "SELECT path, size, expiry, modified FROM {table} WHERE path = $1 AND {VISIBLE}"
            ),
            delete: format!("DELETE FROM {table} WHERE path = $1"),
            list: format!(
                r#"
        SELECT path
        FROM {table}
        WHERE starts_with(path, $1) AND {VISIBLE}
        ORDER BY path COLLATE "C"
        "#
            ),
            list_detail: format!(
                r#"
        SELECT path, size, expiry, modified
        FROM {table}
        WHERE starts_with(path, $1) AND {VISIBLE}
        ORDER BY path COLLATE "C"
        "#
            ),
            count: format!(
                "SELECT COUNT(*) FROM {table} WHERE starts_with(path, $1) AND {VISIBLE}"
            ),
            count_all: format!("SELECT COUNT(*) FROM {table} WHERE {VISIBLE}"),
            purge: format!("DELETE FROM {table} WHERE expiry <= now()"),
            schema: schema(name, table),
        }
    }
}

/// `Cache.Objects` becomes `"cache"."objects"`, the same relation an
/// unquoted name resolves to. Validated names contain no double quotes, so
/// no escaping is needed.
fn quote_table(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join(".")
}

fn schema(name: &str, table: &str) -> String {
    // Index names cannot be schema-qualified; they land in the table's schema
    let index = format!(
        "\"{}_expiry_idx\"",
        name.to_ascii_lowercase().replace('.', "_")
    );
    format!(
        r#"CREATE TABLE {table} (
    path TEXT NOT NULL PRIMARY KEY,
    data BYTEA NOT NULL,
    size INTEGER NOT NULL,
    expiry TIMESTAMP WITH TIME ZONE NULL,
    modified TIMESTAMP WITH TIME ZONE NOT NULL
);
CREATE INDEX {index} ON {table} USING btree (expiry);
"#
    )
}
