//! Database layer
//!
//! SQLite (default, single-file deployment) and MySQL are both supported.
//! The driver is picked from configuration; repositories are written once and
//! dispatched to the concrete pool with [`with_pool!`].

/// Run `$body` with `$pool` bound to the concrete SQLx pool behind a
/// [`DynDatabasePool`]. The body is compiled once per driver, so it must
/// only use SQL both dialects accept. Must be used inside a function
/// returning `anyhow::Result`.
///
/// ```ignore
/// let count: i64 = with_pool!(self.pool, pool => {
///     sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pool).await?
/// });
/// ```
macro_rules! with_pool {
    ($db:expr, $pool:ident => $body:expr) => {
        match $db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $pool = $db
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool unavailable"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $pool = $db
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool unavailable"))?;
                $body
            }
        }
    };
}

pub(crate) use with_pool;

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, LastInsertId, MysqlDatabase,
    SqliteDatabase,
};

/// `?, ?, ?` for an `IN (...)` list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Substring pattern for `LIKE ? ESCAPE '!'`.
///
/// `!` is the escape character because a backslash literal is read
/// differently by SQLite and MySQL.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Positional bind value for dynamically assembled queries
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Int(i64),
    Text(String),
}

/// Bind every value in order onto a `query`, `query_as` or `query_scalar`
macro_rules! bind_all {
    ($query:expr, $binds:expr) => {{
        let mut q = $query;
        for value in $binds.iter() {
            q = match value {
                $crate::db::BindValue::Int(v) => q.bind(*v),
                $crate::db::BindValue::Text(v) => q.bind(v.clone()),
            };
        }
        q
    }};
}

pub(crate) use bind_all;

/// Driver message of a unique-constraint violation carried by `err`
pub fn unique_violation(err: &anyhow::Error) -> Option<&str> {
    match err.downcast_ref::<sqlx::Error>()? {
        sqlx::Error::Database(db) if db.is_unique_violation() => Some(db.message()),
        _ => None,
    }
}
