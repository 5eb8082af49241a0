//! Database layer
//!
//! Storage for Agora on SQLite (default, single-file deployment) or MySQL.
//!
//! The pool is a trait object (`DatabasePool`). Repositories write their SQL
//! once with `?` placeholders and run it on whichever backend is configured
//! through the [`on_backend!`](crate::db::on_backend) macro.
//!
//! ```ignore
//! use agora::config::DatabaseConfig;
//! use agora::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

/// Run the same query body against the concrete pool of either backend.
///
/// `$conn` is bound to `&SqlitePool` or `&MySqlPool`; the body must evaluate
/// to the same type in both arms.
macro_rules! on_backend {
    ($pool:expr, |$conn:ident| $body:expr) => {
        match $pool.backend() {
            $crate::db::Backend::Sqlite($conn) => $body,
            $crate::db::Backend::Mysql($conn) => $body,
        }
    };
}

pub(crate) use on_backend;

/// Driver-independent access to the id generated by an INSERT
pub trait LastInsertId {
    fn last_id(&self) -> i64;
}

impl LastInsertId for sqlx::sqlite::SqliteQueryResult {
    fn last_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl LastInsertId for sqlx::mysql::MySqlQueryResult {
    fn last_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}

/// True if the error chain contains a unique-constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    })
}

/// Build a `%search%` pattern for `LIKE ? ESCAPE '!'` with the wildcards in
/// `search` matched literally
pub fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[tokio::test]
    async fn test_is_unique_violation() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE u (name TEXT UNIQUE)").await.unwrap();
        pool.execute("INSERT INTO u (name) VALUES ('a')").await.unwrap();

        let sqlite = pool.as_sqlite().unwrap();
        let err = sqlx::query("INSERT INTO u (name) VALUES ('a')")
            .execute(sqlite)
            .await
            .context("Failed to insert")
            .unwrap_err();
        assert!(is_unique_violation(&err));

        let other = anyhow::anyhow!("something else");
        assert!(!is_unique_violation(&other));
    }

    #[tokio::test]
    async fn test_on_backend_with_last_insert_id() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)")
            .await
            .unwrap();

        let first: i64 = on_backend!(pool, |conn| {
            sqlx::query("INSERT INTO t (v) VALUES (?)")
                .bind("x")
                .execute(conn)
                .await
                .unwrap()
                .last_id()
        });
        let second: i64 = on_backend!(pool, |conn| {
            sqlx::query("INSERT INTO t (v) VALUES (?)")
                .bind("y")
                .execute(conn)
                .await
                .unwrap()
                .last_id()
        });
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%"), "%100!%%");
        assert_eq!(like_pattern("a_b!"), "%a!_b!!%");
    }
}
