use crate::config::DatabaseConfig;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Could not get a database connection: {0}")]
    Unavailable(#[from] r2d2::Error),
    #[error("{0}")]
    Operation(#[from] rusqlite::Error),
    #[error("Stored document is unreadable: {0}")]
    Document(#[from] serde_json::Error),
    #[error("Invalid Id passed: {0:?}")]
    InvalidId(String),
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(String),
}

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>,
}

impl Database {
    /// Open the database named by the config and bring its schema up to date.
    ///
    /// `:memory:` gives a private in-memory database. The pool is pinned to a single
    /// connection in that case, since every SQLite connection would otherwise get its own.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = if config.url == ":memory:" {
            r2d2::Pool::builder()
                .max_size(1)
                .build(r2d2_sqlite::SqliteConnectionManager::memory())?
        } else {
            if let Some(parent) = std::path::Path::new(&config.url).parent() {
                if !parent.as_os_str().is_empty() {
                    // SQLite reports the real failure when it can't open the file
                    if let Err(err) = std::fs::create_dir_all(parent) {
                        tracing::warn!("Could not create directory {:?}: {}", parent, err);
                    }
                }
            }
            r2d2::Pool::new(r2d2_sqlite::SqliteConnectionManager::file(&config.url))?
        };
        let me = Self { pool };
        me.migrate().await?;
        Ok(me)
    }

    /// Migrate the database to the latest version.
    async fn migrate(&self) -> StoreResult<()> {
        let migrations = [include_str!("migrations/01-initial.sql")];
        // Find the current migration version. If it fails, we need to run all the migrations.
        let conn = self.pool.get()?;
        let current_version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                rusqlite::params![],
                |row| row.get(0),
            )
            .unwrap_or("0".to_string());
        let current_version = current_version.parse::<usize>().unwrap_or(0);
        tracing::info!("Current schema version: {}", current_version);
        for migration in migrations.iter().skip(current_version) {
            tracing::warn!("Applying migration: {}", migration);
            conn.execute_batch(migration)?;
        }
        Ok(())
    }

    /// Convenience method to collect rows from a query into a Vec.
    pub fn collect_rows<T: FromRow, P: rusqlite::Params>(
        &self,
        sql: &str,
        parameters: P,
    ) -> StoreResult<Vec<T>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query(parameters)?;
        rows.mapped(T::from_row)
            .map(|r| r.map_err(Into::into))
            .collect::<StoreResult<_>>()
    }
}

pub trait FromRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recipes.db");
        let config = DatabaseConfig {
            url: path.to_string_lossy().into_owned(),
        };
        let db = Database::connect(&config).await.unwrap();
        drop(db);
        // Reopening must not try to create the tables again
        let db = Database::connect(&config).await.unwrap();
        let conn = db.pool.get().unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, "1");
    }
}
