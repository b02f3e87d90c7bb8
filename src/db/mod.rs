use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Error as ManagerError};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rocket::http::Status;
use rocket::request::{self, FromRequest};
use rocket::outcome::{try_outcome, Outcome};
use rocket::{Request, State};
use std::ops::{Deref, DerefMut};

use crate::errors::{ErrorKind, Result};

pub mod schema;

pub type Connection = SqliteConnection;

// An alias to the type for a pool of Diesel SQLite connections.
pub type Pool = r2d2::Pool<ConnectionManager<Connection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub struct DbConnection(pub r2d2::PooledConnection<ConnectionManager<Connection>>);

/// Attempts to retrieve a single connection from the managed database pool. If
/// no pool is currently managed, fails with an `InternalServerError` status. If
/// no connections are available, fails with a `ServiceUnavailable` status.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for DbConnection {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<DbConnection, ()> {
        let pool = try_outcome!(request.guard::<&State<Pool>>().await);
        match pool.get() {
            Ok(conn) => Outcome::Success(DbConnection(conn)),
            Err(e) => {
                tracing::error!("database pool exhausted: {}", e);
                Outcome::Error((Status::ServiceUnavailable, ()))
            }
        }
    }
}

// For the convenience of using a &mut DbConnection as a &mut SqliteConnection.
impl Deref for DbConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// SQLite leaves foreign keys off unless asked, per connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<Connection, ManagerError> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), ManagerError> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(ManagerError::QueryError)
    }
}

pub fn init_pool(database_url: &str, max_size: u32) -> Result<Pool> {
    let manager = ConnectionManager::<Connection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;
    Ok(pool)
}

pub fn run_migrations(pool: &Pool) -> Result<()> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| ErrorKind::Migration(e.to_string()))?;
    for version in applied {
        tracing::info!(%version, "applied migration");
    }
    Ok(())
}

pub trait TryLoadById
where
    Self: Sized,
{
    fn try_load_by_id(id: i32, connection: &mut Connection) -> diesel::QueryResult<Self>;
}

/// A migrated database in a temporary directory. Keep the directory alive
/// as long as the pool.
#[cfg(test)]
pub(crate) fn test_pool() -> (tempfile::TempDir, Pool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let database_url = dir.path().join("db.sqlite3");
    let pool = init_pool(&database_url.to_string_lossy(), 1).expect("pool");
    run_migrations(&pool).expect("migrations");
    (dir, pool)
}
