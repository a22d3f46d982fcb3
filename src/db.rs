//! Connection pooling for the relational metadata store.

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Small by default: every exposed operation runs a handful of sequential
/// store calls, not a request flood.
pub const DEFAULT_MAX_POOL_SIZE: u32 = 2;

/// Builds the r2d2 pool backing `PgMetadataStore` and the maintenance
/// commands.
pub fn init_pool(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size.max(1))
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}
