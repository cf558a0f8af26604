//! Embedded schema migrations.
//!
//! SQL files are compiled into the binary; applied versions are tracked in
//! `_sqlx_migrations`.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

/// (version, description, sql) in the order they must be applied.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        20260101000001,
        "initial_schema",
        include_str!("../migrations/20260101000001_initial_schema.sql"),
    ),
    (
        20260101000002,
        "torrent_trackers",
        include_str!("../migrations/20260101000002_torrent_trackers.sql"),
    ),
];

fn build_migrations() -> Vec<Migration> {
    MIGRATIONS
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrator = Migrator {
        migrations: Cow::Owned(build_migrations()),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::Database(e.into()))?;

    info!(count = MIGRATIONS.len(), "Database migrations applied");
    Ok(())
}
