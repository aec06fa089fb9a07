use rusqlite::Connection;

use crate::error::Error;

// Embed the SQL migrations
refinery::embed_migrations!("migrations");

/// Name of the refinery history table. Kept distinct so the schema can share a
/// database file with other refinery-managed schemas.
const MIGRATION_TABLE_NAME: &str = "_refinery_schema_history_convo";

/// Run database migrations to set up or upgrade the database schema.
pub fn run_migrations(conn: &mut Connection) -> Result<(), Error> {
    let report = migrations::runner()
        .set_migration_table_name(MIGRATION_TABLE_NAME)
        .run(conn)?;

    for migration in report.applied_migrations() {
        tracing::info!(
            "Applied migration: {} (version: {})",
            migration.name(),
            migration.version()
        );
    }

    Ok(())
}
