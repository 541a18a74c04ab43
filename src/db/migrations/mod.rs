use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Schema migrations, applied in order. Every script is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_event_videos.sql", include_str!("sql/001_event_videos.sql")),
    ("002_events.sql", include_str!("sql/002_events.sql")),
    ("003_bounding_boxes.sql", include_str!("sql/003_bounding_boxes.sql")),
    ("004_fcm_infos.sql", include_str!("sql/004_fcm_infos.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        pool.execute(*sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::MIGRATIONS;

    #[test]
    fn test_migrations_are_ordered() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(MIGRATIONS.iter().all(|(_, sql)| sql.contains("IF NOT EXISTS")));
    }
}
