use anyhow::{bail, Context};
use stagehand_migrate::{MigrationFilter, Migrator};
use super::{print_json, print_summary};

/// Which files an `up`, `down` or `refresh` acts on
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub stages: Vec<String>,
    pub only: Vec<String>,
    pub skip: Vec<String>,
}

impl Selection {
    fn filter(&self) -> MigrationFilter {
        MigrationFilter::new()
            .only_files(self.only.iter().cloned())
            .skip_files(self.skip.iter().cloned())
    }

    fn require_stages(&self) -> anyhow::Result<()> {
        if self.stages.is_empty() {
            bail!("no stages given; pass them as arguments or set MIGRATIONS_STAGES");
        }
        Ok(())
    }
}

pub async fn up(migrator: &Migrator, selection: &Selection) -> anyhow::Result<()> {
    selection.require_stages()?;
    let summary = migrator
        .up(selection.stages.as_slice(), &selection.filter())
        .await
        .context("up failed")?;

    print_summary("Up", &summary, false);
    Ok(())
}

pub async fn down(migrator: &Migrator, selection: &Selection) -> anyhow::Result<()> {
    selection.require_stages()?;
    let summary = migrator
        .down(selection.stages.as_slice(), &selection.filter())
        .await
        .context("down failed")?;

    print_summary("Down", &summary, false);
    Ok(())
}

pub async fn refresh(migrator: &Migrator, selection: &Selection) -> anyhow::Result<()> {
    selection.require_stages()?;
    let summary = migrator
        .refresh(selection.stages.as_slice(), &selection.filter())
        .await
        .context("refresh failed")?;

    print_summary("Refresh", &summary, false);
    Ok(())
}

pub async fn summary(migrator: &Migrator, json: bool) -> anyhow::Result<()> {
    let summary = migrator.summary().await.context("failed to read migration history")?;

    if json {
        print_json(&summary)
    } else {
        print_summary("Summary", &summary, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stagehand_migrate::{Environment, MemoryFs, MemorySource, MigratorConfig};

    async fn migrator(source: &MemorySource) -> Migrator {
        let fs = Arc::new(MemoryFs::new());
        fs.insert("db/001_users.sql", "-- { up: table }\nCREATE TABLE users ();\n-- { down: table }\nDROP TABLE users;");
        fs.insert("db/002_posts.sql", "-- { up: table }\nCREATE TABLE posts ();\n-- { down: table }\nDROP TABLE posts;");

        let config = MigratorConfig::new()
            .with_root("db")
            .with_environment(Environment::Testing);
        Migrator::new(Arc::new(source.clone()), fs, config).await.unwrap()
    }

    fn table() -> Selection {
        Selection {
            stages: vec!["table".to_string()],
            ..Selection::default()
        }
    }

    #[tokio::test]
    async fn test_commands_drive_the_migrator() {
        let source = MemorySource::new();
        let migrator = migrator(&source).await;

        up(&migrator, &table()).await.unwrap();
        assert_eq!(source.history().unwrap().len(), 2);

        let selection = Selection {
            skip: vec!["001_users".to_string()],
            ..table()
        };
        down(&migrator, &selection).await.unwrap();
        assert_eq!(source.history().unwrap(), vec![("001_users".to_string(), "table".to_string())]);

        refresh(&migrator, &table()).await.unwrap();
        assert_eq!(source.history().unwrap().len(), 2);

        summary(&migrator, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_stages_is_an_error() {
        let source = MemorySource::new();
        let migrator = migrator(&source).await;

        let err = up(&migrator, &Selection::default()).await.unwrap_err();
        assert!(err.to_string().contains("MIGRATIONS_STAGES"));
        assert!(source.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_errors_carry_the_operation() {
        let source = MemorySource::new();
        let migrator = migrator(&source).await;
        source.fail_on("CREATE TABLE posts").unwrap();

        let err = up(&migrator, &table()).await.unwrap_err();
        assert_eq!(err.to_string(), "up failed");
        assert!(format!("{:#}", err).contains("002_posts"));
    }
}
