//! The database stage of a deployment.
//!
//! Backup, creation, scripts and migrations are delegated to the
//! [`DatabaseService`]; this module sequences them and rewrites the
//! application's connection string.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sitecast_hosting::ProgressSink;
use tracing::{debug, info};

use crate::collaborators::DatabaseService;
use crate::error::{ControlError, ControlResult};
use crate::types::DatabaseConfig;

const APPSETTINGS: &str = "appsettings.json";
const CONNECTION_ATTRIBUTE: &str = "connectionString=\"";

/// Outcome of the database stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDeploymentResult {
    pub success: bool,
    pub database_name: String,
    pub server_name: String,
    pub scripts_executed: usize,
    pub backup_path: Option<PathBuf>,
    /// Configuration file whose connection string was rewritten.
    pub config_file: Option<PathBuf>,
}

/// What the backup step found and produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseSnapshot {
    pub exists: bool,
    pub backup_path: Option<PathBuf>,
}

/// Back up the database if it exists and backups are enabled.
///
/// Callers must record the returned path before running any changes, so a
/// failure later in the stage can still be restored.
pub async fn backup_database(
    service: &dyn DatabaseService,
    config: &DatabaseConfig,
    backup_dir: &Path,
) -> ControlResult<DatabaseSnapshot> {
    let exists = service.exists(config).await?;
    let mut snapshot = DatabaseSnapshot {
        exists,
        backup_path: None,
    };

    if exists && config.backup_before_deploy {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = backup_dir.join(format!("{}_{stamp}.bak", config.database_name));
        let backup = service.backup(config, &path).await?;
        if !backup.success {
            return Err(ControlError::database(format!(
                "backup of {} did not complete",
                config.database_name
            )));
        }
        info!(
            database = %config.database_name,
            path = %backup.backup_path.display(),
            size_bytes = backup.size_bytes,
            "database backed up"
        );
        snapshot.backup_path = Some(backup.backup_path);
    }

    Ok(snapshot)
}

/// Create the database if needed, run scripts and migrations, and point the
/// application's configuration at it.
pub async fn apply_database_changes(
    service: &dyn DatabaseService,
    config: &DatabaseConfig,
    snapshot: &DatabaseSnapshot,
    app_root: &Path,
    progress: &dyn ProgressSink,
) -> ControlResult<DatabaseDeploymentResult> {
    let mut result = DatabaseDeploymentResult {
        success: false,
        database_name: config.database_name.clone(),
        server_name: config.server.clone(),
        scripts_executed: 0,
        backup_path: snapshot.backup_path.clone(),
        config_file: None,
    };

    if !snapshot.exists {
        if !config.create_if_missing {
            return Err(ControlError::database(format!(
                "database {} does not exist",
                config.database_name
            )));
        }
        service.create(config, progress).await?;
        info!(database = %config.database_name, "database created");
    }

    if !config.scripts.is_empty() {
        result.scripts_executed += service
            .run_scripts(config, &config.scripts, progress)
            .await?;
    }

    if let Some(folder) = &config.migrations_folder {
        result.scripts_executed += service.run_migrations(config, folder).await?;
    }

    if let Some(file) = find_config_file(app_root).await? {
        service
            .update_connection_string(&file, &config.connection_string())
            .await?;
        result.config_file = Some(file);
    } else {
        debug!(root = %app_root.display(), "no configuration file for connection string");
    }

    result.success = true;
    Ok(result)
}

/// Run the whole database stage for an application rooted at `app_root`.
pub async fn deploy_database(
    service: &dyn DatabaseService,
    config: &DatabaseConfig,
    app_root: &Path,
    backup_dir: &Path,
    progress: &dyn ProgressSink,
) -> ControlResult<DatabaseDeploymentResult> {
    let snapshot = backup_database(service, config, backup_dir).await?;
    apply_database_changes(service, config, &snapshot, app_root, progress).await
}

/// First `*.config` file or `appsettings.json` in `root`, by name.
pub async fn find_config_file(root: &Path) -> ControlResult<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if (name.ends_with(".config") || name == APPSETTINGS) && entry.file_type().await?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Replace the connection string in an XML `.config` or `appsettings.json`.
pub async fn rewrite_connection_string(file: &Path, connection_string: &str) -> ControlResult<()> {
    let contents = tokio::fs::read_to_string(file).await?;

    let is_json = file
        .file_name()
        .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(APPSETTINGS));

    let rewritten = if is_json {
        rewrite_json(&contents, connection_string)?
    } else {
        rewrite_xml_attribute(&contents, connection_string).ok_or_else(|| {
            ControlError::database(format!("no connectionString attribute in {}", file.display()))
        })?
    };

    tokio::fs::write(file, rewritten).await?;
    info!(file = %file.display(), "connection string updated");
    Ok(())
}

fn rewrite_json(contents: &str, connection_string: &str) -> ControlResult<String> {
    let mut settings: serde_json::Value = serde_json::from_str(contents)?;
    let root = settings
        .as_object_mut()
        .ok_or_else(|| ControlError::database("appsettings.json is not an object"))?;

    let section = root
        .entry("ConnectionStrings")
        .or_insert_with(|| serde_json::json!({}));
    let section = section
        .as_object_mut()
        .ok_or_else(|| ControlError::database("ConnectionStrings is not an object"))?;
    section.insert(
        "DefaultConnection".to_owned(),
        serde_json::Value::String(connection_string.to_owned()),
    );

    Ok(serde_json::to_string_pretty(&settings)?)
}

/// Replace every `connectionString="..."` value. `None` if there is none.
fn rewrite_xml_attribute(contents: &str, connection_string: &str) -> Option<String> {
    let escaped = connection_string
        .replace('&', "&amp;")
        .replace('"', "&quot;");

    let mut out = String::with_capacity(contents.len());
    let mut rest = contents;
    let mut replaced = false;

    while let Some(start) = rest.find(CONNECTION_ATTRIBUTE) {
        let value_start = start + CONNECTION_ATTRIBUTE.len();
        let Some(len) = rest[value_start..].find('"') else {
            break;
        };
        out.push_str(&rest[..value_start]);
        out.push_str(&escaped);
        rest = &rest[value_start + len..];
        replaced = true;
    }
    out.push_str(rest);

    replaced.then_some(out)
}
