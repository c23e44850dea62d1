//! Registry mirror configuration for the container runtime.
//!
//! Writes one `hosts.toml` per upstream registry under the runtime's
//! registry config path so that pulls are routed through the mirrors, and
//! builds the image list/event filters used to track local images.

use std::path::{Path, PathBuf};

use tokio::fs;
use url::Url;

use crate::error::{MirrorError, Result};

const BACKUP_DIR: &str = "_backup";

/// Write the mirror configuration for each registry.
///
/// On the first run any existing registry directories are moved under
/// `_backup` before the configuration is written; a pre-existing `_backup`
/// is never touched. Loose files directly in the config path cannot map to
/// a registry host and are discarded. Everything else in the config path
/// is regenerated, so repeated runs are idempotent.
pub async fn add_mirror_configuration(
    config_path: &Path,
    registries: &[Url],
    mirrors: &[Url],
    resolve_tags: bool,
) -> Result<()> {
    validate_registries(registries)?;
    let capabilities = if resolve_tags {
        "['pull', 'resolve']"
    } else {
        "['pull']"
    };

    backup_config(config_path).await?;
    clear_config(config_path).await?;

    for registry in registries {
        let dir = config_path.join(host_key(registry));
        fs::create_dir_all(&dir).await?;
        let content = hosts_file_content(registry, mirrors, capabilities);
        fs::write(dir.join("hosts.toml"), content).await?;
        tracing::info!(
            registry = %host_key(registry),
            mirrors = mirrors.len(),
            "wrote registry mirror configuration"
        );
    }
    Ok(())
}

/// Containerd image store filters for the configured registries: one for
/// listing existing images, one for create/update event subscriptions.
pub fn create_filters(registries: &[Url]) -> (String, String) {
    let hosts: Vec<String> = registries.iter().map(host_key).collect();
    let joined = hosts.join("|");
    let list_filter = format!(r#"name~="{}""#, joined);
    let event_filter = format!(
        r#"topic~="/images/create|/images/update",event.name~="{}""#,
        joined
    );
    (list_filter, event_filter)
}

fn validate_registries(registries: &[Url]) -> Result<()> {
    for url in registries {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid_url("scheme must be http or https", url));
        }
        if !url.path().is_empty() && url.path() != "/" {
            return Err(invalid_url("path has to be empty", url));
        }
        if url.query().is_some() {
            return Err(invalid_url("query has to be empty", url));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid_url("user has to be empty", url));
        }
    }
    Ok(())
}

fn invalid_url(reason: &str, url: &Url) -> MirrorError {
    MirrorError::InvalidRegistryUrl {
        reason: reason.to_string(),
        url: url.to_string(),
    }
}

/// Registry key in `host[:port]` form, used both as the directory name and
/// in filter expressions.
fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn url_origin(url: &Url) -> String {
    format!("{}://{}", url.scheme(), host_key(url))
}

// docker.io is an alias; pulls actually go to registry-1.docker.io.
fn canonical_upstream(registry: &Url) -> String {
    if registry.host_str() == Some("docker.io") {
        "https://registry-1.docker.io".to_string()
    } else {
        url_origin(registry)
    }
}

fn hosts_file_content(registry: &Url, mirrors: &[Url], capabilities: &str) -> String {
    let mut out = format!("server = '{}'\n\n[host]\n", canonical_upstream(registry));
    for (i, mirror) in mirrors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "[host.'{}']\ncapabilities = {}\n",
            url_origin(mirror),
            capabilities
        ));
    }
    out
}

async fn backup_config(config_path: &Path) -> Result<()> {
    let backup_path = config_path.join(BACKUP_DIR);
    // A prior run already established the backup; leave it alone.
    if fs::metadata(&backup_path).await.is_ok() {
        return Ok(());
    }

    let mut entries = match fs::read_dir(config_path).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let mut dirs: Vec<(std::ffi::OsString, PathBuf)> = Vec::new();
    let mut loose: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push((entry.file_name(), entry.path()));
        } else {
            loose.push(entry.path());
        }
    }

    if !dirs.is_empty() {
        fs::create_dir_all(&backup_path).await?;
        for (name, path) in dirs {
            fs::rename(&path, backup_path.join(name)).await?;
        }
    }
    for path in loose {
        tracing::warn!(
            path = %path.display(),
            "discarding unrecognized file in registry config path"
        );
        fs::remove_file(&path).await?;
    }
    Ok(())
}

async fn clear_config(config_path: &Path) -> Result<()> {
    let mut entries = match fs::read_dir(config_path).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == BACKUP_DIR {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(entry.path()).await?;
        } else {
            fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
