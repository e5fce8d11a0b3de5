//! Resource CLI commands: register, orphan and list content keys.

use std::path::Path;

use clap::Subcommand;
use iotnode::cache::CacheDir;
use iotnode::store::{filename_from_url, ResourceKind, ResourceStore};

use super::common::load_config;
use crate::error::CliError;

/// Resource subcommands.
#[derive(Debug, Subcommand)]
pub enum ResourceAction {
    /// Register a resource (or update its URL and kind)
    Add {
        /// Content key; derived from --url when omitted
        filename: Option<String>,

        /// Origin URL
        #[arg(long)]
        url: Option<String>,

        /// Register as a permanent asset instead of content
        #[arg(long)]
        asset: bool,
    },

    /// Mark a resource for deletion by the next trim pass
    Orphan {
        filename: String,
    },

    /// List registered resources
    List,
}

/// Run a resource subcommand.
pub fn run(config_path: &Path, action: ResourceAction) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = ResourceStore::open(&config.node.db_dir)?;

    match action {
        ResourceAction::Add {
            filename,
            url,
            asset,
        } => {
            let filename = resolve_filename(filename, url.as_deref())?;
            let kind = if asset {
                ResourceKind::Asset
            } else {
                ResourceKind::Content
            };
            let resource = store.insert(&filename, url.as_deref(), kind)?;
            println!("Registered {} ({})", resource.filename, kind_label(resource.kind));
            Ok(())
        }
        ResourceAction::Orphan { filename } => {
            if store.orphan(&filename)? {
                println!("Orphaned {}", filename);
                Ok(())
            } else {
                Err(CliError::NotFound(format!("resource '{}'", filename)))
            }
        }
        ResourceAction::List => {
            let resources = store.list()?;
            if resources.is_empty() {
                println!("No resources registered");
            }
            for resource in resources {
                println!(
                    "{:<40} {:<8} {}",
                    resource.filename,
                    kind_label(resource.kind),
                    resource.url.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

fn resolve_filename(filename: Option<String>, url: Option<&str>) -> Result<String, CliError> {
    let filename = match (filename, url) {
        (Some(filename), _) => filename,
        (None, Some(url)) => filename_from_url(url).ok_or_else(|| {
            CliError::InvalidArgument(format!("Cannot derive a filename from '{}'", url))
        })?,
        (None, None) => {
            return Err(CliError::InvalidArgument(
                "Give a filename, a --url, or both".to_string(),
            ))
        }
    };

    if !CacheDir::is_valid_key(&filename) {
        return Err(CliError::InvalidArgument(format!(
            "'{}' is not a valid cache filename",
            filename
        )));
    }
    Ok(filename)
}

fn kind_label(kind: Option<ResourceKind>) -> &'static str {
    match kind {
        Some(ResourceKind::Asset) => "asset",
        Some(ResourceKind::Content) => "content",
        None => "orphaned",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url_when_omitted() {
        assert_eq!(
            resolve_filename(None, Some("http://media.example/v/intro.mp4")).unwrap(),
            "intro.mp4"
        );
        assert_eq!(
            resolve_filename(Some("logo.png".into()), None).unwrap(),
            "logo.png"
        );
    }

    #[test]
    fn test_filename_required() {
        assert!(resolve_filename(None, None).is_err());
        assert!(resolve_filename(Some("../escape".into()), None).is_err());
    }
}
