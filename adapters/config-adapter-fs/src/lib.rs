//! Filesystem config store.
//!
//! Each config value is a file at `<base_dir>/<group>/<key>`. Watches poll
//! the file and report every content change; publishing writes a temporary
//! file and renames it into place so readers never see a partial document.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod error;

use std::{
	path::{Path, PathBuf},
	pin::Pin,
	time::Duration,
};

use async_trait::async_trait;
use futures_core::Stream;
use tokio::fs::{create_dir_all, read_to_string, rename, write};

use gatehouse_types::config_adapter::{ConfigAdapter, ConfigEvent};
use gatehouse_types::prelude::*;

pub use error::Error as FsConfigError;

/// Default interval between two polls of a watched file
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Names become path components, so they must not escape the base directory
fn check_name(name: &str) -> Result<&str, FsConfigError> {
	if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
		return Err(FsConfigError::InvalidName(name.into()));
	}
	Ok(name)
}

fn config_path(base_dir: &Path, key: &str, group: &str) -> Result<PathBuf, FsConfigError> {
	Ok(base_dir.join(check_name(group)?).join(check_name(key)?))
}

/// Current content, `None` while the file does not exist
async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
	match read_to_string(path).await {
		Ok(content) => Ok(Some(content)),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(err) => Err(err),
	}
}

#[derive(Debug)]
pub struct ConfigAdapterFs {
	base_dir: Box<Path>,
	poll_interval: Duration,
}

impl ConfigAdapterFs {
	pub async fn new(base_dir: Box<Path>) -> ClResult<Self> {
		create_dir_all(&base_dir).await?;
		Ok(Self { base_dir, poll_interval: DEFAULT_POLL_INTERVAL })
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval.max(Duration::from_millis(10));
		self
	}
}

#[async_trait]
impl ConfigAdapter for ConfigAdapterFs {
	async fn get(&self, key: &str, group: &str) -> ClResult<Box<str>> {
		let path = config_path(&self.base_dir, key, group)?;
		debug!("config get: {:?}", path);
		let content = read_to_string(&path).await.map_err(FsConfigError::from)?;
		Ok(content.into())
	}

	async fn publish(&self, key: &str, group: &str, content: &str) -> ClResult<()> {
		let path = config_path(&self.base_dir, key, group)?;
		let dir = self.base_dir.join(group);
		create_dir_all(&dir).await?;

		let tmp_path = dir.join(format!(".{}.tmp", key));
		write(&tmp_path, content).await?;
		rename(&tmp_path, &path).await?;
		info!("config published: {:?} ({} bytes)", path, content.len());
		Ok(())
	}

	async fn watch(
		&self,
		key: &str,
		group: &str,
	) -> ClResult<Pin<Box<dyn Stream<Item = ConfigEvent> + Send>>> {
		let path = config_path(&self.base_dir, key, group)?;
		// Changes only: the content at subscription time is the baseline
		let mut last = read_optional(&path).await?;
		let interval = self.poll_interval;
		let key: Box<str> = key.into();
		let group: Box<str> = group.into();

		let stream = async_stream::stream! {
			loop {
				tokio::time::sleep(interval).await;
				let current = match read_optional(&path).await {
					Ok(current) => current,
					Err(err) => {
						warn!("config watch on {:?} failed to read: {}", path, err);
						continue;
					}
				};
				if current == last {
					continue;
				}
				last.clone_from(&current);
				if let Some(content) = current {
					yield ConfigEvent { group: group.clone(), key: key.clone(), content: content.into() };
				} else {
					debug!("config watch: {:?} removed", path);
				}
			}
		};

		Ok(Box::pin(stream))
	}
}


// vim: ts=4
