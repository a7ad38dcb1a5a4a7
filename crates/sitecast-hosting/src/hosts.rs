//! Domain-to-address registration in the hosts-resolution file.
//!
//! The file is only ever appended to. Concurrent writers are not
//! coordinated beyond the ordering of their appends.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::HostingResult;

/// Registers domain names with local name resolution.
#[async_trait]
pub trait HostsResolver: Send + Sync {
    /// Map `domain` to `address`. Returns `false` if the mapping was
    /// already present.
    async fn register(&self, domain: &str, address: IpAddr) -> HostingResult<bool>;
}

/// Appends mappings to a hosts file.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The platform's system hosts file.
    pub fn system() -> Self {
        if cfg!(windows) {
            Self::new(r"C:\Windows\System32\drivers\etc\hosts")
        } else {
            Self::new("/etc/hosts")
        }
    }

    fn contains(contents: &str, domain: &str, address: IpAddr) -> bool {
        let address = address.to_string();
        contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default())
            .any(|line| {
                let mut fields = line.split_whitespace();
                fields.next() == Some(address.as_str())
                    && fields.any(|name| name.eq_ignore_ascii_case(domain))
            })
    }
}

#[async_trait]
impl HostsResolver for HostsFile {
    async fn register(&self, domain: &str, address: IpAddr) -> HostingResult<bool> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        if Self::contains(&contents, domain, address) {
            debug!(domain, %address, "hosts mapping already present");
            return Ok(false);
        }

        let mut line = String::new();
        if !contents.is_empty() && !contents.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&format!("{address}\t{domain}\n"));

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(domain, %address, path = %self.path.display(), "registered hosts mapping");
        Ok(true)
    }
}
