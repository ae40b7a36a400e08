use std::fmt;

use url::Url;

use crate::migration::error::{MigrationError, Result};

/// Host suffix of blob storage endpoints
pub const BLOB_HOST_SUFFIX: &str = "blob.core.windows.net";

/// Address of a blob: storage account, container and blob name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobLocation {
    pub account: String,
    pub container: String,
    pub blob: String,
}

impl BlobLocation {
    pub fn new(account: &str, container: &str, blob: &str) -> Self {
        Self {
            account: account.to_string(),
            container: container.to_string(),
            blob: blob.to_string(),
        }
    }

    /// Parse a disk media link such as `https://acct.blob.core.windows.net/vhds/os.vhd`
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| MigrationError::validation(format!("Invalid blob URI '{}': {}", uri, e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| MigrationError::validation(format!("Blob URI '{}' has no host", uri)))?;
        let account = host
            .strip_suffix(BLOB_HOST_SUFFIX)
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|account| !account.is_empty() && !account.contains('.'))
            .ok_or_else(|| {
                MigrationError::validation(format!("Blob URI '{}' is not a blob storage endpoint", uri))
            })?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();
        match segments.split_first() {
            Some((container, rest)) if !rest.is_empty() => Ok(Self::new(account, container, &rest.join("/"))),
            _ => Err(MigrationError::validation(format!(
                "Blob URI '{}' must name a container and a blob",
                uri
            ))),
        }
    }

    /// Same container and blob in another storage account
    pub fn in_account(&self, account: &str) -> Self {
        Self {
            account: account.to_string(),
            ..self.clone()
        }
    }

    pub fn uri(&self) -> String {
        format!(
            "https://{}.{}/{}/{}",
            self.account, BLOB_HOST_SUFFIX, self.container, self.blob
        )
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.blob)
    }
}
