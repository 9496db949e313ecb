//! Implements PhoneCodeLogPort. Appends generated codes to a tab-separated text file.
//! One line per code: `{created_at}\t{purpose}\t{phone}\t{code}`. Append-only; never read back.

use crate::domain::{DomainError, PhoneCode};
use crate::ports::PhoneCodeLogPort;
use chrono::SecondsFormat;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// File-backed delivery channel for verification codes (stands in for SMS).
pub struct FilePhoneCodeLog {
    path: PathBuf,
}

impl FilePhoneCodeLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn log_line(code: &PhoneCode) -> String {
    format!(
        "{}\t{}\t{}\t{}\n",
        code.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        code.purpose.as_str(),
        code.phone,
        code.code
    )
}

#[async_trait::async_trait]
impl PhoneCodeLogPort for FilePhoneCodeLog {
    async fn append(&self, code: &PhoneCode) -> Result<(), DomainError> {
        let io_err = |e: std::io::Error| DomainError::CodeLog(e.to_string());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        f.write_all(log_line(code).as_bytes())
            .await
            .map_err(io_err)?;
        f.flush().await.map_err(io_err)?;
        info!(
            path = %self.path.display(),
            purpose = code.purpose.as_str(),
            "verification code written"
        );
        Ok(())
    }
}
