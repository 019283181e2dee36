//! Upload subsystem configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upload limits, lifetimes and working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory holding session records and chunk artifacts.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Largest accepted file, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Lifetime of presigned URLs.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
    /// Age after which an unfinished session is swept.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Interval of the maintenance task; 0 disables it.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Age after which a finalize claim left by a crashed process is released.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

const fn default_max_file_size() -> u64 {
    // 50 GiB
    50 * 1024 * 1024 * 1024
}

const fn default_presign_ttl_secs() -> u64 {
    3600
}

const fn default_session_ttl_secs() -> u64 {
    7 * 24 * 3600
}

const fn default_sweep_interval_secs() -> u64 {
    3600
}

const fn default_claim_lease_secs() -> u64 {
    3600
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_file_size: default_max_file_size(),
            presign_ttl_secs: default_presign_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

impl UploadConfig {
    /// Config rooted at the given working directory, other values default.
    #[must_use]
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    /// Set the maximum file size.
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Lifetime of presigned URLs.
    #[must_use]
    pub const fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    /// Maximum age of an unfinished session.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Maintenance interval, `None` when disabled.
    #[must_use]
    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sweep_interval_secs))
        }
    }

    /// How long a finalize claim may be held before recovery releases it.
    #[must_use]
    pub const fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    /// Directory for session metadata.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.work_dir.join("meta")
    }

    /// Directory for chunk artifacts.
    #[must_use]
    pub fn chunks_dir(&self) -> PathBuf {
        self.work_dir.join("chunks")
    }
}
