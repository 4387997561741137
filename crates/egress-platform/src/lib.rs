use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier some Android builds report for every device; never unique.
pub const BROKEN_PLATFORM_ID: &str = "9774d56d682e549c";

/// Engine library version announced to the backend.
pub const ENGINE_SDK_VERSION: &str = "55";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityStoreError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
    #[error("identity store corrupt: {0}")]
    Corrupt(String),
    #[error("identity store backend failure: {0}")]
    Backend(String),
}

/// Source of the stable device identifier sent to the backend.
pub trait DeviceIdSource: Send + Sync {
    fn device_id(&self) -> Result<String, IdentityStoreError>;
}

impl<S: DeviceIdSource + ?Sized> DeviceIdSource for Arc<S> {
    fn device_id(&self) -> Result<String, IdentityStoreError> {
        (**self).device_id()
    }
}

/// Whether a platform-reported identifier can be used as-is.
pub fn is_usable_platform_id(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    !trimmed.is_empty() && trimmed != BROKEN_PLATFORM_ID
}

/// Identifier generated once per instance.
#[derive(Debug, Default)]
pub struct RandomDeviceId {
    id: OnceLock<String>,
}

impl DeviceIdSource for RandomDeviceId {
    fn device_id(&self) -> Result<String, IdentityStoreError> {
        Ok(self
            .id
            .get_or_init(|| Uuid::new_v4().to_string())
            .clone())
    }
}

/// Platform identifier with a random fallback for missing or known-bad values.
#[derive(Debug, Default)]
pub struct StaticDeviceId {
    platform_id: Option<String>,
    fallback: RandomDeviceId,
}

impl StaticDeviceId {
    pub fn new(platform_id: impl Into<String>) -> Self {
        Self {
            platform_id: Some(platform_id.into()),
            fallback: RandomDeviceId::default(),
        }
    }
}

impl DeviceIdSource for StaticDeviceId {
    fn device_id(&self) -> Result<String, IdentityStoreError> {
        match self.platform_id.as_deref() {
            Some(id) if is_usable_platform_id(id) => Ok(id.trim().to_owned()),
            Some(_) => {
                debug!("platform device id unusable; falling back to random id");
                self.fallback.device_id()
            }
            None => self.fallback.device_id(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    device_id: String,
}

/// Random identifier persisted as JSON so it survives restarts.
#[derive(Debug, Clone)]
pub struct FileDeviceIdStore {
    path: PathBuf,
}

impl FileDeviceIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Option<String>, IdentityStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(IdentityStoreError::Unavailable(format!(
                    "failed reading {}: {err}",
                    self.path.display()
                )));
            }
        };

        let stored = serde_json::from_str::<StoredIdentity>(&raw).map_err(|err| {
            IdentityStoreError::Corrupt(format!("failed parsing {}: {err}", self.path.display()))
        })?;
        if stored.device_id.trim().is_empty() {
            return Err(IdentityStoreError::Corrupt(format!(
                "{} holds an empty device id",
                self.path.display()
            )));
        }
        Ok(Some(stored.device_id))
    }

    fn save(&self, device_id: &str) -> Result<(), IdentityStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                IdentityStoreError::Backend(format!(
                    "failed creating identity directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let encoded = serde_json::to_vec(&StoredIdentity {
            device_id: device_id.to_owned(),
        })
        .map_err(|err| IdentityStoreError::Backend(err.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, encoded).map_err(|err| {
            IdentityStoreError::Backend(format!(
                "failed writing {}: {err}",
                temp_path.display()
            ))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|err| {
            let _ = fs::remove_file(&temp_path);
            IdentityStoreError::Backend(format!(
                "failed replacing {}: {err}",
                self.path.display()
            ))
        })
    }
}

impl DeviceIdSource for FileDeviceIdStore {
    fn device_id(&self) -> Result<String, IdentityStoreError> {
        if let Some(existing) = self.load()? {
            return Ok(existing);
        }

        let generated = Uuid::new_v4().to_string();
        self.save(&generated)?;
        debug!(path = %self.path.display(), "persisted new device id");
        Ok(generated)
    }
}

/// Metadata handed to the engine provider when a transport is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBuildInfo {
    /// Host process id.
    pub pid: u32,
    /// Engine library version announced to the backend.
    pub sdk_version: String,
    /// Host platform identifier (an API level on mobile hosts).
    pub platform: String,
    /// Normalized CPU architecture label, see [`cpu_arch_label`].
    pub cpu_arch: String,
}

impl EngineBuildInfo {
    /// Describe the current process.
    pub fn current() -> Self {
        let cpu_arch = cpu_arch_label(std::env::consts::ARCH);
        if cpu_arch == "unknown" {
            warn!(arch = std::env::consts::ARCH, "unrecognized cpu architecture");
        }

        Self {
            pid: std::process::id(),
            sdk_version: ENGINE_SDK_VERSION.to_owned(),
            platform: std::env::consts::OS.to_owned(),
            cpu_arch: cpu_arch.to_owned(),
        }
    }
}

/// Map an ABI or architecture string to the label the backend expects.
pub fn cpu_arch_label(abi: &str) -> &'static str {
    if abi.starts_with("arm64") || abi.starts_with("aarch64") {
        "arm64"
    } else if abi.starts_with("armeabi") || abi.starts_with("arm") {
        "armeabi"
    } else if abi.starts_with("x86_64") {
        "x86_64"
    } else if abi.starts_with("x86") {
        "x86"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_stable_per_instance() {
        let source = RandomDeviceId::default();
        let first = source.device_id().expect("first id");
        let second = source.device_id().expect("second id");
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        let other = RandomDeviceId::default().device_id().expect("other id");
        assert_ne!(first, other);
    }

    #[test]
    fn static_id_passes_through_usable_value() {
        let source = StaticDeviceId::new(" a1b2c3d4e5f6 ");
        assert_eq!(source.device_id().expect("id"), "a1b2c3d4e5f6");
    }

    #[test]
    fn static_id_rejects_known_bad_value() {
        let source = StaticDeviceId::new(BROKEN_PLATFORM_ID);
        let id = source.device_id().expect("fallback id");
        assert_ne!(id, BROKEN_PLATFORM_ID);
        assert_eq!(source.device_id().expect("cached fallback"), id);
    }

    #[test]
    fn static_id_falls_back_when_blank() {
        let source = StaticDeviceId::new("   ");
        assert!(Uuid::parse_str(&source.device_id().expect("id")).is_ok());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("identity.json");

        let first = FileDeviceIdStore::new(&path)
            .device_id()
            .expect("generate id");
        let second = FileDeviceIdStore::new(&path)
            .device_id()
            .expect("reload id");

        assert_eq!(first, second);
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn file_store_reports_corrupt_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identity.json");
        fs::write(&path, "not json").expect("write garbage");

        let err = FileDeviceIdStore::new(&path)
            .device_id()
            .expect_err("corrupt file must fail");
        assert!(matches!(err, IdentityStoreError::Corrupt(_)));
    }

    #[test]
    fn file_store_rejects_empty_stored_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("identity.json");
        fs::write(&path, r#"{"device_id":""}"#).expect("write empty id");

        let err = FileDeviceIdStore::new(&path)
            .device_id()
            .expect_err("empty id must fail");
        assert!(matches!(err, IdentityStoreError::Corrupt(_)));
    }

    #[test]
    fn maps_abi_strings_to_arch_labels() {
        assert_eq!(cpu_arch_label("arm64-v8a"), "arm64");
        assert_eq!(cpu_arch_label("aarch64"), "arm64");
        assert_eq!(cpu_arch_label("armeabi-v7a"), "armeabi");
        assert_eq!(cpu_arch_label("x86_64"), "x86_64");
        assert_eq!(cpu_arch_label("x86"), "x86");
        assert_eq!(cpu_arch_label("mips"), "unknown");
    }

    #[test]
    fn build_info_describes_current_process() {
        let info = EngineBuildInfo::current();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.sdk_version, ENGINE_SDK_VERSION);
        assert!(!info.platform.is_empty());
    }

    struct FailingSource;

    impl DeviceIdSource for FailingSource {
        fn device_id(&self) -> Result<String, IdentityStoreError> {
            Err(IdentityStoreError::Unavailable("mock outage".to_owned()))
        }
    }

    #[test]
    fn failure_propagates_through_arc() {
        let source: Arc<dyn DeviceIdSource> = Arc::new(FailingSource);
        assert_eq!(
            source.device_id(),
            Err(IdentityStoreError::Unavailable("mock outage".to_owned()))
        );
    }
}
