/*
 * This module provides utility functions for path manipulation, focusing on
 * retrieving and ensuring the existence of application-specific directories.
 * It also owns the one rule that ties a profile record to its payload file, so
 * the store and the active configuration controller never have to coordinate
 * beyond passing records around.
 */
use super::models::ProfileRecord;
use super::profiles::filter_profile_name;
use directories::ProjectDirs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const PROFILE_LIST_FILENAME: &str = "profiles.json";
pub const PAYLOAD_SUBFOLDER_NAME: &str = "profiles";
pub const MIRROR_SUBFOLDER_NAME: &str = "mirror";
pub const PAYLOAD_FILE_EXTENSION: &str = "properties";

/*
 * Retrieves the application's primary local configuration directory.
 * This function determines the platform-specific path for local (non-roaming)
 * application configuration data. It ensures the directory exists, creating it
 * if necessary. The path is derived without using an organization qualifier.
 *
 * Returns `None` if the directory could not be determined or created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!(
        "PathUtils: Attempting to get base app config local dir for '{}'",
        app_name
    );
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!(
                    "PathUtils: Failed to create base app config directory {:?}: {}",
                    config_path,
                    e
                );
                return None;
            }
            log::debug!(
                "PathUtils: Created base app config directory: {:?}",
                config_path
            );
        }
        Some(config_path.to_path_buf())
    })
}

/*
 * The set of locations derived from one data root. Everything the crate persists
 * lives below `root`.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AppPaths { root: root.into() }
    }

    pub fn profile_list_file(&self) -> PathBuf {
        self.root.join(PROFILE_LIST_FILENAME)
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.root.join(PAYLOAD_SUBFOLDER_NAME)
    }

    pub fn mirror_dir(&self) -> PathBuf {
        self.root.join(MIRROR_SUBFOLDER_NAME)
    }

    pub fn payload_file(&self, record: &ProfileRecord) -> PathBuf {
        profile_payload_file(&self.payload_dir(), record)
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.payload_dir())
    }
}

/*
 * `<payload_dir>/<name>-<id>.properties`. The name is filtered again here because
 * a list written by another instance may carry separators.
 */
pub fn profile_payload_file(payload_dir: &Path, record: &ProfileRecord) -> PathBuf {
    payload_dir.join(format!(
        "{}-{}.{PAYLOAD_FILE_EXTENSION}",
        filter_profile_name(&record.name),
        record.id
    ))
}

/*
 * Appends the payload extension to an export destination that lacks it. The
 * check is on the full file name, so `foo.txt` becomes `foo.txt.properties`.
 */
pub fn with_payload_extension(path: &Path) -> PathBuf {
    let has_extension = path
        .file_name()
        .map(|n| n.to_string_lossy().ends_with(&format!(".{PAYLOAD_FILE_EXTENSION}")))
        .unwrap_or(false);
    if has_extension {
        path.to_path_buf()
    } else {
        let mut file_name = path.file_name().unwrap_or_default().to_os_string();
        file_name.push(format!(".{PAYLOAD_FILE_EXTENSION}"));
        path.with_file_name(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProfileId;

    #[test]
    fn test_get_base_app_config_local_dir_creates_and_is_stable() {
        // Arrange
        let unique_app_name = format!("TestApp_PathUtils_{}", rand::random::<u128>());

        // Act
        let first = get_base_app_config_local_dir(&unique_app_name);
        let second = get_base_app_config_local_dir(&unique_app_name);

        // Assert
        if let Some(path) = first {
            assert!(path.is_dir());
            assert_eq!(second.as_ref(), Some(&path));
            assert!(
                path.to_string_lossy()
                    .to_lowercase()
                    .contains(&unique_app_name.to_lowercase())
            );
            if let Err(e) = fs::remove_dir_all(&path) {
                eprintln!("Test cleanup error for {}: {}", path.display(), e);
            }
        }
    }

    #[test]
    fn test_app_paths_layout() {
        let paths = AppPaths::new("/data/keeper");
        assert_eq!(
            paths.profile_list_file(),
            PathBuf::from("/data/keeper/profiles.json")
        );
        assert_eq!(paths.payload_dir(), PathBuf::from("/data/keeper/profiles"));
        assert_eq!(paths.mirror_dir(), PathBuf::from("/data/keeper/mirror"));
    }

    #[test]
    fn test_payload_file_is_derived_from_name_and_id() {
        let paths = AppPaths::new("/data");
        let record = ProfileRecord::new(ProfileId(99), "Main".to_string());
        assert_eq!(
            paths.payload_file(&record),
            PathBuf::from("/data/profiles/Main-99.properties")
        );
    }

    #[test]
    fn test_payload_file_stays_inside_payload_dir_for_hostile_names() {
        let paths = AppPaths::new("/data");
        let record = ProfileRecord::new(ProfileId(5), "../../etc/passwd".to_string());

        let file = paths.payload_file(&record);

        assert_eq!(file.parent(), Some(paths.payload_dir().as_path()));
        assert_eq!(file, PathBuf::from("/data/profiles/....etcpasswd-5.properties"));
    }

    #[test]
    fn test_with_payload_extension() {
        assert_eq!(
            with_payload_extension(Path::new("/out/backup.properties")),
            PathBuf::from("/out/backup.properties")
        );
        assert_eq!(
            with_payload_extension(Path::new("/out/backup")),
            PathBuf::from("/out/backup.properties")
        );
        assert_eq!(
            with_payload_extension(Path::new("/out/backup.txt")),
            PathBuf::from("/out/backup.txt.properties")
        );
    }
}
