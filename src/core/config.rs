/*
 * Manages application-specific configuration settings that live outside the
 * profile list, currently the directory last used for importing or exporting a
 * profile so that the next file prompt can start there.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) to allow for
 * different storage backends or mock implementations for testing. The concrete
 * implementation (`CoreConfigManager`) keeps one small text file under the data
 * root.
 */
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const LAST_TRANSFER_DIR_FILENAME: &str = "last_transfer_dir.txt";

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Utf8Error(std::string::FromUtf8Error),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<std::string::FromUtf8Error> for ConfigError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ConfigError::Utf8Error(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::Utf8Error(e) => write!(f, "Configuration file UTF-8 error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Utf8Error(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub trait ConfigManagerOperations: Send + Sync {
    fn load_last_transfer_dir(&self) -> Result<Option<PathBuf>>;
    fn save_last_transfer_dir(&self, dir: Option<&Path>) -> Result<()>;
}

pub struct CoreConfigManager {
    config_dir: PathBuf,
}

impl CoreConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        CoreConfigManager { config_dir }
    }

    fn file_path(&self) -> PathBuf {
        self.config_dir.join(LAST_TRANSFER_DIR_FILENAME)
    }
}

impl ConfigManagerOperations for CoreConfigManager {
    fn load_last_transfer_dir(&self) -> Result<Option<PathBuf>> {
        let file_path = self.file_path();
        if !file_path.exists() {
            log::debug!("CoreConfigManager: Last transfer dir file {file_path:?} does not exist.");
            return Ok(None);
        }

        let mut bytes = Vec::new();
        File::open(&file_path)?.read_to_end(&mut bytes)?;
        let contents = String::from_utf8(bytes)?;

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            log::debug!("CoreConfigManager: Loaded last transfer dir '{trimmed}'.");
            Ok(Some(PathBuf::from(trimmed)))
        }
    }

    /* Passing `None` clears the stored value. */
    fn save_last_transfer_dir(&self, dir: Option<&Path>) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        let file_path = self.file_path();
        let mut file = File::create(&file_path)?;
        if let Some(path) = dir {
            file.write_all(path.to_string_lossy().as_bytes())?;
        }
        log::debug!("CoreConfigManager: Saved last transfer dir {dir:?} to {file_path:?}.");
        Ok(())
    }
}
