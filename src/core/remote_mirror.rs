/*
 * The remote sync mirror as seen by the profile core: it can be asked to start or
 * stop mirroring a profile and answers with success or failure. The protocol
 * behind it is not the core's concern.
 *
 * `DirectoryMirror` is the concrete mirror used by the binary. It mirrors into a
 * directory that other running instances can share: enabling writes a manifest
 * entry and a copy of the payload, disabling tears both down.
 */
use super::models::ProfileRecord;
use super::path_utils::{self, PAYLOAD_FILE_EXTENSION};
use super::profiles::{ProfileError, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

pub trait RemoteMirror: Send + Sync {
    fn enable(&self, record: &ProfileRecord) -> Result<()>;
    fn disable(&self, record: &ProfileRecord) -> Result<()>;
}

pub struct DirectoryMirror {
    mirror_dir: PathBuf,
    payload_dir: PathBuf,
}

impl DirectoryMirror {
    pub fn new(mirror_dir: PathBuf, payload_dir: PathBuf) -> Self {
        DirectoryMirror {
            mirror_dir,
            payload_dir,
        }
    }

    fn manifest_path(&self, record: &ProfileRecord) -> PathBuf {
        self.mirror_dir.join(format!("{}.json", record.id))
    }

    fn payload_copy_path(&self, record: &ProfileRecord) -> PathBuf {
        self.mirror_dir
            .join(format!("{}.{PAYLOAD_FILE_EXTENSION}", record.id))
    }

    fn mirror_err(context: &str, err: impl std::fmt::Display) -> ProfileError {
        ProfileError::Mirror(format!("{context}: {err}"))
    }
}

impl RemoteMirror for DirectoryMirror {
    fn enable(&self, record: &ProfileRecord) -> Result<()> {
        fs::create_dir_all(&self.mirror_dir)
            .map_err(|e| Self::mirror_err("creating mirror directory", e))?;

        let manifest = serde_json::json!({ "id": record.id, "name": record.name });
        fs::write(self.manifest_path(record), manifest.to_string())
            .map_err(|e| Self::mirror_err("writing mirror manifest", e))?;

        // A profile without a payload is mirrored as a bare manifest entry.
        let source = path_utils::profile_payload_file(&self.payload_dir, record);
        if source.exists() {
            fs::copy(&source, self.payload_copy_path(record))
                .map_err(|e| Self::mirror_err("uploading payload", e))?;
        }
        log::info!(
            "DirectoryMirror: Mirroring profile '{}' ({}) into {:?}.",
            record.name,
            record.id,
            self.mirror_dir
        );
        Ok(())
    }

    fn disable(&self, record: &ProfileRecord) -> Result<()> {
        for path in [self.manifest_path(record), self.payload_copy_path(record)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Self::mirror_err("removing mirrored entry", e)),
            }
        }
        log::info!(
            "DirectoryMirror: Stopped mirroring profile '{}' ({}).",
            record.name,
            record.id
        );
        Ok(())
    }
}
