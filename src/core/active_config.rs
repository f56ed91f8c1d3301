/*
 * This module defines `ActiveConfigController`, the owner of "which profile is
 * active" as the rest of the application sees it, together with the configuration
 * payload of that profile.
 *
 * A switch is split in two. `switch_identity` runs under a store handle and only
 * flips the `active` flags; `load_profile` runs afterwards without any handle,
 * reads the payload file and publishes `ProfileEvent::ProfileChanged`. Loads can
 * finish out of order when two switches race on different workers, so every
 * identity flip records its target and a load for any other profile is dropped.
 * The final active configuration is always the one of the last flip. Payload files
 * are addressed through `AppPaths::payload_file`, so the store and this controller
 * only ever exchange records.
 *
 * The `ActiveConfigOperations` trait is what the presenter depends on, which keeps
 * it testable with a substitute implementation.
 */
use super::checksum_utils;
use super::events::{EventBus, ProfileEvent};
use super::models::{ProfileId, ProfileRecord};
use super::path_utils::{self, AppPaths};
use super::profile_store::ProfileStore;
use super::profiles::{ProfileError, Result};
use super::remote_mirror::RemoteMirror;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub trait ActiveConfigOperations: Send + Sync {
    fn active_profile(&self) -> Option<ProfileRecord>;
    fn payload_path(&self, record: &ProfileRecord) -> PathBuf;

    /* Writes pending in-memory configuration of the active profile to its payload file. */
    fn flush(&self) -> Result<()>;

    fn switch_identity(&self, store: &ProfileStore, id: ProfileId) -> Result<ProfileRecord>;
    fn load_profile(&self, record: &ProfileRecord) -> Result<()>;

    fn rename_payload(&self, previous: &ProfileRecord, new_name: &str) -> Result<()>;
    fn import_payload(&self, source: &Path, record: &ProfileRecord) -> Result<()>;
    fn export_payload(&self, record: &ProfileRecord, destination: &Path) -> Result<PathBuf>;
    fn clone_payload(&self, from: &ProfileRecord, to: &ProfileRecord) -> Result<bool>;
    fn delete_payload(&self, record: &ProfileRecord) -> Result<()>;

    fn toggle_sync(&self, store: &ProfileStore, id: ProfileId, enabled: bool) -> Result<()>;
}

#[derive(Default)]
struct ActiveConfigState {
    profile: Option<ProfileRecord>,
    payload: Vec<u8>,
    has_pending_changes: bool,
    // Set under the store handle by every identity flip.
    switch_target: Option<ProfileId>,
}

pub struct ActiveConfigController {
    paths: AppPaths,
    mirror: Arc<dyn RemoteMirror>,
    events: Arc<EventBus>,
    state: Mutex<ActiveConfigState>,
}

impl ActiveConfigController {
    pub fn new(paths: AppPaths, mirror: Arc<dyn RemoteMirror>, events: Arc<EventBus>) -> Self {
        ActiveConfigController {
            paths,
            mirror,
            events,
            state: Mutex::new(ActiveConfigState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ActiveConfigState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn payload(&self) -> Vec<u8> {
        self.state().payload.clone()
    }

    /* Replaces the in-memory configuration of the active profile; persisted on `flush`. */
    pub fn set_payload(&self, payload: Vec<u8>) {
        let mut state = self.state();
        state.payload = payload;
        state.has_pending_changes = true;
    }

    /*
     * Loads whichever record the persisted list marks active. Used at startup so
     * the controller agrees with the store before the first switch.
     */
    pub fn restore_from_store(&self, store: &ProfileStore) -> Result<Option<ProfileRecord>> {
        let active = {
            let handle = store.acquire()?;
            let active = handle.active().cloned();
            self.state().switch_target = active.as_ref().map(|r| r.id);
            active
        };
        if let Some(record) = &active {
            self.load_profile(record)?;
        }
        Ok(active)
    }

    fn write_payload_atomically(path: &Path, payload: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)
    }

    /* Writes pending changes while the caller holds the state lock. */
    fn flush_locked(&self, state: &mut ActiveConfigState) -> Result<()> {
        if !state.has_pending_changes {
            return Ok(());
        }
        let Some(profile) = state.profile.clone() else {
            log::debug!("ActiveConfigController: Pending changes without an active profile, dropping.");
            state.has_pending_changes = false;
            return Ok(());
        };
        let path = self.paths.payload_file(&profile);
        Self::write_payload_atomically(&path, &state.payload)?;
        state.has_pending_changes = false;
        log::debug!(
            "ActiveConfigController: Flushed configuration of '{}' to {:?}.",
            profile.name,
            path
        );
        Ok(())
    }

    fn copy_verified(from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        if !checksum_utils::files_have_same_content(from, to)? {
            return Err(ProfileError::ChecksumMismatch(to.to_path_buf()));
        }
        Ok(())
    }
}

impl ActiveConfigOperations for ActiveConfigController {
    fn active_profile(&self) -> Option<ProfileRecord> {
        self.state().profile.clone()
    }

    fn payload_path(&self, record: &ProfileRecord) -> PathBuf {
        self.paths.payload_file(record)
    }

    fn flush(&self) -> Result<()> {
        self.flush_locked(&mut self.state())
    }

    /*
     * The lock-held half of a switch: clear every active flag, set the one for `id`,
     * persist, and record `id` as the switch target.
     */
    fn switch_identity(&self, store: &ProfileStore, id: ProfileId) -> Result<ProfileRecord> {
        let mut handle = store.acquire()?;
        let record = handle.set_active(id)?;
        log::debug!("ActiveConfigController: Switching profile to {}", record.name);
        handle.commit()?;
        // Still under the handle, so targets are recorded in flip order.
        self.state().switch_target = Some(id);
        Ok(record)
    }

    /*
     * The lock-free half of a switch. The outgoing configuration is flushed first. A
     * missing payload file means the profile has no settings yet and loads as empty.
     * A load overtaken by a later identity flip is dropped without notifying.
     */
    fn load_profile(&self, record: &ProfileRecord) -> Result<()> {
        if let Err(e) = self.flush() {
            log::error!("ActiveConfigController: Failed to save outgoing configuration: {e}");
        }

        let path = self.paths.payload_file(record);
        let payload = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    "ActiveConfigController: Profile '{}' has no settings yet ({:?}).",
                    record.name,
                    path
                );
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        // Commit and notify under one lock so notifications follow commit order.
        let mut state = self.state();
        if let Some(target) = state.switch_target.filter(|target| *target != record.id) {
            log::debug!(
                "ActiveConfigController: Dropping load of '{}', switch to {target} is newer.",
                record.name
            );
            return Ok(());
        }
        state.profile = Some(record.clone());
        state.payload = payload;
        state.has_pending_changes = false;
        log::info!("ActiveConfigController: Profile '{}' is now active.", record.name);
        self.events
            .publish(ProfileEvent::ProfileChanged { id: record.id });
        Ok(())
    }

    /* Holds the state lock throughout, so no flush can land on the old path. */
    fn rename_payload(&self, previous: &ProfileRecord, new_name: &str) -> Result<()> {
        let mut state = self.state();
        self.flush_locked(&mut state)?;
        let mut renamed = previous.clone();
        renamed.name = new_name.to_string();

        let from = self.paths.payload_file(previous);
        let to = self.paths.payload_file(&renamed);
        if from != to && from.exists() {
            fs::rename(&from, &to)?;
            log::debug!("ActiveConfigController: Moved payload {from:?} to {to:?}.");
        }

        if let Some(active) = state.profile.as_mut().filter(|p| p.id == previous.id) {
            active.name = new_name.to_string();
        }
        Ok(())
    }

    fn import_payload(&self, source: &Path, record: &ProfileRecord) -> Result<()> {
        let target = self.paths.payload_file(record);
        Self::copy_verified(source, &target)?;
        log::info!(
            "ActiveConfigController: Imported {:?} into profile '{}'.",
            source,
            record.name
        );
        Ok(())
    }

    /*
     * Exports after flushing so the copy carries the full configuration. The
     * destination is overwritten and gets the payload extension if it lacks one.
     */
    fn export_payload(&self, record: &ProfileRecord, destination: &Path) -> Result<PathBuf> {
        self.flush()?;
        let source = self.paths.payload_file(record);
        if !source.exists() {
            return Err(ProfileError::MissingPayload(record.name.clone()));
        }
        let destination = path_utils::with_payload_extension(destination);
        Self::copy_verified(&source, &destination)?;
        Ok(destination)
    }

    /* Returns `false` when the source has no payload to copy. Never overwrites. */
    fn clone_payload(&self, from: &ProfileRecord, to: &ProfileRecord) -> Result<bool> {
        let source = self.paths.payload_file(from);
        if !source.exists() {
            return Ok(false);
        }
        let target = self.paths.payload_file(to);
        if target.exists() {
            return Err(ProfileError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{target:?} already exists"),
            )));
        }
        Self::copy_verified(&source, &target)?;
        Ok(true)
    }

    fn delete_payload(&self, record: &ProfileRecord) -> Result<()> {
        match fs::remove_file(self.paths.payload_file(record)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /*
     * Talks to the mirror first and only records the new `sync` flag once the
     * mirror call succeeded. No store handle is held while the mirror works.
     */
    fn toggle_sync(&self, store: &ProfileStore, id: ProfileId, enabled: bool) -> Result<()> {
        let record = {
            let handle = store.acquire()?;
            handle
                .find(id)
                .cloned()
                .ok_or(ProfileError::ProfileNotFound(id))?
        };
        if record.sync_enabled == enabled {
            return Ok(());
        }

        log::info!(
            "ActiveConfigController: {} sync for: {}",
            if enabled { "Enabling" } else { "Disabling" },
            record.name
        );
        if enabled {
            self.flush()?;
            self.mirror.enable(&record)?;
        } else {
            self.mirror.disable(&record)?;
        }

        let mut handle = store.acquire()?;
        handle.set_sync(id, enabled)?;
        handle.release()
    }
}
