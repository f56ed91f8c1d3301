/*
 * This module owns the authoritative profile list and its on-disk form.
 *
 * All access goes through `ProfileStore::acquire`, which blocks until the single
 * process-wide critical section is free and then re-reads `profiles.json` from
 * disk, so every critical section starts from ground truth even if another running
 * instance rewrote the file in the meantime. The returned `StoreHandle` is the only
 * way to read or mutate the list. Mutations mark the handle dirty; when the handle
 * goes away (explicit `release`, normal scope exit, early return, or unwinding) a
 * dirty list is written back with a write-new-then-rename so readers never see a
 * partial file.
 */
use super::models::{self, ProfileId, ProfileRecord};
use super::path_utils::AppPaths;
use super::profiles::{self, ProfileError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const TEMP_FILE_SUFFIX: &str = "tmp";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedProfileList {
    #[serde(default)]
    profiles: Vec<ProfileRecord>,
}

pub struct ProfileStore {
    list_path: PathBuf,
    profiles: Mutex<Vec<ProfileRecord>>,
}

impl ProfileStore {
    pub fn new(list_path: PathBuf) -> Self {
        log::debug!("ProfileStore: Using profile list at {list_path:?}");
        ProfileStore {
            list_path,
            profiles: Mutex::new(Vec::new()),
        }
    }

    pub fn open(paths: &AppPaths) -> Self {
        ProfileStore::new(paths.profile_list_file())
    }

    pub fn list_path(&self) -> &Path {
        &self.list_path
    }

    /*
     * Blocks until exclusive access is granted, then replaces the in-memory list
     * with what is currently on disk. A poisoned lock (a previous holder panicked)
     * is recovered; the re-read makes the stale in-memory contents irrelevant.
     */
    pub fn acquire(&self) -> Result<StoreHandle<'_>> {
        let mut guard = self
            .profiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        *guard = Self::read_list(&self.list_path)?;
        log::trace!(
            "ProfileStore: Acquired handle with {} profiles from {:?}",
            guard.len(),
            self.list_path
        );

        Ok(StoreHandle {
            profiles: guard,
            list_path: &self.list_path,
            dirty: false,
        })
    }

    fn read_list(path: &Path) -> Result<Vec<ProfileRecord>> {
        if !path.exists() {
            log::trace!("ProfileStore: No profile list at {path:?}, starting empty.");
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let persisted: PersistedProfileList = serde_json::from_str(&contents)?;
        Ok(persisted.profiles)
    }

    fn write_list(path: &Path, profiles: &[ProfileRecord]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(format!(".{TEMP_FILE_SUFFIX}"));
        let temp_path = path.with_file_name(temp_name);

        let persisted = PersistedProfileList {
            profiles: profiles.to_vec(),
        };
        {
            let mut file = File::create(&temp_path)?;
            serde_json::to_writer_pretty(&mut file, &persisted)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;
        log::debug!(
            "ProfileStore: Wrote {} profiles to {:?}.",
            profiles.len(),
            path
        );
        Ok(())
    }

    /* Reads the persisted list without taking the critical section. Test helper. */
    #[cfg(test)]
    pub(crate) fn read_persisted(&self) -> Result<Vec<ProfileRecord>> {
        let file = File::open(&self.list_path)?;
        let persisted: PersistedProfileList = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(persisted.profiles)
    }
}

/*
 * Scoped exclusive access to the profile list. Holding one of these is the only
 * way to observe or change the list; dropping it releases the critical section.
 */
pub struct StoreHandle<'a> {
    profiles: MutexGuard<'a, Vec<ProfileRecord>>,
    list_path: &'a Path,
    dirty: bool,
}

impl StoreHandle<'_> {
    pub fn profiles(&self) -> &[ProfileRecord] {
        &self.profiles
    }

    /* Direct access for whole-list edits; the caller is responsible for `mark_dirty`. */
    pub fn profiles_mut(&mut self) -> &mut Vec<ProfileRecord> {
        &mut self.profiles
    }

    pub fn snapshot(&self) -> Vec<ProfileRecord> {
        self.profiles.clone()
    }

    pub fn find(&self, id: ProfileId) -> Option<&ProfileRecord> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ProfileRecord> {
        self.profiles.iter().find(|p| p.name == name)
    }

    fn find_mut(&mut self, id: ProfileId) -> Result<&mut ProfileRecord> {
        self.profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ProfileError::ProfileNotFound(id))
    }

    pub fn is_at_capacity(&self) -> bool {
        models::is_at_capacity(&self.profiles)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /*
     * Appends a new user-visible profile named `base_name`, or `"base_name (n)"`
     * if that name is already taken in this critical section.
     */
    pub fn create(&mut self, base_name: &str) -> Result<ProfileRecord> {
        let base = profiles::validate_profile_name(base_name)?;
        let name = profiles::probe_free_name(&base, |n| self.find_by_name(n).is_some())?;
        Ok(self.push_new(name, false))
    }

    /* Appends a copy-target profile named `"source_name (n)"`. */
    pub fn create_clone_of(&mut self, source_name: &str) -> Result<ProfileRecord> {
        let name = profiles::probe_clone_name(source_name, |n| self.find_by_name(n).is_some())?;
        Ok(self.push_new(name, false))
    }

    /* Internal records are hidden from the user-facing list and never probed. */
    pub fn create_internal(&mut self, name: &str) -> ProfileRecord {
        self.push_new(name.to_string(), true)
    }

    fn push_new(&mut self, name: String, internal: bool) -> ProfileRecord {
        let id = self.next_free_id();
        let mut record = ProfileRecord::new(id, name);
        record.internal = internal;
        log::debug!(
            "StoreHandle: Created profile '{}' with id {} (internal: {}).",
            record.name,
            record.id,
            internal
        );
        self.profiles.push(record.clone());
        self.dirty = true;
        record
    }

    fn next_free_id(&self) -> ProfileId {
        loop {
            let candidate = ProfileId(rand::random::<u64>());
            if candidate.0 != 0 && self.find(candidate).is_none() {
                return candidate;
            }
        }
    }

    /*
     * Renames the record and returns it as it was before the rename, so callers can
     * move anything keyed by the old name. Name collisions are allowed here; only
     * creation paths probe for a free name.
     */
    pub fn rename(&mut self, id: ProfileId, new_name: &str) -> Result<ProfileRecord> {
        let name = profiles::validate_profile_name(new_name)?;
        if let Some(other) = self.find_by_name(&name).filter(|p| p.id != id) {
            log::warn!(
                "StoreHandle: Renaming {} to '{}' which is also used by profile {}.",
                id,
                name,
                other.id
            );
        }
        let record = self.find_mut(id)?;
        let previous = record.clone();
        record.name = name;
        self.dirty = true;
        Ok(previous)
    }

    pub fn set_credential(&mut self, id: ProfileId, credential: Vec<u8>) -> Result<()> {
        let record = self.find_mut(id)?;
        if record.credential != credential {
            record.credential = credential;
            self.dirty = true;
        }
        Ok(())
    }

    /*
     * Removes a record. A record that is still mirrored must have sync disabled
     * first; removing it anyway is refused.
     */
    pub fn remove(&mut self, id: ProfileId) -> Result<ProfileRecord> {
        let index = self
            .profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or(ProfileError::ProfileNotFound(id))?;
        if self.profiles[index].sync_enabled {
            log::error!("StoreHandle: Refusing to remove profile {id} while sync is enabled.");
            return Err(ProfileError::SyncStillEnabled(id));
        }
        let removed = self.profiles.remove(index);
        self.dirty = true;
        Ok(removed)
    }

    /*
     * Re-sorts the whole list to follow `rendered_order`. Records absent from the
     * rendered order (internal ones, or ones another instance just added) sort ahead
     * of the rendered ones and keep their relative order.
     */
    pub fn reorder(&mut self, rendered_order: &[ProfileId]) {
        let position =
            |id: ProfileId| -> Option<usize> { rendered_order.iter().position(|r| *r == id) };
        self.profiles.sort_by_key(|p| position(p.id));
        self.dirty = true;
    }

    /*
     * Makes `id` the single active record. Every flag is cleared before the new one
     * is set.
     */
    pub fn set_active(&mut self, id: ProfileId) -> Result<ProfileRecord> {
        if self.find(id).is_none() {
            return Err(ProfileError::ProfileNotFound(id));
        }
        for profile in self.profiles.iter_mut() {
            profile.active = false;
        }
        let record = self.find_mut(id)?;
        record.active = true;
        let activated = record.clone();
        self.dirty = true;
        Ok(activated)
    }

    pub fn active(&self) -> Option<&ProfileRecord> {
        self.profiles.iter().find(|p| p.active && !p.internal)
    }

    pub fn set_sync(&mut self, id: ProfileId, enabled: bool) -> Result<()> {
        let record = self.find_mut(id)?;
        if record.sync_enabled != enabled {
            record.sync_enabled = enabled;
            self.dirty = true;
        }
        Ok(())
    }

    /* Flushes if dirty and releases, surfacing a write failure to the caller. */
    pub fn release(mut self) -> Result<()> {
        self.flush()
    }

    /*
     * Persists pending changes but keeps the critical section, so the caller can
     * publish what it wrote before anyone else sees the list.
     */
    pub fn commit(&mut self) -> Result<()> {
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.dirty = false;
        ProfileStore::write_list(self.list_path, &self.profiles)
    }
}

impl Drop for StoreHandle<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!(
                "StoreHandle: Failed to persist profile list to {:?}: {}",
                self.list_path,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    fn new_store() -> (TempDir, ProfileStore) {
        let dir = tempdir().expect("Failed to create temp dir for test");
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        (dir, store)
    }

    #[test]
    fn test_acquire_on_missing_file_yields_empty_list() {
        let (_dir, store) = new_store();
        let handle = store.acquire().unwrap();
        assert!(handle.profiles().is_empty());
        assert!(!handle.is_dirty());
    }

    #[test]
    fn test_acquire_on_blank_file_yields_empty_list() {
        let (_dir, store) = new_store();
        fs::write(store.list_path(), "  \n").unwrap();
        assert!(store.acquire().unwrap().profiles().is_empty());
    }

    #[test]
    fn test_acquire_on_corrupt_file_is_an_error_and_releases() {
        let (_dir, store) = new_store();
        fs::write(store.list_path(), "{ not json").unwrap();

        assert!(matches!(store.acquire(), Err(ProfileError::Serde(_))));

        fs::write(store.list_path(), "").unwrap();
        assert!(store.acquire().is_ok());
    }

    #[test]
    fn test_create_twice_probes_free_name() {
        // Arrange
        let (_dir, store) = new_store();

        // Act
        let (first, second) = {
            let mut handle = store.acquire().unwrap();
            let first = handle.create("New Profile").unwrap();
            let second = handle.create("New Profile").unwrap();
            (first, second)
        };

        // Assert
        assert_eq!(first.name, "New Profile");
        assert_eq!(second.name, "New Profile (1)");
        assert_ne!(first.id, second.id);
        assert!(!first.active && !first.internal);

        let persisted = store.read_persisted().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[1].name, "New Profile (1)");
    }

    #[test]
    fn test_repeated_creates_never_duplicate_names() {
        let (_dir, store) = new_store();
        for _ in 0..8 {
            let mut handle = store.acquire().unwrap();
            let existing: Vec<String> = handle.profiles().iter().map(|p| p.name.clone()).collect();
            let created = handle.create("Imported Profile").unwrap();
            assert!(!existing.contains(&created.name));
        }
        let handle = store.acquire().unwrap();
        let mut names: Vec<&str> = handle.profiles().iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_clone_name_is_numbered() {
        let (_dir, store) = new_store();
        let mut handle = store.acquire().unwrap();
        handle.create("Main").unwrap();
        let clone = handle.create_clone_of("Main").unwrap();
        let clone_again = handle.create_clone_of("Main").unwrap();
        assert_eq!(clone.name, "Main (1)");
        assert_eq!(clone_again.name, "Main (2)");
    }

    #[test]
    fn test_scenario_create_delete_switch() {
        let (_dir, store) = new_store();
        let (first, second) = {
            let mut handle = store.acquire().unwrap();
            (
                handle.create("New Profile").unwrap(),
                handle.create("New Profile").unwrap(),
            )
        };
        assert_eq!(second.name, "New Profile (1)");

        {
            let mut handle = store.acquire().unwrap();
            handle.remove(first.id).unwrap();
        }
        {
            let mut handle = store.acquire().unwrap();
            assert_eq!(handle.profiles().len(), 1);
            assert_eq!(handle.profiles()[0].name, "New Profile (1)");
            handle.set_active(second.id).unwrap();
        }

        let handle = store.acquire().unwrap();
        let active: Vec<_> = handle.profiles().iter().filter(|p| p.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[test]
    fn test_set_active_keeps_single_active_flag() {
        let (_dir, store) = new_store();
        let ids: Vec<ProfileId> = {
            let mut handle = store.acquire().unwrap();
            (0..4).map(|_| handle.create("P").unwrap().id).collect()
        };
        for id in ids.iter().chain(ids.iter().rev()) {
            let mut handle = store.acquire().unwrap();
            handle.set_active(*id).unwrap();
        }
        let handle = store.acquire().unwrap();
        let active: Vec<_> = handle.profiles().iter().filter(|p| p.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, ids[0]);
        assert_eq!(handle.active().map(|p| p.id), Some(ids[0]));
    }

    #[test]
    fn test_set_active_on_missing_id_leaves_flags_alone() {
        let (_dir, store) = new_store();
        let mut handle = store.acquire().unwrap();
        let a = handle.create("A").unwrap();
        handle.set_active(a.id).unwrap();

        let result = handle.set_active(ProfileId(12345));

        assert!(matches!(result, Err(ProfileError::ProfileNotFound(_))));
        assert!(handle.find(a.id).unwrap().active);
    }

    #[test]
    fn test_rename_returns_previous_and_allows_collisions() {
        let (_dir, store) = new_store();
        let mut handle = store.acquire().unwrap();
        let a = handle.create("Alpha").unwrap();
        handle.create("Beta").unwrap();

        let previous = handle.rename(a.id, " Be/ta ").unwrap();

        assert_eq!(previous.name, "Alpha");
        assert_eq!(handle.find(a.id).unwrap().name, "Beta");
        assert!(handle.is_dirty());
    }

    #[test]
    fn test_rename_to_empty_name_is_rejected() {
        let (_dir, store) = new_store();
        let mut handle = store.acquire().unwrap();
        let a = handle.create("Alpha").unwrap();
        assert!(matches!(
            handle.rename(a.id, " :: "),
            Err(ProfileError::InvalidProfileName(_))
        ));
        assert_eq!(handle.find(a.id).unwrap().name, "Alpha");
    }

    #[test]
    fn test_remove_refuses_sync_enabled_record() {
        let (_dir, store) = new_store();
        let mut handle = store.acquire().unwrap();
        let a = handle.create("Synced").unwrap();
        handle.set_sync(a.id, true).unwrap();

        assert!(matches!(
            handle.remove(a.id),
            Err(ProfileError::SyncStillEnabled(id)) if id == a.id
        ));
        assert!(handle.find(a.id).is_some());

        handle.set_sync(a.id, false).unwrap();
        assert_eq!(handle.remove(a.id).unwrap().id, a.id);
        assert!(matches!(
            handle.remove(a.id),
            Err(ProfileError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_reorder_persists_and_reloads_in_exact_order() {
        // Arrange
        let (_dir, store) = new_store();
        let (internal, ids) = {
            let mut handle = store.acquire().unwrap();
            let internal = handle.create_internal("$internal");
            let ids: Vec<ProfileId> = ["A", "B", "C"]
                .iter()
                .map(|n| handle.create(n).unwrap().id)
                .collect();
            (internal, ids)
        };

        // Act
        let rendered = vec![ids[2], ids[0], ids[1]];
        {
            let mut handle = store.acquire().unwrap();
            handle.reorder(&rendered);
            handle.release().unwrap();
        }

        // Assert
        let handle = store.acquire().unwrap();
        let order: Vec<ProfileId> = handle.profiles().iter().map(|p| p.id).collect();
        assert_eq!(order, vec![internal.id, ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_acquire_rereads_changes_made_by_another_instance() {
        let (_dir, store) = new_store();
        {
            let mut handle = store.acquire().unwrap();
            handle.create("Local").unwrap();
        }

        // Another instance rewrites the list behind our back.
        let other = ProfileStore::new(store.list_path().to_path_buf());
        {
            let mut handle = other.acquire().unwrap();
            handle.create("Remote").unwrap();
        }

        let handle = store.acquire().unwrap();
        let names: Vec<&str> = handle.profiles().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Local", "Remote"]);
    }

    #[test]
    fn test_clean_handle_does_not_write() {
        let (_dir, store) = new_store();
        {
            let handle = store.acquire().unwrap();
            assert!(handle.find_by_name("x").is_none());
        }
        assert!(!store.list_path().exists());
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let (dir, store) = new_store();
        {
            let mut handle = store.acquire().unwrap();
            handle.create("A").unwrap();
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_commit_persists_while_handle_is_still_held() {
        let (_dir, store) = new_store();
        let mut handle = store.acquire().unwrap();
        let created = handle.create("Committed").unwrap();

        handle.commit().unwrap();

        assert!(!handle.is_dirty());
        let on_disk = store.read_persisted().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, created.id);
    }

    #[test]
    fn test_panic_inside_critical_section_still_flushes_and_releases() {
        crate::initialize_logging();
        let (_dir, store) = new_store();
        let store = Arc::new(store);

        let worker_store = Arc::clone(&store);
        let result = thread::spawn(move || {
            let mut handle = worker_store.acquire().unwrap();
            handle.create("Before Panic").unwrap();
            panic!("task failed inside the critical section");
        })
        .join();
        assert!(result.is_err());

        let handle = store.acquire().unwrap();
        assert_eq!(handle.profiles().len(), 1);
        assert_eq!(handle.profiles()[0].name, "Before Panic");
    }

    #[test]
    fn test_critical_sections_never_interleave() {
        let (_dir, store) = new_store();
        let store = Arc::new(store);
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let mut handle = store.acquire().unwrap();
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        handle.create("Worker").unwrap();
                        thread::sleep(Duration::from_millis(1));
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        let handle = store.acquire().unwrap();
        assert_eq!(handle.profiles().len(), 20);
        assert!(handle.is_at_capacity());
    }

    #[test]
    fn test_concurrent_switches_leave_exactly_one_active() {
        let (_dir, store) = new_store();
        let (a, b) = {
            let mut handle = store.acquire().unwrap();
            (handle.create("A").unwrap(), handle.create("B").unwrap())
        };
        let store = Arc::new(store);

        let switchers: Vec<_> = [a.id, b.id]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let mut handle = store.acquire().unwrap();
                        handle.set_active(id).unwrap();
                    }
                })
            })
            .collect();
        for s in switchers {
            s.join().unwrap();
        }

        let handle = store.acquire().unwrap();
        let active: Vec<_> = handle.profiles().iter().filter(|p| p.active).collect();
        assert_eq!(active.len(), 1);
        assert!(active[0].id == a.id || active[0].id == b.id);
    }

    #[test]
    fn test_credential_is_persisted_byte_for_byte() {
        let (_dir, store) = new_store();
        let bytes = vec![0u8, 255, 17, 3, 128];
        let id = {
            let mut handle = store.acquire().unwrap();
            let id = handle.create("Secret").unwrap().id;
            handle.set_credential(id, bytes.clone()).unwrap();
            id
        };
        let handle = store.acquire().unwrap();
        assert_eq!(handle.find(id).unwrap().credential, bytes);
    }
}
