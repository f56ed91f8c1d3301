/*
 * This module consolidates the core, platform-agnostic logic of the application:
 * the profile records and their persisted list (`ProfileStore` with its scoped
 * `StoreHandle`), the controller that owns the active profile's configuration
 * (`ActiveConfigOperations`), the remote mirror abstraction, the notification bus,
 * and the worker pool that runs profile operations off the presentation thread.
 * It re-exports the items the presenter and the binary need.
 */
pub mod active_config;
pub mod checksum_utils;
pub mod config;
pub mod events;
pub mod models;
pub mod path_utils;
pub mod profile_store;
pub mod profiles;
pub mod remote_mirror;
pub mod task_runner;

// Re-export key structures
pub use models::{MAX_PROFILES, ProfileId, ProfileRecord};

// Re-export profile related items
pub use profiles::{
    IMPORTED_PROFILE_BASE_NAME, NEW_PROFILE_BASE_NAME, ProfileError, validate_profile_name,
};
pub use profile_store::{ProfileStore, StoreHandle};

// Re-export config related items
pub use config::{ConfigError, ConfigManagerOperations, CoreConfigManager};
pub use path_utils::AppPaths;

pub use active_config::{ActiveConfigController, ActiveConfigOperations};
pub use events::{EventBus, ProfileEvent};
pub use remote_mirror::{DirectoryMirror, RemoteMirror};
pub use task_runner::{DEFAULT_WORKER_THREADS, TaskRunner};
