use super::profile_list_ui_state::{ProfileListUiState, ProfileListView, SnapshotOutcome};
use super::ui_types::{MessageSeverity, UiEvent, UiEventHandler, ViewCommand};
use crate::core::profiles::Result;
use crate::core::{
    ActiveConfigOperations, ConfigManagerOperations, EventBus, IMPORTED_PROFILE_BASE_NAME,
    NEW_PROFILE_BASE_NAME, ProfileError, ProfileEvent, ProfileId, ProfileRecord, ProfileStore,
    StoreHandle, TaskRunner, validate_profile_name,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

/*
 * Everything that reaches the presentation thread. Profile notifications and task
 * results share one queue, so they are applied in the order they happened.
 */
#[derive(Debug)]
pub(crate) enum PanelMessage {
    Event(ProfileEvent),
    Snapshot(Vec<ProfileRecord>),
    Notice(MessageSeverity, String),
}

/*
 * Everything a worker task needs. Cloned into each task, so no task ever touches
 * presenter state; results travel back over `inbox`.
 */
#[derive(Clone)]
struct TaskContext {
    store: Arc<ProfileStore>,
    active_config: Arc<dyn ActiveConfigOperations>,
    inbox: Sender<PanelMessage>,
}

impl TaskContext {
    fn send(&self, message: PanelMessage) {
        if self.inbox.send(message).is_err() {
            log::debug!("ProfileListPresenter: Presenter is gone, dropping task outcome.");
        }
    }

    /*
     * Persists and queues the snapshot before the handle goes away. A switch needs
     * the handle to flip identities, so its `ProfileChanged` always queues behind
     * any snapshot taken earlier.
     */
    fn publish_snapshot(&self, mut handle: StoreHandle<'_>) -> Result<()> {
        handle.commit()?;
        self.send(PanelMessage::Snapshot(handle.snapshot()));
        Ok(())
    }

    fn notify(&self, severity: MessageSeverity, text: String) {
        self.send(PanelMessage::Notice(severity, text));
    }

    fn reload(&self) -> Result<()> {
        self.publish_snapshot(self.store.acquire()?)
    }

    /* A profile that vanished under a task is an expected race: reload instead of failing. */
    fn recover(&self, task_name: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(ProfileError::ProfileNotFound(id)) => {
                log::warn!(
                    "ProfileListPresenter: '{task_name}' found no profile {id}, reloading."
                );
                self.reload()
            }
            other => other,
        }
    }

    fn create_profile(&self, base_name: &str) -> Result<Option<ProfileRecord>> {
        let mut handle = self.store.acquire()?;
        if handle.is_at_capacity() {
            log::debug!("ProfileListPresenter: At capacity, not creating '{base_name}'.");
            self.publish_snapshot(handle)?;
            return Ok(None);
        }
        let record = handle.create(base_name)?;
        self.publish_snapshot(handle)?;
        log::info!("ProfileListPresenter: Created profile '{}'.", record.name);
        Ok(Some(record))
    }

    /*
     * The payload is moved before the record is renamed, so a failed move leaves
     * both untouched.
     */
    fn rename_profile(
        &self,
        id: ProfileId,
        requested_name: &str,
        credential: Option<Vec<u8>>,
    ) -> Result<()> {
        let name = match validate_profile_name(requested_name) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("ProfileListPresenter: Rejected rename of {id}: {e}");
                self.notify(MessageSeverity::Warning, e.to_string());
                return self.reload();
            }
        };

        let mut handle = self.store.acquire()?;
        let previous = handle
            .find(id)
            .cloned()
            .ok_or(ProfileError::ProfileNotFound(id))?;
        if previous.name != name {
            self.active_config.rename_payload(&previous, &name)?;
            handle.rename(id, &name)?;
            log::info!(
                "ProfileListPresenter: Renamed '{}' to '{}'.",
                previous.name,
                name
            );
        }
        if let Some(credential) = credential {
            handle.set_credential(id, credential)?;
        }
        self.publish_snapshot(handle)
    }

    /* Sync is switched off first; if the mirror refuses, nothing is deleted. */
    fn delete_profile(&self, id: ProfileId) -> Result<()> {
        let record = {
            let handle = self.store.acquire()?;
            handle
                .find(id)
                .cloned()
                .ok_or(ProfileError::ProfileNotFound(id))?
        };

        if record.sync_enabled {
            if let Err(e) = self.active_config.toggle_sync(&self.store, id, false) {
                self.notify(
                    MessageSeverity::Error,
                    format!(
                        "Could not stop syncing '{}', it was not deleted: {e}",
                        record.name
                    ),
                );
                self.reload()?;
                return Err(e);
            }
        }

        let mut handle = self.store.acquire()?;
        let removed = handle.remove(id)?;
        self.publish_snapshot(handle)?;
        if let Err(e) = self.active_config.delete_payload(&removed) {
            log::error!(
                "ProfileListPresenter: Failed to delete settings of '{}': {e}",
                removed.name
            );
        }
        log::info!("ProfileListPresenter: Deleted profile '{}'.", removed.name);
        Ok(())
    }

    fn reorder_profiles(&self, rendered_order: &[ProfileId]) -> Result<()> {
        let mut handle = self.store.acquire()?;
        handle.reorder(rendered_order);
        self.publish_snapshot(handle)
    }

    /* Identity flip under the handle, then the payload load without it. */
    fn switch_profile(&self, id: ProfileId) -> Result<()> {
        let record = self.active_config.switch_identity(&self.store, id)?;
        if let Err(e) = self.active_config.load_profile(&record) {
            self.notify(
                MessageSeverity::Error,
                format!("Failed to load settings of '{}': {e}", record.name),
            );
            self.reload()?;
            return Err(e);
        }
        Ok(())
    }

    fn clone_profile(&self, id: ProfileId) -> Result<()> {
        self.active_config.flush()?;

        let mut handle = self.store.acquire()?;
        if handle.is_at_capacity() {
            log::debug!("ProfileListPresenter: At capacity, not cloning {id}.");
            return self.publish_snapshot(handle);
        }
        let source = handle
            .find(id)
            .cloned()
            .ok_or(ProfileError::ProfileNotFound(id))?;
        let target = handle.create_clone_of(&source.name)?;
        self.publish_snapshot(handle)?;
        log::info!(
            "ProfileListPresenter: Cloned '{}' as '{}'.",
            source.name,
            target.name
        );

        match self.active_config.clone_payload(&source, &target) {
            Ok(true) => Ok(()),
            Ok(false) => {
                log::debug!(
                    "ProfileListPresenter: '{}' has no settings to clone.",
                    source.name
                );
                Ok(())
            }
            Err(e) => {
                self.notify(
                    MessageSeverity::Error,
                    format!("Failed to copy settings into '{}': {e}", target.name),
                );
                Err(e)
            }
        }
    }

    /* The new record is published before its payload is copied and is kept if the copy fails. */
    fn import_profile(&self, source: &Path) -> Result<()> {
        let Some(record) = self.create_profile(IMPORTED_PROFILE_BASE_NAME)? else {
            return Ok(());
        };
        if let Err(e) = self.active_config.import_payload(source, &record) {
            self.notify(
                MessageSeverity::Error,
                format!("Import into '{}' failed: {e}", record.name),
            );
            return Err(e);
        }
        self.notify(
            MessageSeverity::Information,
            format!("Imported {} as '{}'.", source.display(), record.name),
        );
        Ok(())
    }

    fn export_profile(&self, id: ProfileId, destination: &Path) -> Result<()> {
        let record = {
            let handle = self.store.acquire()?;
            handle
                .find(id)
                .cloned()
                .ok_or(ProfileError::ProfileNotFound(id))?
        };
        match self.active_config.export_payload(&record, destination) {
            Ok(written) => {
                log::info!("ProfileListPresenter: Exported '{}' to {written:?}.", record.name);
                self.notify(
                    MessageSeverity::Information,
                    format!("Exported '{}' to {}.", record.name, written.display()),
                );
                Ok(())
            }
            Err(ProfileError::MissingPayload(name)) => {
                self.notify(
                    MessageSeverity::Warning,
                    format!("Profile '{name}' has no settings to export."),
                );
                Ok(())
            }
            Err(e) => {
                self.notify(
                    MessageSeverity::Error,
                    format!("Export of '{}' failed: {e}", record.name),
                );
                Err(e)
            }
        }
    }

    fn toggle_sync(&self, id: ProfileId, enabled: bool) -> Result<()> {
        match self.active_config.toggle_sync(&self.store, id, enabled) {
            Ok(()) => self.reload(),
            Err(ProfileError::ProfileNotFound(id)) => Err(ProfileError::ProfileNotFound(id)),
            Err(e) => {
                self.notify(
                    MessageSeverity::Error,
                    format!("Could not change sync of profile {id}: {e}"),
                );
                self.reload()?;
                Err(e)
            }
        }
    }
}

/*
 * Presenter for the profile list panel. It runs on the presentation thread and
 * never blocks on I/O: every intent that touches the store becomes a task on the
 * `TaskRunner`. Task results (snapshots and notices) and profile notifications
 * arrive on one queue and are collected by `pump`, reconciled against the transient card state and turned
 * into `ViewCommand`s.
 */
pub struct ProfileListPresenter {
    pub(crate) ui_state: ProfileListUiState,
    pub(crate) last_transfer_dir: Option<PathBuf>,
    context: TaskContext,
    runner: Arc<TaskRunner>,
    config_manager: Arc<dyn ConfigManagerOperations>,
    inbox: Receiver<PanelMessage>,
}

impl ProfileListPresenter {
    pub fn new(
        store: Arc<ProfileStore>,
        active_config: Arc<dyn ActiveConfigOperations>,
        config_manager: Arc<dyn ConfigManagerOperations>,
        runner: Arc<TaskRunner>,
        events: &EventBus,
    ) -> Self {
        let (sender, inbox) = mpsc::channel();
        let forward = sender.clone();
        events.subscribe_with(move |event| forward.send(PanelMessage::Event(event)).is_ok());
        let last_transfer_dir = match config_manager.load_last_transfer_dir() {
            Ok(dir) => dir,
            Err(e) => {
                log::warn!("ProfileListPresenter: Could not load last transfer directory: {e}");
                None
            }
        };
        ProfileListPresenter {
            ui_state: ProfileListUiState::new(),
            last_transfer_dir,
            context: TaskContext {
                store,
                active_config,
                inbox: sender,
            },
            runner,
            config_manager,
            inbox,
        }
    }

    /* Where an import/export file prompt should start. */
    pub fn last_transfer_dir(&self) -> Option<&Path> {
        self.last_transfer_dir.as_deref()
    }

    pub fn current_view(&self) -> Option<&ProfileListView> {
        self.ui_state.last_view.as_ref()
    }

    fn schedule<F>(&self, task_name: &'static str, task: F)
    where
        F: FnOnce(&TaskContext) -> Result<()> + Send + 'static,
    {
        let context = self.context.clone();
        self.runner.execute(task_name, move || {
            let result = task(&context);
            context.recover(task_name, result)
        });
    }

    fn schedule_reload(&self) {
        self.schedule("reload", |ctx| ctx.reload());
    }

    fn remember_transfer_dir(&mut self, file: &Path) {
        let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return;
        };
        if self.last_transfer_dir.as_deref() == Some(dir) {
            return;
        }
        if let Err(e) = self.config_manager.save_last_transfer_dir(Some(dir)) {
            log::warn!("ProfileListPresenter: Could not save last transfer directory: {e}");
        }
        self.last_transfer_dir = Some(dir.to_path_buf());
    }

    /*
     * Drains profile notifications and finished-task outcomes in arrival order.
     * Call it from the presentation thread whenever it is idle.
     */
    pub fn pump(&mut self) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            self.on_message(message, &mut commands);
        }
        commands
    }

    /*
     * Waits for the runner to go idle and pumps, repeating while pumping keeps
     * scheduling follow-up reloads. For drivers without an event loop.
     */
    pub fn settle(&mut self) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        loop {
            self.runner.wait_idle();
            let pumped = self.pump();
            let finished = pumped.is_empty() && self.runner.pending_tasks() == 0;
            commands.extend(pumped);
            if finished {
                return commands;
            }
        }
    }

    fn on_profile_event(&mut self, event: ProfileEvent, commands: &mut Vec<ViewCommand>) {
        match event {
            ProfileEvent::SessionOpened => self.ui_state.session_open = true,
            ProfileEvent::SessionClosed => self.ui_state.session_open = false,
            _ => {}
        }
        if !self.ui_state.panel_active {
            log::trace!("ProfileListPresenter: Panel inactive, ignoring {event:?}.");
            return;
        }
        match event {
            ProfileEvent::ProfileChanged { id } => {
                if self.ui_state.apply_active_change(id) {
                    if let Some(view) = self.ui_state.rerender() {
                        commands.push(ViewCommand::RenderProfileList(view));
                    }
                } else {
                    log::debug!("ProfileListPresenter: Active profile {id} not rendered, reloading.");
                    self.schedule_reload();
                }
            }
            ProfileEvent::RemoteProfilesChanged
            | ProfileEvent::SessionOpened
            | ProfileEvent::SessionClosed => self.schedule_reload(),
        }
    }

    fn on_message(&mut self, message: PanelMessage, commands: &mut Vec<ViewCommand>) {
        match message {
            PanelMessage::Event(event) => self.on_profile_event(event, commands),
            PanelMessage::Notice(severity, text) => {
                commands.push(ViewCommand::ShowNotice { severity, text });
            }
            PanelMessage::Snapshot(_) if !self.ui_state.panel_active => {
                log::trace!("ProfileListPresenter: Panel inactive, dropping snapshot.");
            }
            PanelMessage::Snapshot(snapshot) => match self.ui_state.apply_snapshot(snapshot) {
                SnapshotOutcome::Render(view) => {
                    commands.push(ViewCommand::RenderProfileList(view));
                }
                SnapshotOutcome::ReloadRequired => self.schedule_reload(),
            },
        }
    }

    fn at_capacity(&self, intent: &str) -> bool {
        let at_capacity = self.ui_state.is_at_capacity();
        if at_capacity {
            log::debug!("ProfileListPresenter: Ignoring {intent}, profile limit reached.");
        }
        at_capacity
    }
}

impl UiEventHandler for ProfileListPresenter {
    fn handle_event(&mut self, event: UiEvent) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        match event {
            UiEvent::PanelActivated => {
                log::debug!("ProfileListPresenter: Panel activated.");
                self.ui_state.panel_active = true;
                self.schedule_reload();
            }
            UiEvent::PanelDeactivated => {
                log::debug!("ProfileListPresenter: Panel deactivated.");
                self.ui_state.panel_active = false;
                self.ui_state.clear();
                commands.push(ViewCommand::ClearProfileList);
            }
            UiEvent::RefreshRequested => {
                if self.ui_state.panel_active {
                    self.schedule_reload();
                }
            }
            UiEvent::CreateClicked => {
                if !self.at_capacity("create") {
                    self.schedule("create", |ctx| {
                        ctx.create_profile(NEW_PROFILE_BASE_NAME).map(|_| ())
                    });
                }
            }
            UiEvent::ImportChosen { source } => {
                self.remember_transfer_dir(&source);
                if !self.at_capacity("import") {
                    self.schedule("import", move |ctx| ctx.import_profile(&source));
                }
            }
            UiEvent::ExportChosen { id, destination } => {
                self.remember_transfer_dir(&destination);
                self.schedule("export", move |ctx| ctx.export_profile(id, &destination));
            }
            UiEvent::CloneClicked { id } => {
                if !self.at_capacity("clone") {
                    self.schedule("clone", move |ctx| ctx.clone_profile(id));
                }
            }
            UiEvent::DeleteConfirmed { id } => {
                if self.ui_state.is_card_active(id) {
                    log::warn!("ProfileListPresenter: Refusing to delete the active profile {id}.");
                } else {
                    self.schedule("delete", move |ctx| ctx.delete_profile(id));
                }
            }
            UiEvent::RenameCommitted {
                id,
                name,
                credential,
            } => {
                self.schedule("rename", move |ctx| {
                    ctx.rename_profile(id, &name, credential)
                });
            }
            UiEvent::ActivateClicked { id } => {
                self.schedule("switch", move |ctx| ctx.switch_profile(id));
            }
            UiEvent::CardToggled { id } => {
                if self.ui_state.toggle_card(id) {
                    if let Some(view) = self.ui_state.rerender() {
                        commands.push(ViewCommand::RenderProfileList(view));
                    }
                }
            }
            UiEvent::SyncToggled { id, enabled } => {
                if self.ui_state.session_open {
                    self.schedule("sync", move |ctx| ctx.toggle_sync(id, enabled));
                } else {
                    log::debug!("ProfileListPresenter: No session, ignoring sync toggle.");
                }
            }
            UiEvent::CardDragged { rendered_order } => {
                self.schedule("reorder", move |ctx| ctx.reorder_profiles(&rendered_order));
            }
        }
        commands
    }
}
