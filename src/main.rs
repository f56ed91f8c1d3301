// src/main.rs

use profile_keeper::app_logic::{
    MessageSeverity, ProfileCardView, ProfileListPresenter, ProfileListView, UiEvent,
    UiEventHandler, ViewCommand,
};
use profile_keeper::core::{
    ActiveConfigController, ActiveConfigOperations, AppPaths, ConfigManagerOperations,
    CoreConfigManager, DirectoryMirror, EventBus, ProfileError, ProfileEvent, ProfileStore,
    RemoteMirror, TaskRunner, path_utils,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const APP_NAME: &str = "ProfileKeeper";
const HOME_ENV_VAR: &str = "PROFILE_KEEPER_HOME";

const USAGE: &str = "\
usage: profile_keeper <command>
  list
  create
  switch <name>
  rename <old> <new>
  delete <name>
  clone <name>
  export <name> <file>
  import <file>
  reorder <name>...
  sync <name> on|off";

fn resolve_paths() -> Result<AppPaths, ProfileError> {
    if let Some(home) = std::env::var_os(HOME_ENV_VAR) {
        return Ok(AppPaths::new(PathBuf::from(home)));
    }
    path_utils::get_base_app_config_local_dir(APP_NAME)
        .map(AppPaths::new)
        .ok_or(ProfileError::NoDataDirectory)
}

fn find_card<'a>(view: &'a ProfileListView, name: &str) -> Result<&'a ProfileCardView, String> {
    view.cards
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| format!("No profile named '{name}'."))
}

fn nth_arg(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| USAGE.to_string())
}

/* Translates the command line into the intent the panel would have sent. */
fn parse_intent(args: &[String], view: &ProfileListView) -> Result<Option<UiEvent>, String> {
    let arg = |i: usize| nth_arg(args, i);
    let command = args.first().map(String::as_str).unwrap_or("list");
    let event = match command {
        "list" => None,
        "create" => Some(UiEvent::CreateClicked),
        "switch" => Some(UiEvent::ActivateClicked {
            id: find_card(view, arg(1)?)?.id,
        }),
        "rename" => Some(UiEvent::RenameCommitted {
            id: find_card(view, arg(1)?)?.id,
            name: arg(2)?.to_string(),
            credential: None,
        }),
        "delete" => {
            let card = find_card(view, arg(1)?)?;
            if !card.can_delete {
                return Err(format!("'{}' is the active profile and cannot be deleted.", card.name));
            }
            Some(UiEvent::DeleteConfirmed { id: card.id })
        }
        "clone" => Some(UiEvent::CloneClicked {
            id: find_card(view, arg(1)?)?.id,
        }),
        "export" => Some(UiEvent::ExportChosen {
            id: find_card(view, arg(1)?)?.id,
            destination: PathBuf::from(arg(2)?),
        }),
        "import" => Some(UiEvent::ImportChosen {
            source: PathBuf::from(arg(1)?),
        }),
        "reorder" => {
            let mut rendered_order = Vec::new();
            for name in &args[1..] {
                rendered_order.push(find_card(view, name)?.id);
            }
            // Cards not named keep their relative order behind the named ones.
            for card in &view.cards {
                if !rendered_order.contains(&card.id) {
                    rendered_order.push(card.id);
                }
            }
            Some(UiEvent::CardDragged { rendered_order })
        }
        "sync" => {
            let id = find_card(view, arg(1)?)?.id;
            let enabled = match arg(2)? {
                "on" => true,
                "off" => false,
                _ => return Err(USAGE.to_string()),
            };
            Some(UiEvent::SyncToggled { id, enabled })
        }
        _ => return Err(USAGE.to_string()),
    };
    if matches!(
        event,
        Some(UiEvent::CreateClicked | UiEvent::ImportChosen { .. } | UiEvent::CloneClicked { .. })
    ) && !view.can_create
    {
        return Err("The profile limit is reached.".to_string());
    }
    Ok(event)
}

/* Applies view commands the way a panel would. */
fn apply(commands: Vec<ViewCommand>, view: &mut ProfileListView) {
    for command in commands {
        match command {
            ViewCommand::RenderProfileList(rendered) => *view = rendered,
            ViewCommand::ClearProfileList => *view = ProfileListView::default(),
            ViewCommand::ShowNotice { severity, text } => match severity {
                MessageSeverity::Information => println!("{text}"),
                MessageSeverity::Warning => eprintln!("warning: {text}"),
                MessageSeverity::Error => eprintln!("error: {text}"),
            },
        }
    }
}

fn print_list(view: &ProfileListView) {
    for card in &view.cards {
        let marker = if card.active { '*' } else { ' ' };
        let sync = if card.sync_enabled { " [sync]" } else { "" };
        println!("{marker} {}{sync}", card.name);
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let paths = resolve_paths().map_err(|e| e.to_string())?;
    paths.ensure_dirs().map_err(|e| e.to_string())?;
    log::debug!("Main: Using data root {:?}", paths.root);

    let store = Arc::new(ProfileStore::open(&paths));
    let events = Arc::new(EventBus::new());
    let mirror: Arc<dyn RemoteMirror> =
        Arc::new(DirectoryMirror::new(paths.mirror_dir(), paths.payload_dir()));
    let controller = Arc::new(ActiveConfigController::new(
        paths.clone(),
        mirror,
        Arc::clone(&events),
    ));
    controller
        .restore_from_store(&store)
        .map_err(|e| e.to_string())?;
    let config_manager: Arc<dyn ConfigManagerOperations> =
        Arc::new(CoreConfigManager::new(paths.root.clone()));
    let runner = Arc::new(TaskRunner::default());

    let mut presenter = ProfileListPresenter::new(
        Arc::clone(&store),
        Arc::clone(&controller) as Arc<dyn ActiveConfigOperations>,
        config_manager,
        Arc::clone(&runner),
        &events,
    );

    // The directory mirror is always reachable, so the session is open from the start.
    events.publish(ProfileEvent::SessionOpened);

    let mut view = ProfileListView::default();
    let commands = presenter.handle_event(UiEvent::PanelActivated);
    apply(commands, &mut view);
    apply(presenter.settle(), &mut view);

    if let Some(event) = parse_intent(args, &view)? {
        let commands = presenter.handle_event(event);
        apply(commands, &mut view);
        apply(presenter.settle(), &mut view);
    }

    if let Err(e) = controller.flush() {
        log::error!("Main: Failed to save active configuration: {e}");
    }
    print_list(&view);
    Ok(())
}

fn main() -> ExitCode {
    profile_keeper::initialize_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
