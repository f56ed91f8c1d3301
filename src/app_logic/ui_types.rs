/*
 * The vocabulary between the profile list presenter and whatever renders it.
 * The renderer sends `UiEvent`s (user intents and panel lifecycle) and receives
 * `ViewCommand`s back. Neither side reaches into the other.
 */
use super::profile_list_ui_state::ProfileListView;
use crate::core::ProfileId;
use std::path::PathBuf;

// Defines the severity of a notice shown to the user.
// Ordered from least to most severe for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageSeverity {
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    PanelActivated,
    PanelDeactivated,
    RefreshRequested,
    CreateClicked,
    ImportChosen {
        source: PathBuf,
    },
    ExportChosen {
        id: ProfileId,
        destination: PathBuf,
    },
    CloneClicked {
        id: ProfileId,
    },
    DeleteConfirmed {
        id: ProfileId,
    },
    RenameCommitted {
        id: ProfileId,
        name: String,
        credential: Option<Vec<u8>>,
    },
    ActivateClicked {
        id: ProfileId,
    },
    CardToggled {
        id: ProfileId,
    },
    SyncToggled {
        id: ProfileId,
        enabled: bool,
    },
    // The full order of cards as rendered right after the drop.
    CardDragged {
        rendered_order: Vec<ProfileId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    RenderProfileList(ProfileListView),
    ClearProfileList,
    ShowNotice {
        severity: MessageSeverity,
        text: String,
    },
}

/*
 * Implemented by the presenter. The renderer calls `handle_event` for every
 * intent and applies the returned commands in order.
 */
pub trait UiEventHandler {
    fn handle_event(&mut self, event: UiEvent) -> Vec<ViewCommand>;
}
