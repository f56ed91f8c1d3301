/*
 * This module provides the application logic layer, centered around
 * `ProfileListPresenter`, which turns user intents into profile tasks and task
 * results into render commands. `ProfileListUiState` holds the transient state of
 * the rendered list. Unit tests for the presenter are in `handler_tests.rs`.
 */
pub mod handler;
pub mod profile_list_ui_state;
pub mod ui_types;


pub use handler::ProfileListPresenter;
pub use profile_list_ui_state::{ProfileCardView, ProfileListUiState, ProfileListView};
pub use ui_types::{MessageSeverity, UiEvent, UiEventHandler, ViewCommand};
