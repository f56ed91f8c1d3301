/*
 * This module defines the transient, presentation-only state of the profile list
 * and the render model derived from it.
 *
 * Profile identity comes from store snapshots; transient flags (currently only
 * "expanded") live in a map keyed by `ProfileId` and are merged with a snapshot at
 * render time by `reconcile`. Positions are never used to correlate a card with
 * its record, because a remote change can insert, remove or reorder records
 * between any two snapshots.
 */
use crate::core::models::{self, ProfileId, ProfileRecord};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardUiState {
    pub expanded: bool,
}

/* One rendered profile card together with the affordances it offers. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCardView {
    pub id: ProfileId,
    pub name: String,
    pub active: bool,
    pub expanded: bool,
    pub can_activate: bool,
    pub can_delete: bool,
    pub can_clone: bool,
    pub sync_available: bool,
    pub sync_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileListView {
    pub cards: Vec<ProfileCardView>,
    pub can_create: bool,
    pub can_import: bool,
}

impl ProfileListView {
    pub fn active_id(&self) -> Option<ProfileId> {
        self.cards.iter().find(|c| c.active).map(|c| c.id)
    }

    pub fn card(&self, id: ProfileId) -> Option<&ProfileCardView> {
        self.cards.iter().find(|c| c.id == id)
    }
}

#[derive(Debug)]
pub struct Reconciliation {
    pub view: ProfileListView,
    pub card_states: HashMap<ProfileId, CardUiState>,
    /* True when visible records exist but none of them is active. */
    pub active_missing: bool,
}

fn card_view(
    record: &ProfileRecord,
    state: CardUiState,
    at_capacity: bool,
    session_open: bool,
) -> ProfileCardView {
    ProfileCardView {
        id: record.id,
        name: record.name.clone(),
        active: record.active,
        expanded: state.expanded,
        can_activate: state.expanded && !record.active,
        can_delete: !record.active,
        can_clone: !at_capacity,
        sync_available: session_open,
        sync_enabled: record.sync_enabled,
    }
}

/*
 * Merges a fresh snapshot with the previous transient state.
 *
 * Internal records are skipped. Each visible record picks up its previous state by
 * id, or the default (collapsed) when it is new. States of records no longer in
 * the snapshot are dropped. Cards come out strictly in snapshot order.
 */
pub fn reconcile(
    previous: &HashMap<ProfileId, CardUiState>,
    snapshot: &[ProfileRecord],
    session_open: bool,
) -> Reconciliation {
    let at_capacity = models::is_at_capacity(snapshot);
    let mut card_states = HashMap::new();
    let mut cards = Vec::new();

    for record in snapshot.iter().filter(|r| !r.internal) {
        let state = previous.get(&record.id).copied().unwrap_or_default();
        card_states.insert(record.id, state);
        cards.push(card_view(record, state, at_capacity, session_open));
    }

    let active_missing = !cards.is_empty() && !cards.iter().any(|c| c.active);
    Reconciliation {
        view: ProfileListView {
            cards,
            can_create: !at_capacity,
            can_import: !at_capacity,
        },
        card_states,
        active_missing,
    }
}

/* What the presenter should do after feeding a snapshot in. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Render(ProfileListView),
    ReloadRequired,
}

/*
 * Holds the profile list panel's UI state between snapshots: the id-keyed
 * transient card states, the last rendered view, and the flags that gate which
 * affordances are offered.
 */
#[derive(Debug, Default)]
pub struct ProfileListUiState {
    pub card_states: HashMap<ProfileId, CardUiState>,
    pub last_snapshot: Vec<ProfileRecord>,
    pub last_view: Option<ProfileListView>,
    pub panel_active: bool,
    pub session_open: bool,
    /* Set after one follow-up reload was spent on a snapshot without an active record. */
    pub active_reload_pending: bool,
}

impl ProfileListUiState {
    pub fn new() -> Self {
        log::debug!("ProfileListUiState::new called");
        ProfileListUiState::default()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.last_view.as_ref().is_some_and(|v| !v.can_create)
    }

    pub fn is_card_active(&self, id: ProfileId) -> bool {
        self.last_view
            .as_ref()
            .and_then(|v| v.card(id))
            .is_some_and(|c| c.active)
    }

    /*
     * A snapshot without an active record gets one follow-up reload. If the next
     * snapshot still has none, it is rendered as is.
     */
    pub fn apply_snapshot(&mut self, snapshot: Vec<ProfileRecord>) -> SnapshotOutcome {
        let reconciliation = reconcile(&self.card_states, &snapshot, self.session_open);
        if reconciliation.active_missing {
            if !self.active_reload_pending {
                log::debug!("ProfileListUiState: No active profile in snapshot, reloading.");
                self.active_reload_pending = true;
                return SnapshotOutcome::ReloadRequired;
            }
            log::warn!("ProfileListUiState: Still no active profile after reload, rendering anyway.");
        }
        self.active_reload_pending = false;
        self.card_states = reconciliation.card_states;
        self.last_snapshot = snapshot;
        self.last_view = Some(reconciliation.view.clone());
        SnapshotOutcome::Render(reconciliation.view)
    }

    /* Re-derives the view from the last snapshot, e.g. after a card toggle. */
    pub fn rerender(&mut self) -> Option<ProfileListView> {
        self.last_view.as_ref()?;
        let reconciliation = reconcile(&self.card_states, &self.last_snapshot, self.session_open);
        self.last_view = Some(reconciliation.view.clone());
        Some(reconciliation.view)
    }

    /* Returns false for an unknown card. */
    pub fn toggle_card(&mut self, id: ProfileId) -> bool {
        match self.card_states.get_mut(&id) {
            Some(state) => {
                state.expanded = !state.expanded;
                true
            }
            None => false,
        }
    }

    /*
     * Flips active flags in place for a profile switch announced from elsewhere.
     * Returns false when the newly active profile is not among the cards.
     */
    pub fn apply_active_change(&mut self, id: ProfileId) -> bool {
        if !self
            .last_snapshot
            .iter()
            .any(|r| r.id == id && !r.internal)
        {
            return false;
        }
        for record in self.last_snapshot.iter_mut().filter(|r| !r.internal) {
            record.active = record.id == id;
        }
        true
    }

    /* Drops everything tied to a rendered list. Session state survives. */
    pub fn clear(&mut self) {
        self.card_states.clear();
        self.last_snapshot.clear();
        self.last_view = None;
        self.active_reload_pending = false;
    }
}
