/*
 * Notifications exchanged between the profile core and the rest of the
 * application. `ProfileChanged` is produced here after a switch has loaded the new
 * configuration; the remaining events come from outside (remote sync, account
 * session) and are consumed by the profile list presenter.
 *
 * The bus fans each event out to every subscriber over a channel, so a publisher
 * on a worker thread never calls into presentation code directly. A subscriber
 * may also hand in its own delivery function, which lets it merge events into a
 * queue it already drains, keeping one arrival order for everything it receives.
 */
use super::models::ProfileId;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    ProfileChanged { id: ProfileId },
    RemoteProfilesChanged,
    SessionOpened,
    SessionClosed,
}

/* Returns `false` once the subscriber has gone away. */
type Deliver = Box<dyn Fn(ProfileEvent) -> bool + Send>;

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Deliver>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe(&self) -> Receiver<ProfileEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribe_with(move |event| tx.send(event).is_ok());
        rx
    }

    pub fn subscribe_with<F>(&self, deliver: F)
    where
        F: Fn(ProfileEvent) -> bool + Send + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(deliver));
    }

    /* Delivers to every live subscriber and forgets the ones that hung up. */
    pub fn publish(&self, event: ProfileEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log::debug!(
            "EventBus: Publishing {:?} to {} subscribers.",
            event,
            subscribers.len()
        );
        subscribers.retain(|deliver| deliver(event.clone()));
    }
}
