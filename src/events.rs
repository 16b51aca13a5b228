use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    AuthenticationChanged(bool),
    ProjectSaving,
    ProjectSaved,
    ProjectPublished { scene_id: String, scene_url: String },
}

/// Fan-out of client state changes to any number of listeners (UI state,
/// CLI output). Events are sent after the state they describe has changed
/// and before the call that changed it returns.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Returns false when nobody is listening, which is not an error.
    pub fn emit(&self, event: ClientEvent) -> bool {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                log::debug!("Emitted {:?} to {} listener(s)", event, receivers);
                true
            }
            Err(_) => {
                log::debug!("No listeners for {:?}", event);
                false
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
