use crate::session::SessionController;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The interview session driven through the control surface
    pub session: Arc<Mutex<SessionController>>,

    /// Interview loaded on the first start request
    pub slug: Arc<String>,
}

impl AppState {
    /// Wrap a controller and spawn the task feeding its device events back into it
    ///
    /// The pump holds only a weak reference; abort the returned handle on shutdown.
    pub fn new(mut controller: SessionController, slug: impl Into<String>) -> (Self, JoinHandle<()>) {
        let events = controller.take_event_receiver();
        let session = Arc::new(Mutex::new(controller));

        let pump = tokio::spawn(pump_events(Arc::downgrade(&session), events));

        (
            Self {
                session,
                slug: Arc::new(slug.into()),
            },
            pump,
        )
    }
}

async fn pump_events(
    session: Weak<Mutex<SessionController>>,
    events: Option<crate::media::EventReceiver>,
) {
    let Some(mut events) = events else {
        return;
    };

    while let Some(event) = events.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        session.lock().await.handle_event(event);
    }

    debug!("Device event pump stopped");
}
