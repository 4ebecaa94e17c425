//! Owner of the single process-wide [`ClientSession`]

use parking_lot::Mutex;
use tracing::info;

use super::session::{ClientCallbacks, ClientSession};

type SessionFactory = Box<dyn Fn() -> ClientSession + Send + Sync>;

/// Holds at most one live [`ClientSession`].
///
/// Acquiring while a session is held rebinds its callbacks and hands back
/// the same instance. A session that was disconnected is replaced on the
/// next acquisition.
pub struct SessionSlot {
    factory: SessionFactory,
    current: Mutex<Option<ClientSession>>,
}

impl SessionSlot {
    pub fn new(factory: impl Fn() -> ClientSession + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            current: Mutex::new(None),
        }
    }

    pub fn acquire(&self, callbacks: ClientCallbacks) -> ClientSession {
        let mut current = self.current.lock();

        if let Some(session) = current.as_ref()
            && !session.is_disposed()
        {
            session.set_callbacks(callbacks);
            return session.clone();
        }

        info!("Creating client session");
        let session = (self.factory)();
        session.set_callbacks(callbacks);
        *current = Some(session.clone());
        session
    }

    /// The held session, if any.
    pub fn current(&self) -> Option<ClientSession> {
        self.current.lock().clone()
    }

    /// Disconnect and drop the held session.
    pub fn destroy(&self) {
        let session = self.current.lock().take();
        if let Some(session) = session {
            session.disconnect();
        }
    }
}
