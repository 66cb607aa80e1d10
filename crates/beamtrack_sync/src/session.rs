use std::sync::Arc;

use beamtrack_contract::UserId;
use tokio::sync::watch;
use tracing::info;

/// The signed-in user, shared by every view.
#[derive(Clone)]
pub struct Session {
    user: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Session {
    pub fn anonymous() -> Self {
        let (user, _) = watch::channel(None);
        Self {
            user: Arc::new(user),
        }
    }

    pub fn authenticated(user_id: UserId) -> Self {
        let session = Self::anonymous();
        session.authenticate(user_id);
        session
    }

    pub fn authenticate(&self, user_id: UserId) {
        self.user.send_if_modified(|current| {
            if *current == Some(user_id) {
                return false;
            }
            info!(user_id, "session authenticated");
            *current = Some(user_id);
            true
        });
    }

    pub fn invalidate(&self) {
        self.user.send_if_modified(|current| {
            if current.is_none() {
                return false;
            }
            info!("session invalidated");
            *current = None;
            true
        });
    }

    pub fn user_id(&self) -> Option<UserId> {
        *self.user.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.user.subscribe()
    }
}
