use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use quoteclip_core::identifiers::MediaId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The same user asked for the same clip again while it renders.
    #[error("duplicate interaction for {0}")]
    Duplicate(MediaId),
    /// The user is waiting on a different clip.
    #[error("you already have a render in progress")]
    InProgress(MediaId),
}

/// At most one render per user.
///
/// Entries are removed when the [`RenderPermit`] drops, which also happens
/// when the task holding it is aborted, so a cancelled render never leaves
/// its user locked out.
#[derive(Debug, Clone, Default)]
pub struct RenderRegistry {
    held: Arc<Mutex<HashMap<String, MediaId>>>,
}

impl RenderRegistry {
    pub fn new() -> RenderRegistry {
        RenderRegistry::default()
    }

    pub fn acquire(&self, user_id: &str, id: &MediaId) -> Result<RenderPermit, LockError> {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match held.get(user_id) {
            Some(current) if current == id => Err(LockError::Duplicate(id.clone())),
            Some(current) => Err(LockError::InProgress(current.clone())),
            None => {
                log::trace!("render lock taken by {} for {}", user_id, id);
                held.insert(user_id.to_owned(), id.clone());
                Ok(RenderPermit {
                    registry: self.clone(),
                    user_id: user_id.to_owned(),
                })
            }
        }
    }

    pub fn is_rendering(&self, user_id: &str) -> bool {
        self.held
            .lock()
            .map(|h| h.contains_key(user_id))
            .unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct RenderPermit {
    registry: RenderRegistry,
    user_id: String,
}

impl Drop for RenderPermit {
    fn drop(&mut self) {
        let mut held = self
            .registry
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = held.remove(&self.user_id) {
            log::trace!("render lock released by {} for {}", self.user_id, id);
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn id(s: &str) -> MediaId {
        MediaId::from_str(s).unwrap()
    }

    #[test]
    fn same_clip_is_duplicate() {
        let reg = RenderRegistry::new();
        let a = id("xfm-S01E01-1");
        let _permit = reg.acquire("42", &a).unwrap();
        assert_eq!(reg.acquire("42", &a).unwrap_err(), LockError::Duplicate(a));
    }

    #[test]
    fn other_clip_is_in_progress() {
        let reg = RenderRegistry::new();
        let a = id("xfm-S01E01-1");
        let b = id("xfm-S01E01-2");
        let _permit = reg.acquire("42", &a).unwrap();
        assert_eq!(
            reg.acquire("42", &b).unwrap_err(),
            LockError::InProgress(a.clone())
        );
        // other users are unaffected
        assert!(reg.acquire("7", &b).is_ok());
    }

    #[test]
    fn released_on_drop() {
        let reg = RenderRegistry::new();
        let a = id("xfm-S01E01-1");
        {
            let _permit = reg.acquire("42", &a).unwrap();
            assert!(reg.is_rendering("42"));
        }
        assert!(!reg.is_rendering("42"));
        assert!(reg.acquire("42", &a).is_ok());
    }

    #[tokio::test]
    async fn released_when_task_aborts() {
        let reg = RenderRegistry::new();
        let a = id("xfm-S01E01-1");
        let task = {
            let reg = reg.clone();
            let a = a.clone();
            tokio::spawn(async move {
                let _permit = reg.acquire("42", &a).unwrap();
                futures::future::pending::<()>().await;
            })
        };
        tokio::task::yield_now().await;
        task.abort();
        let _ = task.await;
        assert!(!reg.is_rendering("42"));
    }
}
