use std::sync::{Arc, RwLock};

/// Holder for the bearer token attached to course service requests.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: String);
    fn clear(&self);
}

/// Process-local token store.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token.into());
        store
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self) -> Option<String> {
        // A poisoned lock still holds a valid Option<String>.
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, token: String) {
        let token = token.trim().to_string();
        let value = (!token.is_empty()).then_some(token);
        match self.token.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn clear(&self) {
        match self.token.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let store = InMemoryTokenStore::new();
        assert_eq!(store.get(), None);
        store.set("abc".into());
        assert_eq!(store.get().as_deref(), Some("abc"));
        store.clear();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn blank_token_is_treated_as_logged_out() {
        let store = InMemoryTokenStore::with_token("abc");
        store.set("   ".into());
        assert_eq!(store.get(), None);
    }

    #[test]
    fn clones_share_the_token() {
        let store = InMemoryTokenStore::new();
        let other = store.clone();
        store.set("shared".into());
        assert_eq!(other.get().as_deref(), Some("shared"));
    }
}
