//! Request-scoped user binding.
//!
//! Once a request is authenticated its principal is bound under a request
//! ID, and downstream code looks it up by that ID instead of re-reading
//! credentials. Bindings have no TTL: they must be removed when the request
//! finishes, which [`BindingGuard`] does on drop.
//!
//! The HTTP middleware binds under a server-generated
//! [`BindingKey`](crate::middleware::BindingKey), never under the
//! client-supplied `X-Request-Id`.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheKey;
use crate::session::{REQUEST_BINDING_NAMESPACE, SessionCache};
use crate::types::User;

/// Binds principals to in-flight requests.
#[derive(Debug, Clone)]
pub struct RequestBindings {
    cache: Arc<SessionCache>,
}

impl RequestBindings {
    /// Creates bindings stored in the shared session cache.
    pub fn new(cache: Arc<SessionCache>) -> Self {
        Self { cache }
    }

    /// Binds `principal` to `request_id`, replacing any previous binding.
    pub fn bind_current_user(&self, request_id: &str, principal: Arc<User>) {
        self.cache
            .set_shared(REQUEST_BINDING_NAMESPACE, request_id, principal, Duration::ZERO);
    }

    /// Returns the principal bound to `request_id`, if any.
    pub fn current_user(&self, request_id: &str) -> Option<Arc<User>> {
        self.cache.get(REQUEST_BINDING_NAMESPACE, request_id)
    }

    /// Removes the binding of `request_id`. Unbound IDs are ignored.
    pub fn unbind_current_user(&self, request_id: &str) {
        self.cache.delete(REQUEST_BINDING_NAMESPACE, request_id);
    }

    /// Removes the binding of `request_id` only if it is still `principal`.
    ///
    /// Returns `false` when the ID was rebound to another principal value
    /// in the meantime; that binding is left in place.
    pub fn unbind_if_same(&self, request_id: &str, principal: &Arc<User>) -> bool {
        self.cache
            .delete_if_same(&CacheKey::new(REQUEST_BINDING_NAMESPACE, request_id), principal)
    }

    /// Binds `principal` to `request_id` until the returned guard is dropped.
    ///
    /// The guard unbinds on every exit path of its owner: normal return,
    /// early return, panic unwinding and cancellation of the owning future.
    #[must_use = "the binding is removed as soon as the guard is dropped"]
    pub fn bind_scoped(&self, request_id: impl Into<String>, principal: Arc<User>) -> BindingGuard {
        let request_id = request_id.into();
        self.bind_current_user(&request_id, Arc::clone(&principal));
        BindingGuard {
            bindings: self.clone(),
            request_id,
            principal,
        }
    }
}

/// Removes a request binding when dropped.
#[derive(Debug)]
pub struct BindingGuard {
    bindings: RequestBindings,
    request_id: String,
    principal: Arc<User>,
}

impl BindingGuard {
    /// Request ID the principal is bound to.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The bound principal.
    pub fn principal(&self) -> &Arc<User> {
        &self.principal
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        if self.bindings.unbind_if_same(&self.request_id, &self.principal) {
            tracing::trace!(request_id = %self.request_id, "Request binding removed");
        } else {
            tracing::warn!(request_id = %self.request_id, "Request binding was replaced before release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::test_user;

    fn bindings() -> RequestBindings {
        RequestBindings::new(Arc::new(SessionCache::new()))
    }

    #[test]
    fn test_bind_and_unbind() {
        let bindings = bindings();
        let user = Arc::new(test_user(1, "a@example.com"));

        bindings.bind_current_user("req-1", Arc::clone(&user));
        assert_eq!(bindings.current_user("req-1").map(|u| u.id), Some(1));

        bindings.unbind_current_user("req-1");
        assert!(bindings.current_user("req-1").is_none());

        // Unbinding twice is harmless
        bindings.unbind_current_user("req-1");
    }

    #[test]
    fn test_request_binding_isolation() {
        let bindings = bindings();
        bindings.bind_current_user("R1", Arc::new(test_user(1, "a@example.com")));
        bindings.bind_current_user("R2", Arc::new(test_user(2, "b@example.com")));

        assert_eq!(bindings.current_user("R1").map(|u| u.id), Some(1));
        assert_eq!(bindings.current_user("R2").map(|u| u.id), Some(2));

        bindings.unbind_current_user("R1");
        assert!(bindings.current_user("R1").is_none());
        assert_eq!(bindings.current_user("R2").map(|u| u.id), Some(2));
    }

    #[test]
    fn test_unbound_request_is_absent() {
        assert!(bindings().current_user("never-bound").is_none());
    }

    #[test]
    fn test_guard_unbinds_on_drop() {
        let bindings = bindings();
        {
            let guard = bindings.bind_scoped("req-1", Arc::new(test_user(1, "a@example.com")));
            assert_eq!(guard.request_id(), "req-1");
            assert_eq!(guard.principal().id, 1);
            assert!(bindings.current_user("req-1").is_some());
        }
        assert!(bindings.current_user("req-1").is_none());
    }

    #[test]
    fn test_guard_leaves_replacement_binding_alone() {
        let bindings = bindings();
        let alice = Arc::new(test_user(1, "a@example.com"));
        let bob = Arc::new(test_user(2, "b@example.com"));

        let alice_guard = bindings.bind_scoped("dup", Arc::clone(&alice));
        let bob_guard = bindings.bind_scoped("dup", Arc::clone(&bob));

        drop(alice_guard);
        assert_eq!(bindings.current_user("dup").map(|u| u.id), Some(2));

        drop(bob_guard);
        assert!(bindings.current_user("dup").is_none());
    }

    #[test]
    fn test_guard_unbinds_on_panic() {
        let bindings = bindings();
        let inner = bindings.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.bind_scoped("req-panic", Arc::new(test_user(1, "a@example.com")));
            assert!(inner.current_user("req-panic").is_some());
            panic!("handler failed");
        }));

        assert!(result.is_err());
        assert!(bindings.current_user("req-panic").is_none());
    }

    #[tokio::test]
    async fn test_guard_unbinds_when_future_dropped() {
        let bindings = bindings();
        let inner = bindings.clone();
        let (bound_tx, bound_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let _guard = inner.bind_scoped("req-cancel", Arc::new(test_user(1, "a@example.com")));
            let _ = bound_tx.send(());
            std::future::pending::<()>().await;
        });

        bound_rx.await.unwrap();
        assert!(bindings.current_user("req-cancel").is_some());

        handle.abort();
        let _ = handle.await;
        assert!(bindings.current_user("req-cancel").is_none());
    }
}
