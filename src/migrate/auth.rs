//! Caller authorization.
//!
//! sitepack never decides who may export or import; the host does. Every
//! mutating entry point asks the injected [`Authorizer`] first.

/// Answers "is the current caller allowed to run migrations".
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self) -> bool;
}

/// The local operator running the CLI. Always authorized.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOperator;

impl Authorizer for LocalOperator {
    fn is_authorized(&self) -> bool {
        true
    }
}

/// Adapts any `Fn() -> bool` into an [`Authorizer`].
pub struct FnAuthorizer<F>(pub F);

impl<F> Authorizer for FnAuthorizer<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_authorized(&self) -> bool {
        (self.0)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fn_authorizer_reads_live_state() {
        let allowed = Arc::new(AtomicBool::new(false));
        let flag = allowed.clone();
        let auth = FnAuthorizer(move || flag.load(Ordering::Relaxed));

        assert!(!auth.is_authorized());
        allowed.store(true, Ordering::Relaxed);
        assert!(auth.is_authorized());
        assert!(LocalOperator.is_authorized());
    }
}
