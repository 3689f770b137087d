//! Binding of the current connection target to a scope of asynchronous work.
//!
//! The binding is task-local: it is visible to everything awaited inside the scope, is never
//! shared with concurrently running tasks, and the previous binding is restored when the scope
//! finishes, whether it returns normally, returns an error, or panics.

use std::{future::Future, sync::Arc};

use crate::DbError;

tokio::task_local! {
    static CURRENT_TARGET: Arc<str>;
}

/// Run `future` with `target` bound as the current connection target.
///
/// Scopes nest: an inner binding shadows the outer one and the outer binding is visible again
/// as soon as the inner future completes.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use db_pool::{current_target, with_target};
///
/// with_target("postgresql://db/revenue", async {
///     assert_eq!(current_target().as_deref(), Some("postgresql://db/revenue"));
/// })
/// .await;
///
/// assert_eq!(current_target(), None);
/// # }
/// ```
pub async fn with_target<F>(target: impl Into<Arc<str>>, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_TARGET.scope(target.into(), future).await
}

/// The target bound by the nearest enclosing [`with_target`] scope.
pub fn current_target() -> Option<Arc<str>> {
    CURRENT_TARGET.try_with(Arc::clone).ok()
}

/// An explicit, non-empty target wins over the scoped binding.
pub(crate) fn resolve_target(explicit: Option<&str>) -> Result<Arc<str>, DbError> {
    if let Some(target) = explicit.filter(|target| !target.is_empty()) {
        return Ok(Arc::from(target));
    }

    current_target()
        .filter(|target| !target.is_empty())
        .ok_or(DbError::NoTarget)
}
