#![forbid(unsafe_code)]

//! The callback contract shared by tick and idle handlers.
//!
//! A handler is registered as an `Arc<dyn Handler>`. Its identity is the
//! address of the shared allocation, so two clones of the same `Arc` are the
//! same handle and two separately allocated handlers are never equal even if
//! their contents match.
//!
//! Two adapters cover the common cases where implementing the trait by hand
//! is noise:
//!
//! - [`FnHandler`] wraps a plain `fn()` and can be found again by that value
//!   (`unsubscribe_fn` on the sources).
//! - [`from_fn`] wraps any closure; remove it with the returned `Arc`.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

/// Result type returned by [`Handler::invoke`].
pub type HandlerResult = Result<(), BoxError>;

/// Shared, type-erased handler handle.
pub type HandlerRef = Arc<dyn Handler>;

/// A collaborator notified by a tick or idle source.
///
/// `invoke` always runs on the designated dispatch thread. Errors and panics
/// are caught by the dispatcher, logged, and do not stop the pass.
pub trait Handler: Send + Sync + 'static {
    /// Run the callback.
    fn invoke(&self) -> HandlerResult;

    /// Name used when a fault is reported.
    ///
    /// The default uses `type_name::<Self>()`; override it when the type name
    /// is too generic to identify the collaborator.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// The plain function wrapped by this handler, if any.
    ///
    /// Only [`FnHandler`] returns `Some`; unsubscribe-by-value relies on it.
    fn wrapped_fn(&self) -> Option<fn()> {
        None
    }
}

/// Identity of a registered handle: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(usize);

impl HandleId {
    /// Identity of the value behind an `Arc`.
    #[inline]
    pub fn of<T: ?Sized>(handle: &Arc<T>) -> Self {
        Self(Arc::as_ptr(handle).cast::<()>() as usize)
    }

    /// Identity of a value known to live inside an `Arc`.
    ///
    /// Lets a handler compute its own id from `&self`.
    #[inline]
    pub fn of_ref<T: ?Sized>(value: &T) -> Self {
        Self((value as *const T).cast::<()>() as usize)
    }
}

/// Adapter turning a plain function into a handler.
///
/// Two `FnHandler`s wrapping the same function are different handles, but
/// both report the same [`Handler::wrapped_fn`], which is what
/// unsubscribe-by-value compares.
#[derive(Clone, Copy)]
pub struct FnHandler {
    func: fn(),
    name: &'static str,
}

impl FnHandler {
    /// Wrap `func`.
    #[must_use]
    pub fn new(func: fn()) -> Self {
        Self {
            func,
            name: "fn-handler",
        }
    }

    /// Wrap `func` with an explicit name for fault reports.
    #[must_use]
    pub fn named(name: &'static str, func: fn()) -> Self {
        Self { func, name }
    }

    /// True if this adapter wraps `func`.
    #[inline]
    pub fn wraps(&self, func: fn()) -> bool {
        std::ptr::fn_addr_eq(self.func, func)
    }
}

impl fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

impl Handler for FnHandler {
    fn invoke(&self) -> HandlerResult {
        (self.func)();
        Ok(())
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.name)
    }

    fn wrapped_fn(&self) -> Option<fn()> {
        Some(self.func)
    }
}

/// Handler backed by a closure.
pub struct ClosureHandler<F> {
    name: Cow<'static, str>,
    func: F,
}

impl<F> Handler for ClosureHandler<F>
where
    F: Fn() -> HandlerResult + Send + Sync + 'static,
{
    fn invoke(&self) -> HandlerResult {
        (self.func)()
    }

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

/// Wrap a fallible closure into a shared handler.
pub fn from_fn<F>(name: impl Into<Cow<'static, str>>, func: F) -> Arc<ClosureHandler<F>>
where
    F: Fn() -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(ClosureHandler {
        name: name.into(),
        func,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn bump() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn other() {}

    #[test]
    fn handle_id_follows_allocation_not_contents() {
        let a: HandlerRef = Arc::new(FnHandler::new(other));
        let b: HandlerRef = Arc::new(FnHandler::new(other));
        assert_eq!(HandleId::of(&a), HandleId::of(&a.clone()));
        assert_ne!(HandleId::of(&a), HandleId::of(&b));
    }

    #[test]
    fn handle_id_of_ref_matches_arc() {
        let h = Arc::new(FnHandler::new(other));
        assert_eq!(HandleId::of(&h), HandleId::of_ref(&*h));
    }

    #[test]
    fn fn_handler_invokes_and_reports_value() {
        let h = FnHandler::named("bump", bump);
        let before = CALLS.load(Ordering::SeqCst);
        h.invoke().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), before + 1);
        assert!(h.wraps(bump));
        assert!(!h.wraps(other));
        assert_eq!(h.name(), "bump");
    }

    #[test]
    fn closure_handler_forwards_result() {
        let ok = from_fn("ok", || Ok(()));
        let bad = from_fn("bad", || Err("nope".into()));
        assert!(ok.invoke().is_ok());
        assert_eq!(bad.invoke().unwrap_err().to_string(), "nope");
        assert_eq!(bad.name(), "bad");
        assert!(bad.wrapped_fn().is_none());
    }
}
