//! Execution-scoped context propagation.
//!
//! A [`Context`] is an immutable bag of typed values that travels with the
//! current unit of execution. Cross-cutting concerns (the active span, the
//! current [`Baggage`](crate::baggage::Baggage)) store their state in it and
//! read it back without threading parameters through every call.
//!
//! Contexts are made current with [`Context::attach`], which returns a
//! [`ContextGuard`]; dropping the guard restores whatever was current
//! before, on every exit path.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::tele_warn;

mod future_ext;

pub use future_ext::{FutureContextExt, WithContext};

thread_local! {
    static CURRENT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// An immutable, execution-scoped collection of typed values.
///
/// Write operations return a new context; previously captured snapshots are
/// never mutated, so contexts can be freely shared across threads.
///
/// # Examples
///
/// ```
/// use telemark::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct Tenant(&'static str);
///
/// let _outer = Context::new().with_value(Tenant("acme")).attach();
/// assert_eq!(Context::current().get::<Tenant>(), Some(&Tenant("acme")));
///
/// {
///     let _inner = Context::current().with_value(Tenant("globex")).attach();
///     assert_eq!(Context::current().get::<Tenant>(), Some(&Tenant("globex")));
/// }
///
/// // Restored when the inner guard drops.
/// assert_eq!(Context::current().get::<Tenant>(), Some(&Tenant("acme")));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    entries: Option<Arc<EntryMap>>,
}

// TypeIds are already hashes, so the map can use them verbatim.
type EntryMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>, BuildHasherDefault<TypeIdHasher>>;

impl Context {
    /// Creates an empty context. Does not allocate.
    pub fn new() -> Self {
        Context::default()
    }

    /// A snapshot of the context currently attached to this thread.
    pub fn current() -> Self {
        Self::map_current(Context::clone)
    }

    /// Applies `f` to the current context without cloning it.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT.with(|stack| f(&stack.borrow().active))
    }

    /// Returns the entry of type `T`, if one is set.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a copy of this context with `value` included, replacing any
    /// previous entry of the same type.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut entries = self
            .entries
            .as_deref()
            .cloned()
            .unwrap_or_default();
        entries.insert(TypeId::of::<T>(), Arc::new(value));
        Context {
            entries: Some(Arc::new(entries)),
        }
    }

    /// Makes this context the current one for the calling thread.
    ///
    /// The returned guard restores the previously current context when
    /// dropped. Guards may be dropped out of order; the stack repairs
    /// itself when the topmost guard goes away.
    pub fn attach(self) -> ContextGuard {
        let pos = CURRENT.with(|stack| stack.borrow_mut().push(self));
        ContextGuard {
            pos,
            _not_send: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field(
                "entries",
                &self.entries.as_ref().map_or(0, |entries| entries.len()),
            )
            .finish()
    }
}

/// Restores the prior context for the thread when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    pos: u16,
    // Guards hold positions into a thread-local stack and must not move
    // across threads.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.pos > ContextStack::BASE && self.pos < ContextStack::OVERFLOW {
            CURRENT.with(|stack| stack.borrow_mut().pop(self.pos));
        }
    }
}

#[derive(Clone, Default, Debug)]
struct TypeIdHasher(u64);

impl Hasher for TypeIdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId hashes via write_u64")
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

/// Per-thread stack of attached contexts.
///
/// `active` is the top of the stack; `suspended` holds everything below it.
/// Guards pop by position so that dropping them out of order leaves a hole
/// (`None`) that is compacted once the top is popped.
struct ContextStack {
    active: Context,
    suspended: Vec<Option<Context>>,
}

impl ContextStack {
    const BASE: u16 = 0;
    const OVERFLOW: u16 = u16::MAX;

    #[inline]
    fn push(&mut self, cx: Context) -> u16 {
        // Position 0 is reserved for the always-present empty context.
        let pos = self.suspended.len() + 1;
        if pos >= ContextStack::OVERFLOW as usize {
            tele_warn!(
                name: "Context.AttachFailed",
                message = "Too many nested contexts; the new context was not attached"
            );
            return ContextStack::OVERFLOW;
        }
        let previous = std::mem::replace(&mut self.active, cx);
        self.suspended.push(Some(previous));
        pos as u16
    }

    #[inline]
    fn pop(&mut self, pos: u16) {
        let len = self.suspended.len() as u16;
        if pos > len {
            debug_assert!(false, "context guard position beyond stack");
            return;
        }
        if pos == len {
            // Popping the top: restore the nearest suspended context and
            // drain any holes left behind by out-of-order drops.
            while let Some(None) = self.suspended.last() {
                self.suspended.pop();
            }
            if let Some(Some(previous)) = self.suspended.pop() {
                self.active = previous;
            }
        } else {
            // Out-of-order drop: leave a hole, compacted later.
            self.suspended[pos as usize].take();
        }
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            active: Context::default(),
            suspended: Vec::with_capacity(8),
        }
    }
}
