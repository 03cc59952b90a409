// Request-scoped state.
//
// Every dispatch gets a fresh `ServiceContext` that stages read and publish
// into. While the chain runs the context is also installed as the thread's
// current context, so code that was not handed the context explicitly can
// reach it through the static proxies below.

pub mod proxy;

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::api::RequestView;
use crate::error::ContextError;
use crate::serialization::ParsedRequest;
use crate::service::{Endpoint, ServiceInfo};
use crate::stages::auth::Credential;
use crate::stages::trace::TraceContext;

pub use proxy::ContextProxy;

/// Per-request, type-keyed store shared by every stage of one dispatch
#[derive(Default)]
pub struct ServiceContext {
    entries: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value, replacing any earlier value of the same type
    pub fn insert<T: 'static>(&self, value: T) {
        self.entries
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<Rc<T>> {
        self.entries
            .borrow()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Like [`ServiceContext::get`], failing with `ContextError::Missing`
    pub fn require<T: 'static>(&self) -> Result<Rc<T>, ContextError> {
        self.get::<T>().ok_or(ContextError::Missing {
            what: std::any::type_name::<T>(),
        })
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.borrow().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: 'static>(&self) -> bool {
        self.entries.borrow_mut().remove(&TypeId::of::<T>()).is_some()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<ServiceContext>>> = const { RefCell::new(None) };
}

/// Keeps a context installed; dropping it restores the previous binding.
#[must_use = "the context is uninstalled when the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Rc<ServiceContext>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Install `context` as the current context of this thread until the guard
/// is dropped
pub fn install(context: Rc<ServiceContext>) -> ContextGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// The context installed on this thread
pub fn current() -> Result<Rc<ServiceContext>, ContextError> {
    CURRENT.with(|current| current.borrow().clone().ok_or(ContextError::NotInstalled))
}

fn lookup<T: 'static>() -> Result<Rc<T>, ContextError> {
    SERVICE_CONTEXT.get()?.require::<T>()
}

pub static SERVICE_CONTEXT: ContextProxy<ServiceContext> = ContextProxy::new(current);
pub static SERVICE: ContextProxy<ServiceInfo> = ContextProxy::new(lookup::<ServiceInfo>);
pub static REQUEST: ContextProxy<RequestView> = ContextProxy::new(lookup::<RequestView>);
pub static PARSED_REQUEST: ContextProxy<ParsedRequest> = ContextProxy::new(lookup::<ParsedRequest>);
pub static ENDPOINT: ContextProxy<Arc<Endpoint>> = ContextProxy::new(lookup::<Arc<Endpoint>>);
pub static CREDENTIAL: ContextProxy<Credential> = ContextProxy::new(lookup::<Credential>);
pub static TRACE_CONTEXT: ContextProxy<TraceContext> = ContextProxy::new(lookup::<TraceContext>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxies_fail_without_context() {
        assert_eq!(REQUEST.get().unwrap_err(), ContextError::NotInstalled);
        assert!(!SERVICE_CONTEXT.is_bound());
    }

    #[test]
    fn proxies_resolve_through_the_installed_context() {
        let context = Rc::new(ServiceContext::new());
        context.insert(RequestView::builder("/first").build());
        let guard = install(context.clone());

        assert_eq!(REQUEST.get().unwrap().url(), "/first");
        assert!(matches!(
            PARSED_REQUEST.get().unwrap_err(),
            ContextError::Missing { .. }
        ));

        // resolved freshly on every access
        context.insert(RequestView::builder("/second").build());
        assert_eq!(REQUEST.with(|request| request.url().to_string()).unwrap(), "/second");

        drop(guard);
        assert_eq!(REQUEST.get().unwrap_err(), ContextError::NotInstalled);
    }

    #[test]
    fn nested_installs_restore_the_outer_context() {
        let outer = Rc::new(ServiceContext::new());
        outer.insert(RequestView::builder("/outer").build());
        let _outer_guard = install(outer);
        {
            let inner = Rc::new(ServiceContext::new());
            inner.insert(RequestView::builder("/inner").build());
            let _inner_guard = install(inner);
            assert_eq!(REQUEST.get().unwrap().url(), "/inner");
        }
        assert_eq!(REQUEST.get().unwrap().url(), "/outer");
    }

    #[test]
    fn guard_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = install(Rc::new(ServiceContext::new()));
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert!(!SERVICE_CONTEXT.is_bound());
    }

    #[test]
    fn typed_entries() {
        let context = ServiceContext::new();
        assert!(!context.contains::<u32>());
        context.insert(7u32);
        assert_eq!(*context.require::<u32>().unwrap(), 7);
        assert!(context.remove::<u32>());
        assert!(matches!(context.require::<u32>(), Err(ContextError::Missing { .. })));
    }
}
