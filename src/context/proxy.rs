use std::fmt;
use std::rc::Rc;

use crate::error::ContextError;

/// Deferred handle to "whatever the resolver currently returns".
///
/// Holds nothing but the resolver; every access resolves again, so a proxy
/// declared once follows the context of whichever request is being served.
pub struct ContextProxy<T: 'static> {
    resolver: fn() -> Result<Rc<T>, ContextError>,
}

impl<T: 'static> ContextProxy<T> {
    pub const fn new(resolver: fn() -> Result<Rc<T>, ContextError>) -> Self {
        Self { resolver }
    }

    pub fn get(&self) -> Result<Rc<T>, ContextError> {
        (self.resolver)()
    }

    /// Whether the proxy currently resolves
    pub fn is_bound(&self) -> bool {
        self.get().is_ok()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ContextError> {
        let value = self.get()?;
        Ok(f(&value))
    }
}

impl<T: 'static> fmt::Debug for ContextProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProxy")
            .field("target", &std::any::type_name::<T>())
            .field("bound", &self.is_bound())
            .finish()
    }
}
