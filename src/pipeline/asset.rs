use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::traits::Dispose;
use crate::error::Result;

/// Type-erased value travelling through the pipeline and stored in the
/// artifact cache. Cloning is cheap and shares the value.
#[derive(Clone)]
pub struct Asset {
    value: Arc<dyn Any + Send + Sync>,
    dispose: Option<Arc<dyn Dispose>>,
    type_name: &'static str,
}

impl Asset {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            dispose: None,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wraps a value whose [`Dispose`] hook runs when the asset is unloaded.
    pub fn disposable<T: Dispose + Any>(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            value: value.clone(),
            dispose: Some(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_disposable(&self) -> bool {
        self.dispose.is_some()
    }

    /// Whether both handles share the same value.
    pub fn ptr_eq(&self, other: &Asset) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn dispose(&self) -> Result<()> {
        match &self.dispose {
            Some(hook) => hook.dispose(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("type", &self.type_name)
            .field("disposable", &self.is_disposable())
            .finish()
    }
}
