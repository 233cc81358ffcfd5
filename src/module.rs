//! Per-type render modules.
//!
//! A [`RenderModule`] is an extension registered for a document type. When a
//! full render unit of that type is created, or when the module is registered
//! while such units are alive, the module builds a [`Capability`] for the unit.
//! The render manager forwards modules without looking inside them.

use crate::unit::{Capability, CapabilityId, FullUnit};
use std::sync::Arc;

mod registry;

pub use registry::{ModuleRegistration, ModuleRegistry, RegisteredModule};

/// Extension registered for a document type.
pub trait RenderModule: Send + Sync {
    /// Id under which the built capability can be looked up
    fn capability_id(&self) -> CapabilityId;

    /// Build the capability for `unit`. Capabilities injected earlier are already
    /// visible on the unit.
    fn create(&self, unit: &FullUnit) -> anyhow::Result<Arc<dyn Capability>>;
}

pub type ModuleRef = Arc<dyn RenderModule>;

/// Module built from a closure.
pub struct FnModule<F> {
    id: CapabilityId,
    factory: F,
}

impl<F> RenderModule for FnModule<F>
where
    F: Fn(&FullUnit) -> anyhow::Result<Arc<dyn Capability>> + Send + Sync,
{
    fn capability_id(&self) -> CapabilityId {
        self.id.clone()
    }

    fn create(&self, unit: &FullUnit) -> anyhow::Result<Arc<dyn Capability>> {
        (self.factory)(unit)
    }
}

/// Wraps a closure into a [`ModuleRef`].
///
/// ```
/// use std::any::Any;
/// use std::sync::Arc;
/// use unit_render::module::module_fn;
/// use unit_render::unit::Capability;
///
/// struct Selection;
/// impl Capability for Selection {
///     fn as_any(&self) -> &dyn Any { self }
/// }
///
/// let module = module_fn("selection", |_unit| Ok(Arc::new(Selection) as Arc<dyn Capability>));
/// assert_eq!(module.capability_id().as_str(), "selection");
/// ```
pub fn module_fn<F>(id: impl Into<CapabilityId>, factory: F) -> ModuleRef
where
    F: Fn(&FullUnit) -> anyhow::Result<Arc<dyn Capability>> + Send + Sync + 'static,
{
    Arc::new(FnModule { id: id.into(), factory })
}
