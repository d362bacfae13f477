//! Composition of a service out of independently written modules.

use super::ServiceContext;
use crate::time::Millis;
use std::any::Any;
use tracing::debug;

/// A slice of business logic hosted by a service.
pub trait Module: Send + 'static {
    fn name(&self) -> &'static str;

    /// Called once, after every module of the service has been created.
    fn init(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn tick(&mut self, ctx: &ServiceContext, now: Millis) -> anyhow::Result<()>;

    /// Used by [`ModuleSet::get_mut`] to recover the concrete module type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered set of modules. Declaration order is tick order.
#[derive(Default)]
pub struct ModuleSet {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every module from its constructor before any is initialised,
    /// since modules may depend on each other during `init`.
    pub fn from_creators<I, F>(creators: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Box<dyn Module>,
    {
        Self {
            modules: creators.into_iter().map(|create| create()).collect(),
        }
    }

    pub fn push(&mut self, module: impl Module) -> &mut Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn init_all(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
        for module in &mut self.modules {
            module
                .init(ctx)
                .map_err(|e| e.context(format!("module {} failed to initialise", module.name())))?;
            debug!(service_id = %ctx.service_id(), module = module.name(), "Module initialised");
        }
        Ok(())
    }

    /// Ticks every module in order, stopping at the first failure.
    pub fn tick_all(&mut self, ctx: &ServiceContext, now: Millis) -> anyhow::Result<()> {
        for module in &mut self.modules {
            module
                .tick(ctx, now)
                .map_err(|e| e.context(format!("module {} failed to tick", module.name())))?;
        }
        Ok(())
    }

    /// Looks a module up by its concrete type.
    pub fn get_mut<M: Module>(&mut self) -> Option<&mut M> {
        self.modules
            .iter_mut()
            .find_map(|module| module.as_any_mut().downcast_mut::<M>())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
