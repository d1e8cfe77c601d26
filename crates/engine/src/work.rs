//! Units of work and handler resolution.
//!
//! A [`WorkUnit`] is the invokable captured at submission time. The engine never
//! looks inside it; it only calls it with a [`JobContext`] whose
//! [`HandlerScope`] was produced by a [`HandlerResolver`] for the job's
//! [`WorkType`]. The scope lives for exactly one execution.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use futures::future::BoxFuture;

use jobforge_core::JobId;

use crate::types::WorkType;

/// Future returned by a unit of work.
pub type WorkFuture = BoxFuture<'static, anyhow::Result<()>>;

type HandlerInstance = Arc<dyn Any + Send + Sync>;
type HandlerFactory = Box<dyn Fn() -> HandlerInstance + Send + Sync>;

/// Typed, reusable unit of work.
///
/// Cloning is cheap; the same unit can be invoked again on requeue or on every
/// recurring trigger.
#[derive(Clone)]
pub struct WorkUnit(Arc<dyn Fn(JobContext) -> WorkFuture + Send + Sync>);

impl WorkUnit {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| f(ctx).boxed()))
    }

    pub(crate) fn invoke(&self, ctx: JobContext) -> WorkFuture {
        (self.0)(ctx)
    }
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkUnit(<closure>)")
    }
}

/// What a unit of work sees while it runs.
#[derive(Debug)]
pub struct JobContext {
    pub job_id: JobId,
    pub work_type: WorkType,
    /// Number of times the job was requeued before this attempt.
    pub retry_count: u32,
    scope: HandlerScope,
}

impl JobContext {
    pub(crate) fn new(job_id: JobId, work_type: WorkType, retry_count: u32, scope: HandlerScope) -> Self {
        Self {
            job_id,
            work_type,
            retry_count,
            scope,
        }
    }

    /// The handler instance resolved for this execution.
    pub fn handler<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        let instance = self
            .scope
            .instance
            .clone()
            .ok_or_else(|| anyhow!("no handler resolved for work type {}", self.work_type))?;

        instance.downcast::<T>().map_err(|_| {
            anyhow!(
                "handler for work type {} is not a {}",
                self.work_type,
                std::any::type_name::<T>()
            )
        })
    }
}

/// Handler instance scoped to a single execution; released on drop.
#[derive(Default)]
pub struct HandlerScope {
    instance: Option<HandlerInstance>,
}

impl HandlerScope {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<T: Any + Send + Sync>(instance: T) -> Self {
        Self {
            instance: Some(Arc::new(instance)),
        }
    }

    fn from_instance(instance: HandlerInstance) -> Self {
        Self {
            instance: Some(instance),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_none()
    }
}

impl std::fmt::Debug for HandlerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerScope")
            .field("resolved", &self.instance.is_some())
            .finish()
    }
}

/// Produces the handler instance a unit of work needs.
pub trait HandlerResolver: Send + Sync + 'static {
    fn resolve(&self, work_type: &WorkType) -> anyhow::Result<HandlerScope>;
}

/// Resolver for engines whose units carry everything they need.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHandlers;

impl HandlerResolver for NoHandlers {
    fn resolve(&self, _work_type: &WorkType) -> anyhow::Result<HandlerScope> {
        Ok(HandlerScope::empty())
    }
}

/// Pattern-keyed handler factories.
///
/// Lookup order: exact work type, then the longest matching `prefix.*`
/// pattern, then `*`. Every resolution calls the factory, so each execution
/// gets a fresh instance.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a work-type pattern.
    pub fn register<T, F>(&mut self, pattern: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factories.insert(
            pattern.into(),
            Box::new(move || Arc::new(factory()) as HandlerInstance),
        );
    }

    pub fn with<T, F>(mut self, pattern: impl Into<String>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register(pattern, factory);
        self
    }

    fn factory_for(&self, work_type: &WorkType) -> Option<&HandlerFactory> {
        let name = work_type.as_str();
        if let Some(f) = self.factories.get(name) {
            return Some(f);
        }

        let category = self
            .factories
            .iter()
            .filter_map(|(pattern, factory)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = name.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), factory))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, factory)| factory);

        category.or_else(|| self.factories.get("*"))
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, work_type: &WorkType) -> anyhow::Result<HandlerScope> {
        let factory = self
            .factory_for(work_type)
            .ok_or_else(|| anyhow!("no handler registered for work type {work_type}"))?;
        Ok(HandlerScope::from_instance(factory()))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut patterns: Vec<_> = self.factories.keys().collect();
        patterns.sort();
        f.debug_struct("HandlerRegistry")
            .field("patterns", &patterns)
            .finish()
    }
}
