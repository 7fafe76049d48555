use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::asset::Asset;
use super::context::PipelineContext;
use super::traits::{FnLoader, Loader};
use super::types::{Stage, Symbol, TypeTag};
use crate::error::Result;

/// Position of an entry in its registry; stable because the registry is
/// append-only.
pub type EntryId = usize;

/// Explicit entries always win over built-in defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Explicit,
    Default,
}

/// One edge (hop stages) or hook (hook stages) of the loader graph
#[derive(Clone)]
pub struct LoaderEntry {
    pub id: EntryId,
    pub stage: Stage,
    pub source_type: TypeTag,
    pub target_type: TypeTag,
    pub priority: Priority,
    pub handler: Arc<dyn Loader>,
}

impl LoaderEntry {
    pub fn matches(&self, stage: Stage, source: &TypeTag, target: &TypeTag) -> bool {
        self.stage == stage && self.source_type.accepts(source) && self.target_type.accepts(target)
    }

    /// A wildcard target leaves the current type unchanged.
    pub fn is_pass_through(&self) -> bool {
        self.target_type.is_wildcard()
    }
}

impl fmt::Debug for LoaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderEntry")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("source_type", &self.source_type)
            .field("target_type", &self.target_type)
            .field("priority", &self.priority)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// One or more equivalent source types (`[".mtl", "model/mtl"]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSet(Vec<TypeTag>);

impl TypeSet {
    pub fn iter(&self) -> impl Iterator<Item = &TypeTag> {
        self.0.iter()
    }
}

impl From<TypeTag> for TypeSet {
    fn from(value: TypeTag) -> Self {
        TypeSet(vec![value])
    }
}

impl From<&TypeTag> for TypeSet {
    fn from(value: &TypeTag) -> Self {
        TypeSet(vec![value.clone()])
    }
}

impl From<Symbol> for TypeSet {
    fn from(value: Symbol) -> Self {
        TypeSet(vec![value.into()])
    }
}

impl From<&str> for TypeSet {
    fn from(value: &str) -> Self {
        TypeSet(vec![value.into()])
    }
}

impl From<Vec<TypeTag>> for TypeSet {
    fn from(value: Vec<TypeTag>) -> Self {
        TypeSet(value)
    }
}

impl<const N: usize> From<[&str; N]> for TypeSet {
    fn from(value: [&str; N]) -> Self {
        TypeSet(value.into_iter().map(TypeTag::from).collect())
    }
}

impl<const N: usize> From<[TypeTag; N]> for TypeSet {
    fn from(value: [TypeTag; N]) -> Self {
        TypeSet(value.into())
    }
}

/// Append-only list of loader entries, shared by every content manager of an
/// application.
#[derive(Default)]
pub struct LoaderRegistry {
    entries: RwLock<Vec<Arc<LoaderEntry>>>,
}

impl LoaderRegistry {
    /// Empty registry without the built-in download and import handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in handlers at [`Priority::Default`].
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        super::defaults::register_defaults(&registry);
        registry
    }

    /// Registers `handler` once per source type. Returns the created entries.
    pub fn register(
        &self,
        stage: Stage,
        sources: impl Into<TypeSet>,
        target: impl Into<TypeTag>,
        handler: Arc<dyn Loader>,
    ) -> Vec<Arc<LoaderEntry>> {
        self.insert(Priority::Explicit, stage, sources.into(), target.into(), handler)
    }

    /// Registers a fallback that only runs when no explicit entry fits.
    pub fn register_default(
        &self,
        stage: Stage,
        sources: impl Into<TypeSet>,
        target: impl Into<TypeTag>,
        handler: Arc<dyn Loader>,
    ) -> Vec<Arc<LoaderEntry>> {
        self.insert(Priority::Default, stage, sources.into(), target.into(), handler)
    }

    pub fn register_fn<F>(
        &self,
        stage: Stage,
        sources: impl Into<TypeSet>,
        target: impl Into<TypeTag>,
        name: &str,
        f: F,
    ) -> Vec<Arc<LoaderEntry>>
    where
        F: for<'a> Fn(&'a mut PipelineContext) -> BoxFuture<'a, Result<Option<Asset>>>
            + Send
            + Sync
            + 'static,
    {
        self.register(stage, sources, target, Arc::new(FnLoader::new(name, f)))
    }

    pub fn loader(
        &self,
        sources: impl Into<TypeSet>,
        target: impl Into<TypeTag>,
        handler: Arc<dyn Loader>,
    ) -> Vec<Arc<LoaderEntry>> {
        self.register(Stage::Load, sources, target, handler)
    }

    pub fn importer(
        &self,
        sources: impl Into<TypeSet>,
        target: impl Into<TypeTag>,
        handler: Arc<dyn Loader>,
    ) -> Vec<Arc<LoaderEntry>> {
        self.register(Stage::Import, sources, target, handler)
    }

    pub fn processor(
        &self,
        sources: impl Into<TypeSet>,
        target: impl Into<TypeTag>,
        handler: Arc<dyn Loader>,
    ) -> Vec<Arc<LoaderEntry>> {
        self.register(Stage::Process, sources, target, handler)
    }

    /// Hook run before the first hop of every chain producing `target`.
    pub fn preloader(&self, target: impl Into<TypeTag>, handler: Arc<dyn Loader>) -> Arc<LoaderEntry> {
        self.hook(Stage::Preload, target.into(), handler)
    }

    pub fn preprocessor(&self, target: impl Into<TypeTag>, handler: Arc<dyn Loader>) -> Arc<LoaderEntry> {
        self.hook(Stage::Preprocess, target.into(), handler)
    }

    /// Hook run after the result of a chain producing `target` exists.
    pub fn postprocessor(&self, target: impl Into<TypeTag>, handler: Arc<dyn Loader>) -> Arc<LoaderEntry> {
        self.hook(Stage::Postprocess, target.into(), handler)
    }

    /// All entries of `stage` accepting `(source, target)`: explicit entries in
    /// registration order, then defaults in registration order.
    pub fn get_handlers(&self, stage: Stage, source: &TypeTag, target: &TypeTag) -> Vec<Arc<LoaderEntry>> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.matches(stage, source, target))
            .collect()
    }

    /// Snapshot of every entry in priority order.
    pub fn entries(&self) -> Vec<Arc<LoaderEntry>> {
        let mut entries = self.entries.read().clone();
        // stable: registration order is kept within a priority
        entries.sort_by_key(|entry| entry.priority);
        entries
    }

    /// Entries in the order the resolver tries them: explicit before
    /// default, and the latest registration first within a priority, so an
    /// application can override a loader a library registered earlier.
    pub fn resolution_order(&self) -> Vec<Arc<LoaderEntry>> {
        let mut entries = self.entries.read().clone();
        entries.sort_by_key(|entry| (entry.priority, Reverse(entry.id)));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn hook(&self, stage: Stage, target: TypeTag, handler: Arc<dyn Loader>) -> Arc<LoaderEntry> {
        let mut entries = self.entries.write();
        push_entry(&mut entries, Priority::Explicit, stage, TypeTag::Wildcard, target, handler)
    }

    fn insert(
        &self,
        priority: Priority,
        stage: Stage,
        sources: TypeSet,
        target: TypeTag,
        handler: Arc<dyn Loader>,
    ) -> Vec<Arc<LoaderEntry>> {
        let mut entries = self.entries.write();
        sources
            .0
            .into_iter()
            .map(|source| {
                push_entry(&mut entries, priority, stage, source, target.clone(), handler.clone())
            })
            .collect()
    }
}

fn push_entry(
    entries: &mut Vec<Arc<LoaderEntry>>,
    priority: Priority,
    stage: Stage,
    source_type: TypeTag,
    target_type: TypeTag,
    handler: Arc<dyn Loader>,
) -> Arc<LoaderEntry> {
    let entry = Arc::new(LoaderEntry {
        id: entries.len(),
        stage,
        source_type,
        target_type,
        priority,
        handler,
    });
    debug!(
        stage = %entry.stage,
        source_type = %entry.source_type,
        target_type = %entry.target_type,
        handler = entry.handler.name(),
        "Registered loader"
    );
    entries.push(entry.clone());
    entry
}
