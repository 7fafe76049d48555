use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::asset::Asset;
use super::context::PipelineContext;
use super::registry::{LoaderEntry, LoaderRegistry};
use super::resolver::PathResolver;
use super::types::{Stage, TypeTag};
use crate::error::{ContentError, Result};
use crate::manager::ContentManager;
use crate::observability::Metrics;

/// Drives resolved chains over a shared [`LoaderRegistry`].
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<LoaderRegistry>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(registry: Arc<LoaderRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<LoaderRegistry> {
        &self.registry
    }

    /// Whether an in-memory `from` value can be turned into `to`.
    pub fn can_convert(&self, from: &TypeTag, to: &TypeTag) -> bool {
        from == to || self.find_chain(Stage::Preload, from, to, None)
    }

    /// Whether a source of type `from` can be loaded as `to`; the first hop
    /// must be a load.
    pub(crate) fn can_load(&self, from: &TypeTag, to: &TypeTag) -> bool {
        self.find_chain(Stage::Preload, from, to, Some(Stage::Load))
    }

    /// Runs hops until the context holds a result of its target type.
    ///
    /// After every hop the next one is resolved again from the updated
    /// context. Hook stages run once, when the chain first moves past them;
    /// postprocess hooks run after the result exists.
    pub async fn run(&self, ctx: &mut PipelineContext) -> Result<Asset> {
        self.metrics.resolution_started();
        let mut hooks_done = BTreeSet::new();

        if ctx.is_source_load() && ctx.source_type == TypeTag::Extension(String::new()) {
            let raw = ctx.fetch_raw().await?;
            ctx.source_type = TypeTag::mime(&raw.content_type);
            debug!(source = %ctx.source, source_type = %ctx.source_type, "Typed source by content type");
        }

        if !ctx.is_source_load() && ctx.source_type == ctx.target_type {
            ctx.result = ctx.intermediate.take();
        }

        while !(ctx.source_type == ctx.target_type && ctx.result.is_some()) {
            let entry = self.next_hop(ctx)?;

            self.run_hooks(ctx, &mut hooks_done, |stage| stage < entry.stage).await?;

            ctx.stage = entry.stage;
            ctx.used.insert(entry.id);
            debug!(
                stage = %entry.stage,
                handler = entry.handler.name(),
                source = %ctx.source,
                from = %ctx.source_type,
                target = %ctx.target_type,
                "Running hop"
            );
            self.metrics.handler_invoked();
            let produced = entry.handler.handle(ctx).await?;

            if !entry.is_pass_through() {
                ctx.source_type = entry.target_type.clone();
            }
            if let Some(value) = produced {
                if ctx.source_type == ctx.target_type {
                    ctx.result = Some(value);
                } else {
                    ctx.intermediate = Some(value);
                }
            }

            if ctx.source_type == ctx.target_type && ctx.result.is_none() {
                return Err(ContentError::MissingResult {
                    stage: entry.stage,
                    target_type: ctx.target_type.clone(),
                    source_ref: ctx.source.clone(),
                });
            }
        }

        self.run_hooks(ctx, &mut hooks_done, |_| true).await?;

        ctx.result.clone().ok_or_else(|| ContentError::MissingResult {
            stage: ctx.stage,
            target_type: ctx.target_type.clone(),
            source_ref: ctx.source.clone(),
        })
    }

    /// Converts an in-memory value, e.g. one parsed by a handler, without
    /// touching the artifact cache. The chain may start at any hop stage.
    pub async fn run_value(
        &self,
        manager: &ContentManager,
        from: TypeTag,
        to: TypeTag,
        value: Asset,
        parent: Option<&PipelineContext>,
    ) -> Result<Asset> {
        let mut ctx = PipelineContext::for_value(manager.clone(), from, to, value, parent);
        self.run(&mut ctx).await
    }

    fn next_hop(&self, ctx: &PipelineContext) -> Result<Arc<LoaderEntry>> {
        let entries = self.registry.resolution_order();
        let mut resolver = PathResolver::new(&entries).excluding(&ctx.used);
        if ctx.is_source_load() && ctx.used.is_empty() {
            resolver = resolver.first_stage(Stage::Load);
        }

        let floor = if ctx.used.is_empty() { Stage::Preload } else { ctx.stage };
        resolver
            .resolve(floor, &ctx.source_type, &ctx.target_type)
            .and_then(|hops| hops.into_iter().next())
            .map(|hop| hop.entry)
            .ok_or_else(|| ContentError::HandlerNotFound {
                stage: missing_stage(ctx),
                source_type: ctx.source_type.clone(),
                target_type: ctx.target_type.clone(),
            })
    }

    async fn run_hooks(
        &self,
        ctx: &mut PipelineContext,
        done: &mut BTreeSet<Stage>,
        due: impl Fn(Stage) -> bool,
    ) -> Result<()> {
        for stage in Stage::ALL {
            if !stage.is_hook() || !due(stage) || !done.insert(stage) {
                continue;
            }

            let hooks = self
                .registry
                .get_handlers(stage, &ctx.source_type, &ctx.target_type);
            for hook in hooks {
                ctx.stage = stage;
                debug!(stage = %stage, handler = hook.handler.name(), source = %ctx.source, "Running hook");
                self.metrics.handler_invoked();
                if let Some(value) = hook.handler.handle(ctx).await? {
                    if ctx.result.is_some() {
                        ctx.result = Some(value);
                    } else {
                        ctx.intermediate = Some(value);
                    }
                }
            }
        }
        Ok(())
    }

    fn find_chain(&self, floor: Stage, from: &TypeTag, to: &TypeTag, first: Option<Stage>) -> bool {
        let entries = self.registry.resolution_order();
        let mut resolver = PathResolver::new(&entries);
        if let Some(stage) = first {
            resolver = resolver.first_stage(stage);
        }
        resolver.resolve(floor, from, to).is_some()
    }
}

/// Stage reported when no chain exists from the current state.
fn missing_stage(ctx: &PipelineContext) -> Stage {
    if ctx.is_source_load() && ctx.used.is_empty() {
        Stage::Load
    } else if matches!(ctx.source_type, TypeTag::Intermediate(_)) {
        Stage::Process
    } else {
        Stage::Import
    }
}
