use async_trait::async_trait;
use futures::future::BoxFuture;

use super::asset::Asset;
use super::context::PipelineContext;
use crate::error::Result;

/// A stage handler plugged into the loader graph.
///
/// Handlers read and mutate the context (`raw`, `intermediate`, `result`) and
/// may issue nested loads through `ctx.manager()`. A returned value is stored
/// by the executor: as `result` when the hop lands on the requested type,
/// otherwise as `intermediate`.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn handle(&self, ctx: &mut PipelineContext) -> Result<Option<Asset>>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Optional disposal hook of a cached artifact, invoked by `unload`.
pub trait Dispose: Send + Sync {
    fn dispose(&self) -> Result<()>;
}

/// Adapts a closure into a [`Loader`].
///
/// ```rust,ignore
/// registry.register_fn(Stage::Process, pixels, model_options, "pixels", |ctx| {
///     async move { Ok(Some(Asset::new(build(ctx.input::<Pixels>()?)))) }.boxed()
/// });
/// ```
pub struct FnLoader<F> {
    name: String,
    f: F,
}

impl<F> FnLoader<F>
where
    F: for<'a> Fn(&'a mut PipelineContext) -> BoxFuture<'a, Result<Option<Asset>>>
        + Send
        + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Loader for FnLoader<F>
where
    F: for<'a> Fn(&'a mut PipelineContext) -> BoxFuture<'a, Result<Option<Asset>>>
        + Send
        + Sync,
{
    async fn handle(&self, ctx: &mut PipelineContext) -> Result<Option<Asset>> {
        (self.f)(ctx).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
