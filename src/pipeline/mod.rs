//! Loader graph and chain execution
//!
//! Loaders are registered under `(stage, source type, target type)` and form
//! a directed multigraph whose nodes are [`TypeTag`]s. Loading a source walks
//! the shortest chain from the source's type to the requested type, one hop at
//! a time, passing a [`PipelineContext`] through every handler.
//!
//! ## Key Components
//!
//! - [`Loader`] - Trait implemented by stage handlers
//! - [`LoaderRegistry`] - Append-only registry, shared by content managers
//! - [`PathResolver`] - Breadth-first search over the type graph
//! - [`Pipeline`] - Executor driving one chain per context
//! - [`Asset`] - Type-erased value with an optional [`Dispose`] hook
//!
//! ## Example
//!
//! ```rust,ignore
//! use contentbox::pipeline::{LoaderRegistry, Stage, Symbol};
//!
//! let registry = LoaderRegistry::with_defaults();
//! let pixels = Symbol::new("Pixels");
//! registry.loader(".pixels", pixels, Arc::new(PixelsLoader));
//! registry.processor(pixels, model_options, Arc::new(ModelOptionsBuilder));
//! ```

mod asset;
mod context;
mod defaults;
mod executor;
mod registry;
mod resolver;
mod traits;
mod types;

pub use asset::Asset;
pub use context::PipelineContext;
pub use defaults::{DownloadLoader, JsonImporter, TextImporter};
pub use executor::Pipeline;
pub use registry::{EntryId, LoaderEntry, LoaderRegistry, Priority, TypeSet};
pub use resolver::{Hop, PathResolver};
pub use traits::{Dispose, FnLoader, Loader};
pub use types::{JSON_DOCUMENT, Stage, Symbol, TEXT_DOCUMENT, TypeTag};
