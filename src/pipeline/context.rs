use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::asset::Asset;
use super::executor::Pipeline;
use super::registry::EntryId;
use super::types::{Stage, TypeTag};
use crate::download::{RawAsset, url};
use crate::error::{ContentError, Result};
use crate::manager::ContentManager;

/// Traversal token of one resolution; owned by the running chain.
pub struct PipelineContext {
    manager: ContentManager,
    /// Stage of the hop or hook currently running.
    pub stage: Stage,
    /// Source reference after remapping. For in-memory conversions this is
    /// the source of the parent chain, if any.
    pub source: String,
    /// Type of the value the chain currently holds.
    pub source_type: TypeTag,
    pub target_type: TypeTag,
    /// Caller options passed through `load_with`.
    pub options: Value,
    pub raw: Option<Arc<RawAsset>>,
    pub intermediate: Option<Asset>,
    pub result: Option<Asset>,
    pub(crate) used: HashSet<EntryId>,
    from_source: bool,
}

impl PipelineContext {
    pub(crate) fn for_source(
        manager: ContentManager,
        source: String,
        target_type: TypeTag,
        options: Value,
    ) -> Self {
        Self {
            manager,
            stage: Stage::Preload,
            source_type: TypeTag::of_source(&source),
            source,
            target_type,
            options,
            raw: None,
            intermediate: None,
            result: None,
            used: HashSet::new(),
            from_source: true,
        }
    }

    pub(crate) fn for_value(
        manager: ContentManager,
        source_type: TypeTag,
        target_type: TypeTag,
        value: Asset,
        parent: Option<&PipelineContext>,
    ) -> Self {
        let (source, options) = match parent {
            Some(parent) => (parent.source.clone(), parent.options.clone()),
            None => (String::new(), Value::Null),
        };
        Self {
            manager,
            stage: Stage::Preload,
            source,
            source_type,
            target_type,
            options,
            raw: None,
            intermediate: Some(value),
            result: None,
            used: HashSet::new(),
            from_source: false,
        }
    }

    pub fn manager(&self) -> &ContentManager {
        &self.manager
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.manager.pipeline()
    }

    /// Whether the chain started from a source reference rather than an
    /// in-memory value.
    pub fn is_source_load(&self) -> bool {
        self.from_source
    }

    /// Resolves a reference found inside the current source against it.
    pub fn resolve(&self, reference: &str) -> String {
        url::resolve_relative(&self.source, reference)
    }

    /// Loads a reference relative to the current source through the manager.
    pub async fn load(&self, reference: &str, target: impl Into<TypeTag>) -> Result<Asset> {
        self.manager.load(&self.resolve(reference), target).await
    }

    /// Downloads the source into `raw` unless it is already there.
    pub async fn fetch_raw(&mut self) -> Result<Arc<RawAsset>> {
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        if !self.from_source {
            return Err(ContentError::InvalidInput(format!(
                "{} value has no source to download",
                self.source_type
            )));
        }

        let raw = self.manager.downloads().download(self.source.as_str()).await?;
        self.raw = Some(raw.clone());
        Ok(raw)
    }

    /// The downloaded content, for importers.
    pub fn raw_asset(&self) -> Result<&RawAsset> {
        self.raw.as_deref().ok_or_else(|| {
            ContentError::InvalidInput(format!("'{}' has not been downloaded", self.source))
        })
    }

    /// The intermediate value as `T`.
    pub fn input<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let value = self.intermediate.as_ref().ok_or_else(|| {
            ContentError::InvalidInput(format!("no {} value for '{}'", self.source_type, self.source))
        })?;
        value.downcast::<T>().ok_or_else(|| ContentError::TypeMismatch {
            key: format!("{}:{}", self.source_type, self.source),
            expected: std::any::type_name::<T>(),
        })
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("stage", &self.stage)
            .field("source", &self.source)
            .field("source_type", &self.source_type)
            .field("target_type", &self.target_type)
            .field("raw", &self.raw.as_ref().map(|raw| raw.url.as_str()))
            .field("intermediate", &self.intermediate)
            .field("result", &self.result)
            .finish()
    }
}
