//! Built-in fallback handlers, registered at [`Priority::Default`]
//!
//! [`Priority::Default`]: super::registry::Priority::Default

use async_trait::async_trait;
use std::sync::Arc;

use super::asset::Asset;
use super::context::PipelineContext;
use super::registry::LoaderRegistry;
use super::traits::Loader;
use super::types::{JSON_DOCUMENT, Stage, TEXT_DOCUMENT, TypeTag};
use crate::download::RawContent;
use crate::error::{ContentError, Result};

const JSON_SOURCES: [&str; 2] = [".json", "application/json"];

const TEXT_SOURCES: [&str; 7] = [
    ".txt",
    "text/plain",
    ".yml",
    ".yaml",
    "application/x-yaml",
    ".mtl",
    ".obj",
];

pub(crate) fn register_defaults(registry: &LoaderRegistry) {
    registry.register_default(Stage::Load, TypeTag::Wildcard, TypeTag::Wildcard, Arc::new(DownloadLoader));
    registry.register_default(Stage::Import, JSON_SOURCES, JSON_DOCUMENT, Arc::new(JsonImporter));
    registry.register_default(Stage::Import, TEXT_SOURCES, TEXT_DOCUMENT, Arc::new(TextImporter));
}

/// Fetches the source through the download cache; the type is unchanged.
#[derive(Debug, Clone, Copy)]
pub struct DownloadLoader;

#[async_trait]
impl Loader for DownloadLoader {
    async fn handle(&self, ctx: &mut PipelineContext) -> Result<Option<Asset>> {
        let raw = ctx.fetch_raw().await?;
        Ok(Some(Asset::from_arc(raw)))
    }

    fn name(&self) -> &str {
        "download"
    }
}

/// Parses the raw content into a `serde_json::Value`.
#[derive(Debug, Clone, Copy)]
pub struct JsonImporter;

#[async_trait]
impl Loader for JsonImporter {
    async fn handle(&self, ctx: &mut PipelineContext) -> Result<Option<Asset>> {
        let raw = ctx.raw_asset()?;
        let value = match &raw.content {
            RawContent::Json(value) => value.clone(),
            RawContent::Text(text) => serde_json::from_str(text)?,
            RawContent::Bytes(bytes) => serde_json::from_slice(bytes)?,
            RawContent::Url(url) => {
                return Err(ContentError::InvalidInput(format!(
                    "{url} ({}) has no inline content to parse as JSON",
                    raw.content_type
                )));
            }
        };
        Ok(Some(Asset::new(value)))
    }

    fn name(&self) -> &str {
        "json-import"
    }
}

/// Exposes the raw content as a UTF-8 `String`.
#[derive(Debug, Clone, Copy)]
pub struct TextImporter;

#[async_trait]
impl Loader for TextImporter {
    async fn handle(&self, ctx: &mut PipelineContext) -> Result<Option<Asset>> {
        let raw = ctx.raw_asset()?;
        let text = match &raw.content {
            RawContent::Text(text) => text.clone(),
            RawContent::Json(value) => value.to_string(),
            RawContent::Bytes(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|e| ContentError::InvalidInput(format!("{} is not UTF-8: {e}", raw.url)))?,
            RawContent::Url(url) => {
                return Err(ContentError::InvalidInput(format!(
                    "{url} ({}) has no inline text",
                    raw.content_type
                )));
            }
        };
        Ok(Some(Asset::new(text)))
    }

    fn name(&self) -> &str {
        "text-import"
    }
}
