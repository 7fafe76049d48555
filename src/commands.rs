use contentbox::ContentManager;
use contentbox::download::RawContent;
use contentbox::pipeline::{JSON_DOCUMENT, TEXT_DOCUMENT};
use tracing::info;

use crate::cli::{FetchArgs, LoadArgs, Output};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Longest text printed by `fetch` before truncating.
const PREVIEW_CHARS: usize = 512;

pub async fn fetch(manager: &ContentManager, args: FetchArgs) -> Result<(), AnyError> {
    let raw = manager.download(args.url.as_str()).await?;

    println!("url:  {}", raw.url);
    println!("type: {}", raw.content_type);
    match &raw.content {
        RawContent::Text(text) => println!("text: {}", preview(text)),
        RawContent::Json(value) => println!("json: {}", preview(&value.to_string())),
        RawContent::Bytes(bytes) => println!("bytes: {}", bytes.len()),
        RawContent::Url(url) => println!("reference: {url}"),
    }

    Ok(())
}

pub async fn load(manager: &ContentManager, args: LoadArgs) -> Result<(), AnyError> {
    match args.output {
        Output::Json => {
            let value = manager
                .load_as::<serde_json::Value>(&args.url, JSON_DOCUMENT)
                .await?;
            println!("{}", serde_json::to_string_pretty(value.as_ref())?);
        }
        Output::Text => {
            let text = manager.load_as::<String>(&args.url, TEXT_DOCUMENT).await?;
            println!("{text}");
        }
    }

    let stats = manager.metrics().snapshot();
    info!(
        downloads = stats.downloads,
        handler_invocations = stats.handler_invocations,
        "Load finished"
    );
    Ok(())
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
