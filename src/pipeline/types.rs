use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Url;

/// Ids below this value are reserved for built-in symbols.
const FIRST_USER_SYMBOL: u64 = 1024;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(FIRST_USER_SYMBOL);

/// Unique token naming an in-memory representation (e.g. "parsed pixel grid").
///
/// Identity is the numeric id; the name is only used for display and cache
/// key strings.
#[derive(Clone, Copy, Debug)]
pub struct Symbol {
    id: u64,
    name: &'static str,
}

impl Symbol {
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            name,
        }
    }

    pub(crate) const fn builtin(id: u64, name: &'static str) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Parsed JSON document (`serde_json::Value`), produced by the default JSON importer.
pub const JSON_DOCUMENT: TypeTag = TypeTag::Intermediate(Symbol::builtin(1, "JsonDocument"));

/// Decoded text (`String`), produced by the default text importer.
pub const TEXT_DOCUMENT: TypeTag = TypeTag::Intermediate(Symbol::builtin(2, "TextDocument"));

/// Type identifier used as a node in the loader graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    /// File extension including the leading dot, lower-cased.
    Extension(String),
    /// MIME essence (`type/subtype`), lower-cased.
    MimeType(String),
    Intermediate(Symbol),
    Wildcard,
}

impl TypeTag {
    pub fn ext(ext: &str) -> Self {
        let ext = ext.trim().to_ascii_lowercase();
        if ext.is_empty() || ext.starts_with('.') {
            TypeTag::Extension(ext)
        } else {
            TypeTag::Extension(format!(".{ext}"))
        }
    }

    /// Builds a MIME tag, dropping any parameters (`; charset=...`).
    pub fn mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or_default();
        TypeTag::MimeType(essence.trim().to_ascii_lowercase())
    }

    pub fn symbol(name: &'static str) -> Self {
        TypeTag::Intermediate(Symbol::new(name))
    }

    /// Derives the source type of a raw reference.
    ///
    /// Data URIs are typed by their MIME type, everything else by the
    /// extension of its path; the host of an absolute URL never counts. A
    /// reference without an extension gets an empty extension, which only
    /// wildcard entries accept.
    pub fn of_source(source: &str) -> Self {
        if let Some(rest) = source.strip_prefix("data:") {
            let header = rest.split(',').next().unwrap_or_default();
            let mime = header.split(';').next().unwrap_or_default();
            if mime.is_empty() {
                return TypeTag::mime("text/plain");
            }
            return TypeTag::mime(mime);
        }

        let absolute = Url::parse(source).ok();
        let path = match &absolute {
            Some(url) => url.path(),
            None => source.split(['?', '#']).next().unwrap_or_default(),
        };
        let file = path.rsplit('/').next().unwrap_or_default();
        match file.rfind('.') {
            Some(pos) => TypeTag::ext(&file[pos..]),
            None => TypeTag::Extension(String::new()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TypeTag::Wildcard)
    }

    /// Whether an entry declared with `self` accepts the `wanted` type.
    pub fn accepts(&self, wanted: &TypeTag) -> bool {
        match (self, wanted) {
            (TypeTag::Wildcard, _) => true,
            (TypeTag::MimeType(declared), TypeTag::MimeType(wanted)) => {
                if declared == wanted {
                    return true;
                }
                match declared.split_once('/') {
                    Some((top, "*")) => wanted.split_once('/').is_some_and(|(t, _)| t == top),
                    _ => false,
                }
            }
            (declared, wanted) => declared == wanted,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Extension(ext) => f.write_str(ext),
            TypeTag::MimeType(mime) => f.write_str(mime),
            TypeTag::Intermediate(symbol) => f.write_str(symbol.name),
            TypeTag::Wildcard => f.write_str("*"),
        }
    }
}

impl From<&str> for TypeTag {
    /// `"*"` is the wildcard, strings with a `/` are MIME types, anything else
    /// is an extension.
    fn from(value: &str) -> Self {
        if value == "*" {
            TypeTag::Wildcard
        } else if value.contains('/') {
            TypeTag::mime(value)
        } else {
            TypeTag::ext(value)
        }
    }
}

impl From<Symbol> for TypeTag {
    fn from(value: Symbol) -> Self {
        TypeTag::Intermediate(value)
    }
}

/// Pipeline stages in their fixed execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Preload,
    Load,
    Import,
    Preprocess,
    Process,
    Postprocess,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Preload,
        Stage::Load,
        Stage::Import,
        Stage::Preprocess,
        Stage::Process,
        Stage::Postprocess,
    ];

    /// Hook stages run every matching handler; hop stages pick one edge.
    pub fn is_hook(self) -> bool {
        matches!(self, Stage::Preload | Stage::Preprocess | Stage::Postprocess)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Preload => "preload",
            Stage::Load => "load",
            Stage::Import => "import",
            Stage::Preprocess => "preprocess",
            Stage::Process => "process",
            Stage::Postprocess => "postprocess",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_from_extension() {
        assert_eq!(TypeTag::of_source("a.png"), TypeTag::ext(".png"));
        assert_eq!(TypeTag::of_source("http://host/dir/A.PNG?v=2#x"), TypeTag::ext("png"));
        assert_eq!(TypeTag::of_source("/assets/model.tar.gz"), TypeTag::ext(".gz"));
        assert_eq!(TypeTag::of_source("http://host/dir.d/file"), TypeTag::Extension(String::new()));
        assert_eq!(TypeTag::of_source("http://example.com"), TypeTag::Extension(String::new()));
        assert_eq!(TypeTag::of_source("https://cdn.example.com/"), TypeTag::Extension(String::new()));
        assert_eq!(TypeTag::of_source("mem:///app/a.json"), TypeTag::ext(".json"));
    }

    #[test]
    fn test_source_type_from_data_uri() {
        assert_eq!(
            TypeTag::of_source("data:application/json;base64,e30="),
            TypeTag::mime("application/json")
        );
        assert_eq!(TypeTag::of_source("data:,hello"), TypeTag::mime("text/plain"));
    }

    #[test]
    fn test_mime_parameters_are_dropped() {
        assert_eq!(
            TypeTag::mime("Text/Plain; charset=utf-8"),
            TypeTag::MimeType("text/plain".to_string())
        );
    }

    #[test]
    fn test_accepts_wildcards() {
        let png = TypeTag::mime("image/png");
        assert!(TypeTag::Wildcard.accepts(&png));
        assert!(TypeTag::mime("image/*").accepts(&png));
        assert!(!TypeTag::mime("video/*").accepts(&png));
        assert!(!TypeTag::ext(".png").accepts(&png));
        assert!(!png.accepts(&TypeTag::Wildcard));
    }

    #[test]
    fn test_symbols_with_same_name_are_distinct() {
        let a = Symbol::new("Pixels");
        let b = Symbol::new("Pixels");
        assert_ne!(a, b);
        assert_eq!(a, a);
        assert_eq!(TypeTag::from(a).to_string(), "Pixels");
        assert!(a.id() >= FIRST_USER_SYMBOL);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(TypeTag::from("*"), TypeTag::Wildcard);
        assert_eq!(TypeTag::from("application/x-yaml"), TypeTag::mime("application/x-yaml"));
        assert_eq!(TypeTag::from(".MTL"), TypeTag::ext(".mtl"));
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::Load < Stage::Import);
        assert!(Stage::Process < Stage::Postprocess);
        assert!(Stage::Preprocess.is_hook());
        assert!(!Stage::Process.is_hook());
    }
}
