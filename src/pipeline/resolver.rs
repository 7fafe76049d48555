use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use super::registry::{EntryId, LoaderEntry};
use super::types::{Stage, TypeTag};

/// One step of a resolved chain
#[derive(Clone, Debug)]
pub struct Hop {
    pub entry: Arc<LoaderEntry>,
    pub from: TypeTag,
    pub to: TypeTag,
}

/// Type graph over a registry snapshot.
///
/// Nodes are `(stage floor, current type)`; edges are hop-stage entries whose
/// stage is not below the floor. Entries are expected in resolution order
/// (see `LoaderRegistry::resolution_order`): among equally short chains the
/// one with explicit entries is found first, and among explicit entries the
/// most recently registered.
pub struct PathResolver<'a> {
    entries: &'a [Arc<LoaderEntry>],
    excluded: Option<&'a HashSet<EntryId>>,
    first_stage: Option<Stage>,
}

struct Node {
    floor: Stage,
    current: TypeTag,
    hops: Vec<Hop>,
    /// Entries taken without changing the node, e.g. the download hop.
    loops: BTreeSet<EntryId>,
}

impl<'a> PathResolver<'a> {
    pub fn new(entries: &'a [Arc<LoaderEntry>]) -> Self {
        Self {
            entries,
            excluded: None,
            first_stage: None,
        }
    }

    /// Skips entries that already ran in this resolution.
    pub fn excluding(mut self, used: &'a HashSet<EntryId>) -> Self {
        self.excluded = Some(used);
        self
    }

    /// Requires the first hop to belong to `stage`.
    pub fn first_stage(mut self, stage: Stage) -> Self {
        self.first_stage = Some(stage);
        self
    }

    /// Shortest chain of at least one hop from `from` to `to`.
    pub fn resolve(&self, floor: Stage, from: &TypeTag, to: &TypeTag) -> Option<Vec<Hop>> {
        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();

        visited.insert((floor, from.clone(), BTreeSet::new()));
        queue.push_back(Node {
            floor,
            current: from.clone(),
            hops: Vec::new(),
            loops: BTreeSet::new(),
        });

        while let Some(node) = queue.pop_front() {
            if !node.hops.is_empty() && node.current == *to {
                return Some(node.hops);
            }

            for entry in self.edges(&node) {
                let next = if entry.is_pass_through() {
                    node.current.clone()
                } else {
                    entry.target_type.clone()
                };

                let mut loops = node.loops.clone();
                if entry.stage == node.floor && next == node.current {
                    loops.insert(entry.id);
                }
                if !visited.insert((entry.stage, next.clone(), loops.clone())) {
                    continue;
                }

                let mut hops = node.hops.clone();
                hops.push(Hop {
                    entry: entry.clone(),
                    from: node.current.clone(),
                    to: next.clone(),
                });
                queue.push_back(Node {
                    floor: entry.stage,
                    current: next,
                    hops,
                    loops,
                });
            }
        }

        None
    }

    fn edges<'n>(&'n self, node: &'n Node) -> impl Iterator<Item = &'a Arc<LoaderEntry>> + 'n {
        let first = node.hops.is_empty();
        self.entries.iter().filter(move |entry| {
            if entry.stage.is_hook() || entry.stage < node.floor {
                return false;
            }
            if first && self.first_stage.is_some_and(|stage| entry.stage != stage) {
                return false;
            }
            if self.excluded.is_some_and(|used| used.contains(&entry.id)) {
                return false;
            }
            if node.hops.iter().any(|hop| hop.entry.id == entry.id) {
                return false;
            }
            entry.source_type.accepts(&node.current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::pipeline::{
        Asset, JSON_DOCUMENT, Loader, LoaderRegistry, PipelineContext, Symbol, TEXT_DOCUMENT,
    };
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Loader for Named {
        async fn handle(&self, _ctx: &mut PipelineContext) -> Result<Option<Asset>> {
            Ok(None)
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn chain(hops: &[Hop]) -> Vec<&str> {
        hops.iter().map(|hop| hop.entry.handler.name()).collect()
    }

    #[test]
    fn test_two_hop_chain() {
        let registry = LoaderRegistry::new();
        let pixels = Symbol::new("Pixels");
        let options = Symbol::new("ModelOptions");
        registry.loader(".pixels", pixels, Arc::new(Named("load")));
        registry.processor(pixels, options, Arc::new(Named("process")));

        let entries = registry.resolution_order();
        let hops = PathResolver::new(&entries)
            .resolve(Stage::Preload, &".pixels".into(), &options.into())
            .unwrap();

        assert_eq!(chain(&hops), ["load", "process"]);
        assert_eq!(hops[0].to, TypeTag::from(pixels));
    }

    #[test]
    fn test_shortest_chain_wins() {
        let registry = LoaderRegistry::new();
        let a = Symbol::new("A");
        let b = Symbol::new("B");
        registry.loader(".x", a, Arc::new(Named("x->a")));
        registry.processor(a, b, Arc::new(Named("a->b")));
        registry.loader(".x", b, Arc::new(Named("x->b")));

        let entries = registry.resolution_order();
        let hops = PathResolver::new(&entries)
            .resolve(Stage::Preload, &".x".into(), &b.into())
            .unwrap();

        assert_eq!(chain(&hops), ["x->b"]);
    }

    #[test]
    fn test_explicit_preferred_over_default() {
        let registry = LoaderRegistry::with_defaults();
        registry.importer(".json", JSON_DOCUMENT, Arc::new(Named("custom-json")));

        let entries = registry.resolution_order();
        let hops = PathResolver::new(&entries)
            .first_stage(Stage::Load)
            .resolve(Stage::Preload, &".json".into(), &JSON_DOCUMENT)
            .unwrap();

        assert_eq!(hops.len(), 2);
        assert!(hops[0].entry.is_pass_through());
        assert_eq!(chain(&hops)[1], "custom-json");
    }

    #[test]
    fn test_latest_explicit_registration_wins() {
        let registry = LoaderRegistry::new();
        let label = Symbol::new("Label");
        registry.loader(".label", label, Arc::new(Named("library")));
        registry.loader(".label", label, Arc::new(Named("app")));

        let entries = registry.resolution_order();
        let hops = PathResolver::new(&entries)
            .resolve(Stage::Preload, &".label".into(), &label.into())
            .unwrap();
        assert_eq!(chain(&hops), ["app"]);
    }

    #[test]
    fn test_default_download_then_import() {
        let registry = LoaderRegistry::with_defaults();
        let entries = registry.resolution_order();
        let resolver = PathResolver::new(&entries).first_stage(Stage::Load);

        let hops = resolver
            .resolve(Stage::Preload, &".txt".into(), &TEXT_DOCUMENT)
            .unwrap();
        assert_eq!(hops[0].entry.stage, Stage::Load);
        assert_eq!(hops[0].to, TypeTag::ext(".txt"));
        assert_eq!(hops[1].entry.stage, Stage::Import);

        assert!(resolver.resolve(Stage::Preload, &".bin".into(), &TEXT_DOCUMENT).is_none());
    }

    #[test]
    fn test_stages_never_go_backwards() {
        let registry = LoaderRegistry::new();
        let a = Symbol::new("A");
        let b = Symbol::new("B");
        registry.processor(".x", a, Arc::new(Named("process")));
        registry.importer(a, b, Arc::new(Named("import")));

        let entries = registry.resolution_order();
        let resolver = PathResolver::new(&entries);
        assert!(resolver.resolve(Stage::Preload, &".x".into(), &b.into()).is_none());
        assert!(resolver.resolve(Stage::Preload, &".x".into(), &a.into()).is_some());
        assert!(resolver.resolve(Stage::Postprocess, &".x".into(), &a.into()).is_none());
    }

    #[test]
    fn test_first_stage_constraint() {
        let registry = LoaderRegistry::new();
        registry.importer(".json", JSON_DOCUMENT, Arc::new(Named("import")));

        let entries = registry.resolution_order();
        assert!(
            PathResolver::new(&entries)
                .first_stage(Stage::Load)
                .resolve(Stage::Preload, &".json".into(), &JSON_DOCUMENT)
                .is_none()
        );
        assert!(
            PathResolver::new(&entries)
                .resolve(Stage::Preload, &".json".into(), &JSON_DOCUMENT)
                .is_some()
        );
    }

    #[test]
    fn test_used_entries_are_excluded() {
        let registry = LoaderRegistry::with_defaults();
        let entries = registry.resolution_order();
        let download = registry.get_handlers(Stage::Load, &".json".into(), &JSON_DOCUMENT)[0].id;

        let used = HashSet::from([download]);
        let hops = PathResolver::new(&entries)
            .excluding(&used)
            .resolve(Stage::Load, &".json".into(), &JSON_DOCUMENT)
            .unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].entry.stage, Stage::Import);
    }

    #[test]
    fn test_pass_through_does_not_loop() {
        let registry = LoaderRegistry::new();
        registry.processor("*", "*", Arc::new(Named("noop")));

        let entries = registry.resolution_order();
        let target = Symbol::new("Never");
        assert!(
            PathResolver::new(&entries)
                .resolve(Stage::Preload, &".x".into(), &target.into())
                .is_none()
        );
    }

    #[test]
    fn test_mime_family_source() {
        let registry = LoaderRegistry::new();
        let image = Symbol::new("Image");
        registry.loader("image/*", image, Arc::new(Named("image")));

        let entries = registry.resolution_order();
        let hops = PathResolver::new(&entries)
            .resolve(Stage::Preload, &TypeTag::mime("image/png"), &image.into())
            .unwrap();
        assert_eq!(chain(&hops), ["image"]);
    }
}
