//! Library instance resolution and constructor ordering.
use crate::database::BuildDatabase;
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::module::ModuleData;
use crate::platform::PlatformData;
use crate::types::{ModuleType, NULL_LIBRARY_CLASS};
use fxhash::FxHashSet;
use indexmap::IndexMap;
use itertools::Itertools;
use petgraph::graph::NodeIndex;
use petgraph::prelude::StableGraph;
use petgraph::Direction;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, warn};

/// Library every legacy module links against.
const COMPILER_STUB: &str = "CompilerStub";

/// Dependency graph between library instances. An edge `lib -> consumer` means `consumer`
/// links against `lib`.
struct LibraryGraph {
    graph: StableGraph<Rc<ModuleData>, ()>,
    /// Nodes in the order their instances were resolved.
    order: IndexMap<MetaFile, NodeIndex>,
    constructors: FxHashSet<NodeIndex>,
}

impl LibraryGraph {
    fn new() -> Self {
        LibraryGraph {
            graph: StableGraph::new(),
            order: IndexMap::new(),
            constructors: FxHashSet::default(),
        }
    }

    fn node(&mut self, library: &Rc<ModuleData>) -> NodeIndex {
        if let Some(index) = self.order.get(&library.meta_file) {
            return *index;
        }
        let index = self.graph.add_node(library.clone());
        if !library.constructors.is_empty() {
            self.constructors.insert(index);
        }
        self.order.insert(library.meta_file.clone(), index);
        index
    }

    fn nodes(&self) -> Vec<NodeIndex> {
        self.order.values().copied().collect()
    }

    fn consumer_count(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Outgoing).count()
    }

    /// Drop one edge from a constructor node to a consumer without one. Returns whether anything
    /// was dropped, and the node left without consumers if there is one.
    fn relax(&mut self) -> (bool, Option<NodeIndex>) {
        let mut removed = false;
        for item in self.nodes() {
            if !self.constructors.contains(&item) {
                continue;
            }
            for consumer in self.nodes() {
                if self.constructors.contains(&consumer) {
                    continue;
                }
                let Some(edge) = self.graph.find_edge(item, consumer) else {
                    continue;
                };
                self.graph.remove_edge(edge);
                removed = true;
                if self.consumer_count(item) == 0 {
                    return (true, Some(item));
                }
            }
        }
        (removed, None)
    }

    /// Kahn's algorithm over the consumed-by edges. Yields destructor order.
    fn sort(mut self, platform: &MetaFile) -> AutoGenResult<Vec<Rc<ModuleData>>> {
        let mut queue: VecDeque<NodeIndex> = self
            .nodes()
            .into_iter()
            .filter(|n| self.consumer_count(*n) == 0)
            .collect();
        let mut sorted: Vec<NodeIndex> = vec![];

        loop {
            let mut removed = true;
            while queue.is_empty() && removed {
                let (edge_removed, freed) = self.relax();
                removed = edge_removed;
                if let Some(freed) = freed {
                    queue.push_front(freed);
                }
            }

            let Some(node) = queue.pop_back() else {
                break;
            };
            sorted.push(node);

            for item in self.nodes() {
                let Some(edge) = self.graph.find_edge(item, node) else {
                    continue;
                };
                self.graph.remove_edge(edge);
                if self.consumer_count(item) == 0 {
                    queue.push_front(item);
                }
            }
        }

        for item in self.nodes() {
            if self.consumer_count(item) != 0
                && self.constructors.contains(&item)
                && self.constructors.len() > 1
            {
                let consumers = self
                    .graph
                    .neighbors_directed(item, Direction::Outgoing)
                    .map(|c| self.graph[c].meta_file.to_string())
                    .join("\n\tconsumed by ");
                return Err(AutoGenError::build_error(format!(
                    "Library [{}] with constructors has a cycle",
                    self.graph[item].meta_file
                ))
                .in_file(platform)
                .with_extra(format!("\tconsumed by {}", consumers)));
            }
            if !sorted.contains(&item) {
                sorted.push(item);
            }
        }

        Ok(sorted.into_iter().map(|n| self.graph[n].clone()).collect())
    }
}

fn is_null_class(class: &str) -> bool {
    class.starts_with(NULL_LIBRARY_CLASS)
}

/// Library classes `module` uses, with the forced `NULL` instances the platform adds.
fn consumed_classes(platform: &PlatformData, module: &ModuleData) -> IndexMap<String, Option<MetaFile>> {
    let mut classes = module.library_classes.clone();

    // USER_DEFINED modules only get what they ask for
    if module.module_type != ModuleType::UserDefined {
        for class in platform.library_class_names().filter(|c| is_null_class(c)) {
            if let Some(instance) = platform.library_instance(class, module.module_type) {
                classes.insert(class.to_string(), Some(instance.clone()));
            }
        }
    }

    if let Some(component) = platform.modules.get(&module.meta_file) {
        for (class, instance) in &component.library_classes {
            if is_null_class(class) {
                classes.insert(class.clone(), Some(instance.clone()));
            }
        }
    }
    classes
}

/// Resolve the library instances `module` links against, in constructor order.
pub fn apply_library_instance(
    db: &BuildDatabase,
    platform: &PlatformData,
    module: &Rc<ModuleData>,
) -> AutoGenResult<Vec<Rc<ModuleData>>> {
    let module_type = module.module_type;
    let arch = &platform.arch;
    let component = platform.modules.get(&module.meta_file);

    let mut graph = LibraryGraph::new();
    let mut instances: IndexMap<String, Rc<ModuleData>> = IndexMap::new();
    let mut frontier: Vec<(Rc<ModuleData>, IndexMap<String, Option<MetaFile>>)> =
        vec![(module.clone(), consumed_classes(platform, module))];

    debug!(module = %module.meta_file, %arch, "resolving library instances");
    while let Some((consumer, classes)) = frontier.pop() {
        for (class, default) in &classes {
            let library = match instances.get(class) {
                Some(library) => library.clone(),
                None => {
                    let path = component
                        .and_then(|c| c.library_classes.get(class))
                        .or_else(|| platform.library_instance(class, module_type))
                        .or(default.as_ref())
                        .ok_or_else(|| {
                            AutoGenError::resource_not_available(format!(
                                "Instance of library class [{}] is not found",
                                class
                            ))
                            .in_file(&platform.meta_file)
                            .with_extra(format!(
                                "in [{}] [{}]\n\tconsumed by module [{}]",
                                consumer.meta_file, arch, module.meta_file
                            ))
                        })?;

                    let library = db.module(path, arch)?;
                    // Forced instances link regardless of the types they declare
                    if !is_null_class(class) {
                        let supported = library
                            .library_class
                            .first()
                            .is_some_and(|decl| module_type == ModuleType::UserDefined || decl.supports(module_type));
                        if !supported {
                            return Err(AutoGenError::option_missing(format!(
                                "Module type [{}] is not supported by library instance [{}]",
                                module_type, path
                            ))
                            .in_file(&platform.meta_file)
                            .with_extra(format!("consumed by [{}]", module.meta_file)));
                        }
                    }

                    debug!("\t{} : {}", class, library.meta_file);
                    instances.insert(class.clone(), library.clone());
                    frontier.push((library.clone(), library.library_classes.clone()));
                    library
                }
            };

            let library_node = graph.node(&library);
            if !Rc::ptr_eq(&consumer, module) {
                let consumer_node = graph.node(&consumer);
                if graph.graph.find_edge(library_node, consumer_node).is_none() {
                    graph.graph.add_edge(library_node, consumer_node, ());
                }
            }
        }
    }

    let mut libraries = graph.sort(&platform.meta_file)?;
    libraries.reverse();
    Ok(libraries)
}

/// Libraries `module` links against: none for a library, the legacy name references for a legacy
/// module, the bound class instances otherwise.
pub fn linked_libraries(
    db: &BuildDatabase,
    platform: &PlatformData,
    module: &Rc<ModuleData>,
) -> AutoGenResult<Vec<Rc<ModuleData>>> {
    if module.is_library() {
        Ok(vec![])
    } else if module.is_legacy() {
        resolve_library_reference(db, platform, module)
    } else {
        apply_library_instance(db, platform, module)
    }
}

/// Resolve the libraries a legacy module names. Names the platform does not know are skipped.
pub fn resolve_library_reference(
    db: &BuildDatabase,
    platform: &PlatformData,
    module: &Rc<ModuleData>,
) -> AutoGenResult<Vec<Rc<ModuleData>>> {
    let arch = &platform.arch;
    let mut names = module.libraries.clone();
    if !names.is_empty() {
        names.push(COMPILER_STUB.to_string());
    }

    let mut libraries: Vec<Rc<ModuleData>> = vec![];
    let mut frontier = vec![(module.clone(), names)];
    while let Some((consumer, names)) = frontier.pop() {
        for name in &names {
            let path = platform.legacy_libraries.get(name).or_else(|| {
                platform
                    .legacy_libraries
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, path)| path)
            });
            let Some(path) = path else {
                warn!(
                    file = %consumer.meta_file,
                    "Library [{}] is not found\n\t{} [{}]",
                    name, module.meta_file, arch
                );
                continue;
            };

            let library = db.module(path, arch)?;
            if !libraries.iter().any(|l| Rc::ptr_eq(l, &library)) {
                debug!("\t{} : {}", name, library.meta_file);
                libraries.push(library.clone());
                frontier.push((library.clone(), library.libraries.clone()));
            }
        }
    }
    Ok(libraries)
}
