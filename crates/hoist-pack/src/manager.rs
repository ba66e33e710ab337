use hoist_dist::{BuildModule, Descriptor};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Sentinel depth: flatten everything handed to one `add_modules` call into
/// a single group, regardless of composition depth.
pub const FLATTEN_MAX_DEPTH: i32 = -1;

/// Depth at which only the top-level module keeps its own layer.
pub const FLATTEN_NONE: i32 = 0;

/// Decides, per the configured policy, which modules are merged into shared
/// layers and which stay individual.
///
/// Group lists are owned by a single assembly invocation; the manager holds
/// no cross-invocation state.
pub struct ModuleManager {
    modules: Vec<Arc<dyn BuildModule>>,
    flatten_groups: Vec<Vec<Arc<dyn BuildModule>>>,
    flatten: bool,
    max_depth: i32,
}

impl ModuleManager {
    pub fn new(flatten: bool, max_depth: i32) -> Self {
        Self {
            modules: Vec::new(),
            flatten_groups: Vec::new(),
            flatten,
            max_depth,
        }
    }

    /// All managed modules, individual and flattened alike.
    pub fn modules(&self) -> Vec<Arc<dyn BuildModule>> {
        let mut all = self.modules.clone();
        for group in &self.flatten_groups {
            all.extend(group.iter().cloned());
        }
        all
    }

    /// The recorded flatten groups; empty when flattening is disabled.
    pub fn flatten_groups(&self) -> &[Vec<Arc<dyn BuildModule>>] {
        if self.flatten {
            &self.flatten_groups
        } else {
            &[]
        }
    }

    /// Record a root module and its dependencies, either as individual
    /// layers (flattening disabled), one shared group (unlimited depth), or
    /// a bounded-depth partition of the composition tree.
    pub fn add_modules(&mut self, root: Arc<dyn BuildModule>, deps: Vec<Arc<dyn BuildModule>>) {
        if !self.flatten {
            self.modules.push(root);
            self.modules.extend(deps);
        } else if self.max_depth <= FLATTEN_MAX_DEPTH {
            let mut group = vec![root];
            group.extend(deps);
            self.flatten_groups.push(group);
        } else {
            let groups = calculate_flatten_groups(root, deps, 0, self.max_depth);
            self.flatten_groups.extend(groups);
        }
    }

    /// Whether the module landed in any flatten group.
    pub fn is_flatten(&self, module: &dyn BuildModule) -> bool {
        if !self.flatten {
            return false;
        }
        let full_name = module.descriptor().full_name();
        self.flatten_groups
            .iter()
            .any(|group| group.iter().any(|m| m.descriptor().full_name() == full_name))
    }
}

/// Partition `root` and `deps` into flatten groups, recursing one level per
/// meta-module until `max_depth`.
///
/// A meta-module below the depth limit becomes its own group and its
/// order-referenced dependencies recurse with the remaining dependency set;
/// at the limit, the module and every still-unconsumed dependency collapse
/// into one terminal group. Leaves are singleton groups.
fn calculate_flatten_groups(
    root: Arc<dyn BuildModule>,
    deps: Vec<Arc<dyn BuildModule>>,
    depth: i32,
    max_depth: i32,
) -> Vec<Vec<Arc<dyn BuildModule>>> {
    let mut groups = Vec::new();
    if root.descriptor().is_meta() {
        if depth == max_depth {
            let mut group = vec![root];
            group.extend(deps);
            groups.push(group);
        } else if depth < max_depth {
            let referenced = referenced_full_names(root.descriptor());
            let (children, remaining) = partition_deps(&referenced, deps);
            groups.push(vec![root]);
            for child in children {
                groups.extend(calculate_flatten_groups(
                    child,
                    remaining.clone(),
                    depth + 1,
                    max_depth,
                ));
            }
        }
    } else {
        groups.push(vec![root]);
    }
    groups
}

fn referenced_full_names(descriptor: &Descriptor) -> BTreeSet<String> {
    descriptor
        .order
        .iter()
        .flat_map(|order| order.group.iter().map(|entry| entry.info.full_name()))
        .collect()
}

/// Split dependencies into those consumed by the order references and the
/// rest, matching by full name.
fn partition_deps(
    referenced: &BTreeSet<String>,
    deps: Vec<Arc<dyn BuildModule>>,
) -> (Vec<Arc<dyn BuildModule>>, Vec<Arc<dyn BuildModule>>) {
    let mut consumed = Vec::new();
    let mut remaining = Vec::new();
    for dep in deps {
        if referenced.contains(&dep.descriptor().full_name()) {
            consumed.push(dep);
        } else {
            remaining.push(dep);
        }
    }
    (consumed, remaining)
}
