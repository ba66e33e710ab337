use serde::{Deserialize, Serialize};

/// A base-OS environment a module declares compatibility with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<String>,
}

impl Stack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mixins: Vec::new(),
        }
    }
}

/// Intersect two stack lists by id. Mixins of matching stacks are unioned
/// and sorted, so the merge is order-insensitive on the mixin side.
pub fn merge_compatible(a: &[Stack], b: &[Stack]) -> Vec<Stack> {
    let mut merged = Vec::new();
    for sa in a {
        if let Some(sb) = b.iter().find(|s| s.id == sa.id) {
            let mut mixins = sa.mixins.clone();
            for mixin in &sb.mixins {
                if !mixins.contains(mixin) {
                    mixins.push(mixin.clone());
                }
            }
            mixins.sort();
            merged.push(Stack {
                id: sa.id.clone(),
                mixins,
            });
        }
    }
    merged
}
