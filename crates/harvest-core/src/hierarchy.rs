//! Issue type hierarchy: which types may appear beneath which.
//!
//! The hierarchy is a forest of [`IssueType`]s keyed by numeric id. It is
//! validated once at construction (no cycles, no dangling child ids) and is
//! immutable afterwards. Lookups never fail: an id the hierarchy does not know
//! resolves to the sentinel "unknown" type, which is always a leaf.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Numeric identifier of an issue type in the upstream source.
pub type TypeId = i64;

/// Id of the sentinel type used for records whose type is not configured.
pub const UNKNOWN_TYPE_ID: TypeId = -1;

/// Display name of the sentinel type.
pub const UNKNOWN_TYPE_NAME: &str = "Unknown";

/// A configured issue type and the types allowed as its direct children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueType {
    pub id: TypeId,
    pub name: String,
    #[serde(default)]
    pub children: Vec<TypeId>,
}

impl IssueType {
    pub fn new(id: TypeId, name: impl Into<String>, children: impl Into<Vec<TypeId>>) -> Self {
        Self {
            id,
            name: name.into(),
            children: children.into(),
        }
    }

    /// Returns `true` if this is the sentinel "unknown" type.
    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_TYPE_ID
    }

    /// Returns `true` if no child types are configured.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Errors raised while building an [`IssueTypeHierarchy`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    /// No types were configured.
    #[error("issue type hierarchy is empty")]
    Empty,

    /// Two types share an id.
    #[error("duplicate issue type id {0}")]
    DuplicateId(TypeId),

    /// Two types share a name.
    #[error("duplicate issue type name {0:?}")]
    DuplicateName(String),

    /// A configured type uses the sentinel id.
    #[error("issue type id {UNKNOWN_TYPE_ID} is reserved for unknown types")]
    ReservedId,

    /// A child id does not name any configured type.
    #[error("issue type {parent} lists unknown child type {child}")]
    UnknownChild {
        parent: TypeId,
        child: TypeId,
    },

    /// The parent/child relation contains a cycle.
    #[error("issue type hierarchy contains a cycle: {}", format_path(.path))]
    Cycle {
        /// The type ids along the cycle, first id repeated at the end.
        path: Vec<TypeId>,
    },
}

fn format_path(path: &[TypeId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Validated, immutable mapping from type id to its child type ids.
#[derive(Debug, Clone)]
pub struct IssueTypeHierarchy {
    types: BTreeMap<TypeId, IssueType>,
    by_name: HashMap<String, TypeId>,
    roots: Vec<TypeId>,
    sentinel: IssueType,
}

impl IssueTypeHierarchy {
    /// Builds and validates a hierarchy.
    ///
    /// Duplicate entries within a child list are dropped (first occurrence
    /// wins) so each `children` list behaves as an ordered set.
    pub fn from_types(types: impl IntoIterator<Item = IssueType>) -> Result<Self, HierarchyError> {
        let mut map = BTreeMap::new();
        let mut by_name = HashMap::new();

        for mut t in types {
            if t.id == UNKNOWN_TYPE_ID {
                return Err(HierarchyError::ReservedId);
            }
            let mut seen = Vec::with_capacity(t.children.len());
            t.children.retain(|c| {
                if seen.contains(c) {
                    false
                } else {
                    seen.push(*c);
                    true
                }
            });
            if by_name.insert(t.name.clone(), t.id).is_some() {
                return Err(HierarchyError::DuplicateName(t.name));
            }
            let id = t.id;
            if map.insert(id, t).is_some() {
                return Err(HierarchyError::DuplicateId(id));
            }
        }

        if map.is_empty() {
            return Err(HierarchyError::Empty);
        }

        for t in map.values() {
            for child in &t.children {
                if !map.contains_key(child) {
                    return Err(HierarchyError::UnknownChild {
                        parent: t.id,
                        child: *child,
                    });
                }
            }
        }

        detect_cycle(&map)?;

        let roots = map
            .keys()
            .copied()
            .filter(|id| !map.values().any(|t| t.children.contains(id)))
            .collect();

        Ok(Self {
            types: map,
            by_name,
            roots,
            sentinel: IssueType::new(UNKNOWN_TYPE_ID, UNKNOWN_TYPE_NAME, Vec::new()),
        })
    }

    /// Returns the child type ids of `id`, empty for leaves and unknown ids.
    pub fn children_of(&self, id: TypeId) -> &[TypeId] {
        self.types
            .get(&id)
            .map(|t| t.children.as_slice())
            .unwrap_or(&[])
    }

    /// Looks up a configured type by id.
    pub fn get(&self, id: TypeId) -> Option<&IssueType> {
        self.types.get(&id)
    }

    /// Looks up a configured type by its exact name.
    pub fn find_by_name(&self, name: &str) -> Option<&IssueType> {
        self.by_name.get(name).and_then(|id| self.types.get(id))
    }

    /// Maps an upstream type to a configured one: by id first, then by name,
    /// falling back to the sentinel.
    pub fn resolve(&self, id: Option<TypeId>, name: Option<&str>) -> &IssueType {
        if let Some(t) = id.and_then(|id| self.types.get(&id)) {
            return t;
        }
        if let Some(t) = name.and_then(|n| self.find_by_name(n)) {
            return t;
        }
        &self.sentinel
    }

    /// The sentinel "unknown" type.
    pub fn unknown(&self) -> &IssueType {
        &self.sentinel
    }

    /// Names of the given ids, skipping any the hierarchy does not know.
    pub fn names_of(&self, ids: &[TypeId]) -> Vec<&str> {
        ids.iter()
            .filter_map(|id| self.types.get(id))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Type ids that are nobody's child, in ascending id order.
    pub fn roots(&self) -> &[TypeId] {
        &self.roots
    }

    /// All configured types in ascending id order (sentinel excluded).
    pub fn types(&self) -> impl Iterator<Item = &IssueType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Non-fatal observations about the hierarchy's shape.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.roots.len() != 1 {
            warnings.push(format!(
                "expected exactly one root type, found {} ({})",
                self.roots.len(),
                self.names_of(&self.roots).join(", ")
            ));
        }
        for t in self.types.values() {
            if self.roots.contains(&t.id) && t.is_leaf() && self.types.len() > 1 {
                warnings.push(format!("type {:?} is disconnected from the hierarchy", t.name));
            }
        }
        warnings
    }

    /// Longest root-to-leaf chain, counted in levels.
    pub fn depth(&self) -> usize {
        fn walk(h: &IssueTypeHierarchy, id: TypeId) -> usize {
            1 + h
                .children_of(id)
                .iter()
                .map(|c| walk(h, *c))
                .max()
                .unwrap_or(0)
        }
        self.roots.iter().map(|r| walk(self, *r)).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycle(types: &BTreeMap<TypeId, IssueType>) -> Result<(), HierarchyError> {
    let mut marks: HashMap<TypeId, Mark> = HashMap::new();
    let mut stack: Vec<TypeId> = Vec::new();

    fn visit(
        id: TypeId,
        types: &BTreeMap<TypeId, IssueType>,
        marks: &mut HashMap<TypeId, Mark>,
        stack: &mut Vec<TypeId>,
    ) -> Result<(), HierarchyError> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                let mut path = stack[start..].to_vec();
                path.push(id);
                return Err(HierarchyError::Cycle { path });
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        stack.push(id);
        if let Some(t) = types.get(&id) {
            for child in &t.children {
                visit(*child, types, marks, stack)?;
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for id in types.keys() {
        visit(*id, types, &mut marks, &mut stack)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// PV -> {FEAT, CA}, FEAT -> {STORY, TASK}, CA -> {STORY}
    fn sample() -> IssueTypeHierarchy {
        IssueTypeHierarchy::from_types(vec![
            IssueType::new(10, "Product Version", vec![20, 30]),
            IssueType::new(20, "Feature", vec![40, 50]),
            IssueType::new(30, "Customer Adoption", vec![40]),
            IssueType::new(40, "Story", vec![]),
            IssueType::new(50, "Task", vec![]),
        ])
        .unwrap()
    }

    #[test]
    fn children_of_known_and_unknown() {
        let h = sample();
        assert_eq!(h.children_of(10), &[20, 30]);
        assert_eq!(h.children_of(30), &[40]);
        assert!(h.children_of(40).is_empty());
        assert!(h.children_of(999).is_empty());
        assert!(h.children_of(UNKNOWN_TYPE_ID).is_empty());
    }

    #[test]
    fn resolve_prefers_id_then_name() {
        let h = sample();
        assert_eq!(h.resolve(Some(20), Some("Story")).id, 20);
        assert_eq!(h.resolve(Some(777), Some("Story")).id, 40);
        assert_eq!(h.resolve(None, Some("Task")).id, 50);
        let unknown = h.resolve(Some(777), Some("Epic"));
        assert!(unknown.is_unknown());
        assert!(unknown.is_leaf());
        assert_eq!(unknown.name, UNKNOWN_TYPE_NAME);
    }

    #[test]
    fn roots_and_depth() {
        let h = sample();
        assert_eq!(h.roots(), &[10]);
        assert_eq!(h.depth(), 3);
        assert!(h.warnings().is_empty());
    }

    #[test]
    fn names_of_skips_unknown() {
        let h = sample();
        assert_eq!(h.names_of(&[20, 999, 30]), vec!["Feature", "Customer Adoption"]);
    }

    #[test]
    fn duplicate_children_collapse() {
        let h = IssueTypeHierarchy::from_types(vec![
            IssueType::new(1, "A", vec![2, 2, 3, 2]),
            IssueType::new(2, "B", vec![]),
            IssueType::new(3, "C", vec![]),
        ])
        .unwrap();
        assert_eq!(h.children_of(1), &[2, 3]);
    }

    #[test]
    fn rejects_cycle() {
        let err = IssueTypeHierarchy::from_types(vec![
            IssueType::new(1, "A", vec![2]),
            IssueType::new(2, "B", vec![3]),
            IssueType::new(3, "C", vec![1]),
        ])
        .unwrap_err();
        assert_eq!(err, HierarchyError::Cycle { path: vec![1, 2, 3, 1] });
        assert_eq!(
            err.to_string(),
            "issue type hierarchy contains a cycle: 1 -> 2 -> 3 -> 1"
        );
    }

    #[test]
    fn rejects_self_loop() {
        let err = IssueTypeHierarchy::from_types(vec![IssueType::new(1, "A", vec![1])]).unwrap_err();
        assert_eq!(err, HierarchyError::Cycle { path: vec![1, 1] });
    }

    #[test]
    fn rejects_dangling_child() {
        let err = IssueTypeHierarchy::from_types(vec![IssueType::new(1, "A", vec![9])]).unwrap_err();
        assert_eq!(err, HierarchyError::UnknownChild { parent: 1, child: 9 });
    }

    #[test]
    fn rejects_reserved_and_duplicates() {
        assert_eq!(
            IssueTypeHierarchy::from_types(vec![IssueType::new(-1, "X", vec![])]).unwrap_err(),
            HierarchyError::ReservedId
        );
        assert_eq!(
            IssueTypeHierarchy::from_types(vec![
                IssueType::new(1, "A", vec![]),
                IssueType::new(1, "B", vec![]),
            ])
            .unwrap_err(),
            HierarchyError::DuplicateId(1)
        );
        assert_eq!(
            IssueTypeHierarchy::from_types(vec![
                IssueType::new(1, "A", vec![]),
                IssueType::new(2, "A", vec![]),
            ])
            .unwrap_err(),
            HierarchyError::DuplicateName("A".into())
        );
        assert_eq!(
            IssueTypeHierarchy::from_types(Vec::new()).unwrap_err(),
            HierarchyError::Empty
        );
    }

    #[test]
    fn warns_on_multiple_roots() {
        let h = IssueTypeHierarchy::from_types(vec![
            IssueType::new(1, "A", vec![2]),
            IssueType::new(2, "B", vec![]),
            IssueType::new(3, "C", vec![]),
        ])
        .unwrap();
        let warnings = h.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("found 2 (A, C)"));
        assert!(warnings[1].contains("\"C\""));
    }
}
