//! The closed set of mutating operations tracked per entity type.

use std::fmt;

/// Whether an operation applies to the entity type as a whole or to a single
/// instance of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationScope {
    /// Applies to every record matching a filter or id
    Type,
    /// Applies to one document (`save`)
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutatingOperation {
    FindOneAndUpdate,
    FindByIdAndUpdate,
    FindOneAndRemove,
    FindByIdAndRemove,
    Remove,
    Update,
    Save,
}

impl MutatingOperation {
    /// Type-level operations in the order they are scanned for diagnostics.
    pub const TYPE_LEVEL: [MutatingOperation; 6] = [
        MutatingOperation::FindOneAndUpdate,
        MutatingOperation::FindByIdAndUpdate,
        MutatingOperation::FindOneAndRemove,
        MutatingOperation::FindByIdAndRemove,
        MutatingOperation::Remove,
        MutatingOperation::Update,
    ];

    pub const INSTANCE_LEVEL: [MutatingOperation; 1] = [MutatingOperation::Save];

    pub fn in_scope(scope: OperationScope) -> &'static [MutatingOperation] {
        match scope {
            OperationScope::Type => &Self::TYPE_LEVEL,
            OperationScope::Instance => &Self::INSTANCE_LEVEL,
        }
    }

    pub fn all() -> impl Iterator<Item = MutatingOperation> {
        Self::TYPE_LEVEL
            .into_iter()
            .chain(Self::INSTANCE_LEVEL)
    }

    pub fn scope(&self) -> OperationScope {
        match self {
            MutatingOperation::Save => OperationScope::Instance,
            _ => OperationScope::Type,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MutatingOperation::FindOneAndUpdate => "find_one_and_update",
            MutatingOperation::FindByIdAndUpdate => "find_by_id_and_update",
            MutatingOperation::FindOneAndRemove => "find_one_and_remove",
            MutatingOperation::FindByIdAndRemove => "find_by_id_and_remove",
            MutatingOperation::Remove => "remove",
            MutatingOperation::Update => "update",
            MutatingOperation::Save => "save",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|op| op.name() == name)
    }

    /// Qualified call form used in diagnostics: `Item.remove()` for type-level
    /// operations, `Item#save()` for instance-level ones.
    pub fn describe(&self, model_name: &str) -> String {
        match self.scope() {
            OperationScope::Type => format!("{}.{}()", model_name, self.name()),
            OperationScope::Instance => format!("{}#{}()", model_name, self.name()),
        }
    }
}

impl fmt::Display for MutatingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_partition_all_operations() {
        let all: Vec<_> = MutatingOperation::all().collect();
        assert_eq!(all.len(), 7);
        for op in all {
            assert!(MutatingOperation::in_scope(op.scope()).contains(&op));
        }
    }

    #[test]
    fn test_name_roundtrip() {
        for op in MutatingOperation::all() {
            assert_eq!(MutatingOperation::from_name(op.name()), Some(op));
        }
        assert_eq!(MutatingOperation::from_name("create"), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(MutatingOperation::Remove.describe("Item"), "Item.remove()");
        assert_eq!(MutatingOperation::Save.describe("Item"), "Item#save()");
    }
}
