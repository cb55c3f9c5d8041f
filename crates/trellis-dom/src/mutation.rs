//! Mutation records queued by the document for an external observer.

use trellis_common::NodeId;

/// A structural or attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// An attribute value changed.
    Attributes {
        target: NodeId,
        name: String,
        namespace: Option<String>,
        old_value: Option<String>,
    },
    /// Text of a character data node changed.
    CharacterData {
        target: NodeId,
        old_value: String,
    },
    /// Children were added or removed.
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        previous_sibling: Option<NodeId>,
        next_sibling: Option<NodeId>,
    },
}

impl MutationRecord {
    /// `"attributes"`, `"characterData"` or `"childList"`.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationRecord::Attributes { .. } => "attributes",
            MutationRecord::CharacterData { .. } => "characterData",
            MutationRecord::ChildList { .. } => "childList",
        }
    }

    /// The node the record is about.
    pub fn target(&self) -> NodeId {
        match self {
            MutationRecord::Attributes { target, .. }
            | MutationRecord::CharacterData { target, .. }
            | MutationRecord::ChildList { target, .. } => *target,
        }
    }
}
