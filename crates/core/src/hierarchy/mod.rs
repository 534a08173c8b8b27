//! Logical scene tree reconstruction.
//!
//! A [`Hierarchy`] is built per document from its flat object arena: scene
//! nodes, attached components, parent/child edges, and instance nodes that
//! stand in for instanced sub-trees through placeholder objects and override
//! records.

pub mod builder;
pub mod tree;

pub use tree::{
    ComponentRef, Hierarchy, InstanceSource, NodeId, NodeKind, OverrideRecord, TemplateRef,
    TreeNode,
};
