//! Elimination-tree layouts.
//!
//! Sparse factorizations work on data ordered along an elimination tree,
//! while the rest of the solver stores vectors in their natural block row
//! distribution. This module holds the tree description ([`DistSymmInfo`]),
//! a reference nested-dissection ordering that produces it, and the nodal
//! multivector that converts between the two layouts.

pub mod dissection;
pub mod info;
pub mod multivec;

pub use dissection::{nested_dissection, DistNodalTree, NestedDissectionCtrl};
pub use info::{DistSymmInfo, DistSymmNodeInfo, SymmNodeInfo};
pub use multivec::DistNodalMultiVec;
