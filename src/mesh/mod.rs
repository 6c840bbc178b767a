//! Interface to the distributed mesh collaborator.
//!
//! The mesh is owned and mutated outside of this crate; the sizing
//! pipeline only consumes entity iteration, adjacency, geometric measures
//! and the partition locality services defined here.

pub mod test_meshes;

use crate::{field::ElemSizeField, Dim};

/// Read access to one rank's shard of a partitioned simplex mesh.
///
/// Elements are the entities of highest topological dimension. Locally
/// resident elements are indexed `0..n_elems()`, owned elements first,
/// ghost copies (received through locality requests) after them.
pub trait Mesh: Send + Sync {
    /// Topological dimension (1, 2 or 3)
    fn dim(&self) -> Dim;

    /// Number of locally resident vertices
    fn n_verts(&self) -> usize;

    /// Number of locally resident elements, ghost copies included
    fn n_elems(&self) -> usize;

    /// Whether element `i_elem` is owned by the local partition
    fn is_owned_elem(&self, i_elem: usize) -> bool;

    /// Bounding edges of an element (downward adjacency); for `dim() == 1`
    /// the element is its own bounding edge
    fn elem_edges(&self, i_elem: usize) -> impl Iterator<Item = usize> + '_;

    /// Geometric length of an edge
    fn edge_length(&self, i_edge: usize) -> f64;

    /// Elements incident to a vertex (upward adjacency), ghost copies
    /// included
    fn vertex_star(&self, i_vert: usize) -> impl Iterator<Item = usize> + '_;
}

/// Locality services used by the vertex traversal on partitioned meshes.
///
/// Implementations must guarantee that once a request issued by
/// `request_star` has been answered by `resolve_requests`, a further
/// `request_star` call for the same vertex returns true, so that every
/// deferred vertex is eventually computable.
pub trait CavityMesh: Mesh {
    /// True if every element incident to `i_vert` is locally resident.
    /// Otherwise a locality request for the missing remote copies is
    /// recorded and false is returned.
    fn request_star(&mut self, i_vert: usize) -> bool;

    /// Answer all pending locality requests. Blocking, and collective over
    /// the partition: every rank enters once per traversal pass. Newly
    /// received ghost elements extend the local element range and carry
    /// their entry of `elem_size` with them.
    fn resolve_requests(&mut self, elem_size: &mut ElemSizeField);
}
