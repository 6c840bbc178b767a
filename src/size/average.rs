//! Propagation of element sizes to the vertices.
//!
//! A vertex receives the minimum target size over its incident elements
//! (the smallest requested size wins). On a partitioned mesh parts of a
//! vertex star may live on other ranks: such vertices are deferred, their
//! remote copies are requested, and the worklist is drained again once the
//! requests are answered. A vertex shared between ranks therefore sees its
//! complete star before it is evaluated, and every sharing rank computes
//! the identical minimum.

use crate::{
    field::{ElemSizeField, VertexSizeField},
    mesh::CavityMesh,
    H_MAX,
};
use log::{debug, warn};
use std::collections::VecDeque;

/// Create the vertex size field `name` and fill it from the element sizes.
/// The element size field is destroyed once the traversal completes.
pub(crate) fn average_size_field<M: CavityMesh>(
    mesh: &mut M,
    elem_size: ElemSizeField,
    name: &str,
) -> VertexSizeField {
    let mut elem_size = elem_size;
    let mut vtx_size = VertexSizeField::new(name, mesh.n_verts());
    average_into(mesh, &mut elem_size, &mut vtx_size);
    vtx_size
}

/// Worklist traversal over the vertices. Vertices already holding a value
/// are skipped, so re-entry is a no-op per assigned vertex. Vertices whose
/// star is not locally complete are re-enqueued after one blocking
/// resolution of the pending locality requests per pass; no recursion and
/// no nested requests are involved, so termination only depends on the
/// requests being answered.
pub(crate) fn average_into<M: CavityMesh>(
    mesh: &mut M,
    elem_size: &mut ElemSizeField,
    vtx_size: &mut VertexSizeField,
) {
    debug!("average the element sizes to the vertices");
    let mut worklist: VecDeque<usize> = (0..mesh.n_verts()).collect();
    let mut deferred = Vec::new();
    let mut n_passes = 0;
    while !worklist.is_empty() {
        n_passes += 1;
        while let Some(i_vert) = worklist.pop_front() {
            if vtx_size.is_set(i_vert) {
                continue;
            }
            if !mesh.request_star(i_vert) {
                deferred.push(i_vert);
                continue;
            }
            let mut h = H_MAX;
            let mut empty = true;
            for i_elem in mesh.vertex_star(i_vert) {
                h = f64::min(h, elem_size.get(i_elem));
                empty = false;
            }
            if empty {
                warn!("no element is incident to vertex {i_vert}");
            }
            vtx_size.set(i_vert, h);
        }
        if !deferred.is_empty() {
            mesh.resolve_requests(elem_size);
            worklist.extend(deferred.drain(..));
        }
    }
    debug!("vertex sizes assigned in {n_passes} passes");
}
