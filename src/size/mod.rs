//! Error-driven isotropic target size fields.
//!
//! A nonnegative per-element error indicator is converted into a
//! continuous per-vertex target size field, scaled so that equidistributing
//! the error leads the adapted mesh to a prescribed number of elements.
//! The resizing of every element is bounded to avoid over-refinement or
//! over-coarsening in a single adaptation step.

mod average;

use crate::{
    field::{ElemSizeField, ErrorField, VertexSizeField},
    mesh::{CavityMesh, Mesh},
    parallel::Reduction,
};
use log::{debug, info};
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use std::time::Instant;

/// Bounds and polynomial order for the error-to-size transformation
#[derive(Clone, Copy, Debug)]
pub struct SizeParams {
    /// Polynomial order of the discretization
    pub polynomial_order: u32,
    /// Shrink bound: an element may not shrink below `alpha * h`
    pub alpha: f64,
    /// Growth bound: an element may not grow beyond `beta * h`
    pub beta: f64,
}

impl Default for SizeParams {
    fn default() -> Self {
        Self {
            polynomial_order: 1,
            alpha: 0.5,
            beta: 2.0,
        }
    }
}

/// Short-lived aggregate for one size field computation; owns the error
/// field, which is destroyed with it at the end of the pipeline
struct Specification<'a> {
    error: ErrorField,
    params: SizeParams,
    target: usize,
    name: &'a str,
    size_factor: f64,
}

impl Specification<'_> {
    /// Global error measure
    /// ```math
    /// G = \sum_e \theta_e^{2d / (2p + d)}
    /// ```
    /// summed over the locally owned elements, then reduced over all ranks
    /// (blocking)
    fn sum_contributions<M: Mesh, C: Reduction>(&self, mesh: &M, comm: &C) -> f64 {
        let d = f64::from(mesh.dim());
        let p = f64::from(self.params.polynomial_order);
        let expo = 2.0 * d / (2.0 * p + d);
        let error = &self.error;
        let local: f64 = (0..mesh.n_elems())
            .into_par_iter()
            .filter(|&i_elem| mesh.is_owned_elem(i_elem))
            .map(|i_elem| f64::powf(error.get(i_elem), expo))
            .sum();
        comm.sum(local)
    }

    /// Global size factor `(G / N)^{1 / d}` for a target of `N` elements
    fn compute_size_factor<M: Mesh, C: Reduction>(&mut self, mesh: &M, comm: &C) {
        debug!(
            "aggregate the error contributions on rank {} / {}",
            comm.rank(),
            comm.n_ranks()
        );
        let d = f64::from(mesh.dim());
        let g = self.sum_contributions(mesh, comm);
        let factor = f64::powf(g / self.target as f64, 1.0 / d);
        debug!("global error measure = {g:.6e}, size factor = {factor:.6e}");
        self.size_factor = factor;
    }

    /// Bounded target size of one element
    /// ```math
    /// h_{new} = \min(\beta h, \max(\alpha h, s \, \theta_e^{-2 / (2p + d)} \, h))
    /// ```
    /// where `h` is the longest bounding edge. The bounds are applied even
    /// when the raw value already lies within them, so a vanishing or
    /// diverging indicator saturates at `beta * h` or `alpha * h`.
    fn new_size<M: Mesh>(&self, mesh: &M, i_elem: usize) -> f64 {
        let d = f64::from(mesh.dim());
        let p = f64::from(self.params.polynomial_order);
        let h = current_size(mesh, i_elem);
        let theta = self.error.get(i_elem);
        let r = f64::powf(theta, -2.0 / (2.0 * p + d));
        let h_new = self.size_factor * r * h;
        f64::min(self.params.beta * h, f64::max(self.params.alpha * h, h_new))
    }

    /// Target sizes for all locally resident elements
    fn elem_sizes<M: Mesh>(&self, mesh: &M) -> ElemSizeField {
        debug!("compute the target element sizes");
        let vals: Vec<f64> = (0..mesh.n_elems())
            .into_par_iter()
            .map(|i_elem| self.new_size(mesh, i_elem))
            .collect();
        ElemSizeField::new(vals)
    }
}

/// Longest bounding edge of an element
fn current_size<M: Mesh>(mesh: &M, i_elem: usize) -> f64 {
    mesh.elem_edges(i_elem)
        .map(|i_edge| mesh.edge_length(i_edge))
        .fold(0.0, f64::max)
}

/// Compute the vertex target size field `name` from a per-element error
/// indicator, scaled so the adapted mesh reaches `target` elements.
///
/// The error field is consumed. The intermediate element size field is
/// destroyed once the vertex averaging completes.
pub fn iso_target_size<M: CavityMesh, C: Reduction>(
    mesh: &mut M,
    comm: &C,
    error: ErrorField,
    target: usize,
    params: SizeParams,
    name: &str,
) -> VertexSizeField {
    assert!(target > 0, "target element count must be positive");
    assert!(
        params.polynomial_order >= 1,
        "polynomial order must be at least 1"
    );
    assert!(
        params.alpha <= 1.0 && params.beta >= 1.0,
        "size bounds must satisfy alpha <= 1 <= beta"
    );
    assert_eq!(
        error.len(),
        mesh.n_elems(),
        "one error value per element expected"
    );

    let now = Instant::now();
    let mut spec = Specification {
        error,
        params,
        target,
        name,
        size_factor: 0.0,
    };
    spec.compute_size_factor(mesh, comm);
    let elem_size = spec.elem_sizes(mesh);
    let vtx_size = average::average_size_field(mesh, elem_size, spec.name);
    info!(
        "isotropic target size field '{}' computed in {:.2e} s",
        spec.name,
        now.elapsed().as_secs_f64()
    );
    vtx_size
}

/// Pointwise minimum of three vertex size fields, producing `min_size`.
///
/// The smallest requested size wins at every vertex. All three inputs are
/// consumed and must not be referenced afterwards.
#[must_use]
pub fn min_size_field(
    s1: VertexSizeField,
    s2: VertexSizeField,
    s3: VertexSizeField,
) -> VertexSizeField {
    let n_verts = s1.len();
    assert_eq!(s2.len(), n_verts, "size fields defined on different meshes");
    assert_eq!(s3.len(), n_verts, "size fields defined on different meshes");
    debug!("combine '{}', '{}' and '{}'", s1.name(), s2.name(), s3.name());
    let mut res = VertexSizeField::new("min_size", n_verts);
    for i_vert in 0..n_verts {
        let h = f64::min(s1.get(i_vert), f64::min(s2.get(i_vert), s3.get(i_vert)));
        res.set(i_vert, h);
    }
    res
}
