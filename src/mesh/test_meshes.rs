//! Simple simplex meshes used in tests and diagnostics.

use crate::{
    field::ElemSizeField,
    mesh::{CavityMesh, Mesh},
    Dim,
};
use nalgebra::SVector;
use rustc_hash::FxHashMap;
use sorted_vec::SortedVec;

/// Vertex coordinates, padded to 3d for lower dimensions
pub type Vert = SVector<f64, 3>;

/// Serial simplex mesh with explicit edge and star adjacency
pub struct TestMesh {
    dim: Dim,
    verts: Vec<Vert>,
    elems: Vec<Vec<usize>>,
    edges: Vec<[usize; 2]>,
    edge_ids: FxHashMap<(usize, usize), usize>,
    elem_to_edges: Vec<Vec<usize>>,
    vert_to_elems: Vec<SortedVec<usize>>,
}

impl TestMesh {
    /// Build a mesh of dimension `dim` from vertex coordinates and element
    /// connectivities (`dim + 1` vertices per element)
    #[must_use]
    pub fn new(dim: Dim, verts: Vec<Vert>, elems: Vec<Vec<usize>>) -> Self {
        let n_verts = verts.len();
        let mut res = Self {
            dim,
            verts,
            elems: Vec::new(),
            edges: Vec::new(),
            edge_ids: FxHashMap::default(),
            elem_to_edges: Vec::new(),
            vert_to_elems: (0..n_verts).map(|_| SortedVec::default()).collect(),
        };
        for e in elems {
            res.add_elem(&e);
        }
        res
    }

    /// Append an element, updating the edge list and the vertex stars
    pub fn add_elem(&mut self, conn: &[usize]) {
        assert_eq!(
            conn.len(),
            self.dim as usize + 1,
            "a {}d element has {} vertices",
            self.dim,
            self.dim + 1
        );
        let i_elem = self.elems.len();
        let mut edges = Vec::new();
        for (i, &v0) in conn.iter().enumerate() {
            for &v1 in &conn[i + 1..] {
                let key = (v0.min(v1), v0.max(v1));
                let next = self.edges.len();
                let i_edge = *self.edge_ids.entry(key).or_insert(next);
                if i_edge == next {
                    self.edges.push([key.0, key.1]);
                }
                edges.push(i_edge);
            }
        }
        self.elem_to_edges.push(edges);
        for &v in conn {
            self.vert_to_elems[v].push(i_elem);
        }
        self.elems.push(conn.to_vec());
    }

    /// Vertex coordinates
    #[must_use]
    pub fn vert(&self, i_vert: usize) -> Vert {
        self.verts[i_vert]
    }

    /// Element connectivity
    #[must_use]
    pub fn elem(&self, i_elem: usize) -> &[usize] {
        &self.elems[i_elem]
    }

    /// Uniform subdivision: every edge is split at its midpoint; segments
    /// are split in 2, triangles in 4 and tetrahedra in 8
    #[must_use]
    pub fn split(&self) -> Self {
        let n_verts = self.verts.len();
        let mut verts = self.verts.clone();
        verts.extend(
            self.edges
                .iter()
                .map(|&[v0, v1]| (self.verts[v0] + self.verts[v1]) * 0.5),
        );
        let mid = |v0: usize, v1: usize| n_verts + self.edge_ids[&(v0.min(v1), v0.max(v1))];
        let mut elems = Vec::with_capacity(self.elems.len() << self.dim);
        for e in &self.elems {
            match self.dim {
                1 => {
                    let (a, b) = (e[0], e[1]);
                    let m = mid(a, b);
                    elems.push(vec![a, m]);
                    elems.push(vec![m, b]);
                }
                2 => {
                    let (a, b, c) = (e[0], e[1], e[2]);
                    let (mab, mbc, mca) = (mid(a, b), mid(b, c), mid(c, a));
                    elems.push(vec![a, mab, mca]);
                    elems.push(vec![b, mbc, mab]);
                    elems.push(vec![c, mca, mbc]);
                    elems.push(vec![mab, mbc, mca]);
                }
                _ => {
                    // red refinement: 4 corner tetrahedra + 4 from the
                    // inner octahedron
                    let (a, b, c, d) = (e[0], e[1], e[2], e[3]);
                    let (mab, mac, mad) = (mid(a, b), mid(a, c), mid(a, d));
                    let (mbc, mbd, mcd) = (mid(b, c), mid(b, d), mid(c, d));
                    elems.push(vec![a, mab, mac, mad]);
                    elems.push(vec![mab, b, mbc, mbd]);
                    elems.push(vec![mac, mbc, c, mcd]);
                    elems.push(vec![mad, mbd, mcd, d]);
                    elems.push(vec![mab, mac, mad, mbd]);
                    elems.push(vec![mab, mac, mbc, mbd]);
                    elems.push(vec![mac, mad, mbd, mcd]);
                    elems.push(vec![mac, mbc, mbd, mcd]);
                }
            }
        }
        Self::new(self.dim, verts, elems)
    }
}

impl Mesh for TestMesh {
    fn dim(&self) -> Dim {
        self.dim
    }

    fn n_verts(&self) -> usize {
        self.verts.len()
    }

    fn n_elems(&self) -> usize {
        self.elems.len()
    }

    fn is_owned_elem(&self, _i_elem: usize) -> bool {
        true
    }

    fn elem_edges(&self, i_elem: usize) -> impl Iterator<Item = usize> + '_ {
        self.elem_to_edges[i_elem].iter().copied()
    }

    fn edge_length(&self, i_edge: usize) -> f64 {
        let [v0, v1] = self.edges[i_edge];
        (self.verts[v1] - self.verts[v0]).norm()
    }

    fn vertex_star(&self, i_vert: usize) -> impl Iterator<Item = usize> + '_ {
        self.vert_to_elems[i_vert].iter().copied()
    }
}

impl CavityMesh for TestMesh {
    fn request_star(&mut self, _i_vert: usize) -> bool {
        true
    }

    fn resolve_requests(&mut self, _elem_size: &mut ElemSizeField) {}
}

/// Uniform mesh of the unit interval with `n` segments
#[must_use]
pub fn test_mesh_1d(n: usize) -> TestMesh {
    let verts = (0..=n)
        .map(|i| Vert::new(i as f64 / n as f64, 0., 0.))
        .collect();
    let elems = (0..n).map(|i| vec![i, i + 1]).collect();
    TestMesh::new(1, verts, elems)
}

/// 2d mesh of the unit square with 2 triangles
#[must_use]
pub fn test_mesh_2d() -> TestMesh {
    let verts = vec![
        Vert::new(0., 0., 0.),
        Vert::new(1., 0., 0.),
        Vert::new(1., 1., 0.),
        Vert::new(0., 1., 0.),
    ];
    let elems = vec![vec![0, 1, 2], vec![0, 2, 3]];
    TestMesh::new(2, verts, elems)
}

/// 3d mesh of a single reference tetrahedron
#[must_use]
pub fn test_mesh_3d() -> TestMesh {
    let verts = vec![
        Vert::new(0., 0., 0.),
        Vert::new(1., 0., 0.),
        Vert::new(0., 1., 0.),
        Vert::new(0., 0., 1.),
    ];
    let elems = vec![vec![0, 1, 2, 3]];
    TestMesh::new(3, verts, elems)
}

/// Element owned by another rank, visible locally only once the matching
/// locality request has been answered
pub struct RemoteElem {
    /// Connectivity, referencing vertices already present locally
    pub conn: Vec<usize>,
    /// Target size computed by the owning rank
    pub size: f64,
}

/// Mesh double for a partition boundary: the stars of the vertices touched
/// by `remote` elements are incomplete until the locality requests issued
/// for them are resolved
pub struct DistributedTestMesh {
    local: TestMesh,
    n_owned: usize,
    remote: Vec<RemoteElem>,
    localized: Vec<bool>,
    missing: FxHashMap<usize, Vec<usize>>,
    pending: Vec<usize>,
    n_rounds: usize,
}

impl DistributedTestMesh {
    /// Wrap a local shard and the remote elements adjacent to it
    #[must_use]
    pub fn new(local: TestMesh, remote: Vec<RemoteElem>) -> Self {
        let mut missing: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for (i, r) in remote.iter().enumerate() {
            for &v in &r.conn {
                assert!(v < local.n_verts(), "remote elements may only reference shared vertices");
                missing.entry(v).or_default().push(i);
            }
        }
        let n_owned = local.n_elems();
        let n_remote = remote.len();
        Self {
            local,
            n_owned,
            remote,
            localized: vec![false; n_remote],
            missing,
            pending: Vec::new(),
            n_rounds: 0,
        }
    }

    /// Number of collective resolution rounds performed
    #[must_use]
    pub fn n_rounds(&self) -> usize {
        self.n_rounds
    }
}

impl Mesh for DistributedTestMesh {
    fn dim(&self) -> Dim {
        self.local.dim()
    }

    fn n_verts(&self) -> usize {
        self.local.n_verts()
    }

    fn n_elems(&self) -> usize {
        self.local.n_elems()
    }

    fn is_owned_elem(&self, i_elem: usize) -> bool {
        i_elem < self.n_owned
    }

    fn elem_edges(&self, i_elem: usize) -> impl Iterator<Item = usize> + '_ {
        self.local.elem_edges(i_elem)
    }

    fn edge_length(&self, i_edge: usize) -> f64 {
        self.local.edge_length(i_edge)
    }

    fn vertex_star(&self, i_vert: usize) -> impl Iterator<Item = usize> + '_ {
        self.local.vertex_star(i_vert)
    }
}

impl CavityMesh for DistributedTestMesh {
    fn request_star(&mut self, i_vert: usize) -> bool {
        let complete = match self.missing.get(&i_vert) {
            Some(ids) => ids.iter().all(|&i| self.localized[i]),
            None => true,
        };
        if !complete && !self.pending.contains(&i_vert) {
            self.pending.push(i_vert);
        }
        complete
    }

    fn resolve_requests(&mut self, elem_size: &mut ElemSizeField) {
        self.n_rounds += 1;
        let pending = std::mem::take(&mut self.pending);
        for i_vert in pending {
            let Some(ids) = self.missing.remove(&i_vert) else {
                continue;
            };
            for i in ids {
                if !self.localized[i] {
                    self.localized[i] = true;
                    let conn = self.remote[i].conn.clone();
                    self.local.add_elem(&conn);
                    elem_size.push(self.remote[i].size);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_mesh_1d, test_mesh_2d, test_mesh_3d};
    use crate::{assert_delta, mesh::Mesh};

    #[test]
    fn test_adjacency_2d() {
        let mesh = test_mesh_2d();
        assert_eq!(mesh.n_verts(), 4);
        assert_eq!(mesh.n_elems(), 2);
        assert_eq!(mesh.elem_edges(0).count(), 3);
        assert_eq!(mesh.vertex_star(0).count(), 2);
        assert_eq!(mesh.vertex_star(1).count(), 1);
        let diag = mesh
            .elem_edges(0)
            .map(|e| mesh.edge_length(e))
            .fold(0.0, f64::max);
        assert_delta!(diag, f64::sqrt(2.0), 1e-12);
    }

    #[test]
    fn test_split_1d() {
        let mesh = test_mesh_1d(2).split();
        assert_eq!(mesh.n_elems(), 4);
        assert_eq!(mesh.n_verts(), 5);
        let total: f64 = (0..mesh.n_elems())
            .map(|i| {
                mesh.elem_edges(i)
                    .map(|e| mesh.edge_length(e))
                    .sum::<f64>()
            })
            .sum();
        assert_delta!(total, 1.0, 1e-12);
    }

    #[test]
    fn test_split_2d() {
        let mesh = test_mesh_2d().split();
        assert_eq!(mesh.n_elems(), 8);
        assert_eq!(mesh.n_verts(), 9);
    }

    #[test]
    fn test_split_3d() {
        let mesh = test_mesh_3d().split();
        assert_eq!(mesh.n_elems(), 8);
        assert_eq!(mesh.n_verts(), 10);
    }
}
