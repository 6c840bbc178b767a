use hadapt::{
    field::ErrorField,
    init_log,
    mesh::{
        test_meshes::{test_mesh_2d, Vert},
        Mesh,
    },
    parallel::{Reduction, SerialComm},
    size::{iso_target_size, SizeParams},
    Result,
};
use log::info;

fn main() -> Result<()> {
    init_log("debug");

    let mut mesh = test_mesh_2d().split().split().split().split();
    info!("mesh: {} verts, {} elems", mesh.n_verts(), mesh.n_elems());

    let comm = SerialComm;
    info!("rank {} / {}", comm.rank(), comm.n_ranks());

    // error indicator concentrated at the center of the square
    let vals = (0..mesh.n_elems())
        .map(|i_elem| {
            let center = mesh
                .elem(i_elem)
                .iter()
                .fold(Vert::zeros(), |c, &i_vert| c + mesh.vert(i_vert))
                / 3.0;
            let r2 = (center[0] - 0.5).powi(2) + (center[1] - 0.5).powi(2);
            f64::exp(-10.0 * r2)
        })
        .collect();
    let error = ErrorField::from_indicator(vals);

    let size = iso_target_size(&mut mesh, &comm, error, 1000, SizeParams::default(), "size");
    let (h_min, h_max) = size.min_max();
    info!(
        "size field '{}': min = {:.3e}, max = {:.3e}",
        size.name(),
        h_min,
        h_max
    );

    Ok(())
}
