//! Helmholtz-Hodge decomposition on the closed surface of a thick square ring.
//!
//! The surface is assembled cell by cell with mixed orientations.
//! It is a torus, so a 1-form on it has a harmonic part
//! that neither the curl-free nor the divergence-free part can absorb.

use cubical_dec as dec;

fn main() -> Result<(), dec::DecError> {
    // a 16x16x8 block of spels with a 4x4 shaft through the middle
    let solid = dec::CubicalComplex::<3>::from_spels(
        (1..9)
            .flat_map(|z| (2..18).flat_map(move |y| (2..18).map(move |x| [x, y, z])))
            .filter(|&[x, y, _]| !((8..12).contains(&x) && (8..12).contains(&y))),
    );

    let mut surface = dec::CubicalComplex::<3>::new();
    let mut flipped = 0;
    for dim in 0..3 {
        let cells = solid.cells(dim, dec::Primal)?;
        for idx in solid.boundary(dim)?.indices.ones() {
            let cell = cells[idx];
            // faces on the lower side of their closed axis point inwards
            let inward = dim == 2
                && cell
                    .closed_axes()
                    .any(|axis| !solid.contains(&cell.offset(axis, -1)));
            flipped += inward as usize;
            surface.insert(cell.signed(!inward), 1.)?;
        }
    }
    println!(
        "surface: {} pointels, {} linels, {} surfels ({flipped} flipped)",
        surface.size(0, dec::Primal),
        surface.size(1, dec::Primal),
        surface.size(2, dec::Primal),
    );

    let field = surface.sample_vector_field(dec::Primal, |p| {
        dec::na::Vector3::new(
            -(-0.3 * p.x + 0.6 * p.y + 0.8 * p.z).cos(),
            (0.8 * p.x + 0.3 * p.y - 0.4 * p.z).sin(),
            -(0.5 * p.z).cos(),
        )
    });
    let w = surface.flat(&field)?;

    let d0 = surface.d(0, dec::Primal)?;
    let d1 = surface.d(1, dec::Primal)?;
    let delta1 = surface.codifferential(1, dec::Primal)?;
    let delta2 = surface.codifferential(2, dec::Primal)?;

    let mut solver = dec::Solver::new(dec::SolverStrategy::Qr);

    solver.compute(&dec::compose(&delta1, &d0)?)?;
    let x = solver.solve(&delta1.apply(&w)?)?;
    println!("curl-free potential: {}", solver.status());
    let curl_free = d0.apply(&x)?;

    solver.compute(&dec::compose(&d1, &delta2)?)?;
    let y = solver.solve(&d1.apply(&w)?)?;
    println!("divergence-free potential: {}", solver.status());
    let div_free = delta2.apply(&y)?;

    let harmonic = w.checked_sub(&curl_free)?.checked_sub(&div_free)?;
    for (name, part) in [
        ("input", &w),
        ("curl-free", &curl_free),
        ("divergence-free", &div_free),
        ("harmonic", &harmonic),
    ] {
        println!(
            "{name:>16}: norm {:.6}, values in [{:.6}, {:.6}]",
            part.norm(),
            part.min().unwrap_or(0.),
            part.max().unwrap_or(0.),
        );
    }
    Ok(())
}
