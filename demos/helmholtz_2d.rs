//! Helmholtz-Hodge decomposition of a vector field on a digital domain with a hole.
//!
//! A 1-form `w` is split into a curl-free part `d x`,
//! a divergence-free part `codifferential y` and a harmonic remainder `h`.
//! The remainder only vanishes on domains without holes,
//! so it measures the part of the field circulating around the hole.

use cubical_dec as dec;

fn decompose(
    complex: &dec::CubicalComplex<2>,
    primality: dec::Primality,
) -> Result<(), dec::DecError> {
    let center = dec::na::Vector2::new(15., 10.);
    let field = complex.sample_vector_field(primality, |p| {
        let c = p - center;
        // a swirl around the hole plus a source term
        dec::na::Vector2::new(-c.y + 0.2 * c.x, c.x + 0.2 * c.y) * (-c.norm_squared() / 200.).exp()
    });
    let w = complex.flat(&field)?;

    let d0 = complex.d(0, primality)?;
    let d1 = complex.d(1, primality)?;
    let delta1 = complex.codifferential(1, primality)?;
    let delta2 = complex.codifferential(2, primality)?;

    // the graph-Laplacian-like systems here may be singular,
    // which the rank-revealing QR handles
    let mut solver = dec::Solver::new(dec::SolverStrategy::Qr);

    solver.compute(&dec::compose(&delta1, &d0)?)?;
    let x = solver.solve(&delta1.apply(&w)?)?;
    let curl_free = d0.apply(&x)?;

    solver.compute(&dec::compose(&d1, &delta2)?)?;
    let y = solver.solve(&d1.apply(&w)?)?;
    let div_free = delta2.apply(&y)?;

    let harmonic = w.checked_sub(&curl_free)?.checked_sub(&div_free)?;

    println!("{primality} decomposition of a {}:", w.kind());
    for (name, part) in [
        ("input", &w),
        ("curl-free", &curl_free),
        ("divergence-free", &div_free),
        ("harmonic", &harmonic),
    ] {
        println!("{name:>16}: norm {:.6}", part.norm());
    }

    let swirl = complex.sharp(&harmonic)?;
    let strongest = swirl
        .vectors
        .iter()
        .map(|v| v.norm())
        .fold(0., f64::max);
    println!("{:>16}: strongest harmonic vector {strongest:.6}", "");
    Ok(())
}

fn main() -> Result<(), dec::DecError> {
    // a 30x20 rectangle with a square hole in the middle
    let points = (0..20)
        .flat_map(|y| (0..30).map(move |x| [x, y]))
        .filter(|&[x, y]| !((12..18).contains(&x) && (7..13).contains(&y)));
    let complex = dec::CubicalComplex::<2>::from_spels(points);

    let boundary = complex.boundary(1)?;
    println!(
        "complex: {} linels, {} of them on the boundary",
        complex.size(1, dec::Primal),
        boundary.count()
    );

    decompose(&complex, dec::Dual)?;
    decompose(&complex, dec::Primal)?;
    Ok(())
}
