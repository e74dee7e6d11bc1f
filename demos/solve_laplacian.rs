//! Solve a regularized Laplace problem on a ring-shaped digital domain
//! with every available solver strategy.
//!
//! The dual 0-form Laplacian `star d star d` plus a small multiple of identity
//! is inverted against a Dirac impulse,
//! giving a smooth bump around the impulse that decays
//! towards the edges of the domain.

use cubical_dec as dec;

fn main() -> Result<(), dec::DecError> {
    // every spel of a 10x10 square whose center lies in an annulus
    let points = (0..10)
        .flat_map(|y| (0..10).map(move |x| [x, y]))
        .filter(|&[x, y]| {
            let r = ((x as f64 - 4.5).powi(2) + (y as f64 - 4.5).powi(2)).sqrt();
            (2. ..=5.).contains(&r)
        });
    let complex = dec::CubicalComplex::<2>::from_spels(points);
    println!(
        "complex: {} pointels, {} linels, {} spels",
        complex.size(0, dec::Primal),
        complex.size(1, dec::Primal),
        complex.size(2, dec::Primal),
    );

    let laplacian = dec::combine(
        &complex.laplacian(dec::Dual)?,
        &complex.identity(0, dec::Dual)?,
        1.,
        0.01,
    )?;
    println!(
        "operator: {} -> {}, {} entries, largest {}",
        laplacian.input(),
        laplacian.output(),
        laplacian.nnz(),
        laplacian.max_abs_entry(),
    );

    let mut dirac = complex.new_zero_form(0, dec::Dual)?;
    let source = complex
        .index_of(&dec::Cell::spel([2, 5]))
        .expect("the impulse location is part of the ring");
    dirac[source] = 1.;

    for strategy in dec::SolverStrategy::ALL {
        let mut solver = dec::Solver::new(strategy);
        let result = solver
            .compute(&laplacian)
            .and_then(|_| solver.solve(&dirac));
        match result {
            Ok(solution) => println!(
                "{strategy:>20}: {}, values in [{:.6}, {:.6}]",
                solver.status(),
                solution.min().unwrap_or(0.),
                solution.max().unwrap_or(0.),
            ),
            Err(err) => println!("{strategy:>20}: {err}"),
        }
    }

    Ok(())
}
