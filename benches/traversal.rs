use criterion::{criterion_group, criterion_main, Criterion};
use hcgrid::{config::GridConfig, distributed::PeContext, errors::HCError, grid::{AdaptiveGrid, Traversal, VECLEN}};

fn build_refined_grid() -> Result<AdaptiveGrid<2>, HCError>
{
    // 64x64 base grid with every fourth interior cell refined once.
    let config = GridConfig { max_cells: 1 << 16, ..GridConfig::unit_box(2, 64) };
    let mut grid = AdaptiveGrid::<2>::new(&PeContext::single(), &config)?;
    let leaves: Vec<_> = grid.cells(Traversal::LeafOnly).step_by(4).collect();
    for i in leaves
    {
        let children = grid.subdivide(i)?;
        grid.mature_cells(children.start, children.end);
    }
    Ok(grid)
}

fn scalar(grid: &AdaptiveGrid<2>) -> usize
{
    let mut n = 0;
    let mut i = grid.first(Traversal::LeafOnly);
    while !grid.is_over(i)
    {
        n += 1;
        i = grid.next(Traversal::LeafOnly, i);
    }
    n
}

fn vector(grid: &AdaptiveGrid<2>) -> usize
{
    let mut iv = [0; VECLEN];
    let mut total = 0;
    let mut n = grid.vfirst(Traversal::LeafOnly, &mut iv);
    while n > 0
    {
        total += n;
        n = grid.vnext(Traversal::LeafOnly, &mut iv, n);
    }
    total
}

fn run_traversal(c: &mut Criterion)
{
    let grid = build_refined_grid().unwrap();
    c.bench_function("leaf traversal", |b|b.iter(||scalar(&grid)));
    c.bench_function("vector leaf traversal", |b|b.iter(||vector(&grid)));
    c.bench_function("neighbours", |b|b.iter(||
    {
        grid.cells(Traversal::LeafOnly).map(|i| grid.neighbours(i, 0, 1).len()).sum::<usize>()
    }));
}

criterion_group!(benches, run_traversal);
criterion_main!(benches);
