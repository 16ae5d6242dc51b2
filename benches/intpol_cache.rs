use criterion::{criterion_group, criterion_main, Criterion};
use hcgrid::{config::GridConfig, distributed::PeContext, errors::HCError, grid::{AdaptiveGrid, Traversal}, interpolation_cache::IntpolCache};

fn build_grid() -> Result<AdaptiveGrid<2>, HCError>
{
    let config = GridConfig { ncd: 3, ..GridConfig::unit_box(2, 128) };
    let grid = AdaptiveGrid::<2>::new(&PeContext::single(), &config)?;
    for i in grid.cells(Traversal::All)
    {
        let x = grid.centroid(i);
        grid.put_cell(i, &[x[0], x[1], x[0] * x[1]])?;
    }
    Ok(grid)
}

fn points() -> Vec<[f64; 2]>
{
    (0..1000).map(|k| [(k % 37) as f64 / 37.0, (k % 53) as f64 / 53.0]).collect()
}

fn run_intpol(c: &mut Criterion)
{
    let mut grid = build_grid().unwrap();
    let x = points();
    c.bench_function("intpol uncached", |b|b.iter(||
    {
        x.iter().map(|x| grid.intpol_uncached(x, 1).unwrap()[2]).sum::<f64>()
    }));
    grid.set_intpol_caching(true);
    c.bench_function("intpol cached", |b|b.iter(||
    {
        x.iter().map(|x| grid.intpol(x, 1).unwrap()[2]).sum::<f64>()
    }));
    grid.set_intpol_caching(false);
    c.bench_function("intpol batch", |b|b.iter(||grid.intpol_batch(&x, 1)));
}

fn run_cache(c: &mut Criterion)
{
    let mut cache = IntpolCache::new(1.0 / 128.0, 0.0, 0.0);
    let x = points();
    for (k, p) in x.iter().enumerate()
    {
        cache.store(k as f64, p[0], p[1]);
    }
    c.bench_function("cache read", |b|b.iter(||
    {
        x.iter().filter_map(|p| cache.read(p[0], p[1])).sum::<f64>()
    }));
}

criterion_group!(benches, run_intpol, run_cache);
criterion_main!(benches);
