//! Generates a synthetic time-varying scalar field and runs it through the
//! full `critrace` pipeline, writing out the resulting trajectories.
//!
//! Parsing real mesh/volume file formats is out of scope for this crate;
//! this binary exists to exercise the pipeline end to end from the
//! command line without a production file format reader.

use anyhow::Context as _;
use anyhow::Result;
use rand::Rng as _;
use rand::SeedableRng as _;
use std::env;
use std::fs;
use std::io;

fn print_usage(options: &getopts::Options) {
    eprintln!("{}", options.usage("Usage: critrace-cli [options]"));
}

/// `f(x, y, t) = sin(freq * x) * cos(freq * y) + drift * t + noise`: a
/// woven spatial pattern that slowly drifts upward over time.
fn generate_field(size: i64, steps: i64, seed: u64) -> (usize, Vec<i64>, Vec<f64>) {
    let mut rng = rand_pcg::Pcg32::seed_from_u64(seed);

    let total = (size * size * steps) as usize;
    let mut values = Vec::with_capacity(total);
    let freq = std::f64::consts::PI / (size as f64).max(1.0);
    // The lattice's last axis is time; `Field` stores values with the last
    // axis fastest-varying, so the loop nest puts `t` innermost.
    for x in 0..size {
        for y in 0..size {
            for t in 0..steps {
                let noise: f64 = rng.gen_range(-0.01..0.01);
                let v = (freq * x as f64).sin() * (freq * y as f64).cos() + 0.02 * t as f64 + noise;
                values.push(v);
            }
        }
    }
    (3, vec![size, size, steps], values)
}

fn parse_critical_point_type(s: &str) -> Result<critrace::CriticalPointType> {
    match s {
        "all" => Ok(critrace::CriticalPointType::All),
        "maximum" => Ok(critrace::CriticalPointType::Maximum),
        other => anyhow::bail!("unknown critical-point-type {:?}, expected 'all' or 'maximum'", other),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut options = getopts::Options::new();
    options.optflag("h", "help", "print this help menu");
    options.optopt("", "size", "spatial extent per axis (default: 16)", "N");
    options.optopt("", "steps", "number of time steps (default: 16)", "N");
    options.optopt("", "seed", "RNG seed for the synthetic field (default: 0)", "SEED");
    options.optopt(
        "",
        "critical-point-type",
        "'all' or 'maximum' (default: all)",
        "TYPE",
    );
    options.optopt("", "value-threshold", "drop trajectories whose peak value does not exceed this", "F");
    options.optopt("", "length-threshold", "drop trajectories shorter than this", "N");
    options.optopt("", "nblocks", "number of simulated ranks (default: 1)", "N");
    options.optopt("", "nthreads", "worker pool size (default: 1)", "N");
    options.optopt("", "ghost-margin", "ghost layer width (default: 1)", "N");
    options.optflag("", "no-balance", "disable load balancing between detection and convergence");
    options.optopt("o", "output", "trajectory output file", "FILE");
    options.optopt("", "dump-intersections", "dump intersections as JSON to this file", "FILE");
    options.optopt("", "dump-components", "dump connected components (one per line) to this file", "FILE");

    let matches = options.parse(env::args().skip(1)).context("failed to parse arguments")?;
    if matches.opt_present("h") {
        print_usage(&options);
        return Ok(());
    }

    let size: i64 = matches.opt_get_default("size", 16)?;
    let steps: i64 = matches.opt_get_default("steps", 16)?;
    let seed: u64 = matches.opt_get_default("seed", 0)?;

    let mut opts = critrace::Options::default();
    if let Some(s) = matches.opt_str("critical-point-type") {
        opts.critical_point_type = parse_critical_point_type(&s)?;
    }
    if let Some(v) = matches.opt_get::<f64>("value-threshold")? {
        opts.value_threshold = v;
    }
    if let Some(n) = matches.opt_get::<usize>("length-threshold")? {
        opts.length_threshold = n;
    }
    opts.nblocks = matches.opt_get_default("nblocks", opts.nblocks)?;
    opts.nthreads = matches.opt_get_default("nthreads", opts.nthreads)?;
    opts.ghost_margin = matches.opt_get_default("ghost-margin", opts.ghost_margin)?;
    opts.load_balancing = !matches.opt_present("no-balance");

    let (dim, shape, values) = generate_field(size, steps, seed);
    let lattice = critrace::lattice::Lattice::new(vec![0; dim], shape);

    println!(" -> Dimension: {dim}");
    println!(" -> Lattice size: {:?}", lattice.size());
    println!(" -> Ranks: {}", opts.nblocks);

    let (trajectories, stats) = critrace::Pipeline::run(lattice, values, &opts).context("pipeline failed")?;

    println!(" -> Trajectories found: {}", trajectories.len());
    println!(
        " -> Rejected candidates: {} (singular: {}, outside simplex: {}, not a maximum: {})",
        stats.detection.rejected(),
        stats.detection.singular,
        stats.detection.outside_simplex,
        stats.detection.not_maximum,
    );

    if let Some(output) = matches.opt_str("output") {
        let file = fs::File::create(&output).with_context(|| format!("failed to create {output:?}"))?;
        let mut writer = io::BufWriter::new(file);
        critrace::io::write_trajectories(&mut writer, &trajectories)
            .with_context(|| format!("failed to write trajectories to {output:?}"))?;
    }

    if let Some(path) = matches.opt_str("dump-intersections") {
        let file = fs::File::create(&path).with_context(|| format!("failed to create {path:?}"))?;
        critrace::io::dump_intersections_json(io::BufWriter::new(file), &stats.diagnostics.intersections)
            .with_context(|| format!("failed to write intersections dump to {path:?}"))?;
    }

    if let Some(path) = matches.opt_str("dump-components") {
        let file = fs::File::create(&path).with_context(|| format!("failed to create {path:?}"))?;
        let mut writer = io::BufWriter::new(file);
        critrace::io::dump_components(&mut writer, &stats.diagnostics.components)
            .with_context(|| format!("failed to write components dump to {path:?}"))?;
    }

    Ok(())
}
