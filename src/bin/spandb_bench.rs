use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use SpanDB::db::Db;
use SpanDB::hash::HashKind;
use SpanDB::metrics::MetricsSnapshot;
use SpanDB::SpanConfig;

/// Простой детерминированный PRNG (SplitMix64).
/// Достаточен для бенчей; не криптостойкий.
#[derive(Clone)]
struct Rng64 {
    state: u64,
}
impl Rng64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Прогресс на ~10 шагов.
struct Progress<'a> {
    name: &'a str,
    total: usize,
    step: usize,
    next: usize,
    start: Instant,
    enabled: bool,
}
impl<'a> Progress<'a> {
    fn new(name: &'a str, total: usize, enabled: bool) -> Self {
        let step = std::cmp::max(1, total / 10);
        Self {
            name,
            total,
            step,
            next: step,
            start: Instant::now(),
            enabled,
        }
    }
    fn bump(&mut self, cur: usize) {
        if !self.enabled {
            return;
        }
        if cur >= self.next || cur == self.total {
            let pct = (cur as f64 / self.total.max(1) as f64) * 100.0;
            let elapsed = self.start.elapsed().as_secs_f64();
            let tput = if elapsed > 0.0 { cur as f64 / elapsed } else { 0.0 };
            println!(
                "[{:>10}] {:>7} / {:<7} ({:>5.1}%) elapsed={:.2}s, tput={:.0} ops/s",
                self.name, cur, self.total, pct, elapsed, tput
            );
            self.next = cur.saturating_add(self.step);
        }
    }
}

/// SpanDB micro-benchmark CLI
///
/// Примеры:
///   spandb_bench --path ./bench.spdb --n 100000 --value-size 64
///   RUST_LOG=debug spandb_bench --path ./bench.spdb --buckets 16 --json
#[derive(Parser, Debug)]
#[command(name = "spandb_bench", version, about = "SpanDB micro-bench CLI")]
struct Opt {
    /// Data file for the benchmark (truncated on start)
    #[arg(long)]
    path: PathBuf,

    /// Buckets count for init (1 ..= 1007)
    #[arg(long, default_value_t = 256)]
    buckets: u32,

    /// Key hash: xx64 | xx32
    #[arg(long, default_value = "xx64")]
    hash: String,

    /// Total keys to load
    #[arg(long, default_value_t = 100_000)]
    n: u64,

    /// Value size (bytes); record must fit into one block
    #[arg(long, default_value_t = 128)]
    value_size: usize,

    /// Number of miss probes
    #[arg(long, default_value_t = 50_000)]
    n_miss: u64,

    /// Hot preallocation (blocks per file extension)
    #[arg(long, default_value_t = 256)]
    prealloc: u32,

    /// Random seed
    #[arg(long, default_value_t = 0xA1B2_C3D4_E5F6_7788)]
    seed: u64,

    /// JSON output
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Show progress for each phase
    #[arg(long, default_value_t = true)]
    progress: bool,

    /// Keep the data file after the run
    #[arg(long, default_value_t = false)]
    keep: bool,
}

#[derive(Debug, Clone, Serialize)]
struct PhaseStats {
    name: String,
    ops: u64,
    #[serde(skip)]
    elapsed: Duration,
    elapsed_ms: f64,
    p50_us: f64,
    p99_us: f64,
    tput_ops: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BenchReport {
    phases: Vec<PhaseStats>,
    file_bytes: u64,
    buckets: u32,
    next_block: u32,
    free_blocks: u32,
    live_keys: u64,
    doctor_clean: bool,
    metrics: MetricsSnapshot,
}

fn main() {
    // Логгер: RUST_LOG, по умолчанию info, миллисекундные метки.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        eprintln!("bench error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::parse();
    let hash: HashKind = opt.hash.parse().map_err(|e: String| anyhow!(e))?;

    let cfg = SpanConfig::default()
        .with_buckets(opt.buckets)
        .with_hash_kind(hash)
        .with_overwrite(true)
        .with_prealloc_blocks(opt.prealloc);
    let mut db = Db::open_with_config(&opt.path, cfg)
        .with_context(|| format!("open {}", opt.path.display()))?;

    let mut rng = Rng64::new(opt.seed);
    let n = opt.n as usize;
    let keys: Vec<Vec<u8>> = (0..n)
        .map(|i| format!("k-{:016x}-{:08x}", rng.next_u64(), i as u32).into_bytes())
        .collect();
    let miss_keys: Vec<Vec<u8>> = (0..opt.n_miss as usize)
        .map(|i| format!("m-{:016x}-{:08x}", rng.next_u64(), i as u32).into_bytes())
        .collect();
    let val = vec![0xAB; opt.value_size];
    let val2 = vec![0xCD; opt.value_size];

    let mut phases = Vec::new();

    println!("==> Phase: put ({} keys)", keys.len());
    phases.push(timed("put", &keys, opt.progress, |k| Ok(db.put(k, &val)?))?);

    println!("==> Phase: get_hits ({} keys, random order)", keys.len());
    let mut order: Vec<usize> = (0..n).collect();
    shuffle(&mut order, &mut rng);
    let shuffled: Vec<Vec<u8>> = order.iter().map(|&i| keys[i].clone()).collect();
    phases.push(timed("get_hits", &shuffled, opt.progress, |k| {
        match db.get(k)? {
            Some(_) => Ok(()),
            None => Err(anyhow!("missing key {}", String::from_utf8_lossy(k))),
        }
    })?);

    println!("==> Phase: get_miss ({} keys)", miss_keys.len());
    phases.push(timed("get_miss", &miss_keys, opt.progress, |k| {
        match db.get(k)? {
            None => Ok(()),
            Some(_) => Err(anyhow!("unexpected hit {}", String::from_utf8_lossy(k))),
        }
    })?);

    println!("==> Phase: overwrite ({} keys)", keys.len());
    phases.push(timed("overwrite", &keys, opt.progress, |k| Ok(db.put(k, &val2)?))?);

    let half: Vec<Vec<u8>> = keys.iter().step_by(2).cloned().collect();
    println!("==> Phase: delete ({} keys)", half.len());
    phases.push(timed("delete", &half, opt.progress, |k| {
        db.delete(k)?;
        Ok(())
    })?);

    println!("==> Phase: compact_all");
    let t0 = Instant::now();
    let summary = db.compact_all()?;
    let el = t0.elapsed();
    phases.push(PhaseStats {
        name: "compact_all".into(),
        ops: summary.buckets_compacted as u64,
        elapsed: el,
        elapsed_ms: el.as_secs_f64() * 1e3,
        p50_us: 0.0,
        p99_us: 0.0,
        tput_ops: summary.buckets_compacted as f64 / el.as_secs_f64().max(1e-9),
    });

    let doctor = db.doctor()?;
    let stats = db.stats()?;
    let report = BenchReport {
        phases,
        file_bytes: stats.file_bytes,
        buckets: stats.bucket_count,
        next_block: stats.next_block,
        free_blocks: stats.free_blocks,
        live_keys: doctor.live_keys,
        doctor_clean: doctor.is_clean(),
        metrics: db.metrics(),
    };
    db.close()?;
    if !opt.keep {
        let _ = std::fs::remove_file(&opt.path);
    }

    if opt.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_human(&report);
    }
    Ok(())
}

fn timed<F>(name: &str, keys: &[Vec<u8>], progress: bool, mut op: F) -> Result<PhaseStats>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut lat = Vec::with_capacity(keys.len());
    let mut prog = Progress::new(name, keys.len(), progress);
    let t0 = Instant::now();
    for (i, k) in keys.iter().enumerate() {
        let s = Instant::now();
        op(k).with_context(|| format!("{} #{}", name, i))?;
        lat.push(s.elapsed());
        prog.bump(i + 1);
    }
    let elapsed = t0.elapsed();
    lat.sort_unstable();
    Ok(PhaseStats {
        name: name.to_string(),
        ops: keys.len() as u64,
        elapsed,
        elapsed_ms: elapsed.as_secs_f64() * 1e3,
        p50_us: percentile_us(&lat, 0.50),
        p99_us: percentile_us(&lat, 0.99),
        tput_ops: keys.len() as f64 / elapsed.as_secs_f64().max(1e-9),
    })
}

fn percentile_us(sorted: &[Duration], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx].as_secs_f64() * 1e6
}

fn shuffle<T>(v: &mut [T], rng: &mut Rng64) {
    for i in (1..v.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        v.swap(i, j);
    }
}

fn print_report_human(r: &BenchReport) {
    println!();
    println!("{:<12} {:>10} {:>12} {:>10} {:>10} {:>12}", "phase", "ops", "elapsed_ms", "p50_us", "p99_us", "ops/s");
    for p in &r.phases {
        println!(
            "{:<12} {:>10} {:>12.1} {:>10.1} {:>10.1} {:>12.0}",
            p.name,
            p.ops,
            p.elapsed.as_secs_f64() * 1e3,
            p.p50_us,
            p.p99_us,
            p.tput_ops
        );
    }
    println!();
    println!("file_bytes   = {}", r.file_bytes);
    println!("buckets      = {}", r.buckets);
    println!("next_block   = {}", r.next_block);
    println!("free_blocks  = {}", r.free_blocks);
    println!("live_keys    = {}", r.live_keys);
    println!("doctor_clean = {}", r.doctor_clean);
    println!(
        "metrics: allocated={} reused={} ({:.1}%) freed={} extensions={} grows={} shrinks={} compactions={}",
        r.metrics.blocks_allocated,
        r.metrics.blocks_reused,
        r.metrics.reuse_ratio() * 100.0,
        r.metrics.blocks_freed,
        r.metrics.region_extensions,
        r.metrics.extent_grows,
        r.metrics.extent_shrinks,
        r.metrics.compactions
    );
}
