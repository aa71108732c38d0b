use std::time::{Duration, Instant};

use sha2::Digest as _;
use testbars::{BitDepth, FrameCanvas, PatternKind};

#[derive(Clone, Debug)]
struct BenchArgs {
    iterations: u32,
    repeats: u32,
    pattern: PatternKind,
    text: String,
    sizes: Vec<(u32, u32)>,
    json: bool,
}

#[derive(Clone, Debug)]
struct Case {
    width: u32,
    height: u32,
    depth: BitDepth,
    out_depth: BitDepth,
}

#[derive(Clone, Debug)]
struct CaseResult {
    case: Case,
    runs: Vec<Duration>,
    digest: String,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    if args.iterations == 0 || args.repeats == 0 {
        anyhow::bail!("--iterations and --repeats must be > 0");
    }
    if args.text.is_empty() || args.text.len() > testbars::MAX_STRING_LEN {
        anyhow::bail!("--text must be 1..={} bytes", testbars::MAX_STRING_LEN);
    }

    eprintln!(
        "bench: {repeats} run(s) x {iters} frames ({profile} build), pattern={pattern}",
        repeats = args.repeats,
        iters = args.iterations,
        profile = if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        pattern = args.pattern,
    );

    let mut results = Vec::new();
    for depth in [BitDepth::Eight, BitDepth::Ten] {
        for &(width, height) in &args.sizes {
            for out_depth in [BitDepth::Eight, BitDepth::Ten] {
                let case = Case {
                    width,
                    height,
                    depth,
                    out_depth,
                };
                results.push(run_case(&args, case)?);
            }
        }
    }

    if args.json {
        let rows: Vec<serde_json::Value> = results.iter().map(result_json).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        report(&args, &results);
    }
    Ok(())
}

fn run_case(args: &BenchArgs, case: Case) -> anyhow::Result<CaseResult> {
    // Output uses the V210 stride at both depths, as a capture card would.
    let stride = BitDepth::Ten.stride_for(case.width);
    let mut out = vec![0u8; stride * case.height as usize];
    let mut canvas = FrameCanvas::create(case.width, case.height, case.depth)?;

    let mut runs = Vec::with_capacity(args.repeats as usize);
    for _ in 0..args.repeats {
        let t0 = Instant::now();
        for _ in 0..args.iterations {
            testbars::overlay::reset(&mut canvas);
            testbars::generate(&mut canvas, args.pattern);
            testbars::overlay::render_string(&mut canvas, args.text.as_bytes(), 0, 2)?;
            canvas.finalize(&mut out, case.out_depth, stride)?;
        }
        runs.push(t0.elapsed());
    }

    Ok(CaseResult {
        case,
        runs,
        digest: sha256_hex(&out),
    })
}

fn fps(iterations: u32, d: Duration) -> f64 {
    let secs = d.as_secs_f64();
    if secs == 0.0 {
        return f64::INFINITY;
    }
    f64::from(iterations) / secs
}

fn percentile(runs: &[Duration], p: f64) -> Duration {
    let mut v = runs.to_vec();
    v.sort();
    if v.is_empty() {
        return Duration::ZERO;
    }
    let n = v.len();
    let rank = (p * (n as f64)).ceil().clamp(1.0, n as f64) as usize;
    v[rank - 1]
}

fn report(args: &BenchArgs, results: &[CaseResult]) {
    eprintln!("\nframes per second across runs (p50/p90):");
    for r in results {
        let p50 = percentile(&r.runs, 0.50);
        let p90 = percentile(&r.runs, 0.90);
        println!(
            "  {w:>4}x{h:<4} {depth:>6} internal -> {out:>6}  p50={p50:>10.1}  p90={p90:>10.1}  sha256={digest}",
            w = r.case.width,
            h = r.case.height,
            depth = r.case.depth.to_string(),
            out = r.case.out_depth.to_string(),
            p50 = fps(args.iterations, p50),
            p90 = fps(args.iterations, p90),
            digest = &r.digest[..16],
        );
    }
}

fn result_json(r: &CaseResult) -> serde_json::Value {
    serde_json::json!({
        "width": r.case.width,
        "height": r.case.height,
        "depth": r.case.depth,
        "output_depth": r.case.out_depth,
        "runs_ms": r.runs.iter().map(|d| d.as_secs_f64() * 1000.0).collect::<Vec<_>>(),
        "sha256": r.digest,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn parse_args() -> anyhow::Result<BenchArgs> {
    let mut args = std::env::args().skip(1);

    let mut out = BenchArgs {
        iterations: 7500,
        repeats: 3,
        pattern: PatternKind::ColorBars,
        text: "Hello World!".to_string(),
        sizes: Vec::new(),
        json: false,
    };

    while let Some(a) = args.next() {
        match a.as_str() {
            "--iterations" => out.iterations = parse_u32(args.next(), "--iterations")?,
            "--repeats" => out.repeats = parse_u32(args.next(), "--repeats")?,
            "--pattern" => {
                let v = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for --pattern"))?;
                out.pattern = v.parse()?;
            }
            "--text" => {
                out.text = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for --text"))?;
            }
            "--size" => {
                let v = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for --size (expected WxH)"))?;
                let (w, h) = v
                    .split_once('x')
                    .ok_or_else(|| anyhow::anyhow!("invalid --size '{v}' (expected WxH)"))?;
                out.sizes.push((
                    parse_u32(Some(w.to_string()), "--size")?,
                    parse_u32(Some(h.to_string()), "--size")?,
                ));
            }
            "--json" => out.json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => anyhow::bail!("unknown arg '{a}' (try --help)"),
        }
    }

    if out.sizes.is_empty() {
        out.sizes = vec![(640, 480), (1280, 720), (1920, 1080)];
    }
    Ok(out)
}

fn print_help() {
    eprintln!(
        r#"testbars-bench

Times pattern fill + text overlay + finalize for every size, internal depth and output depth.

Usage:
  cargo run -q --release
  cargo run -q --release -- --iterations 1000 --size 1920x1080 --pattern smpte-bars

Args:
  --iterations N   frames per run (default 7500)
  --repeats N      runs per case (default 3)
  --pattern P      pattern slug, name or index (default color-bars)
  --text S         overlay text (default "Hello World!")
  --size WxH       frame size; repeatable (default 640x480, 1280x720, 1920x1080)
  --json           print results as JSON
"#
    );
}

fn parse_u32(v: Option<String>, flag: &str) -> anyhow::Result<u32> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<u32>()
        .map_err(|e| anyhow::anyhow!("invalid {flag} '{v}': {e}"))
}
