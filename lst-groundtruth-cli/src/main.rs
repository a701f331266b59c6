use anyhow::{Context, Result};
use clap::Parser;
use lst_groundtruth::correlate::{FilterPolicy, MissingQuality};
use lst_groundtruth::sources::{LocalProductStore, MarkupDirectorySource, ProductFetcher};
use lst_groundtruth::station::{select_targets, JsonStationCatalog, StationCatalog};
use lst_groundtruth::{run_batch, BandExtractor, CorrelationEngine, GdalCommandBackend};
use rayon::ThreadPoolBuilder;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 入力HDF5ファイル、またはディレクトリ
    #[arg(value_name = "INPUT", required_unless_present = "products")]
    inputs: Vec<PathBuf>,

    /// プロダクトID（またはURL）の一覧ファイル（1行に1件）
    #[arg(long, value_name = "FILE", requires = "product_dir")]
    products: Option<PathBuf>,

    /// ダウンロード済みプロダクトのディレクトリ
    #[arg(long, value_name = "DIR")]
    product_dir: Option<PathBuf>,

    /// 抽出したGeoTIFFの出力ディレクトリ
    #[arg(short, long, value_name = "DIR")]
    workspace: PathBuf,

    /// 観測所カタログ（JSON）
    #[arg(short, long, value_name = "FILE")]
    stations: PathBuf,

    /// 対象地域名（部分一致）
    #[arg(short, long)]
    region: String,

    /// 10分値ページ（HTML）を保存したディレクトリ
    #[arg(long, value_name = "DIR")]
    observations: PathBuf,

    /// 結果の出力先（JSON Lines、省略時は標準出力）
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short, long)]
    threads: Option<usize>,

    /// 対象とする現地時刻の範囲（例: 9-15）
    #[arg(long, value_parser = parse_hours)]
    local_hours: Option<RangeInclusive<u32>>,

    /// 地上観測値が取得できない観測所を除外
    #[arg(long)]
    drop_unavailable: bool,

    /// QAフラグ欠損時にフラグなしとみなす
    #[arg(long)]
    assume_clear: bool,
}

fn parse_hours(value: &str) -> Result<RangeInclusive<u32>, String> {
    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{value}'"))?;
    let start: u32 = start.trim().parse().map_err(|e| format!("{e}"))?;
    let end: u32 = end.trim().parse().map_err(|e| format!("{e}"))?;
    if start > end || end > 23 {
        return Err(format!("invalid hour range '{value}'"));
    }
    Ok(start..=end)
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    // スレッドプールの設定
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    fs::create_dir_all(&args.workspace)?;

    // 観測所の選定
    let catalog = JsonStationCatalog::load(&args.stations)?;
    let region = catalog
        .find_region(&args.region)
        .with_context(|| format!("No region matching '{}'", args.region))?
        .to_string();
    let stations = select_targets(catalog.stations(&region)?.into_values());
    info!("{}: {} target stations", region, stations.len());

    let policy = FilterPolicy {
        local_hours: args.local_hours.clone(),
        keep_unavailable: !args.drop_unavailable,
        missing_quality: if args.assume_clear {
            MissingQuality::AssumeClear
        } else {
            MissingQuality::Exclude
        },
        ..FilterPolicy::default()
    };

    let mut swaths = collect_swaths(&args.inputs)?;
    if let (Some(list), Some(dir)) = (&args.products, &args.product_dir) {
        let ids = fs::read_to_string(list)
            .with_context(|| format!("Failed to read product list {:?}", list))?;
        swaths.extend(resolve_products(&LocalProductStore::new(dir), &ids));
        swaths.sort();
        swaths.dedup();
    }
    info!("Found {} swath files", swaths.len());
    if swaths.is_empty() {
        anyhow::bail!("No .h5 input found");
    }

    let extractor = BandExtractor::new(GdalCommandBackend::new());
    let observations = MarkupDirectorySource::new(&args.observations);
    let mut engine = CorrelationEngine::new(stations, observations, policy);
    let records = run_batch(&swaths, &extractor, &args.workspace, &mut engine);

    // JSON Linesで出力
    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    for record in &records {
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    info!(
        "{} of {} passes produced records in {:?}",
        records.len(),
        swaths.len(),
        start_time.elapsed()
    );
    Ok(())
}

/// Expands directories into the `.h5` files beneath them.
fn collect_swaths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_dir(input, &mut files)?;
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            error!("Invalid input path: {:?}", input);
            anyhow::bail!("Input path must be a file or directory");
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Resolves product ids, one per line, to local files. Blank lines and `#`
/// comments are ignored; products the fetcher cannot supply are skipped.
fn resolve_products<F: ProductFetcher>(fetcher: &F, ids: &str) -> Vec<PathBuf> {
    ids.lines()
        .map(str::trim)
        .filter(|id| !id.is_empty() && !id.starts_with('#'))
        .filter_map(|id| match fetcher.fetch(id) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping product {}: {}", id, e);
                None
            }
        })
        .collect()
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_dir(&path, files)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("h5") {
            files.push(path);
        }
    }
    Ok(())
}
