use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use citygml_footprint::{
    detect_source_crs_from_reader, extract_footprints_from_reader, open_document, summarize,
    AttributeName, BuildingStream, CrsDetection, DocumentSummary, ExtractOptions, Footprint,
    StreamOptions, ZipHandler, DEFAULT_BUILDING_HEIGHT,
};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// デバッグログを出力
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 建物数と建物IDの一覧をJSONで出力
    Parse {
        /// 入力CityGMLファイル（.gml / .xml）またはZIPファイル
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// 一覧に載せる建物IDの最大数
        #[arg(long)]
        limit: Option<usize>,
    },

    /// 建物をストリーミングで読み、IDを1行ずつ出力
    StreamParse {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// 最大建物数
        #[arg(long)]
        limit: Option<usize>,

        /// 対象とする建物ID（複数指定可）
        #[arg(long = "building-id", value_name = "ID")]
        building_ids: Vec<String>,

        /// 建物IDとして参照する属性
        #[arg(long, default_value = "gml:id")]
        filter_attribute: AttributeName,
    },

    /// 建物フットプリントと高さをJSONで出力
    ExtractFootprints {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// 出力JSONファイル（省略時は標準出力）
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// 最大建物数
        #[arg(long)]
        limit: Option<usize>,

        /// 高さが得られない建物に使う高さ（m）
        #[arg(long, default_value_t = DEFAULT_BUILDING_HEIGHT)]
        default_height: f64,

        /// 文書全体を読み込んでから処理する
        #[arg(long)]
        no_streaming: bool,
    },

    /// 座標参照系（EPSGコード）とサンプル座標を推定
    DetectCrs {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy)]
enum InputType {
    Document,
    Zip,
}

fn input_type(path: &Path) -> Result<InputType> {
    if !path.is_file() {
        error!("Invalid input path: {:?}", path);
        anyhow::bail!("Input path must be a file: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "zip" => Ok(InputType::Zip),
        "gml" | "xml" => Ok(InputType::Document),
        _ => {
            error!("Unsupported file type: {:?}", path);
            anyhow::bail!("Input file must be .gml, .xml or .zip");
        }
    }
}

fn open_zip(input: &Path) -> ZipHandler {
    let handler = ZipHandler::new(input);
    info!("Processing ZIP file: {:?}", handler.path());
    handler
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ログの初期化（標準出力はJSON用に空けておく）
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    match cli.command {
        Command::Parse { input, limit } => run_parse(&input, limit)?,
        Command::StreamParse {
            input,
            limit,
            building_ids,
            filter_attribute,
        } => {
            let options = StreamOptions {
                limit,
                building_ids: (!building_ids.is_empty())
                    .then(|| building_ids.into_iter().collect::<HashSet<_>>()),
                filter_attribute,
            };
            run_stream_parse(&input, options)?
        }
        Command::ExtractFootprints {
            input,
            output,
            limit,
            default_height,
            no_streaming,
        } => {
            let options = ExtractOptions {
                stream: StreamOptions {
                    limit,
                    ..Default::default()
                },
                default_height,
                use_streaming: !no_streaming,
            };
            run_extract(&input, output.as_deref(), &options)?
        }
        Command::DetectCrs { input } => run_detect_crs(&input)?,
    }

    // 処理時間を表示
    info!("Total processing time: {:?}", start_time.elapsed());

    Ok(())
}

fn run_parse(input: &Path, limit: Option<usize>) -> Result<()> {
    let json = match input_type(input)? {
        InputType::Document => {
            let summary = summarize(open_document(input)?, limit)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            serde_json::to_string_pretty(&summary)?
        }
        InputType::Zip => {
            let handler = open_zip(input);
            let mut summaries: BTreeMap<String, DocumentSummary> = BTreeMap::new();
            for name in handler.list_documents()? {
                let summary = handler
                    .summarize(&name, limit)
                    .with_context(|| format!("Failed to parse {}", name))?;
                summaries.insert(name, summary);
            }
            serde_json::to_string_pretty(&summaries)?
        }
    };
    println!("{}", json);
    Ok(())
}

fn run_stream_parse(input: &Path, options: StreamOptions) -> Result<()> {
    let mut count = 0;
    let mut print_ids = |reader: &mut dyn BufRead| -> citygml_footprint::Result<()> {
        for item in BuildingStream::new(reader, options.clone()) {
            let (building, _) = item?;
            count += 1;
            let id = building
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("building_{}", count));
            println!("{}", id);
        }
        Ok(())
    };

    match input_type(input)? {
        InputType::Document => print_ids(&mut open_document(input)?)?,
        InputType::Zip => {
            let handler = open_zip(input);
            for name in handler.list_documents()? {
                info!("Processing {}", name);
                handler.with_document(&name, &mut print_ids)?;
            }
        }
    }
    println!("total={}", count);
    Ok(())
}

fn run_extract(input: &Path, output: Option<&Path>, options: &ExtractOptions) -> Result<()> {
    let footprints: Vec<Footprint> = match input_type(input)? {
        InputType::Document => extract_footprints_from_reader(open_document(input)?, options)
            .with_context(|| format!("Failed to extract footprints from {}", input.display()))?,
        InputType::Zip => open_zip(input)
            .extract_footprints(options)?
            .into_iter()
            .flat_map(|(_, footprints)| footprints)
            .collect(),
    };
    info!("Extracted {} footprints", footprints.len());

    let json = serde_json::to_string_pretty(&footprints)?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run_detect_crs(input: &Path) -> Result<()> {
    let json = match input_type(input)? {
        InputType::Document => {
            let detection = detect_source_crs_from_reader(open_document(input)?)?;
            serde_json::to_string_pretty(&detection)?
        }
        InputType::Zip => {
            let handler = open_zip(input);
            let mut detections: BTreeMap<String, CrsDetection> = BTreeMap::new();
            for name in handler.list_documents()? {
                detections.insert(name.clone(), handler.detect_source_crs(&name)?);
            }
            serde_json::to_string_pretty(&detections)?
        }
    };
    println!("{}", json);
    Ok(())
}
