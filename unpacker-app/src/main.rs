//! Unpacker Application
//!
//! 二进制拆包命令行入口：加载结构表和流水线配置，把采集数据作为输入字节流发布，
//! 执行若干周期后打印所有数据产品。

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use tracing::{error, info};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use unpacker_core::utils::hex_to_bytes;
use unpacker_core::{ByteStream, ConfigurationError, SchemaRegistry, UnpackError};
use unpacker_engine::TypeRegistry;
use unpacker_pipeline::{
    DataProductStore, Pipeline, PipelineConfig, PipelineContext, ProductValue,
    DEFAULT_INPUT_BYTE_STREAM, INPUT_BYTE_STREAM_PARAM,
};

/// 日志过滤环境变量
const LOG_ENV: &str = "UNPACKER_LOG";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "hex"])))]
struct Args {
    /// Path to the class schema table (JSON)
    #[arg(short, long)]
    schema: PathBuf,

    /// Path to the pipeline configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Path to the captured binary data
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Captured data as hex digits
    #[arg(long)]
    hex: Option<String>,

    /// Number of pipeline cycles to execute
    #[arg(short = 'n', long, default_value_t = 1)]
    cycles: usize,

    /// Name of the input byte stream product (defaults to the first stage's input)
    #[arg(long)]
    stream_name: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|s| s.parse::<Targets>().ok())
        .unwrap_or_else(|| Targets::new().with_default(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .ok();
}

fn load_input(args: &Args) -> Result<Vec<u8>, ConfigurationError> {
    if let Some(hex) = &args.hex {
        return hex_to_bytes(hex);
    }
    match &args.input {
        Some(path) => read_file(path),
        None => Err(ConfigurationError::MissingParameter("input".to_string())),
    }
}

/// 输入字节流产品名称：命令行优先，其次取第一个阶段的配置
fn input_stream_name(
    args: &Args,
    config: &PipelineConfig,
) -> Result<String, ConfigurationError> {
    if let Some(name) = &args.stream_name {
        return Ok(name.clone());
    }
    match config.pipeline.first() {
        Some(stage) => stage
            .parameters()
            .str_or(INPUT_BYTE_STREAM_PARAM, DEFAULT_INPUT_BYTE_STREAM),
        None => Ok(DEFAULT_INPUT_BYTE_STREAM.to_string()),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigurationError> {
    std::fs::read(path).map_err(|e| ConfigurationError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// 打印所有数据产品
fn print_products(store: &DataProductStore) {
    for product in store.snapshot() {
        let tags = product
            .tags
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match &product.value {
            ProductValue::Record(record) => {
                println!("{} ({}) [{}]", product.name, record.class_name(), tags);
                for (name, value) in record.field_values() {
                    println!("  {name} = {value}");
                }
            }
            value => println!("{} = {} [{}]", product.name, value, tags),
        }
    }
}

fn run(args: &Args) -> Result<(), UnpackError> {
    let types = TypeRegistry::shared();
    let schema = SchemaRegistry::from_json_file(&args.schema, &*types)?;
    let config = PipelineConfig::from_json_file(&args.config)?;
    let context = PipelineContext::new(Arc::new(schema), types);
    let pipeline = Pipeline::from_config(&config, &context)?;

    let stream_name = input_stream_name(args, &config)?;
    let data = load_input(args)?;
    info!(bytes = data.len(), stream = %stream_name, "loaded input");
    pipeline.store().publish_or_replace(
        stream_name.as_str(),
        ProductValue::ByteStream(ByteStream::from(data)),
        ["raw"],
    );

    for cycle in 0..args.cycles {
        info!(cycle, "execute pipeline");
        pipeline.execute();
    }

    print_products(pipeline.store());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_require_one_source() {
        assert!(Args::try_parse_from(["unpacker", "-s", "s.json", "-c", "p.json"]).is_err());
        assert!(Args::try_parse_from([
            "unpacker", "-s", "s.json", "-c", "p.json", "-i", "a.bin", "--hex", "00"
        ])
        .is_err());

        let args =
            Args::try_parse_from(["unpacker", "-s", "s.json", "-c", "p.json", "--hex", "0x0102"])
                .unwrap();
        assert_eq!(args.cycles, 1);
        assert_eq!(args.stream_name, None);
        assert_eq!(load_input(&args).unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn test_input_stream_name_follows_first_stage() {
        let config = PipelineConfig::from_json_str(
            r#"{"pipeline": [{"id": "h", "type": "simple_unpacker", "parameters": {
                "root_class_name": "Header",
                "input_byte_stream_product_name": "capture"
            }}]}"#,
        )
        .unwrap();
        let args =
            Args::try_parse_from(["unpacker", "-s", "s.json", "-c", "p.json", "--hex", "00"])
                .unwrap();
        assert_eq!(input_stream_name(&args, &config).unwrap(), "capture");

        let args = Args::try_parse_from([
            "unpacker", "-s", "s.json", "-c", "p.json", "--hex", "00", "--stream-name", "raw",
        ])
        .unwrap();
        assert_eq!(input_stream_name(&args, &config).unwrap(), "raw");
    }

    #[test]
    fn test_missing_input_file() {
        let args = Args::try_parse_from([
            "unpacker",
            "-s",
            "s.json",
            "-c",
            "p.json",
            "-i",
            "/nonexistent/capture.bin",
        ])
        .unwrap();
        assert!(matches!(
            load_input(&args),
            Err(ConfigurationError::Io { .. })
        ));
    }
}
