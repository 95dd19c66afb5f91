use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use docband_core::{
    CompressionOptions, CompressionRequest, CompressionService, CompressionServiceImpl, EngineConfig, TargetBand,
};

const USAGE: &str = "usage: debug_compression <input> [output] [--min KB] [--max KB] [--target KB] [--gray] [--contrast BOOST] [--force-gs]";

struct Args {
    input: PathBuf,
    /// Explicit output path; derived from the input and the method when absent
    output: Option<PathBuf>,
    band: TargetBand,
    options: CompressionOptions,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let default_filter = if cfg!(debug_assertions) { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    println!("🗜️  Compression Debug Tool");
    println!("=========================");

    let config = EngineConfig::from_env();
    let args = match parse_args(env::args().skip(1).collect(), config.default_band) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("❌ {}", message);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let service = CompressionServiceImpl::from_config(config);
    match service.external_tool_version() {
        Some(version) => println!("🔧 Ghostscript: {}", version),
        None => println!("🔧 Ghostscript: not found (page pipeline only)"),
    }
    println!("📄 Input:  {}", args.input.display());
    println!(
        "🎯 Band:   [{:.0}, {:.0}] KB, target {:.0} KB",
        args.band.min_kb, args.band.max_kb, args.band.target_kb
    );

    // page-pipeline output is always PDF; only a verbatim copy keeps the input's type
    let staged = args.output.clone().unwrap_or_else(|| default_output(&args.input, None));
    let request = CompressionRequest::from_path(&args.input, &staged, args.band).with_options(args.options);
    let result = service.compress(request).await?;

    if result.success {
        let output = match args.output {
            Some(explicit) => explicit,
            None => {
                let derived = default_output(&args.input, result.method.as_deref());
                if derived != staged {
                    fs::rename(&staged, &derived)?;
                }
                derived
            }
        };
        println!("📁 Output: {}", output.display());
        let in_band = args.band.contains(result.compressed_kb());
        println!("\n✅ COMPRESSED ({})", result.method.as_deref().unwrap_or("-"));
        println!(
            "   📏 Size: {} → {} ({:.1}% saved)",
            format_bytes(result.original_size),
            format_bytes(result.compressed_size),
            result.compression_ratio
        );
        if let (Some(quality), Some(scale), Some(subsampling)) = (result.quality, result.scale, result.subsampling) {
            println!("   🎚️  Quality {} at scale {:.2}, {} chroma", quality, scale, subsampling.as_str());
        }
        if let Some(pages) = result.page_count {
            println!("   📑 Pages: {}", pages);
        }
        println!("   {} In band: {}", if in_band { "🟢" } else { "🟡" }, in_band);
    } else {
        println!("\n❌ FAILED: {}", result.error.as_deref().unwrap_or("unknown error"));
    }
    println!("   ⏱️  {} ms", result.duration_ms);

    Ok(())
}

fn parse_args(raw: Vec<String>, default_band: TargetBand) -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut band = default_band;
    let mut options = CompressionOptions::default();

    let mut iter = raw.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--min" => band.min_kb = parse_number(&arg, iter.next())?,
            "--max" => band.max_kb = parse_number(&arg, iter.next())?,
            "--target" => band.target_kb = parse_number(&arg, iter.next())?,
            "--contrast" => options.contrast_boost = parse_number::<f32>(&arg, iter.next())?,
            "--gray" => options.grayscale = true,
            "--force-gs" => options.force_external_tool = true,
            flag if flag.starts_with("--") => return Err(format!("unknown flag {}", flag)),
            other => positional.push(PathBuf::from(other)),
        }
    }

    let mut positional = positional.into_iter();
    let input = positional.next().ok_or("missing input path")?;
    let output = positional.next();
    Ok(Args { input, output, band, options })
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| format!("{} expects a number", flag))
}

/// Output next to the input: `photo.png` becomes `photo.compressed.pdf`, or
/// `photo.compressed.png` when `method` is `none` and the bytes were copied as is.
fn default_output(input: &Path, method: Option<&str>) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let extension = match method {
        Some("none") => input.extension().and_then(|e| e.to_str()),
        _ => Some("pdf"),
    };
    let name = match extension {
        Some(ext) => format!("{}.compressed.{}", stem, ext),
        None => format!("{}.compressed", stem),
    };
    input.with_file_name(name)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}
