mod cli;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ParamArgs};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vidmorph::{TransformRequest, TransformService};
use vm_av::{FfprobeProber, PipelineCompiler, SourceMedia, ToolRegistry};
use vm_core::config::Config;

fn main() {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidmorph=debug,vm_av=trace,vm_core=debug".to_string()
        } else {
            "vidmorph=info,vm_av=info,vm_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        let code = e
            .downcast_ref::<vm_core::Error>()
            .map_or(1, vm_core::Error::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            params,
            timeout,
            seed,
        } => transform_file(cli.config.as_deref(), input, output, &params, timeout, seed),
        Commands::Plan {
            input,
            output,
            params,
            height,
            seed,
            json,
        } => print_plan(cli.config.as_deref(), &input, &output, &params, height, seed, json),
        Commands::Probe { file } => probe_file(cli.config.as_deref(), &file),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidmorph {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn transform_file(
    config_path: Option<&Path>,
    input: PathBuf,
    output: PathBuf,
    params: &ParamArgs,
    timeout: Option<u64>,
    seed: Option<u64>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }

    let request = TransformRequest {
        source: input,
        destination: output,
        params: params.to_params(),
        timeout: timeout.map(Duration::from_secs),
        seed,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let service = TransformService::from_config(&config)?;
        let outcome = service.process(request).await;
        service.shutdown().await;
        outcome
    })?;

    let result = &outcome.result;
    match &outcome.delivered {
        Some(path) if result.succeeded => {
            println!("Job {} complete in {:.1}s", outcome.job_id, result.elapsed.as_secs_f64());
            println!("Output: {}", path.display());
            Ok(())
        }
        _ => {
            for line in &result.diagnostics {
                eprintln!("  {line}");
            }
            let reason = result
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown failure".into());
            anyhow::bail!("Video processing failed ({reason})")
        }
    }
}

fn print_plan(
    config_path: Option<&Path>,
    input: &Path,
    output: &Path,
    params: &ParamArgs,
    height: Option<u32>,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let params = params.to_params();

    let height = match height {
        Some(h) => Some(h),
        None if params.toggles.aspect => {
            let ffprobe = tools.require("ffprobe")?.path.clone();
            let rt = tokio::runtime::Runtime::new()?;
            let dims = rt.block_on(FfprobeProber::new(ffprobe).video_dimensions(input))?;
            Some(dims.height)
        }
        None => None,
    };

    let compiler = PipelineCompiler::new(&config.encoding);
    let source = SourceMedia::new(input).with_height(height);
    let plan = match seed {
        Some(seed) => {
            compiler.compile_with_rng(&params, &source, output, &mut StdRng::seed_from_u64(seed))?
        }
        None => compiler.compile(&params, &source, output)?,
    };

    let ffmpeg = tools
        .get("ffmpeg")
        .map(|t| t.path.clone())
        .unwrap_or_else(|| PathBuf::from("ffmpeg"));

    if json {
        let doc = serde_json::json!({
            "input": plan.input(),
            "output": plan.output(),
            "trim": plan.trim().map(|t| serde_json::json!({
                "start_offset_secs": t.start_offset_secs,
                "duration_secs": t.duration_secs,
            })),
            "video_filters": plan.video_descriptors(),
            "audio_filters": plan.audio_descriptors(),
            "program": ffmpeg,
            "args": plan.to_args(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("{}", plan.command_line(&ffmpeg));
    }

    Ok(())
}

fn probe_file(config_path: Option<&Path>, file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?.path.clone();

    let rt = tokio::runtime::Runtime::new()?;
    let dims = rt.block_on(FfprobeProber::new(ffprobe).video_dimensions(file))?;

    println!("File: {}", file.display());
    println!("Video: {}x{}", dims.width, dims.height);
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("⚠ {warning}");
        }
    }
    println!("  Max concurrent jobs: {}", config.jobs.max_concurrent);
    println!("  Cleanup workers: {}", config.jobs.cleanup_workers);
    println!("  Timeout: {}s", config.jobs.timeout_secs);
    println!("  Temp dir: {}", config.jobs.temp_dir.display());
    println!(
        "  Encoding: {} preset={} crf={} / {}",
        config.encoding.video_codec,
        config.encoding.preset,
        config.encoding.crf,
        config.encoding.audio_codec
    );

    Ok(())
}
