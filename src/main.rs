mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use tb_av::{detect_capabilities, FfmpegTranscoder, FfprobeProber, ToolRegistry};
use tb_bench::{BatchObserver, BatchReport, BatchRunner, Benchmark};
use tb_core::config::Config;
use tb_core::error::render_command;
use tb_core::Error;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "transcode_bench=debug,tb_bench=debug,tb_av=debug,tb_core=debug".to_string()
        } else {
            "transcode_bench=info,tb_bench=info,tb_av=info,tb_core=info".to_string()
        }
    });

    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Run(args) => rt.block_on(run_benchmark(config, args)),
        Commands::Probe { file, json } => rt.block_on(probe_file(&config, &file, json)),
        Commands::Plan { file, gpu, json } => rt.block_on(plan_file(&config, &file, gpu, json)),
        Commands::CheckTools => check_tools(&config),
    }
}

fn ensure_source(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::configuration(format!(
            "Input file does not exist: {}",
            path.display()
        ))
        .into());
    }
    Ok(())
}

async fn run_benchmark(mut config: Config, args: RunArgs) -> Result<()> {
    args.apply(&mut config.bench);
    config.ensure_valid()?;
    let bench = &config.bench;
    ensure_source(&bench.input)?;

    let tools = ToolRegistry::discover(&config.tools);
    let hw = detect_capabilities(&tools, bench.hw_accel).await?;
    let transcoder =
        FfmpegTranscoder::from_registry(&tools, config.limits, hw, bench.probe_timeout())?
            .with_timeout(bench.job_timeout());

    let concurrency = bench.effective_concurrency();
    tracing::info!(
        "Benchmarking {} with batch sizes {:?} (up to {} jobs at once)",
        bench.input.display(),
        bench.batch_sizes,
        concurrency
    );

    let runner = BatchRunner::new(
        Arc::new(transcoder),
        &bench.output_dir,
        bench.output_prefix.as_str(),
        concurrency,
    );
    let observer = if args.json {
        BatchObserver::noop()
    } else {
        BatchObserver::new(|report| {
            println!(
                "{:>5} conversions in {:>8.2} s  ({:.2} conversions/s)",
                report.batch_size,
                report.total.as_secs_f64(),
                report.throughput()
            );
        })
    };

    let reports = Benchmark::new(runner)
        .with_observer(observer)
        .run(&bench.input, &bench.batch_sizes)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }
    Ok(())
}

fn print_summary(reports: &[BatchReport]) {
    println!("\n{:>10} {:>12} {:>14} {:>14}", "batch", "total (s)", "mean job (s)", "jobs/s");
    for report in reports {
        let mean = report
            .mean_job_time()
            .map(|d| format!("{:.2}", d.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10} {:>12.2} {:>14} {:>14.2}",
            report.batch_size,
            report.total.as_secs_f64(),
            mean,
            report.throughput()
        );
    }
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    ensure_source(file)?;

    let tools = ToolRegistry::discover(&config.tools);
    let prober = FfprobeProber::new(tools.require("ffprobe")?.to_path_buf())
        .with_timeout(config.bench.probe_timeout());
    let info = prober.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Resolution: {}x{}", info.width, info.height);
    println!("Duration: {:.3} s", info.duration);
    if let Some(ref codec) = info.video_codec {
        print!("Video: {codec}");
        if let Some(fps) = info.frame_rate {
            print!(", {fps:.3} fps");
        }
        if let Some(bitrate) = info.video_bitrate {
            print!(", {bitrate} b/s");
        }
        println!();
    }
    if let Some(ref codec) = info.audio_codec {
        print!("Audio: {codec}");
        if let Some(bitrate) = info.audio_bitrate {
            print!(", {bitrate} b/s");
        }
        println!();
    }
    Ok(())
}

async fn plan_file(config: &Config, file: &Path, gpu: bool, json: bool) -> Result<()> {
    config.ensure_valid()?;
    ensure_source(file)?;

    let tools = ToolRegistry::discover(&config.tools);
    let hw = detect_capabilities(&tools, gpu || config.bench.hw_accel).await?;
    let transcoder =
        FfmpegTranscoder::from_registry(&tools, config.limits, hw, config.bench.probe_timeout())?;
    let plan = transcoder.plan_for(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let output = config
        .bench
        .output_dir
        .join(format!("{}_0.mp4", config.bench.output_prefix));
    let command = transcoder.encode_command(&plan, file, &output);

    println!("Encoder: {}", plan.encoder.accel);
    println!(
        "Filters: {}",
        plan.filter_graph().unwrap_or_else(|| "none".to_string())
    );
    match plan.duration_cap {
        Some(secs) => println!("Duration: truncated to {secs} s"),
        None => println!("Duration: {:.3} s", plan.effective_duration),
    }
    println!("Target bitrate: {} b/s", plan.target_bitrate);
    println!("Video bitrate: {} b/s", plan.bitrate);
    println!("\n{}", render_command(&command.command_line()));
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut required_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            // nvidia-smi only matters for --gpu
            if tool.name != "nvidia-smi" {
                required_ok = false;
            }
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if required_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to run the benchmark.");
    }

    Ok(())
}
