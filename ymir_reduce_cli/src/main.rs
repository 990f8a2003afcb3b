//! # ymir_reduce_cli
//!
//! Part of the ymir_reduce crate family.
//!
//! This is the command line application to reduce YMIR imaging data.
//!
//! ## Install
//!
//! Use `cargo install --path ./ymir_reduce_cli`
//!
//! ## Use
//!
//! Make a template configuration file with
//!
//! ```bash
//! ymir_reduce_cli -p config.yml new
//! ```
//!
//! Edit the paths in the file, then run the reduction with
//!
//! ```bash
//! ymir_reduce_cli -p config.yml
//! ```
//!
//! Progress is shown in the terminal. Detailed messages from the reduction are written to
//! `ymir_reduce.log` in the working directory.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use libymir_reduce::config::Config;
use libymir_reduce::process::process;
use libymir_reduce::status::ReductionStatus;

fn make_template_config(path: &Path) {
    Config::default()
        .write_config_file(path)
        .expect("Failed to write template config file!");
}

/// Route the library's spdlog messages to a log file
fn init_file_logger() {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./ymir_reduce.log"))
            .formatter(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            ))
            .truncate(true)
            .build()
            .expect("Could not create log file!"),
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()
            .expect("Could not create file logger!"),
    );
    spdlog::set_default_logger(logger);
}

fn main() {
    // Create a cli
    let matches = Command::new("ymir_reduce_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    init_file_logger();

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Input Path: {}", config.input_path.to_string_lossy());
    if let Some(source_dir) = config.source_dir.as_ref() {
        log::info!("Source Directory: {}", source_dir.to_string_lossy());
    }
    log::info!(
        "Detector: {}/{}",
        config.histogram_path,
        config.detector_name
    );
    log::info!("Rotation Sensor: {}", config.sensor_name);
    if !config.crop.is_full_frame() {
        log::info!("Crop: {:?}", config.crop);
    }
    log::info!(
        "Background Threshold: {} Sample Threshold: {}",
        config.background_threshold,
        config.sample_threshold
    );
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    match config.normalized_path.as_ref() {
        Some(path) => log::info!("Normalized Path: {}", path.to_string_lossy()),
        None => log::info!("Normalized Path: None (normalization skipped)"),
    }
    log::info!(
        "Merge Images: {} Overwrite: {}",
        config.merge_images,
        config.overwrite
    );

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .expect("Invalid progress bar template!"),
    );
    let (tx, rx) = mpsc::channel::<ReductionStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    // The channel closes once the task has finished and dropped its sender
    for status in rx {
        pb.set_message(format!("{} {}", status.stage, status.message));
        pb.set_position((status.progress * 100.0) as u64);
    }

    match handle.join() {
        Ok(result) => match result {
            Ok(_) => log::info!("Successfully reduced data!"),
            Err(e) => log::error!("Reduction failed with error: {e}. Check ymir_reduce.log."),
        },
        Err(_) => log::error!("Failed to join reduction task!"),
    }

    pb.finish();

    log::info!("Done.");
}
