//! Command-line runner
//!
//! Usage: `sightclick <assets.json> [config.toml]`
//!
//! Runs until a line is entered on stdin or stdin is closed.

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use sightclick::{
    platform_backend, Detector, EnigoClicker, EngineConfig, EngineError, Orchestrator,
    TemplateStore, XcapScreen,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> sightclick::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(assets) = args.next() else {
        eprintln!("Usage: sightclick <assets.json> [config.toml]");
        return Err(EngineError::Config("missing asset file".to_string()));
    };
    let config = match args.next() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let store = TemplateStore::load(&assets)?;
    println!("Loaded {} sequence(s): {}", store.len(), store.names().join(", "));

    let detector = Detector::from_config(
        &config,
        platform_backend(),
        Box::new(XcapScreen::new()),
        Box::new(EnigoClicker::new()),
    );

    if config.capture.window_title.is_some() && !detector.capture().is_window_mode() {
        let tracker = detector.capture().tracker();
        println!("Available windows:");
        for window in tracker.enumerate(tracker.min_size()) {
            println!("  {}", window);
        }
    }

    let (tx, rx) = mpsc::channel::<String>();
    let mut orchestrator =
        Orchestrator::from_config(detector, store.into_sequences(), &config).with_log(tx);

    let printer = thread::Builder::new()
        .name("sightclick-log".to_string())
        .spawn(move || {
            for message in rx {
                println!("{}", message);
            }
        })?;

    orchestrator.start()?;

    // Any input, or end of input, stops the worker
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    orchestrator.stop();
    println!("Executions: {}", orchestrator.execution_count());

    // Dropping the orchestrator closes the log channel and ends the printer
    drop(orchestrator);
    let _ = printer.join();
    Ok(())
}
