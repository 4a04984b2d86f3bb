//! Signal Tuner CLI - Tune green durations from a JSON configuration.

use std::fs;
use std::path::Path;
use std::process;

use signal_tuner::{
    compute::{CandidateEvaluator, Evaluator, PROGRESS_TARGET, evolution::EvolutionEngine},
    history::HistoryRecorder,
    schema::{Candidate, TuningConfig},
    sim::launcher_for,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_log_filter()))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    match args[1].as_str() {
        "--example" => print_example_config(),
        "--evaluate" | "--replay" => {
            if args.len() < 5 {
                print_usage(&args[0]);
                process::exit(1);
            }
            let config = load_config(Path::new(&args[2]));
            let candidate = Candidate::new(parse_green(&args[3]), parse_green(&args[4]));
            let replay = args[1] == "--replay";
            evaluate_plan(&config, candidate, replay);
        }
        path => {
            let config = load_config(Path::new(path));
            run_search(config);
        }
    }
}

/// Warnings everywhere plus replay progress, unless RUST_LOG says otherwise.
fn default_log_filter() -> String {
    format!("warn,{}=info", PROGRESS_TARGET)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <config.json>", program);
    eprintln!("       {} --evaluate <config.json> <green_a> <green_b>", program);
    eprintln!("       {} --replay <config.json> <green_a> <green_b>", program);
    eprintln!("       {} --example", program);
    eprintln!();
    eprintln!("Search the two green durations of one traffic light.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json  Path to tuning configuration file");
    eprintln!("  --evaluate   Score a single plan headless");
    eprintln!("  --replay     Run a single plan in the GUI with progress output");
    eprintln!("  --example    Print an example configuration");
    eprintln!();
    eprintln!("Set SUMO_MAP to choose the map directory under sumo_data/.");
    eprintln!("Set RUST_LOG (e.g. RUST_LOG=debug) to change log output.");
}

fn load_config(path: &Path) -> TuningConfig {
    let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        process::exit(1);
    });

    let config: TuningConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        process::exit(1);
    }
    config
}

fn parse_green(value: &str) -> i32 {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid green duration: {}", value);
        process::exit(1);
    })
}

fn build_evaluator(config: &TuningConfig) -> Evaluator {
    Evaluator::new(config, launcher_for(config.scenario.backend)).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    })
}

fn evaluate_plan(config: &TuningConfig, candidate: Candidate, replay: bool) {
    let mut evaluator = build_evaluator(config)
        .with_gui(replay)
        .with_verbose(replay);

    match evaluator.evaluate(candidate) {
        Ok(evaluation) => {
            let metrics = &evaluation.metrics;
            println!("Plan {}", metrics.candidate());
            println!("  Steps: {}", metrics.steps_used);
            println!("  Arrived: {}", metrics.arrived_total);
            println!("  Total wait: {:.2}s", metrics.total_wait);
            println!("  Avg wait per arrival: {:.2}s", metrics.avg_waiting_time());
            println!("  Avg speed: {:.2} m/s", metrics.avg_speed);
            println!("  Fitness: {:.3}", evaluation.fitness);
        }
        Err(e) => {
            eprintln!("Evaluation failed: {}", e);
            process::exit(1);
        }
    }
}

fn run_search(config: TuningConfig) {
    println!("Signal Plan Search");
    println!("==================");
    println!("Traffic light: {}", config.tls_id);
    println!(
        "Scenario: {}",
        config.scenario.resolved_config_path().display()
    );
    println!(
        "Population: {} x {} generations ({} elites)",
        config.population_size, config.generations, config.elite_count
    );
    println!("Green bounds: [{}, {}]", config.green_min, config.green_max);
    println!("History: {}", config.history_path.display());
    println!();

    let mut evaluator = build_evaluator(&config);
    let mut recorder = HistoryRecorder::new(&config.history_path);
    let replay_best = config.replay_best;
    let replay_config = config.clone();

    let mut engine = EvolutionEngine::new(config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let result = engine.run_with_callback(&mut evaluator, |report| {
        recorder.record(&report.record)?;
        let best = &report.scored[0];
        println!(
            "Gen {}: best {} fitness {:.3} (arrived {}, avg wait {:.2}s)",
            report.generation,
            best.candidate,
            best.fitness,
            report.record.throughput,
            report.record.avg_waiting_time
        );
        Ok(())
    });

    let result = result.unwrap_or_else(|e| {
        eprintln!("Search failed: {}", e);
        process::exit(1);
    });

    println!();
    println!(
        "OVERALL BEST: {} fitness {:.3}",
        result.best, result.best_fitness
    );
    println!(
        "Evaluations: {} in {:.1}s",
        result.stats.total_evaluations, result.stats.elapsed_seconds
    );

    if replay_best {
        println!();
        println!("Replaying best plan...");
        evaluate_plan(&replay_config, result.best, true);
    }
}

fn print_example_config() {
    let config = TuningConfig::default();

    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}
