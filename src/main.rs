use genetic_ai::config::Config;
use genetic_ai::evolution::Engine;
use genetic_ai::target::TargetStringModel;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    log::info!("Booting genetic-ai...");

    // 1. Load and Validate Configuration
    let config = match Config::load(Path::new("config.toml")) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    // 2. Build the model and the engine
    let model = match TargetStringModel::from_config(&config.target) {
        Ok(m) => m,
        Err(e) => {
            log::error!("Failed to build the target model: {}", e);
            process::exit(1);
        }
    };
    let engine = match Engine::new(model, config.engine.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to create the engine: {}", e);
            process::exit(1);
        }
    };

    log::debug!("Engine configuration: {:?}", engine.config());

    // 3. Evolve
    log::info!(
        "--- Evolving toward '{}' ---",
        String::from_utf8_lossy(engine.model().target())
    );
    let outcome = match engine.run_many(engine.config().time_budget(), engine.config().workers) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Evolution failed: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Best: {} (score {:.1}) after {} generations in {}ms",
        String::from_utf8_lossy(&outcome.best),
        outcome.score,
        outcome.generations,
        outcome.elapsed.as_millis()
    );
}
