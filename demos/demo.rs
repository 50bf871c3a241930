use bayes_feed::{LinearSensor, Mode, Simulation, SimulationConfig, TextReporter};

fn main() {
    // --- 1. Setup ---
    // Feed axis commanded over [0, 1]; the sensor reads y = 0.2 + 1.0 * x with 0.05 noise.
    let mut config = SimulationConfig::default();
    config.generator.seed = Some(2024);

    let mut sensor =
        LinearSensor::from_config(&config.generator).expect("default generator config is valid");
    let observations = sensor.observations();
    println!(
        "Sampling {} positions over [{:.1}, {:.1}]",
        sensor.positions().len(),
        sensor.positions().first().copied().unwrap_or_default(),
        sensor.positions().last().copied().unwrap_or_default()
    );

    // --- 2. Estimation with feed control ---
    println!("--- Uncertainty-driven feed control ---");
    let mut controlled = Simulation::from_config(&config, true).expect("default config is valid");
    let summary = controlled
        .run(&observations, &mut TextReporter::new(std::io::stdout()))
        .expect("noisy line data never degenerates");

    match summary.first_normal_step {
        Some(step) => println!("Full feed rate reached at step {step}."),
        None => println!("Uncertainty never dropped below the safe threshold."),
    }

    // --- 3. Estimation only, same data ---
    println!("\n--- Estimation only ---");
    let mut estimate = Simulation::from_config(&config, false).expect("default config is valid");
    estimate
        .run(&observations, &mut TextReporter::new(std::io::stdout()))
        .expect("noisy line data never degenerates");

    let model = estimate.estimator();
    println!(
        "\nFitted line: y = {:.4} + {:.4} * x (true: y = {} + {} * x)",
        model.intercept().unwrap_or_default(),
        model.slope().unwrap_or_default(),
        sensor.intercept(),
        sensor.slope()
    );

    let stops = controlled
        .history()
        .iter()
        .filter(|r| r.decision.map(|d| d.mode) == Some(Mode::Stop))
        .count();
    println!(
        "The controlled run held the axis stopped for {stops} step(s) while the prior dominated."
    );
}
