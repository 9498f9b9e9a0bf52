//! Subcommand implementations.

use std::error::Error;
use std::time::Instant;

use hopbench_backends::{connectors, setup_backend};
use hopbench_core::dataset::{self, Dataset};
use hopbench_core::{
    generate, read_customer_ids, run_all, select_targets, write_report, BenchConfig,
    ComparisonReport,
};

type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// Generate the dataset and write it to the data directory.
pub fn generate_data(config: &BenchConfig) -> CommandResult {
    let spec = &config.dataset;
    println!(
        "Generating {} customers, {} transfers, {} card transactions (seed {})",
        spec.customers, spec.transactions, spec.card_transactions, spec.seed
    );

    let data = generate(spec)?;
    dataset::write_csv(&data, &config.data_dir)?;

    println!("Data written to {}", config.data_dir.display());
    Ok(())
}

fn load_dataset(config: &BenchConfig) -> CommandResult<Dataset> {
    dataset::read_csv(&config.data_dir).map_err(|e| {
        format!(
            "cannot read dataset from {} ({}); run `hopbench generate` first",
            config.data_dir.display(),
            e
        )
        .into()
    })
}

/// Load the dataset into every selected backend, stopping at the first failure.
pub fn setup(config: &BenchConfig) -> CommandResult {
    let data = load_dataset(config)?;

    for &backend in &config.backends {
        println!("Setting up {}...", backend);
        let start = Instant::now();
        let outcome = setup_backend(backend, config, &data)
            .map_err(|e| format!("{} setup failed: {}", backend, e))?;
        println!(
            "  {}: {} ({:.2}s)",
            backend,
            outcome,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Run the benchmark, print the comparison and persist the results.
pub fn run(config: &BenchConfig) -> CommandResult {
    let ids = read_customer_ids(config.customers_csv())?;
    let targets = select_targets(&ids, config.sample_size, config.seed);
    tracing::info!(
        targets = targets.len(),
        customers = ids.len(),
        backends = config.backends.len(),
        "starting benchmark"
    );

    let results = run_all(connectors(config), &targets, &config.run_settings())?;
    let report = ComparisonReport::build(&results, &config.baseline)?;

    println!("{}", report.render_console());

    let written = write_report(&config.results_dir, &report, &results)?;
    println!("\nResults written to {}:", config.results_dir.display());
    for path in written {
        println!("  {}", path.display());
    }

    if results.iter().all(|r| r.is_failed()) {
        return Err("no backend produced results".into());
    }
    Ok(())
}

/// Run every step in order, timing each and stopping at the first failure.
pub fn pipeline(config: &BenchConfig, skip_generate: bool, skip_setup: bool) -> CommandResult {
    let steps: [(&str, bool, fn(&BenchConfig) -> CommandResult); 3] = [
        ("Generate banking data", skip_generate, generate_data),
        ("Set up backends", skip_setup, setup),
        ("Run benchmark", false, run),
    ];
    let total = steps.len();
    let start = Instant::now();

    for (i, (name, skip, step)) in steps.into_iter().enumerate() {
        let n = i + 1;
        if skip {
            println!("\n[Step {}/{}] Skipping: {}", n, total, name);
            continue;
        }

        println!("\n[Step {}/{}] Running: {}", n, total, name);
        let step_start = Instant::now();
        if let Err(e) = step(config) {
            println!("\n[Step {}/{}] ERROR: {}", n, total, e);
            return Err(e);
        }
        println!(
            "\n[Step {}/{}] Completed in {:.2} seconds",
            n,
            total,
            step_start.elapsed().as_secs_f64()
        );
    }

    println!(
        "\nPipeline completed in {:.2} seconds",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
