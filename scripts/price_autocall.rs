// scripts/price_autocall.rs
use autocall_mc::analytics::bs_analytic::OptionType;
use autocall_mc::greeks::estimator::estimate_greeks;
use autocall_mc::market::calibration::MarketCalibrator;
use autocall_mc::market::surface::MarketSurface;
use autocall_mc::math_utils::Timer;
use autocall_mc::mc::mc_engine::{mc_price_autocallable_observed, Execution};
use autocall_mc::mc::TracingProgress;
use autocall_mc::output::{write_summary_to_csv, CsvSink, ResultSink};
use autocall_mc::{AutocallResult, PricingConfig};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn execution_label(execution: &Execution) -> String {
    match execution {
        Execution::Sequential => "sequential".to_string(),
        Execution::Parallel { threads: None } => format!("parallel ({} threads)", rayon::current_num_threads()),
        Execution::Parallel { threads: Some(n) } => format!("parallel ({} threads)", n),
        Execution::Distributed {
            partitions,
            max_retries,
        } => format!("distributed ({} partitions, {} retries)", partitions, max_retries),
    }
}

fn run(config: &PricingConfig) -> AutocallResult<()> {
    let spec = config.instrument_spec()?;
    let mc = config.mc_config();
    let mut timer = Timer::new();

    let market = config.flat_market()?.build()?;
    let surface = MarketSurface::from_source(&market)?;
    let calibration = MarketCalibrator::new(OptionType::Call, config.market.curve_mode).calibrate(
        &surface,
        spec.protection_barrier,
        config.instrument.start_year,
        config.instrument.maturity_year,
    )?;
    let curve = &calibration.curve;
    let calibration_ms = timer.elapsed_ms();

    println!("Calibration ({:.1} ms)", calibration_ms);
    println!("  Observation years: {:?}", calibration.observation_years);
    println!("  Drift:      {:?}", curve.drift());
    println!("  Volatility: {:?}", curve.volatility());
    println!("  Discount:   {:?}", curve.discount());
    println!("  Unconverged vol nodes: {}", calibration.volatility.non_converged());
    println!();

    timer.start();
    let estimate = mc_price_autocallable_observed(&mc, &spec, curve, None, Arc::new(TracingProgress))?;
    let pricing_ms = timer.elapsed_ms();

    println!("Price ({}, {} paths, {:.1} ms)", execution_label(&mc.execution), mc.paths, pricing_ms);
    println!("  Price:          {:.6} ± {:.6}", estimate.price, estimate.std_error);
    println!("  Kick-out ratio: {:.2}%", estimate.kick_out_ratio() * 100.0);
    println!("  Excluded paths: {}", estimate.excluded);
    println!();

    let set = config.greek_set()?;
    timer.start();
    let report = estimate_greeks(set, &config.greek_grids(), &spec, curve, &mc, Arc::new(TracingProgress))?;
    let greeks_ms = timer.elapsed_ms();

    println!("Greeks ({:.1} ms)", greeks_ms);
    println!("{:<8} {:>14} {:>14}", "Greek", "Midpoint", "Value");
    println!("{:-<38}", "");
    for series in &report.series {
        for (m, v) in series.derivative.midpoints.iter().zip(&series.derivative.values) {
            println!("{:<8} {:>14.6} {:>14.6}", series.greek.name(), m, v);
        }
    }

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir)?;
        let sink = CsvSink::new(dir);
        for series in &report.series {
            sink.publish(series)?;
        }
        let summary = [
            ("price", estimate.price.to_string()),
            ("std_error", estimate.std_error.to_string()),
            ("paths", estimate.paths.to_string()),
            ("evaluated", estimate.evaluated.to_string()),
            ("excluded", estimate.excluded.to_string()),
            ("kicked_out", estimate.kicked_out.to_string()),
            ("execution", execution_label(&mc.execution)),
            ("seed", mc.seed.to_string()),
            ("calibration_ms", format!("{:.1}", calibration_ms)),
            ("pricing_ms", format!("{:.1}", pricing_ms)),
            ("greeks_ms", format!("{:.1}", greeks_ms)),
        ];
        write_summary_to_csv(Path::new(dir).join("summary.csv"), &summary, report.generated_at)?;
        info!(dir = %dir, "results written");
    }

    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match env::args().nth(1) {
        Some(path) => PricingConfig::from_file(&path),
        None => Ok(PricingConfig::default()),
    };

    let result = config.and_then(|config| {
        println!("Autocallable Monte Carlo Pricer");
        println!("===============================\n");
        run(&config)
    });

    if let Err(e) = result {
        error!(error = %e, "pricing run failed");
        std::process::exit(1);
    }
}
