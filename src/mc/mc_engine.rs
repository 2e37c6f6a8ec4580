// src/mc/mc_engine.rs
use crate::error::{validation::*, AutocallError, AutocallResult};
use crate::market::calibration::CalibratedCurve;
use crate::mc::bump::Bump;
use crate::mc::distributed::Distributed;
use crate::mc::instrument::InstrumentSpec;
use crate::mc::payoffs::{AutocallPayoff, PathOutcome, PathState};
use crate::mc::progress::{NoProgress, ProgressObserver};
use crate::rng::{NormalSource, SeededNormals};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// How paths are spread over compute resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// One path after another on the calling thread
    Sequential,
    /// Rayon thread pool; `None` uses the global pool
    Parallel { threads: Option<usize> },
    /// Contiguous path partitions on independent workers
    Distributed { partitions: usize, max_retries: usize },
}

impl Default for Execution {
    fn default() -> Self {
        Execution::Parallel { threads: None }
    }
}

#[derive(Debug, Clone)]
pub struct McConfig {
    pub paths: usize,
    pub seed: u64,
    pub use_antithetic: bool,
    pub execution: Execution,
}

impl McConfig {
    /// Validate the Monte Carlo configuration
    pub fn validate(&self) -> AutocallResult<()> {
        validate_paths(self.paths)?;
        match self.execution {
            Execution::Parallel { threads: Some(0) } => Err(AutocallError::InvalidConfiguration {
                field: "threads".to_string(),
                reason: "must be greater than 0".to_string(),
            }),
            Execution::Distributed { partitions: 0, .. } => Err(AutocallError::InvalidConfiguration {
                field: "partitions".to_string(),
                reason: "must be greater than 0".to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn normals(&self) -> SeededNormals {
        SeededNormals::new(self.seed).with_antithetic(self.use_antithetic)
    }

    /// Strategy matching `execution`
    ///
    /// A dedicated thread pool is built here, once; reuse the returned
    /// strategy across pricing calls rather than rebuilding it.
    pub fn strategy(&self) -> AutocallResult<Box<dyn ExecutionStrategy>> {
        self.observed_strategy(Arc::new(NoProgress))
    }

    /// [`McConfig::strategy`] with partition progress sent to `observer`
    pub fn observed_strategy(
        &self,
        observer: Arc<dyn ProgressObserver>,
    ) -> AutocallResult<Box<dyn ExecutionStrategy>> {
        self.validate()?;
        let strategy: Box<dyn ExecutionStrategy> = match self.execution {
            Execution::Sequential => Box::new(Sequential),
            Execution::Parallel { threads: None } => Box::new(Parallel::default()),
            Execution::Parallel { threads: Some(n) } => Box::new(Parallel::with_threads(n)?),
            Execution::Distributed {
                partitions,
                max_retries,
            } => Box::new(Distributed::local(partitions, max_retries).with_observer(observer)),
        };
        Ok(strategy)
    }
}

impl Default for McConfig {
    fn default() -> Self {
        McConfig {
            paths: 100_000,
            seed: 12345,
            use_antithetic: false,
            execution: Execution::default(),
        }
    }
}

/// Everything a strategy needs to price: same contract for every topology
#[derive(Clone, Copy)]
pub struct PricingJob<'a> {
    pub spec: InstrumentSpec,
    pub curve: &'a CalibratedCurve,
    pub bump: Option<Bump>,
    pub draws: &'a dyn NormalSource,
    pub paths: usize,
}

impl<'a> PricingJob<'a> {
    pub fn new(
        spec: &InstrumentSpec,
        curve: &'a CalibratedCurve,
        draws: &'a dyn NormalSource,
        paths: usize,
    ) -> Self {
        Self {
            spec: *spec,
            curve,
            bump: None,
            draws,
            paths,
        }
    }

    pub fn with_bump(mut self, bump: Option<Bump>) -> Self {
        self.bump = bump;
        self
    }

    pub fn validate(&self) -> AutocallResult<()> {
        self.spec.validate()?;
        validate_paths(self.paths)?;
        if self.spec.steps != self.curve.steps() {
            return Err(AutocallError::InvalidConfiguration {
                field: "steps".to_string(),
                reason: format!(
                    "instrument has {} observation dates, curve has {}",
                    self.spec.steps,
                    self.curve.steps()
                ),
            });
        }
        if let Some(bump) = self.bump {
            validate_finite("bump_scale", bump.scale)?;
            if bump.volatility_scale() < 0.0 {
                return Err(AutocallError::InvalidParameters {
                    parameter: "volatility_scale".to_string(),
                    value: bump.scale,
                    constraint: "must be non-negative".to_string(),
                });
            }
            bump.apply_to_spec(&self.spec).validate()?;
        }
        if let Some((max_paths, max_steps)) = self.draws.capacity() {
            if max_paths < self.paths || max_steps < self.curve.steps() {
                return Err(AutocallError::MonteCarlo {
                    paths: self.paths,
                    reason: format!(
                        "draw source holds {} paths x {} steps, need {} x {}",
                        max_paths,
                        max_steps,
                        self.paths,
                        self.curve.steps()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Payoff engine with the bump applied
    pub fn payoff(&self) -> AutocallPayoff<'a> {
        AutocallPayoff::bumped(&self.spec, self.curve, self.bump)
    }

    pub fn draw_buffer(&self) -> Vec<f64> {
        vec![0.0; self.curve.steps()]
    }

    /// Simulate path `index` into `tally`, reusing `buffer` for its draws
    #[inline]
    pub fn simulate_path(
        &self,
        payoff: &AutocallPayoff<'_>,
        index: usize,
        buffer: &mut [f64],
        tally: &mut PathTally,
    ) {
        self.draws.fill_path(index as u64, buffer);
        tally.push(&payoff.evaluate(buffer));
    }

    /// Sequential tally of a contiguous path range
    pub fn simulate_range(&self, range: Range<usize>) -> PathTally {
        let payoff = self.payoff();
        let mut buffer = self.draw_buffer();
        let mut tally = PathTally::default();
        for index in range {
            self.simulate_path(&payoff, index, &mut buffer, &mut tally);
        }
        tally
    }
}

/// Running sums of path outcomes; the unit of reduction
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathTally {
    pub sum: f64,
    pub sum_sq: f64,
    pub evaluated: usize,
    /// Paths whose payoff was not finite
    pub excluded: usize,
    pub kicked_out: usize,
}

impl PathTally {
    #[inline]
    pub fn push(&mut self, outcome: &PathOutcome) {
        if !outcome.payoff.is_finite() {
            self.excluded += 1;
            return;
        }
        self.sum += outcome.payoff;
        self.sum_sq += outcome.payoff * outcome.payoff;
        self.evaluated += 1;
        if let PathState::KickedOut { .. } = outcome.state {
            self.kicked_out += 1;
        }
    }

    pub fn merge(self, other: PathTally) -> PathTally {
        PathTally {
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            evaluated: self.evaluated + other.evaluated,
            excluded: self.excluded + other.excluded,
            kicked_out: self.kicked_out + other.kicked_out,
        }
    }

    /// Paths accounted for, evaluated or excluded
    pub fn paths(&self) -> usize {
        self.evaluated + self.excluded
    }
}

/// Mean discounted payoff over the evaluated paths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEstimate {
    pub price: f64,
    /// Standard error of `price`
    pub std_error: f64,
    /// Paths requested
    pub paths: usize,
    pub evaluated: usize,
    pub excluded: usize,
    pub kicked_out: usize,
}

impl PriceEstimate {
    /// Share of evaluated paths that kicked out early
    pub fn kick_out_ratio(&self) -> f64 {
        self.kicked_out as f64 / self.evaluated as f64
    }

    /// Whether every requested path contributed to the mean
    pub fn is_complete(&self) -> bool {
        self.excluded == 0 && self.evaluated == self.paths
    }
}

/// A way of running `job.paths` path evaluations and reducing them
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tally of every path in `0..job.paths`
    fn run(&self, job: &PricingJob<'_>) -> AutocallResult<PathTally>;
}

impl<S: ExecutionStrategy + ?Sized> ExecutionStrategy for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn run(&self, job: &PricingJob<'_>) -> AutocallResult<PathTally> {
        (**self).run(job)
    }
}

impl<S: ExecutionStrategy + ?Sized> ExecutionStrategy for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn run(&self, job: &PricingJob<'_>) -> AutocallResult<PathTally> {
        (**self).run(job)
    }
}

/// Single accumulator on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl ExecutionStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn run(&self, job: &PricingJob<'_>) -> AutocallResult<PathTally> {
        Ok(job.simulate_range(0..job.paths))
    }
}

/// Shared-memory parallelism: per-worker tallies folded by rayon, then reduced
#[derive(Debug, Clone, Default)]
pub struct Parallel {
    /// Dedicated pool; `None` runs on the global rayon pool
    pool: Option<Arc<ThreadPool>>,
}

impl Parallel {
    /// Build a dedicated pool of `threads` workers
    pub fn with_threads(threads: usize) -> AutocallResult<Self> {
        if threads == 0 {
            return Err(AutocallError::InvalidConfiguration {
                field: "threads".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| AutocallError::ThreadPool {
                reason: e.to_string(),
            })?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Width of the pool paths run on
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn reduce(job: &PricingJob<'_>) -> PathTally {
        let payoff = job.payoff();
        (0..job.paths)
            .into_par_iter()
            .fold(
                || (PathTally::default(), job.draw_buffer()),
                |(mut tally, mut buffer), index| {
                    job.simulate_path(&payoff, index, &mut buffer, &mut tally);
                    (tally, buffer)
                },
            )
            .map(|(tally, _)| tally)
            .reduce(PathTally::default, PathTally::merge)
    }
}

impl ExecutionStrategy for Parallel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn run(&self, job: &PricingJob<'_>) -> AutocallResult<PathTally> {
        match &self.pool {
            None => Ok(Self::reduce(job)),
            Some(pool) => Ok(pool.install(|| Self::reduce(job))),
        }
    }
}

/// Price `job` with `strategy`
///
/// # Errors
///
/// - invalid terms, curve/instrument step mismatch, too few draws
/// - any strategy failure (e.g. a distributed partition that never reports)
/// - a tally that does not account for every requested path, or in which no
///   path produced a finite payoff
///
/// Paths with non-finite payoffs are excluded from the mean and counted in
/// [`PriceEstimate::excluded`].
pub fn price(job: &PricingJob<'_>, strategy: &dyn ExecutionStrategy) -> AutocallResult<PriceEstimate> {
    job.validate()?;
    debug!(
        strategy = strategy.name(),
        paths = job.paths,
        bump = ?job.bump,
        "pricing autocallable"
    );

    let tally = strategy.run(job)?;
    if tally.paths() != job.paths {
        return Err(AutocallError::MonteCarlo {
            paths: job.paths,
            reason: format!(
                "{} strategy accounted for {} paths",
                strategy.name(),
                tally.paths()
            ),
        });
    }
    if tally.evaluated == 0 {
        return Err(AutocallError::MonteCarlo {
            paths: job.paths,
            reason: "no path produced a finite payoff".to_string(),
        });
    }
    if tally.excluded > 0 {
        warn!(
            excluded = tally.excluded,
            paths = job.paths,
            "non-finite path payoffs excluded from the mean"
        );
    }

    let n = tally.evaluated as f64;
    let mean = tally.sum / n;
    let std_error = if tally.evaluated > 1 {
        let variance = (tally.sum_sq / n - mean * mean) * n / (n - 1.0);
        (variance.max(0.0) / n).sqrt()
    } else {
        0.0
    };

    if !mean.is_finite() {
        return Err(AutocallError::MonteCarlo {
            paths: job.paths,
            reason: format!("price estimate is not finite: {}", mean),
        });
    }

    Ok(PriceEstimate {
        price: mean,
        std_error,
        paths: job.paths,
        evaluated: tally.evaluated,
        excluded: tally.excluded,
        kicked_out: tally.kicked_out,
    })
}

/// Monte Carlo price of an autocallable with seeded draws
///
/// Convenience over [`price`] using the configuration's seed, antithetic flag
/// and execution strategy.
pub fn mc_price_autocallable(
    cfg: &McConfig,
    spec: &InstrumentSpec,
    curve: &CalibratedCurve,
    bump: Option<Bump>,
) -> AutocallResult<PriceEstimate> {
    mc_price_with_strategy(cfg, &cfg.strategy()?, spec, curve, bump)
}

/// Same as [`mc_price_autocallable`] with progress reporting for partitioned runs
pub fn mc_price_autocallable_observed(
    cfg: &McConfig,
    spec: &InstrumentSpec,
    curve: &CalibratedCurve,
    bump: Option<Bump>,
    observer: Arc<dyn ProgressObserver>,
) -> AutocallResult<PriceEstimate> {
    mc_price_with_strategy(cfg, &cfg.observed_strategy(observer)?, spec, curve, bump)
}

/// Seeded draws from `cfg`, run on a strategy the caller already built
pub fn mc_price_with_strategy(
    cfg: &McConfig,
    strategy: &dyn ExecutionStrategy,
    spec: &InstrumentSpec,
    curve: &CalibratedCurve,
    bump: Option<Bump>,
) -> AutocallResult<PriceEstimate> {
    cfg.validate()?;
    let normals = cfg.normals();
    let job = PricingJob::new(spec, curve, &normals, cfg.paths).with_bump(bump);
    price(&job, strategy)
}
