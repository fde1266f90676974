//! Strategies and the ordered fallback chains that run them

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::converters::external::ToolPaths;
use crate::error::{ConversionError, StrategyFailure};
use crate::options::ConversionOptions;
use crate::progress::Progress;
use crate::scene::SceneBackend;

/// Everything a strategy needs for one conversion
pub struct ConversionJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub options: &'a ConversionOptions,
    pub backend: &'a dyn SceneBackend,
    pub tools: &'a ToolPaths,
}

/// One way of producing the output file
pub trait ConversionStrategy {
    fn name(&self) -> &str;

    /// Writes `job.output`; on `Ok` the file must exist
    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError>;
}

type StrategyFn = dyn Fn(&ConversionJob, &mut Progress) -> Result<(), ConversionError>;

/// A strategy backed by a plain function or closure
pub struct FnStrategy {
    name: String,
    run: Box<StrategyFn>,
}

impl FnStrategy {
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&ConversionJob, &mut Progress) -> Result<(), ConversionError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

impl ConversionStrategy for FnStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        (self.run)(job, progress)
    }
}

/// Ordered strategies for one format; the first success wins
pub struct StrategyChain {
    format: String,
    strategies: Vec<Box<dyn ConversionStrategy>>,
}

impl StrategyChain {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl ConversionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn ConversionStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Runs strategies in order. Failures and panics are reported at 0% and
    /// the next strategy is tried; only the aggregate failure is returned.
    pub fn run(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            progress.begin_attempt();
            progress.report(5, &format!("Trying {}...", name));

            let outcome = remove_stale_output(name, job)
                .and_then(|()| {
                    panic::catch_unwind(AssertUnwindSafe(|| strategy.convert(job, progress)))
                        .unwrap_or_else(|payload| Err(ConversionError::strategy(name, panic_message(payload.as_ref()))))
                })
                .and_then(|()| check_output(name, job.output));

            match outcome {
                Ok(()) => {
                    log::info!("{} conversion succeeded with {}", self.format, name);
                    progress.report(100, &format!("{} conversion complete!", self.format));
                    return Ok(());
                }
                Err(e) => {
                    let reason = failure_reason(name, e);
                    progress.failure(&format!("{} failed: {}", name, reason));
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        reason,
                    });
                }
            }
        }

        progress.failure(&format!("All {} conversion methods failed", self.format));
        Err(ConversionError::AllStrategiesFailed {
            format: self.format.clone(),
            failures,
        })
    }
}

/// Runs a whole chain as one step of another chain
pub struct ChainStrategy {
    name: String,
    chain: StrategyChain,
}

impl ChainStrategy {
    pub fn new(name: impl Into<String>, chain: StrategyChain) -> Self {
        Self {
            name: name.into(),
            chain,
        }
    }
}

impl ConversionStrategy for ChainStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert(&self, job: &ConversionJob, progress: &mut Progress) -> Result<(), ConversionError> {
        self.chain.run(job, progress)
    }
}

/// Leftovers from an earlier run must not pass for this attempt's output
fn remove_stale_output(strategy: &str, job: &ConversionJob) -> Result<(), ConversionError> {
    if job.output == job.input || !job.output.is_file() {
        return Ok(());
    }
    log::debug!("Removing existing {}", job.output.display());
    std::fs::remove_file(job.output)
        .map_err(|e| ConversionError::strategy(strategy, format!("cannot replace {}: {}", job.output.display(), e)))
}

fn check_output(strategy: &str, output: &Path) -> Result<(), ConversionError> {
    match std::fs::metadata(output) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(ConversionError::strategy(strategy, "output file is empty")),
        Err(_) => Err(ConversionError::strategy(strategy, "no output file was written")),
    }
}

/// Strategy errors already naming the strategy are reduced to their reason
fn failure_reason(name: &str, error: ConversionError) -> String {
    match error {
        ConversionError::StrategyFailed { strategy, reason } if strategy == name => reason,
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressLog;
    use crate::scene::UsdaBackend;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stagehand_strategy_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn writes(name: &'static str) -> FnStrategy {
        FnStrategy::new(name, |job, progress| {
            progress.report(40, "writing");
            std::fs::write(job.output, "#usda 1.0\n").map_err(|e| ConversionError::SceneWriteFailed(e.to_string()))
        })
    }

    fn fails(name: &'static str) -> FnStrategy {
        FnStrategy::new(name, move |_, _| Err(ConversionError::ExternalToolMissing(name.to_string())))
    }

    fn run_chain(chain: &StrategyChain, output: &Path) -> (Result<(), ConversionError>, ProgressLog) {
        let backend = UsdaBackend::new();
        let options = ConversionOptions::default();
        let tools = ToolPaths::default();
        let input = output.with_extension("obj");
        let job = ConversionJob {
            input: &input,
            output,
            options: &options,
            backend: &backend,
            tools: &tools,
        };
        let mut log = ProgressLog::new();
        let mut callback = |p: u8, m: &str| log.record(p, m);
        let result = chain.run(&job, &mut Progress::new(&mut callback));
        (result, log)
    }

    #[test]
    fn test_first_success_wins() {
        let dir = temp_dir("first");
        let output = dir.join("out.usda");
        let chain = StrategyChain::new("OBJ").with(fails("a")).with(writes("b")).with(fails("c"));
        let (result, log) = run_chain(&chain, &output);
        assert!(result.is_ok());
        assert_eq!(log.failures(), vec!["a failed: external tool not available: a"]);
        assert!(!log.events.iter().any(|(_, m)| m.contains("Trying c")));
        assert_eq!(log.events.last().unwrap(), &(100, "OBJ conversion complete!".to_string()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_panics_are_contained() {
        let dir = temp_dir("panic");
        let output = dir.join("out.usda");
        let chain = StrategyChain::new("FBX")
            .with(FnStrategy::new("boom", |_, _| panic!("bad input")))
            .with(writes("ok"));
        let (result, log) = run_chain(&chain, &output);
        assert!(result.is_ok());
        assert!(log.failures()[0].contains("panicked: bad input"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_success_without_output_is_failure() {
        let dir = temp_dir("nooutput");
        let output = dir.join("out.usda");
        let chain = StrategyChain::new("FBX").with(FnStrategy::new("liar", |_, _| Ok(())));
        let (result, log) = run_chain(&chain, &output);
        match result {
            Err(ConversionError::AllStrategiesFailed { format, failures }) => {
                assert_eq!(format, "FBX");
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].strategy, "liar");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(log.failures().last(), Some(&"All FBX conversion methods failed"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_existing_output_does_not_count() {
        let dir = temp_dir("stale");
        let output = dir.join("out.usda");
        std::fs::write(&output, "#usda 1.0\n# from an earlier run\n").unwrap();
        let chain = StrategyChain::new("OBJ").with(FnStrategy::new("noop", |_, _| Ok(())));
        let (result, _) = run_chain(&chain, &output);
        assert!(matches!(result, Err(ConversionError::AllStrategiesFailed { .. })));
        assert!(!output.exists());

        std::fs::write(&output, "stale").unwrap();
        let chain = StrategyChain::new("OBJ").with(writes("fresh"));
        let (result, _) = run_chain(&chain, &output);
        assert!(result.is_ok());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "#usda 1.0\n");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_nested_chain_delegates() {
        let dir = temp_dir("nested");
        let output = dir.join("out.usda");
        let base = StrategyChain::new("FBX").with(fails("inner")).with(writes("inner ok"));
        let chain = StrategyChain::new("FBX")
            .with(fails("outer"))
            .with(ChainStrategy::new("base chain", base));
        assert_eq!(chain.names(), vec!["outer", "base chain"]);
        let (result, log) = run_chain(&chain, &output);
        assert!(result.is_ok());
        assert_eq!(log.failures().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
