use crate::classifier::FailingInput;
use crate::driver::{FuzzDriver, FuzzError};
use crate::target::Target;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Splits a total fuzz budget evenly across `targets` targets.
///
/// The slice is `⌊total / targets⌋` in whole milliseconds, so the slices
/// never sum to more than `total`. Returns `None` when there is nothing to
/// schedule.
pub fn slice_per_target(total: Duration, targets: usize) -> Option<Duration> {
    if targets == 0 {
        return None;
    }
    let millis = total.as_millis() / targets as u128;
    Some(Duration::from_millis(
        u64::try_from(millis).unwrap_or(u64::MAX),
    ))
}

/// Outcome of fuzzing one target within a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRun {
    pub target: Target,
    pub failing_input: Option<FailingInput>,
    pub elapsed: Duration,
}

/// Result of running a list of targets sequentially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignReport {
    /// Budget each target was given.
    pub slice: Duration,
    /// Runs in execution order. Shorter than the target list when fail-fast
    /// stopped the campaign early.
    pub runs: Vec<TargetRun>,
}

impl CampaignReport {
    pub fn any_failure(&self) -> bool {
        self.runs.iter().any(|run| run.failing_input.is_some())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Target, &FailingInput)> {
        self.runs
            .iter()
            .filter_map(|run| run.failing_input.as_ref().map(|input| (&run.target, input)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignOptions {
    pub total: Duration,
    /// Stop after the first target that reports a failing input.
    pub fail_fast: bool,
}

/// Fuzzes `targets` one after another, each for an equal slice of
/// `options.total`.
///
/// Targets never run concurrently: each driver run is CPU and memory bound
/// and concurrent runs would make the per-target budget meaningless.
///
/// Returns `Ok(None)` when `targets` is empty. Any [`FuzzError`] ends the
/// campaign immediately; a launch failure would repeat for every remaining
/// target, and an unexpected failure must be surfaced.
pub fn run_campaign(
    driver: &mut dyn FuzzDriver,
    targets: &[Target],
    options: CampaignOptions,
) -> Result<Option<CampaignReport>, FuzzError> {
    run_campaign_with(driver, targets, options, |_| ControlFlow::Continue(()))
}

/// Like [`run_campaign`], calling `on_run` as soon as each target finishes.
/// Returning [`ControlFlow::Break`] stops the campaign; the report then holds
/// the runs completed so far.
pub fn run_campaign_with<F>(
    driver: &mut dyn FuzzDriver,
    targets: &[Target],
    options: CampaignOptions,
    mut on_run: F,
) -> Result<Option<CampaignReport>, FuzzError>
where
    F: FnMut(&TargetRun) -> ControlFlow<()>,
{
    let Some(slice) = slice_per_target(options.total, targets.len()) else {
        return Ok(None);
    };

    info!(
        "discovered {} targets, each of them will be fuzzed for {:?}",
        targets.len(),
        slice
    );

    let mut report = CampaignReport {
        slice,
        runs: Vec::with_capacity(targets.len()),
    };

    for target in targets {
        info!("fuzzing {target} for {slice:?}");
        let started = Instant::now();
        let failing_input = driver.fuzz(target, slice)?;
        let run = TargetRun {
            target: target.clone(),
            failing_input,
            elapsed: started.elapsed(),
        };

        if let Some(input) = &run.failing_input {
            warn!(target = %target, id = input.id(), "found {input}");
        }
        let failed = run.failing_input.is_some();
        let flow = on_run(&run);
        report.runs.push(run);

        if flow.is_break() {
            break;
        }
        if failed && options.fail_fast {
            info!("fail-fast enabled, skipping remaining targets");
            break;
        }
    }

    Ok(Some(report))
}
