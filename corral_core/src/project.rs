use crate::classifier::FailingInput;
use crate::config::DriverSettings;
use crate::corpus::{self, CorpusError};
use crate::discovery::{DiscoveryError, discover_targets};
use crate::driver::{CancelToken, FuzzDriver, FuzzError, GoFuzzDriver, GoFuzzDriverConfig};
use crate::lister::{GoPackageLister, PackageLister};
use crate::scheduler::{CampaignOptions, CampaignReport, TargetRun, run_campaign_with};
use crate::target::Target;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A Go module on disk together with the tools used to inspect and fuzz it.
///
/// Pattern-driven operations always run discovery first, so a bad pattern
/// fails before anything is read, written or launched.
pub struct Project {
    dir: PathBuf,
    lister: Box<dyn PackageLister>,
    driver: Box<dyn FuzzDriver>,
}

impl Project {
    pub fn new(
        dir: impl Into<PathBuf>,
        lister: Box<dyn PackageLister>,
        driver: Box<dyn FuzzDriver>,
    ) -> Self {
        Self {
            dir: dir.into(),
            lister,
            driver,
        }
    }

    /// Builds a project that lists packages and fuzzes through the Go
    /// toolchain named by `settings`.
    pub fn with_go_toolchain(
        dir: impl Into<PathBuf>,
        settings: &DriverSettings,
        quiet: bool,
        cancel: CancelToken,
    ) -> Self {
        let dir = dir.into();
        let lister = GoPackageLister::new(settings.command.clone());
        let mut driver_config = GoFuzzDriverConfig::new(dir.clone());
        driver_config.command = settings.command.clone();
        driver_config.quiet = quiet;
        let driver = GoFuzzDriver::new(driver_config).with_cancel(cancel);

        Self::new(dir, Box::new(lister), Box::new(driver))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn discover<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<Target>, DiscoveryError> {
        discover_targets(self.lister.as_ref(), &self.dir, patterns)
    }

    pub fn fuzz(
        &mut self,
        target: &Target,
        duration: Duration,
    ) -> Result<Option<FailingInput>, FuzzError> {
        self.driver.fuzz(target, duration)
    }

    /// Runs a sequential campaign over already discovered `targets`.
    pub fn run_campaign(
        &mut self,
        targets: &[Target],
        options: CampaignOptions,
    ) -> Result<Option<CampaignReport>, FuzzError> {
        self.run_campaign_with(targets, options, |_| ControlFlow::Continue(()))
    }

    pub fn run_campaign_with<F>(
        &mut self,
        targets: &[Target],
        options: CampaignOptions,
        on_run: F,
    ) -> Result<Option<CampaignReport>, FuzzError>
    where
        F: FnMut(&TargetRun) -> ControlFlow<()>,
    {
        run_campaign_with(self.driver.as_mut(), targets, options, on_run)
    }

    pub fn extract_corpus<S: AsRef<str>>(
        &self,
        destination: &Path,
        patterns: &[S],
    ) -> Result<usize, CorpusError> {
        let targets = self.discover(patterns)?;
        corpus::extract(&self.dir, destination, &targets)
    }

    pub fn delete_corpus<S: AsRef<str>>(&self, patterns: &[S]) -> Result<usize, CorpusError> {
        let targets = self.discover(patterns)?;
        corpus::delete(&self.dir, &targets)?;
        Ok(targets.len())
    }

    pub fn merge_corpus<S: AsRef<str>>(
        &self,
        external: &Path,
        patterns: &[S],
    ) -> Result<usize, CorpusError> {
        let targets = self.discover(patterns)?;
        corpus::merge(&self.dir, external, &targets)
    }

    pub fn replace_corpus<S: AsRef<str>>(
        &self,
        external: &Path,
        patterns: &[S],
    ) -> Result<usize, CorpusError> {
        let targets = self.discover(patterns)?;
        corpus::replace(&self.dir, external, &targets)
    }

    pub fn save_failing_input(
        &self,
        out_dir: &Path,
        target: &Target,
        input: &FailingInput,
    ) -> Result<Option<PathBuf>, CorpusError> {
        corpus::save_failing_input(&self.dir, out_dir, target, input)
    }
}
