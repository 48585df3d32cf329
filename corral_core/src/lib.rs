pub mod classifier;
pub mod config;
pub mod copy;
pub mod corpus;
pub mod discovery;
pub mod driver;
pub mod lister;
pub mod project;
pub mod scanner;
pub mod scheduler;
pub mod target;

pub use classifier::{FailingInput, classify_output};
pub use config::{ConfigError, CorralConfig, DriverSettings, FuzzSettings};
pub use corpus::CorpusError;
pub use discovery::{DiscoveryError, discover_targets};
pub use driver::{CancelToken, FuzzDriver, FuzzError, GoFuzzDriver, GoFuzzDriverConfig};
pub use lister::{GoPackageLister, PackageLister, PackageRecord};
pub use project::Project;
pub use scheduler::{
    CampaignOptions, CampaignReport, TargetRun, run_campaign, run_campaign_with, slice_per_target,
};
pub use target::{Target, TargetError};
