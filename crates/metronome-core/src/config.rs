use serde::{Deserialize, Serialize};

/// Optional config file kept beside the channel socket. Everything has a
/// working default so a missing or empty file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(
        default,
        rename = "log-level",
        alias = "log_level",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_level: Option<String>,

    #[serde(default, rename = "job", skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobConfig>,
}

/// One scheduled job: a name and how often it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,

    #[serde(
        rename = "interval-secs",
        alias = "interval_secs",
        default = "default_interval_secs"
    )]
    pub interval_secs: u64,
}

pub const DEFAULT_JOB_INTERVAL_SECS: u64 = 5;

fn default_interval_secs() -> u64 {
    DEFAULT_JOB_INTERVAL_SECS
}

impl JobConfig {
    pub fn effective_interval_secs(&self) -> u64 {
        if self.interval_secs == 0 {
            DEFAULT_JOB_INTERVAL_SECS
        } else {
            self.interval_secs
        }
    }
}

impl ConfigFile {
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// The jobs to run: the configured list, or the built-in demo pair when
    /// the file defines none.
    pub fn effective_jobs(&self) -> Vec<JobConfig> {
        if self.jobs.is_empty() {
            default_jobs()
        } else {
            self.jobs.clone()
        }
    }
}

pub fn default_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig {
            name: "job-a".to_owned(),
            interval_secs: 5,
        },
        JobConfig {
            name: "job-b".to_owned(),
            interval_secs: 10,
        },
    ]
}
