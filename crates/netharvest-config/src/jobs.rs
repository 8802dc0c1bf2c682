// crates/netharvest-config/src/jobs.rs
// ============================================================================
// Module: Netharvest Job Descriptors
// Description: On-disk job definitions and their mapping into core job specs.
// Purpose: Load operator-editable TOML/JSON descriptors with a version tag.
// Dependencies: serde, serde_json, toml, netharvest-core
// ============================================================================

//! ## Overview
//! A job descriptor is a versioned TOML or JSON document, one file per job
//! under the jobs directory. Durations are written in operator-friendly
//! units (`device_timeout_secs`, `inter_command_pause_ms`) and mapped onto
//! the core model on load. Unknown top-level fields are preserved in the
//! descriptor and ignored by the core, so newer fields survive round-trips
//! through older binaries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use netharvest_core::CaptureKind;
use netharvest_core::DeviceFilter;
use netharvest_core::ExecutionPolicy;
use netharvest_core::JobId;
use netharvest_core::JobSlug;
use netharvest_core::JobSpec;
use netharvest_core::OutputPolicy;
use netharvest_core::ValidationPolicy;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Descriptor version this loader understands.
pub const JOB_DESCRIPTOR_VERSION: u32 = 1;

// ============================================================================
// SECTION: Descriptor Types
// ============================================================================

/// Command block of a job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsBlock {
    /// Primary command.
    pub primary: String,
    /// Additional commands executed after the primary, in order.
    #[serde(default)]
    pub extra: Vec<String>,
    /// Optional paging-disable prelude overriding the platform default.
    #[serde(default)]
    pub paging_prelude: Option<String>,
}

/// Validation block of a job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationBlock {
    /// Template selection filter.
    pub template_filter: String,
    /// Minimum acceptable match score.
    pub min_score: u8,
    /// Whether captures are written even when validation fails.
    #[serde(default)]
    pub save_on_fail: bool,
}

/// Execution block of a job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBlock {
    /// Maximum devices in flight.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-device wall-clock timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub device_timeout_secs: u64,
    /// Optional pause between consecutive commands, in milliseconds.
    #[serde(default)]
    pub inter_command_pause_ms: Option<u64>,
}

/// Default worker bound mirrored from the core model.
const fn default_max_workers() -> usize {
    netharvest_core::DEFAULT_MAX_WORKERS
}

/// Default per-device timeout mirrored from the core model.
const fn default_timeout_secs() -> u64 {
    netharvest_core::DEFAULT_DEVICE_TIMEOUT.as_secs()
}

impl Default for ExecutionBlock {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            device_timeout_secs: default_timeout_secs(),
            inter_command_pause_ms: None,
        }
    }
}

/// Output block of a job descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBlock {
    /// Subdirectory under the collection root.
    pub subdir: String,
    /// Filename template.
    pub filename_template: String,
}

/// On-disk job descriptor.
///
/// # Invariants
/// - `version` must equal [`JOB_DESCRIPTOR_VERSION`].
/// - Unknown top-level fields land in `extra` and are ignored by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Descriptor format version.
    pub version: u32,
    /// Stable slug.
    pub slug: String,
    /// Numeric identifier.
    pub id: u64,
    /// Capture kind produced by the job.
    pub capture_kind: CaptureKind,
    /// Vendor hint recorded for operators.
    #[serde(default)]
    pub vendor_hint: Option<String>,
    /// Whether the job may be executed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Command block.
    pub commands: CommandsBlock,
    /// Device filter.
    #[serde(default)]
    pub filter: DeviceFilter,
    /// Validation block; absent stores captures unvalidated.
    #[serde(default)]
    pub validation: Option<ValidationBlock>,
    /// Execution block.
    #[serde(default)]
    pub execution: ExecutionBlock,
    /// Output block.
    pub output: OutputBlock,
    /// Unknown fields preserved for newer descriptor versions.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Jobs are enabled unless explicitly switched off.
const fn default_enabled() -> bool {
    true
}

impl JobDescriptor {
    /// Maps the descriptor onto the validated core job spec.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the version tag, slug, id, or
    /// any core invariant is violated.
    pub fn into_spec(self) -> Result<JobSpec, ConfigError> {
        if self.version != JOB_DESCRIPTOR_VERSION {
            return Err(ConfigError::Invalid(format!(
                "job {}: unsupported descriptor version {}",
                self.slug, self.version
            )));
        }
        let slug = JobSlug::parse(self.slug).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        let id = JobId::from_raw(self.id)
            .ok_or_else(|| ConfigError::Invalid(format!("job {slug}: id must be >= 1")))?;
        let mut commands = Vec::with_capacity(1 + self.commands.extra.len());
        commands.push(self.commands.primary);
        commands.extend(self.commands.extra);
        let spec = JobSpec {
            slug,
            id,
            capture_kind: self.capture_kind,
            vendor_hint: self.vendor_hint,
            commands,
            paging_prelude: self.commands.paging_prelude,
            filter: self.filter,
            validation: self.validation.map(|v| ValidationPolicy {
                template_filter: v.template_filter,
                min_score: v.min_score,
                save_on_fail: v.save_on_fail,
            }),
            execution: ExecutionPolicy {
                max_workers: self.execution.max_workers,
                device_timeout: Duration::from_secs(self.execution.device_timeout_secs),
                inter_command_pause: self
                    .execution
                    .inter_command_pause_ms
                    .map(Duration::from_millis),
            },
            output: OutputPolicy {
                subdir: self.output.subdir,
                filename_template: self.output.filename_template,
            },
            enabled: self.enabled,
        };
        spec.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(spec)
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads one job descriptor by path, selecting the parser by extension.
///
/// # Errors
///
/// Returns [`ConfigError`] on read, parse, or validation failure.
pub fn load_job(path: &Path) -> Result<JobSpec, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor: JobDescriptor = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?,
        Some("json") => serde_json::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?,
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };
    descriptor.into_spec()
}

/// Loads every job descriptor in a directory, sorted by slug.
///
/// Non-descriptor files are ignored. Duplicate slugs or ids across the
/// directory are rejected.
///
/// # Errors
///
/// Returns [`ConfigError`] on the first failing descriptor or duplicate.
pub fn load_jobs_dir(dir: &Path) -> Result<Vec<JobSpec>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(path.extension().and_then(|e| e.to_str()), Some("toml" | "json"))
        })
        .collect();
    paths.sort();
    let mut jobs = Vec::with_capacity(paths.len());
    for path in paths {
        jobs.push(load_job(&path)?);
    }
    jobs.sort_by(|a, b| a.slug.cmp(&b.slug));
    for pair in jobs.windows(2) {
        if pair[0].slug == pair[1].slug {
            return Err(ConfigError::DuplicateJob(pair[0].slug.to_string()));
        }
    }
    let mut ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    ids.sort_unstable();
    for pair in ids.windows(2) {
        if pair[0] == pair[1] {
            return Err(ConfigError::DuplicateJob(format!("id {}", pair[0])));
        }
    }
    Ok(jobs)
}

/// Finds one job by slug within a loaded set.
#[must_use]
pub fn find_job<'a>(jobs: &'a [JobSpec], slug: &JobSlug) -> Option<&'a JobSpec> {
    jobs.iter().find(|job| &job.slug == slug)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_TOML: &str = r#"
version = 1
slug = "arp-cache"
id = 3
capture_kind = "state"
vendor_hint = "cisco"
enabled = true

[commands]
primary = "show ip arp"
paging_prelude = "terminal length 0"

[filter]
vendor = "cisco"
name_regex = "^edge"

[validation]
template_filter = "cisco_ios_show_ip_arp"
min_score = 30

[execution]
max_workers = 4
device_timeout_secs = 45
inter_command_pause_ms = 250

[output]
subdir = "arp"
filename_template = "{device_name}-{timestamp}.txt"
"#;

    #[test]
    fn toml_descriptor_maps_to_spec() {
        let descriptor: JobDescriptor = toml::from_str(JOB_TOML).expect("parse");
        let spec = descriptor.into_spec().expect("spec");
        assert_eq!(spec.slug.as_str(), "arp-cache");
        assert_eq!(spec.primary_command(), "show ip arp");
        assert_eq!(spec.execution.device_timeout, Duration::from_secs(45));
        assert_eq!(spec.execution.inter_command_pause, Some(Duration::from_millis(250)));
        assert_eq!(spec.validation.as_ref().map(|v| v.min_score), Some(30));
    }

    #[test]
    fn unknown_fields_are_preserved_not_fatal() {
        let with_extra = format!("{JOB_TOML}\nfuture_knob = \"on\"\n");
        let descriptor: JobDescriptor = toml::from_str(&with_extra).expect("parse");
        assert!(descriptor.extra.contains_key("future_knob"));
        assert!(descriptor.into_spec().is_ok());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let bumped = JOB_TOML.replace("version = 1", "version = 9");
        let descriptor: JobDescriptor = toml::from_str(&bumped).expect("parse");
        assert!(matches!(descriptor.into_spec(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_timeout_is_a_config_error() {
        let zeroed = JOB_TOML.replace("device_timeout_secs = 45", "device_timeout_secs = 0");
        let descriptor: JobDescriptor = toml::from_str(&zeroed).expect("parse");
        assert!(matches!(descriptor.into_spec(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn jobs_dir_rejects_duplicate_slugs() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("a.toml"), JOB_TOML).expect("write");
        std::fs::write(dir.path().join("b.toml"), JOB_TOML.replace("id = 3", "id = 4"))
            .expect("write");
        assert!(matches!(load_jobs_dir(dir.path()), Err(ConfigError::DuplicateJob(_))));
    }

    #[test]
    fn jobs_dir_loads_sorted() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let second = JOB_TOML.replace("arp-cache", "version-sweep").replace("id = 3", "id = 4");
        std::fs::write(dir.path().join("z.toml"), JOB_TOML).expect("write");
        std::fs::write(dir.path().join("a.toml"), second).expect("write");
        let jobs = load_jobs_dir(dir.path()).expect("load");
        let slugs: Vec<_> = jobs.iter().map(|j| j.slug.to_string()).collect();
        assert_eq!(slugs, vec!["arp-cache", "version-sweep"]);
    }
}
