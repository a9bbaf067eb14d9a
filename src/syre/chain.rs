//! Version registry and the engine that chains per-version converters.
//!
//! Versions are ordered by their position in the registry only. The
//! converter registered under version `i` handles the boundary
//! `versions[i] -> versions[i + 1]`.

use crate::error::{MigrationError, MigrationResult};
use crate::syre::context::MigrationContext;
use crate::syre::{convert_0_10_0, convert_0_10_1, convert_0_10_2, legacy};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const VERSIONS: [&str; 5] = ["0.9.x", "0.10.0", "0.10.1", "0.10.2", "0.11.0"];

/// Format written by converters that produce current documents from scratch.
pub const LATEST_VERSION: &str = "0.11.0";

/// One version boundary. Implementations must be idempotent and decide what
/// to do from the shape of the files on disk, not from version numbers.
pub trait Converter {
    /// Convert the global config store. Runs once per chain.
    fn convert_config(&self, _ctx: &MigrationContext) -> MigrationResult<()> {
        Ok(())
    }

    /// Convert the project rooted at `project`.
    fn convert(&self, ctx: &MigrationContext, project: &Path) -> MigrationResult<()>;
}

pub struct VersionRegistry {
    versions: Vec<String>,
    converters: BTreeMap<String, Box<dyn Converter>>,
}

impl VersionRegistry {
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for version in versions.into_iter().map(Into::into) {
            if unique.contains(&version) {
                tracing::warn!(%version, "version registered twice, keeping the first position");
                continue;
            }
            unique.push(version);
        }
        Self {
            versions: unique,
            converters: BTreeMap::new(),
        }
    }

    pub fn with_converter(mut self, from: &str, converter: impl Converter + 'static) -> Self {
        self.converters.insert(from.to_string(), Box::new(converter));
        self
    }

    pub fn builtin() -> Self {
        Self::new(VERSIONS)
            .with_converter("0.9.x", legacy::LegacyImport)
            .with_converter("0.10.0", convert_0_10_0::Convert0_10_0)
            .with_converter("0.10.1", convert_0_10_1::Convert0_10_1)
            .with_converter("0.10.2", convert_0_10_2::Convert0_10_2)
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn has_converter(&self, from: &str) -> bool {
        self.converters.contains_key(from)
    }

    fn index_of(&self, version: &str) -> MigrationResult<usize> {
        self.versions
            .iter()
            .position(|v| v == version)
            .ok_or_else(|| MigrationError::UnknownVersion(version.to_string()))
    }

    /// Converters needed to go from `start` to `end`, in order.
    pub fn resolve(&self, start: &str, end: &str) -> MigrationResult<MigrationChain<'_>> {
        let start_idx = self.index_of(start)?;
        let end_idx = self.index_of(end)?;
        if end_idx <= start_idx {
            return Err(MigrationError::NothingToDo {
                from: start.to_string(),
                to: end.to_string(),
            });
        }

        let mut steps = Vec::with_capacity(end_idx - start_idx);
        for idx in start_idx..end_idx {
            let from = self.versions[idx].as_str();
            let to = self.versions[idx + 1].as_str();
            let converter = self.converters.get(from).ok_or_else(|| {
                MigrationError::Unimplemented {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            })?;
            steps.push(ChainStep {
                from,
                to,
                converter: converter.as_ref(),
            });
        }
        Ok(MigrationChain { steps })
    }
}

pub struct ChainStep<'a> {
    pub from: &'a str,
    pub to: &'a str,
    converter: &'a dyn Converter,
}

pub struct MigrationChain<'a> {
    steps: Vec<ChainStep<'a>>,
}

impl MigrationChain<'_> {
    pub fn steps(&self) -> &[ChainStep<'_>] {
        &self.steps
    }

    pub fn convert_config(&self, ctx: &MigrationContext) -> MigrationResult<()> {
        for step in &self.steps {
            tracing::info!(from = step.from, to = step.to, "converting config store");
            step.converter.convert_config(ctx)?;
        }
        Ok(())
    }

    pub fn convert_project(&self, ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
        for step in &self.steps {
            tracing::info!(
                project = %project.display(),
                from = step.from,
                to = step.to,
                "converting project"
            );
            step.converter.convert(ctx, project)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    StopOnFirstError,
    ContinueOnError,
}

#[derive(Debug, Clone)]
pub struct ProjectOutcome {
    pub project: PathBuf,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    pub projects: Vec<ProjectOutcome>,
}

impl ChainOutcome {
    pub fn converted(&self) -> usize {
        self.projects.iter().filter(|p| p.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.projects.iter().filter(|p| p.error.is_some()).count()
    }
}

/// Apply `chain` to the config store once, then to every project in order.
pub fn run(
    chain: &MigrationChain<'_>,
    ctx: &MigrationContext,
    projects: &[PathBuf],
    policy: FailurePolicy,
) -> MigrationResult<ChainOutcome> {
    chain.convert_config(ctx)?;

    let mut outcome = ChainOutcome::default();
    for project in projects {
        match chain.convert_project(ctx, project) {
            Ok(()) => outcome.projects.push(ProjectOutcome {
                project: project.clone(),
                error: None,
            }),
            Err(err) => {
                tracing::error!(
                    project = %project.display(),
                    code = err.code(),
                    error = %err,
                    "project conversion failed"
                );
                if policy == FailurePolicy::StopOnFirstError {
                    return Err(err);
                }
                outcome.projects.push(ProjectOutcome {
                    project: project.clone(),
                    error: Some(format!("{}: {err}", err.code())),
                });
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syre::config::ConverterConfig;
    use crate::syre::paths::SyrePaths;
    use std::fs;
    use tempfile::tempdir;

    /// Appends its tag to `<project>/log` so ordering is observable.
    struct Recording(&'static str);

    impl Converter for Recording {
        fn convert(&self, _ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
            let log = project.join("log");
            let mut raw = fs::read_to_string(&log).unwrap_or_default();
            raw.push_str(self.0);
            raw.push('\n');
            fs::write(&log, raw).expect("write log");
            Ok(())
        }
    }

    struct FailsFor(&'static str);

    impl Converter for FailsFor {
        fn convert(&self, _ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
            if project.ends_with(self.0) {
                return Err(MigrationError::corrupt(project, "broken on purpose"));
            }
            Ok(())
        }
    }

    fn test_ctx(root: &Path) -> MigrationContext {
        MigrationContext {
            paths: SyrePaths::in_dir(root.join("config")),
            user: None,
            config: ConverterConfig::default(),
        }
    }

    #[test]
    fn chain_length_equals_index_distance() {
        let registry = VersionRegistry::builtin();
        for (i, start) in VERSIONS.iter().enumerate() {
            for (j, end) in VERSIONS.iter().enumerate().skip(i + 1) {
                let chain = registry.resolve(start, end).expect("resolve");
                assert_eq!(chain.steps().len(), j - i, "{start} -> {end}");
                assert_eq!(chain.steps()[0].from, *start);
                assert_eq!(chain.steps()[chain.steps().len() - 1].to, *end);
            }
        }
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let registry = VersionRegistry::builtin();
        assert!(matches!(
            registry.resolve("0.8.0", "0.11.0"),
            Err(MigrationError::UnknownVersion(v)) if v == "0.8.0"
        ));
        assert!(matches!(
            registry.resolve("0.10.0", "1.0.0"),
            Err(MigrationError::UnknownVersion(v)) if v == "1.0.0"
        ));
    }

    #[test]
    fn empty_or_backwards_chain_is_nothing_to_do() {
        let registry = VersionRegistry::builtin();
        assert!(matches!(
            registry.resolve("0.10.1", "0.10.1"),
            Err(MigrationError::NothingToDo { .. })
        ));
        assert!(matches!(
            registry.resolve("0.11.0", "0.10.0"),
            Err(MigrationError::NothingToDo { .. })
        ));
    }

    #[test]
    fn missing_converter_is_unimplemented() {
        let registry = VersionRegistry::new(["a", "b", "c"]).with_converter("a", Recording("a"));
        assert!(registry.resolve("a", "b").is_ok());
        assert!(matches!(
            registry.resolve("a", "c"),
            Err(MigrationError::Unimplemented { from, to }) if from == "b" && to == "c"
        ));
    }

    #[test]
    fn duplicate_versions_keep_their_first_position() {
        let registry = VersionRegistry::new(["a", "b", "a", "c"])
            .with_converter("a", Recording("a"))
            .with_converter("b", Recording("b"));
        assert_eq!(registry.versions(), ["a", "b", "c"]);
        let chain = registry.resolve("a", "c").expect("resolve");
        assert_eq!(chain.steps().len(), 2);
    }

    #[test]
    fn steps_run_in_version_order_per_project() {
        let tmp = tempdir().expect("tempdir");
        let project = tmp.path().join("p");
        fs::create_dir_all(&project).expect("mkdir");
        let registry = VersionRegistry::new(["a", "b", "c", "d"])
            .with_converter("a", Recording("a"))
            .with_converter("b", Recording("b"))
            .with_converter("c", Recording("c"));

        let chain = registry.resolve("b", "d").expect("resolve");
        let outcome = run(
            &chain,
            &test_ctx(tmp.path()),
            &[project.clone()],
            FailurePolicy::StopOnFirstError,
        )
        .expect("run");
        assert_eq!(outcome.converted(), 1);
        assert_eq!(
            fs::read_to_string(project.join("log")).expect("log"),
            "b\nc\n"
        );
    }

    #[test]
    fn stop_on_first_error_halts_the_run() {
        let tmp = tempdir().expect("tempdir");
        let projects: Vec<PathBuf> = ["one", "bad", "three"]
            .iter()
            .map(|name| {
                let p = tmp.path().join(name);
                fs::create_dir_all(&p).expect("mkdir");
                p
            })
            .collect();
        let registry = VersionRegistry::new(["a", "b", "c"])
            .with_converter("a", FailsFor("bad"))
            .with_converter("b", Recording("b"));
        let chain = registry.resolve("a", "c").expect("resolve");

        let err = run(
            &chain,
            &test_ctx(tmp.path()),
            &projects,
            FailurePolicy::StopOnFirstError,
        )
        .expect_err("stops");
        assert!(matches!(err, MigrationError::Corrupt { .. }));
        assert!(projects[0].join("log").exists());
        assert!(!projects[2].join("log").exists());
    }

    #[test]
    fn continue_on_error_records_failure_and_moves_on() {
        let tmp = tempdir().expect("tempdir");
        let projects: Vec<PathBuf> = ["one", "bad", "three"]
            .iter()
            .map(|name| {
                let p = tmp.path().join(name);
                fs::create_dir_all(&p).expect("mkdir");
                p
            })
            .collect();
        let registry = VersionRegistry::new(["a", "b", "c"])
            .with_converter("a", FailsFor("bad"))
            .with_converter("b", Recording("b"));
        let chain = registry.resolve("a", "c").expect("resolve");

        let outcome = run(
            &chain,
            &test_ctx(tmp.path()),
            &projects,
            FailurePolicy::ContinueOnError,
        )
        .expect("run");
        assert_eq!(outcome.converted(), 2);
        assert_eq!(outcome.failed(), 1);
        let failed = &outcome.projects[1];
        assert!(failed.error.as_deref().unwrap_or("").starts_with("CORRUPT_STATE"));
        assert!(projects[2].join("log").exists());
        assert!(!projects[1].join("log").exists());
    }
}
