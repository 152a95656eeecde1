//! Pipeline descriptor — the YAML document that drives a build.
//!
//! A descriptor names the project language, the services the build needs,
//! an environment block of `KEY=VALUE` entries, and up to five command
//! phases executed in a fixed order:
//!
//! ```yaml
//! language: python
//! services:
//!   - mysql
//! env:
//!   - HELO_DATABASE_URL=mysql://root@127.0.0.1:3306/helo
//! install:
//!   - pip install -r requirements.txt
//! script:
//!   - flake8 helo tests
//!   - pytest --cov=helo tests
//! ```
//!
//! Phase sections accept either a single command string or a list of
//! commands. Unknown top-level keys are rejected so typos fail loudly
//! instead of silently skipping a phase.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dburl::DatabaseUrl;
use crate::error::PipelineError;
use crate::services::ServiceKind;

/// Build phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BeforeInstall,
    Install,
    BeforeScript,
    Script,
    AfterSuccess,
}

impl Phase {
    /// All phases in the order a build runs them.
    pub const ORDER: [Phase; 5] = [
        Phase::BeforeInstall,
        Phase::Install,
        Phase::BeforeScript,
        Phase::Script,
        Phase::AfterSuccess,
    ];

    /// Phases that run before the build verdict is known. A failure here
    /// means the build never reached its tests.
    pub fn is_setup(self) -> bool {
        matches!(
            self,
            Phase::BeforeInstall | Phase::Install | Phase::BeforeScript
        )
    }

    pub fn key(self) -> &'static str {
        match self {
            Phase::BeforeInstall => "before_install",
            Phase::Install => "install",
            Phase::BeforeScript => "before_script",
            Phase::Script => "script",
            Phase::AfterSuccess => "after_success",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Phase {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "before_install" => Ok(Phase::BeforeInstall),
            "install" => Ok(Phase::Install),
            "before_script" => Ok(Phase::BeforeScript),
            "script" => Ok(Phase::Script),
            "after_success" => Ok(Phase::AfterSuccess),
            other => Err(PipelineError::Descriptor(format!(
                "unknown phase {other:?}, expected one of before_install, install, \
                 before_script, script, after_success"
            ))),
        }
    }
}

/// Phase section content - a single command string, a list of commands, or
/// a key left without a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandList {
    /// Single command (shorthand).
    Single(String),

    /// List of commands, run in order.
    Many(Vec<String>),

    /// Section present but empty (`script:` with no value), as hand-edited
    /// descriptors often leave them.
    Empty,
}

impl CommandList {
    pub fn as_slice(&self) -> &[String] {
        match self {
            CommandList::Single(cmd) => std::slice::from_ref(cmd),
            CommandList::Many(cmds) => cmds,
            CommandList::Empty => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CommandList::Single(cmd) => cmd.trim().is_empty(),
            CommandList::Many(cmds) => cmds.is_empty(),
            CommandList::Empty => true,
        }
    }
}

impl Default for CommandList {
    fn default() -> Self {
        CommandList::Many(Vec::new())
    }
}

/// A parsed `KEY=VALUE` entry from the descriptor's env block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
}

impl EnvEntry {
    /// Split on the first `=`. The value may itself contain `=` signs,
    /// as database URLs and query strings routinely do.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            PipelineError::Descriptor(format!("env entry {raw:?} is not KEY=VALUE"))
        })?;
        if key.trim().is_empty() {
            return Err(PipelineError::Descriptor(format!(
                "env entry {raw:?} has an empty key"
            )));
        }
        Ok(EnvEntry {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Complete pipeline descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project language, informational only.
    #[serde(default)]
    pub language: Option<String>,

    /// Services to provision before the build starts.
    #[serde(default)]
    pub services: Vec<ServiceKind>,

    /// `KEY=VALUE` entries exported to every step.
    #[serde(default)]
    pub env: CommandList,

    #[serde(default)]
    pub before_install: CommandList,

    #[serde(default)]
    pub install: CommandList,

    #[serde(default)]
    pub before_script: CommandList,

    /// The phase whose outcome decides the build verdict.
    #[serde(default)]
    pub script: CommandList,

    /// Runs only when every earlier step succeeded. Failures here are
    /// logged but never change the verdict.
    #[serde(default)]
    pub after_success: CommandList,

    /// Per-step timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PipelineConfig {
    /// Parse a descriptor from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = serde_yaml::from_str(text)?;
        Ok(config)
    }

    /// Read and parse a descriptor file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Io(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Commands for one phase, in order.
    pub fn commands(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::BeforeInstall => self.before_install.as_slice(),
            Phase::Install => self.install.as_slice(),
            Phase::BeforeScript => self.before_script.as_slice(),
            Phase::Script => self.script.as_slice(),
            Phase::AfterSuccess => self.after_success.as_slice(),
        }
    }

    /// Parsed env entries. Fails on the first malformed entry.
    pub fn env_entries(&self) -> Result<Vec<EnvEntry>, PipelineError> {
        self.env.as_slice().iter().map(|raw| EnvEntry::parse(raw)).collect()
    }

    /// The database URL the build advertises to the code under test,
    /// taken from the first env entry whose key ends in `DATABASE_URL`.
    pub fn database_url(&self) -> Result<Option<DatabaseUrl>, PipelineError> {
        for entry in self.env_entries()? {
            if entry.key.ends_with("DATABASE_URL") {
                return entry.value.parse().map(Some);
            }
        }
        Ok(None)
    }

    /// Check the descriptor without running anything. Returns every
    /// problem found rather than stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.script.is_empty() {
            problems.push("script section is empty; nothing decides the build".to_string());
        }

        let mut env_ok = true;
        let mut env_keys: Vec<String> = Vec::new();
        for raw in self.env.as_slice() {
            match EnvEntry::parse(raw) {
                Ok(entry) => {
                    if env_keys.contains(&entry.key) {
                        problems.push(format!("env key {} assigned more than once", entry.key));
                    } else {
                        env_keys.push(entry.key);
                    }
                }
                Err(e) => {
                    problems.push(e.to_string());
                    env_ok = false;
                }
            }
        }

        if env_ok {
            match self.database_url() {
                Err(e) => problems.push(e.to_string()),
                Ok(Some(url)) if !url.is_local() => problems.push(format!(
                    "database URL host {:?} is not local; provisioned services listen on 127.0.0.1",
                    url.host
                )),
                Ok(_) => {}
            }
        }

        let mut seen = Vec::new();
        for service in &self.services {
            if seen.contains(service) {
                problems.push(format!("service {service} listed more than once"));
            } else {
                seen.push(*service);
            }
        }

        if self.timeout_secs == Some(0) {
            problems.push("timeout_secs must be greater than zero".to_string());
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELO_DESCRIPTOR: &str = r#"
language: python
services:
  - mysql
env:
  - HELO_DATABASE_URL=mysql://root@127.0.0.1:3306/helo
before_install:
  - pip install --upgrade pip
  - pip install flake8 pytest pytest-asyncio pytest-cov
install:
  - pip install -r requirements.txt
before_script:
  - mysql -h 127.0.0.1 -u root -e 'select version()'
script:
  - flake8 helo tests --max-line-length=100
  - pytest --cov=helo tests
after_success:
  - codecov
"#;

    #[test]
    fn test_parse_full_descriptor() {
        let config = PipelineConfig::from_yaml(HELO_DESCRIPTOR).unwrap();
        assert_eq!(config.language.as_deref(), Some("python"));
        assert_eq!(config.services, vec![ServiceKind::Mysql]);
        assert_eq!(config.commands(Phase::BeforeInstall).len(), 2);
        assert_eq!(config.commands(Phase::Install).len(), 1);
        assert_eq!(config.commands(Phase::Script).len(), 2);
        assert_eq!(
            config.commands(Phase::AfterSuccess),
            ["codecov".to_string()]
        );
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_scalar_phase() {
        let yaml = "script: flake8 helo\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.commands(Phase::Script), ["flake8 helo".to_string()]);
    }

    #[test]
    fn test_parse_crlf_with_block_scalar() {
        let yaml = "language: python\r\nservices:\r\n  - mysql\r\nscript: |\r\n  pytest --cov=helo tests\r\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.language.as_deref(), Some("python"));
        assert_eq!(config.services, vec![ServiceKind::Mysql]);
        let commands = config.commands(Phase::Script);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].trim_end(), "pytest --cov=helo tests");
    }

    #[test]
    fn test_missing_phases_default_empty() {
        let config = PipelineConfig::from_yaml("script: [pytest]\n").unwrap();
        assert!(config.commands(Phase::BeforeInstall).is_empty());
        assert!(config.commands(Phase::AfterSuccess).is_empty());
        assert!(config.services.is_empty());
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_null_section_reads_as_empty() {
        let yaml = "before_install:\nscript: [pytest]\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert!(config.commands(Phase::BeforeInstall).is_empty());
        assert!(config.validate().is_empty());

        let config = PipelineConfig::from_yaml("script:\n").unwrap();
        assert!(config.commands(Phase::Script).is_empty());
        assert!(config
            .validate()
            .iter()
            .any(|p| p.contains("script section is empty")));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let yaml = "script: [pytest]\nafter_script: [echo done]\n";
        let err = PipelineConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("after_script"), "{err}");
    }

    #[test]
    fn test_unknown_service_rejected() {
        let yaml = "services: [redis]\nscript: [pytest]\n";
        assert!(PipelineConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_env_entries_split_on_first_equals() {
        let yaml = "env:\n  - A=1\n  - URL=mysql://root@127.0.0.1:3306/helo?x=y\nscript: [\"true\"]\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let entries = config.env_entries().unwrap();
        assert_eq!(entries[0], EnvEntry { key: "A".into(), value: "1".into() });
        assert_eq!(entries[1].value, "mysql://root@127.0.0.1:3306/helo?x=y");
    }

    #[test]
    fn test_malformed_env_entry() {
        let yaml = "env: [NOT_AN_ASSIGNMENT]\nscript: [\"true\"]\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert!(config.env_entries().is_err());
    }

    #[test]
    fn test_database_url_extraction() {
        let config = PipelineConfig::from_yaml(HELO_DESCRIPTOR).unwrap();
        let url = config.database_url().unwrap().unwrap();
        assert_eq!(url.database, "helo");
        assert_eq!(url.port, 3306);

        // The bare name counts too, not just prefixed variants.
        let yaml = "env: [DATABASE_URL=postgres://app:pw@localhost:5432/app]\nscript: [\"true\"]\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database_url().unwrap().unwrap().scheme, "postgres");

        let config = PipelineConfig::from_yaml("script: [\"true\"]\n").unwrap();
        assert!(config.database_url().unwrap().is_none());
    }

    #[test]
    fn test_validate_collects_problems() {
        let yaml = r#"
services: [mysql, mysql]
env:
  - BROKEN
  - PORT=1
  - PORT=2
timeout_secs: 0
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let problems = config.validate();
        assert_eq!(problems.len(), 5, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("script section is empty")));
        assert!(problems.iter().any(|p| p.contains("BROKEN")));
        assert!(problems.iter().any(|p| p.contains("PORT") && p.contains("more than once")));
        assert!(problems.iter().any(|p| p.contains("listed more than once")));
        assert!(problems.iter().any(|p| p.contains("timeout_secs")));
    }

    #[test]
    fn test_validate_rejects_remote_database_host() {
        let yaml = "env: [DATABASE_URL=mysql://root@db.prod:3306/helo]\nscript: [\"true\"]\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("not local")), "{problems:?}");
    }

    #[test]
    fn test_phase_order_and_names() {
        let keys: Vec<&str> = Phase::ORDER.iter().map(|p| p.key()).collect();
        assert_eq!(
            keys,
            ["before_install", "install", "before_script", "script", "after_success"]
        );
        assert!(Phase::Install.is_setup());
        assert!(!Phase::Script.is_setup());
        assert_eq!("before-script".parse::<Phase>().unwrap(), Phase::BeforeScript);
        assert!("cleanup".parse::<Phase>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".helo-ci.yml");
        std::fs::write(&path, HELO_DESCRIPTOR).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.services, vec![ServiceKind::Mysql]);

        let missing = PipelineConfig::load(&dir.path().join("absent.yml"));
        assert!(matches!(missing, Err(PipelineError::Io(_))));
    }
}
