//! Rule directory loader

use super::config::WafConfig;
use super::error::{WafError, WafResult};
use super::rules::{Rule, RuleSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RULE_EXTENSION: &str = "yaml";

/// Loads every rule file under a directory tree
#[derive(Debug, Clone)]
pub struct RuleLoader {
    root: PathBuf,
    ignored: Vec<String>,
}

impl RuleLoader {
    /// Create a loader for a rules directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignored: Vec::new(),
        }
    }

    /// Create from WAF config
    pub fn from_config(config: &WafConfig) -> Self {
        Self::new(&config.rules_directory)
            .with_ignored_directories(config.ignore_rules_directories.clone())
    }

    /// Builder: set directory names whose subtree is skipped
    pub fn with_ignored_directories(mut self, names: Vec<String>) -> Self {
        self.ignored = names;
        self
    }

    /// Rules directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the rule set.
    ///
    /// Only a missing root is an error. Files that cannot be read, parsed or
    /// validated, and duplicate IDs, are skipped with a warning. Entries are
    /// visited in file name order so the first of two duplicates is stable.
    pub fn load(&self) -> WafResult<RuleSet> {
        if !self.root.is_dir() {
            return Err(WafError::RulesDirectory(self.root.clone()));
        }

        let mut rules = RuleSet::new();
        let mut skipped = 0;
        self.walk(&self.root, &mut rules, &mut skipped);

        info!(
            directory = %self.root.display(),
            loaded = rules.len(),
            skipped,
            "rules loaded"
        );
        Ok(rules)
    }

    fn walk(&self, dir: &Path, rules: &mut RuleSet, skipped: &mut usize) {
        let mut entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(Result::ok).collect::<Vec<_>>(),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "cannot read rules directory, skipping");
                return;
            },
        };
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();

            if path.is_dir() {
                let name = entry.file_name();
                if self.ignored.iter().any(|i| name.to_str() == Some(i.as_str())) {
                    info!(path = %path.display(), "skipping ignored rules directory");
                    continue;
                }
                self.walk(&path, rules, skipped);
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) != Some(RULE_EXTENSION) {
                warn!(path = %path.display(), "skipping rule file, not a .yaml file");
                continue;
            }

            let added = Self::load_file(&path).and_then(|rule| rules.add(rule));
            match added {
                Ok(()) => debug!(path = %path.display(), "loaded rule"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping rule file");
                    *skipped += 1;
                },
            }
        }
    }

    /// Read and parse one rule file (not validated)
    pub fn load_file(path: &Path) -> WafResult<Rule> {
        let content = std::fs::read_to_string(path).map_err(|e| WafError::load(path, e))?;
        Rule::from_yaml(&content).map_err(|e| WafError::load(path, e))
    }
}
