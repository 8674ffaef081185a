//! Rule model and rule-file loader
//!
//! Rules are YAML documents, one per file:
//!
//! ```yaml
//! name: Old github notifications
//! description: trash stale CI noise
//! search:
//!   - older_than: 1m
//!   - from: "github_ OR something"
//! add_labels: [TRASH]
//! remove_labels: []
//! ```
//!
//! Loading is all-or-nothing: a single malformed rule aborts the whole
//! load. Silently skipping a mistyped rule risks mass-mislabeling going
//! unnoticed, which is worse than a hard stop.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, RulesError};

/// One search criterion: a Gmail search operator and its value.
///
/// The key is not validated locally; Gmail is the authority on its own
/// query grammar and rejects unknown operators at search time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub key: String,
    pub value: String,
}

impl Criterion {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A validated automation rule: search criteria plus a label delta.
///
/// Immutable after load; constructed only through [`Rule::validate`]
/// so invalid rules cannot flow into the engine.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Logging identifier only; never used for matching
    pub name: String,
    pub description: Option<String>,
    /// Ordered; order determines query construction
    pub search: Vec<Criterion>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    /// File the rule was loaded from, for error reporting
    pub source: PathBuf,
}

impl Rule {
    /// All label names the rule references, adds before removes
    pub fn referenced_labels(&self) -> impl Iterator<Item = &str> {
        self.add_labels
            .iter()
            .chain(self.remove_labels.iter())
            .map(String::as_str)
    }
}

/// Raw rule document as it appears on disk, before validation
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    search: Vec<serde_yaml::Mapping>,
    #[serde(default)]
    add_labels: Vec<String>,
    #[serde(default)]
    remove_labels: Vec<String>,
}

/// Render a YAML scalar as the string Gmail will see
fn scalar_to_string(value: &serde_yaml::Value, source: &Path) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(RulesError::ConfigError(format!(
            "{}: search values must be scalars",
            source.display()
        ))),
    }
}

/// Drop repeated label names, keeping first occurrence order
fn dedup_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

impl Rule {
    /// Validate a raw rule document into a `Rule`, or explain exactly
    /// which invariant the file at `source` violates.
    fn validate(raw: RuleFile, source: &Path) -> Result<Self> {
        if raw.name.trim().is_empty() {
            return Err(RulesError::ConfigError(format!(
                "{}: rule is missing a name",
                source.display()
            )));
        }

        if raw.search.is_empty() {
            return Err(RulesError::ConfigError(format!(
                "{}: rule '{}' has no search criteria",
                source.display(),
                raw.name
            )));
        }

        // Each search entry is a single-key mapping; order within the
        // list is preserved for deterministic query construction.
        let mut search = Vec::with_capacity(raw.search.len());
        for mapping in &raw.search {
            if mapping.len() != 1 {
                return Err(RulesError::ConfigError(format!(
                    "{}: rule '{}': each search entry must be a single operator: value pair",
                    source.display(),
                    raw.name
                )));
            }
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) if !s.trim().is_empty() => s.clone(),
                    _ => {
                        return Err(RulesError::ConfigError(format!(
                            "{}: rule '{}': search operator must be a non-empty string",
                            source.display(),
                            raw.name
                        )))
                    }
                };
                search.push(Criterion {
                    key,
                    value: scalar_to_string(value, source)?,
                });
            }
        }

        let add_labels = dedup_labels(raw.add_labels);
        let remove_labels = dedup_labels(raw.remove_labels);

        if add_labels.is_empty() && remove_labels.is_empty() {
            return Err(RulesError::ConfigError(format!(
                "{}: rule '{}' has no effect (both add_labels and remove_labels are empty)",
                source.display(),
                raw.name
            )));
        }

        Ok(Rule {
            name: raw.name,
            description: raw.description,
            search,
            add_labels,
            remove_labels,
            source: source.to_path_buf(),
        })
    }

    /// Parse and validate a single rule file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RulesError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        let raw: RuleFile = serde_yaml::from_str(&content).map_err(|e| {
            RulesError::ConfigError(format!("{}: invalid YAML: {}", path.display(), e))
        })?;
        Self::validate(raw, path)
    }
}

fn is_rule_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Collect rule files under a directory in lexicographic name order
fn scan_dir(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| RulesError::ConfigError(format!("{}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if recursive {
                scan_dir(&path, recursive, out)?;
            }
        } else if is_rule_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Discover rule files across the given locations, preserving location
/// order; directories contribute their files in name order.
///
/// A location that is itself a file is taken as-is, whatever its
/// extension; directories only contribute `*.yaml`/`*.yml` files.
pub fn discover_rule_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            scan_dir(path, recursive, &mut files)?;
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(RulesError::ConfigError(format!(
                "{}: no such file or directory",
                path.display()
            )));
        }
    }
    Ok(files)
}

/// Load and validate every rule under the given locations.
///
/// Fails the whole load on the first malformed rule; finding no rule
/// file at all is a fatal configuration error. Duplicate rule names are
/// allowed but logged, since they usually indicate a copy-paste slip.
pub fn load_rules(paths: &[PathBuf], recursive: bool) -> Result<Vec<Rule>> {
    let files = discover_rule_files(paths, recursive)?;
    if files.is_empty() {
        return Err(RulesError::ConfigError(
            "no rule files found in the given locations".to_string(),
        ));
    }

    let mut rules = Vec::with_capacity(files.len());
    let mut seen_names: HashSet<String> = HashSet::new();
    for file in &files {
        let rule = Rule::from_path(file)?;
        debug!("Loaded rule '{}' from {}", rule.name, file.display());
        if !seen_names.insert(rule.name.clone()) {
            warn!(
                "Duplicate rule name '{}' ({}); both rules will run",
                rule.name,
                file.display()
            );
        }
        rules.push(rule);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Rule> {
        let raw: RuleFile = serde_yaml::from_str(yaml).expect("test yaml parses");
        Rule::validate(raw, Path::new("test.yaml"))
    }

    #[test]
    fn test_valid_rule_parses() {
        let rule = parse(
            r#"
name: Old github notifications
description: trash stale CI noise
search:
  - older_than: 1m
  - from: "github_ OR something"
add_labels: [TRASH]
"#,
        )
        .unwrap();

        assert_eq!(rule.name, "Old github notifications");
        assert_eq!(rule.search.len(), 2);
        assert_eq!(rule.search[0], Criterion::new("older_than", "1m"));
        assert_eq!(rule.search[1], Criterion::new("from", "github_ OR something"));
        assert_eq!(rule.add_labels, vec!["TRASH"]);
        assert!(rule.remove_labels.is_empty());
    }

    #[test]
    fn test_search_order_preserved() {
        let rule = parse(
            r#"
name: ordered
search:
  - subject: invoice
  - from: billing@example.com
  - older_than: 7d
add_labels: [Receipts]
"#,
        )
        .unwrap();

        let keys: Vec<&str> = rule.search.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["subject", "from", "older_than"]);
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = parse(
            r#"
search:
  - from: a@b.c
add_labels: [X]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RulesError::ConfigError(_)));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_empty_search_rejected() {
        let err = parse(
            r#"
name: no filter
add_labels: [X]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no search criteria"));
    }

    #[test]
    fn test_empty_delta_rejected() {
        let err = parse(
            r#"
name: no effect
search:
  - from: a@b.c
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no effect"));
    }

    #[test]
    fn test_multi_key_search_entry_rejected() {
        let err = parse(
            r#"
name: ambiguous
search:
  - from: a@b.c
    subject: hi
add_labels: [X]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("single operator"));
    }

    #[test]
    fn test_numeric_search_value_stringified() {
        let rule = parse(
            r#"
name: numeric
search:
  - larger: 5
add_labels: [Big]
"#,
        )
        .unwrap();
        assert_eq!(rule.search[0], Criterion::new("larger", "5"));
    }

    #[test]
    fn test_duplicate_labels_deduped() {
        let rule = parse(
            r#"
name: dupes
search:
  - from: a@b.c
add_labels: [TRASH, TRASH, Archive]
"#,
        )
        .unwrap();
        assert_eq!(rule.add_labels, vec!["TRASH", "Archive"]);
    }

    #[test]
    fn test_referenced_labels_order() {
        let rule = parse(
            r#"
name: refs
search:
  - from: a@b.c
add_labels: [A, B]
remove_labels: [INBOX]
"#,
        )
        .unwrap();
        let refs: Vec<&str> = rule.referenced_labels().collect();
        assert_eq!(refs, vec!["A", "B", "INBOX"]);
    }
}
