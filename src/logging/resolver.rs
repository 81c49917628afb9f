use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::OnceLock;
use thiserror::Error;

/// Severity names as the logging subsystem knows them, in declaration order.
///
/// Values follow the usual convention where a higher number is more severe.
pub const STANDARD_LEVELS: &[(&str, i32)] = &[
    ("CRITICAL", 50),
    ("FATAL", 50),
    ("ERROR", 40),
    ("WARN", 30),
    ("WARNING", 30),
    ("INFO", 20),
    ("DEBUG", 10),
    ("TRACE", 5),
    ("NOTSET", 0),
];

/// The "unset" sentinel, never exposed or resolvable.
pub const EXCLUDED_LEVELS: &[&str] = &["NOTSET"];

pub const DEFAULT_LEVEL: i32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LevelError {
    #[error("invalid log level {0:?}")]
    Invalid(String),
    #[error("log level {input:?} is ambiguous (could be {})", candidates.join(", "))]
    Ambiguous {
        input: String,
        candidates: Vec<String>,
    },
}

/// Something `LogLevelResolver::resolve` accepts: a name or an already numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelInput<'a> {
    Name(&'a str),
    Value(i32),
}

impl<'a> From<&'a str> for LevelInput<'a> {
    fn from(name: &'a str) -> Self {
        LevelInput::Name(name)
    }
}

impl<'a> From<&'a String> for LevelInput<'a> {
    fn from(name: &'a String) -> Self {
        LevelInput::Name(name)
    }
}

impl From<i32> for LevelInput<'_> {
    fn from(value: i32) -> Self {
        LevelInput::Value(value)
    }
}

/// A level that gets its own command line flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelFlag {
    /// Spelling as declared, e.g. `WARNING`.
    pub name: String,
    /// Normalized key, e.g. `WARNING`.
    pub key: String,
    pub value: i32,
    /// Shortest prefix of `key` no other registered key starts with.
    pub prefix: String,
}

impl LevelFlag {
    /// Long flag spelling without the leading dashes (`warning`).
    pub fn long(&self) -> String {
        self.key.to_lowercase().replace('_', "-")
    }

    pub fn short_prefix(&self) -> String {
        self.prefix.to_lowercase().replace('_', "-")
    }
}

/// Maps level names and their unambiguous abbreviations to numeric levels.
///
/// Built once at startup and handed to whoever needs to parse levels.
#[derive(Debug, Clone)]
pub struct LogLevelResolver {
    entries: BTreeMap<String, i32>,
    flags: Vec<LevelFlag>,
}

/// Uppercase identifier with every run of non-alphanumerics collapsed to `_`.
pub fn to_identifier(s: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| Regex::new("[^a-zA-Z0-9]+").expect("valid regex"));
    re.replace_all(s, "_").to_uppercase()
}

impl LogLevelResolver {
    pub fn standard() -> Self {
        Self::new(
            STANDARD_LEVELS
                .iter()
                .copied()
                .filter(|(name, _)| !EXCLUDED_LEVELS.contains(name)),
        )
    }

    pub fn new<'a>(levels: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        let levels: Vec<(&str, String, i32)> = levels
            .into_iter()
            .map(|(name, value)| (name, to_identifier(name), value))
            .filter(|(_, key, _)| !key.is_empty())
            .collect();

        let mut by_length: Vec<&(&str, String, i32)> = levels.iter().collect();
        by_length.sort_by_key(|(_, key, _)| key.len());

        let mut entries = BTreeMap::new();
        let mut collapsed = HashSet::new();
        for (_, key, value) in by_length {
            // A shorter spelling of the same level is redundant once the longer one is known.
            for end in 1..key.len() {
                let prefix = &key[..end];
                if entries.get(prefix) == Some(value) {
                    entries.remove(prefix);
                    collapsed.insert(prefix.to_string());
                }
            }
            entries.insert(key.clone(), *value);
        }

        let mut seen_keys = HashSet::new();
        let mut seen_values = HashSet::new();
        let mut flags = Vec::new();
        for (name, key, value) in &levels {
            if collapsed.contains(key) || entries.get(key) != Some(value) {
                continue;
            }
            if !seen_keys.insert(key.clone()) || !seen_values.insert(*value) {
                continue;
            }
            flags.push(LevelFlag {
                name: name.to_string(),
                key: key.clone(),
                value: *value,
                prefix: shortest_unique_prefix(key, entries.keys()).to_string(),
            });
        }

        Self { entries, flags }
    }

    pub fn flags(&self) -> &[LevelFlag] {
        &self.flags
    }

    /// Resolvable names with their values, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i32)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn shortest_unique_prefix(&self, name: &str) -> Option<String> {
        let key = to_identifier(name);
        self.entries
            .contains_key(&key)
            .then(|| shortest_unique_prefix(&key, self.entries.keys()).to_string())
    }

    pub fn resolve<'a>(&self, input: impl Into<LevelInput<'a>>) -> Result<i32, LevelError> {
        let name = match input.into() {
            LevelInput::Value(value) => return Ok(value),
            LevelInput::Name(name) => name,
        };
        if let Ok(value) = name.trim().parse::<i32>() {
            return Ok(value);
        }

        let key = to_identifier(name);
        if key.is_empty() {
            return Err(LevelError::Invalid(name.to_string()));
        }
        if let Some(value) = self.entries.get(&key) {
            return Ok(*value);
        }

        let matches: Vec<(&String, &i32)> = self
            .entries
            .range(key.clone()..)
            .take_while(|(candidate, _)| candidate.starts_with(&key))
            .collect();
        let values: BTreeSet<i32> = matches.iter().map(|(_, value)| **value).collect();
        match values.len() {
            0 => Err(LevelError::Invalid(name.to_string())),
            1 => Ok(*matches[0].1),
            _ => Err(LevelError::Ambiguous {
                input: name.to_string(),
                candidates: matches.iter().map(|(key, _)| key.to_string()).collect(),
            }),
        }
    }
}

fn shortest_unique_prefix<'k>(
    key: &'k str,
    all: impl Iterator<Item = &'k String> + Clone,
) -> &'k str {
    (1..=key.len())
        .map(|end| &key[..end])
        .find(|prefix| {
            all.clone()
                .filter(|other| other.as_str() != key)
                .all(|other| !other.starts_with(prefix))
        })
        .unwrap_or(key)
}
