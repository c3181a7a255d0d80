//! Load the pipeline config file (TOML).
//!
//! ```toml
//! [pipeline]
//! steps = """
//! BasicModule.getBasicStats
//! HashModule.blake3Digest:short
//! """
//!
//! ["BaseImage.BaseImage"]
//! extensions = "svs,tif"
//!
//! ["HashModule.blake3Digest:short"]
//! length = 16
//! ```
//!
//! Each step identifier may have a table of the same name holding its parameters. Keys may be
//! quoted (`["A.b"]`) or written as nested tables (`[A.b]`); both are found.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::RunError;
use crate::utils::config::ConfigSections;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepList {
    /// Newline-separated identifiers.
    Lines(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct PipelineSection {
    steps: StepList,
}

#[derive(Debug, Deserialize)]
struct PipelineToml {
    pipeline: PipelineSection,
    #[serde(flatten)]
    sections: toml::Table,
}

/// Parsed config: ordered step identifiers plus every other table, for parameter lookup.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    steps: Vec<String>,
    sections: toml::Table,
}

impl PipelineConfig {
    /// Read and parse a config file. Any failure is a configuration error.
    pub fn load(path: &Path) -> Result<Self, RunError> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            RunError::Configuration(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&s)
            .map_err(|e| RunError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(s: &str) -> Result<Self, RunError> {
        let file: PipelineToml = toml::from_str(s).map_err(|e| {
            RunError::Configuration(format!(
                "expected a [{}] table with a `{}` key: {}",
                ConfigSections::PIPELINE,
                ConfigSections::STEPS_KEY,
                e
            ))
        })?;
        let steps: Vec<String> = match file.pipeline.steps {
            StepList::Lines(s) => s.lines().map(str::to_string).collect(),
            StepList::List(v) => v,
        }
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
        Ok(Self {
            steps,
            sections: file.sections,
        })
    }

    /// Build a config in code (library use, tests).
    pub fn from_parts(
        steps: Vec<String>,
        sections: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Self {
        let sections = sections
            .into_iter()
            .map(|(name, params)| {
                let table: toml::Table = params
                    .into_iter()
                    .map(|(k, v)| (k, toml::Value::String(v)))
                    .collect();
                (name, toml::Value::Table(table))
            })
            .collect();
        Self { steps, sections }
    }

    /// Step identifiers in pipeline order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    fn find_table(&self, name: &str) -> Option<&toml::Table> {
        if let Some(toml::Value::Table(t)) = self.sections.get(name) {
            return Some(t);
        }
        // `[A.b]` parses as nested tables; walk them. A `:variant` suffix stays on the last key.
        let mut parts = name.split('.');
        let mut current = self.sections.get(parts.next()?)?.as_table()?;
        for part in parts {
            current = current.get(part)?.as_table()?;
        }
        Some(current)
    }

    /// Parameter map of a section, scalars stringified. Empty when the section is absent.
    pub fn section(&self, name: &str) -> BTreeMap<String, String> {
        self.find_table(name)
            .map(|t| {
                t.iter()
                    .filter(|(_, v)| !v.is_table())
                    .map(|(k, v)| (k.clone(), value_to_param(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.find_table(name).is_some()
    }
}

fn value_to_param(v: &toml::Value) -> String {
    match v {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
