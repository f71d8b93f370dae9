// src/config/model.rs

use serde::Deserialize;

/// Processor used when neither the process nor `[default]` names one.
pub const DEFAULT_PROCESSOR: &str = "shell";

/// Project file as read from TOML, before semantic validation.
///
/// ```toml
/// [default]
/// processor = "bash"
///
/// [[process]]
/// inputs = ["file://A"]
/// outputs = ["file://B"]
/// code = "cat A > B"
/// ```
///
/// Every section is optional: an empty file is a valid, empty project.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProjectFile {
    /// Defaults from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All `[[process]]` sections, in declaration order.
    #[serde(default)]
    pub process: Vec<ProcessSection>,
}

/// Validated project file.
///
/// Build with [`ProjectFile::try_from`] so that the checks in
/// `config::validate` have run.
#[derive(Debug, Clone)]
pub struct ProjectFile {
    pub default: DefaultSection,
    pub process: Vec<ProcessSection>,
}

impl ProjectFile {
    /// Construct without validation; only used by `TryFrom<RawProjectFile>`.
    pub(crate) fn new_unchecked(default: DefaultSection, process: Vec<ProcessSection>) -> Self {
        Self { default, process }
    }

    /// Processor name a section resolves to.
    pub fn processor_of<'a>(&'a self, section: &'a ProcessSection) -> &'a str {
        section
            .processor
            .as_deref()
            .or(self.default.processor.as_deref())
            .unwrap_or(DEFAULT_PROCESSOR)
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Processor applied to processes that do not name one.
    #[serde(default)]
    pub processor: Option<String>,
}

/// One `[[process]]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProcessSection {
    /// Processor (execution language) name; falls back to `[default]`.
    #[serde(default)]
    pub processor: Option<String>,

    /// Resource urls consumed by the process, in order.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Resource urls produced by the process, in order.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Source handed to the processor. Part of the process identity.
    #[serde(default)]
    pub code: String,
}
