#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tuttle::config::{DefaultSection, ProcessSection, ProjectFile, RawProjectFile};

/// Builder for `ProjectFile` to simplify test setup.
///
/// Can also render itself as a tuttlefile for tests going through the
/// command entry points.
#[derive(Debug, Clone, Default)]
pub struct ProjectBuilder {
    project: RawProjectFile,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_processor(mut self, name: &str) -> Self {
        self.project.default = DefaultSection {
            processor: Some(name.to_string()),
        };
        self
    }

    pub fn process(mut self, process: ProcessBuilder) -> Self {
        self.project.process.push(process.build());
        self
    }

    pub fn raw(self) -> RawProjectFile {
        self.project
    }

    pub fn build(self) -> ProjectFile {
        ProjectFile::try_from(self.project).expect("Failed to build valid project from builder")
    }

    /// TOML text of the project. Code goes into a literal multi-line string.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();
        if let Some(processor) = &self.project.default.processor {
            let _ = writeln!(out, "[default]\nprocessor = {processor:?}\n");
        }
        for section in self.project.process.iter() {
            let _ = writeln!(out, "[[process]]");
            if let Some(processor) = &section.processor {
                let _ = writeln!(out, "processor = {processor:?}");
            }
            let _ = writeln!(out, "inputs = {:?}", section.inputs);
            let _ = writeln!(out, "outputs = {:?}", section.outputs);
            let _ = writeln!(out, "code = '''\n{}'''\n", section.code);
        }
        out
    }

    /// Write `<dir>/tuttlefile` and return its path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join("tuttlefile");
        fs::write(&path, self.to_toml()).expect("Failed to write tuttlefile");
        path
    }
}

/// Builder for one `[[process]]` section.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    section: ProcessSection,
}

impl ProcessBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            section: ProcessSection {
                processor: None,
                inputs: vec![],
                outputs: vec![],
                code: code.to_string(),
            },
        }
    }

    pub fn processor(mut self, name: &str) -> Self {
        self.section.processor = Some(name.to_string());
        self
    }

    pub fn input(mut self, url: &str) -> Self {
        self.section.inputs.push(url.to_string());
        self
    }

    pub fn output(mut self, url: &str) -> Self {
        self.section.outputs.push(url.to_string());
        self
    }

    pub fn build(self) -> ProcessSection {
        self.section
    }
}
