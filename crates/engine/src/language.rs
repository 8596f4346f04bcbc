//! Language identifiers and their container images.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// A language a sandbox can be provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Go,
    Node,
    Java,
    Ruby,
    Php,
    Rust,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Self::Python,
        Self::Go,
        Self::Node,
        Self::Java,
        Self::Ruby,
        Self::Php,
        Self::Rust,
    ];

    /// Resolve a user-supplied identifier (case-insensitive, aliases allowed).
    pub fn resolve(input: &str) -> Result<Self> {
        let lang = match input.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Self::Python,
            "go" | "golang" => Self::Go,
            "node" | "nodejs" | "js" | "javascript" => Self::Node,
            "java" => Self::Java,
            "ruby" | "rb" => Self::Ruby,
            "php" => Self::Php,
            "rust" | "rs" => Self::Rust,
            _ => return Err(SandboxError::UnsupportedLanguage(input.to_string())),
        };
        Ok(lang)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Go => "go",
            Self::Node => "node",
            Self::Java => "java",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Rust => "rust",
        }
    }

    /// Container image the sandbox pod runs.
    pub fn image(&self) -> &'static str {
        match self {
            Self::Python => "python:3.9",
            Self::Go => "golang:1.24",
            Self::Node => "node:14",
            Self::Java => "openjdk:11",
            Self::Ruby => "ruby:2.7",
            Self::Php => "php:8.0",
            Self::Rust => "rust:1.56",
        }
    }

    /// File name a script body is written to before it runs.
    pub fn script_file(&self) -> &'static str {
        match self {
            Self::Python => "exec_script.py",
            Self::Go => "exec_script.go",
            Self::Node => "exec_script.js",
            Self::Java => "ExecScript.java",
            Self::Ruby => "exec_script.rb",
            Self::Php => "exec_script.php",
            Self::Rust => "exec_script.rs",
        }
    }

    /// Shell command that runs the script stored under `script_dir`.
    pub fn run_invocation(&self, script_dir: &str) -> String {
        let dir = script_dir.trim_end_matches('/');
        let path = format!("{dir}/{}", self.script_file());
        match self {
            Self::Python => format!("python3 {path}"),
            Self::Go => format!("go run {path}"),
            Self::Node => format!("node {path}"),
            Self::Java => format!("javac {path} && java -cp {dir} ExecScript"),
            Self::Ruby => format!("ruby {path}"),
            Self::Php => format!("php {path}"),
            Self::Rust => format!("rustc {path} -o {dir}/exec_script && {dir}/exec_script"),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}
