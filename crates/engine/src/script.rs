//! Shell commands that store a script in a sandbox and run it.

use serde::Serialize;

use crate::language::Language;

/// One round-trip of a script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStep {
    Write,
    Chmod,
    Run,
}

impl std::fmt::Display for ExecStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write => f.write_str("write"),
            Self::Chmod => f.write_str("chmod"),
            Self::Run => f.write_str("run"),
        }
    }
}

/// The write, chmod and run commands for a script body, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPlan {
    pub path: String,
    steps: Vec<(ExecStep, String)>,
}

impl ScriptPlan {
    pub fn new(language: Language, script_dir: &str, body: &str) -> Self {
        let dir = script_dir.trim_end_matches('/');
        let path = format!("{dir}/{}", language.script_file());
        let body = body.strip_suffix('\n').unwrap_or(body);
        let delimiter = heredoc_delimiter(body);

        let steps = vec![
            (
                ExecStep::Write,
                format!("cat > {path} << '{delimiter}'\n{body}\n{delimiter}"),
            ),
            (ExecStep::Chmod, format!("chmod +x {path}")),
            (ExecStep::Run, language.run_invocation(dir)),
        ];
        Self { path, steps }
    }

    pub fn steps(&self) -> &[(ExecStep, String)] {
        &self.steps
    }
}

/// A heredoc terminator that does not appear as a line of `body`.
fn heredoc_delimiter(body: &str) -> String {
    let mut delimiter = String::from("SANDBOXED_EOF");
    let mut suffix = 0u32;
    while body.lines().any(|line| line == delimiter) {
        suffix += 1;
        delimiter = format!("SANDBOXED_EOF_{suffix}");
    }
    delimiter
}
