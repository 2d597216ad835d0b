//! Command builder for running the external crawl tool.

use std::process::Stdio;

use tokio::process::Command;

/// Fluent builder for a single external command invocation.
#[derive(Debug, Default, Clone)]
pub struct CmdBuilder {
    program: String,
    args: Vec<String>,
}

impl CmdBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The full command line, for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Run to completion, capturing stdout and stderr combined.
    ///
    /// A nonzero exit is not an error here: wget exits nonzero whenever
    /// any single fetch failed while still producing a usable mirror.
    /// Callers judge success from the output on disk instead.
    pub async fn run_capture(&self) -> std::io::Result<CmdOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            // Null stdin so the tool can never hang on an interactive prompt.
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(CmdOutput {
            combined,
            code: output.status.code(),
        })
    }
}

/// Output from a captured command execution.
pub struct CmdOutput {
    pub combined: Vec<u8>,
    pub code: Option<i32>,
}

impl CmdOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.combined).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_program_and_args() {
        let cmd = CmdBuilder::new("wget")
            .arg("--no-clobber")
            .args(["--recursive", "https://example.com/"]);
        assert_eq!(
            cmd.display(),
            "wget --no-clobber --recursive https://example.com/"
        );
    }
}
