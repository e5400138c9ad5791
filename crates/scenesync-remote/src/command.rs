//! Typed remote command lines.
//!
//! # Design
//! - Every remote shell string is assembled here from typed parts; callers
//!   never concatenate shell text themselves.
//! - Each command carries an operation label used in logs and errors.

use scenesync_config::DispatchSettings;

use crate::shell::quote;

/// A shell command line to run on the remote worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    operation: &'static str,
    script: String,
}

impl RemoteCommand {
    /// Wrap an already-quoted script under an operation label.
    #[must_use]
    pub fn new(operation: &'static str, script: impl Into<String>) -> Self {
        Self {
            operation,
            script: script.into(),
        }
    }

    /// `mkdir -p <dir>`.
    #[must_use]
    pub fn make_dir(remote_dir: &str) -> Self {
        Self::new("ensure_dir", format!("mkdir -p {}", quote(remote_dir)))
    }

    /// Recursive listing of regular files under `remote_dir`.
    ///
    /// A missing directory lists as empty rather than failing.
    #[must_use]
    pub fn list_files(remote_dir: &str) -> Self {
        let dir = quote(remote_dir);
        Self::new(
            "list_files",
            format!("if [ -d {dir} ]; then find {dir} -type f; fi"),
        )
    }

    /// Non-recursive listing of regular files in `remote_dir` whose names
    /// match the shell glob `pattern`.
    #[must_use]
    pub fn list_matching(remote_dir: &str, pattern: &str) -> Self {
        let dir = quote(remote_dir);
        Self::new(
            "list_matching",
            format!(
                "if [ -d {dir} ]; then find {dir} -maxdepth 1 -type f -name {}; fi",
                quote(pattern)
            ),
        )
    }

    /// Operation label for logs and errors.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Script text passed to the remote shell.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }
}

/// One invocation of the remote inference program over a batch of descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceInvocation<'a> {
    /// Directory the program runs from.
    pub workdir: &'a str,
    /// Program, prelude, and flags.
    pub settings: &'a DispatchSettings,
    /// Remote descriptor paths for the batch, in batch order.
    pub descriptors: &'a [String],
    /// Directory the program writes results into.
    pub output_dir: &'a str,
}

impl InferenceInvocation<'_> {
    /// Render `cd <workdir> && <setup> && <program> -i <d1> .. <dn> -o <output>`.
    ///
    /// `program` and `setup` are operator-supplied shell fragments and are
    /// passed through verbatim; paths are quoted.
    #[must_use]
    pub fn command(&self) -> RemoteCommand {
        let mut script = format!("cd {}", quote(self.workdir));
        if let Some(setup) = &self.settings.setup {
            script.push_str(" && ");
            script.push_str(setup);
        }
        script.push_str(" && ");
        script.push_str(&self.settings.program);
        script.push(' ');
        script.push_str(&quote(&self.settings.input_flag));
        for descriptor in self.descriptors {
            script.push(' ');
            script.push_str(&quote(descriptor));
        }
        script.push(' ');
        script.push_str(&quote(&self.settings.output_flag));
        script.push(' ');
        script.push_str(&quote(self.output_dir));
        RemoteCommand::new("run_batch", script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(setup: Option<&str>) -> DispatchSettings {
        DispatchSettings {
            batch_size: 2,
            program: "python examples/inference.py".to_string(),
            setup: setup.map(str::to_string),
            input_flag: "-i".to_string(),
            output_flag: "-o".to_string(),
        }
    }

    #[test]
    fn inference_invocation_lists_descriptors_in_order() {
        let settings = settings(Some("source .venv/bin/activate"));
        let descriptors = vec![
            "/ws/assets/scene_3_rgb_0001.json".to_string(),
            "/ws/assets/scene_3_rgb_0002.json".to_string(),
        ];
        let invocation = InferenceInvocation {
            workdir: "/ws",
            settings: &settings,
            descriptors: &descriptors,
            output_dir: "/ws/outputs/image2image",
        };
        let command = invocation.command();
        assert_eq!(command.operation(), "run_batch");
        assert_eq!(
            command.script(),
            "cd /ws && source .venv/bin/activate && python examples/inference.py -i \
             /ws/assets/scene_3_rgb_0001.json /ws/assets/scene_3_rgb_0002.json \
             -o /ws/outputs/image2image"
        );
    }

    #[test]
    fn inference_invocation_skips_missing_setup_and_quotes_paths() {
        let settings = settings(None);
        let descriptors = vec!["/ws/my assets/a.json".to_string()];
        let command = InferenceInvocation {
            workdir: "/ws",
            settings: &settings,
            descriptors: &descriptors,
            output_dir: "/ws/out",
        }
        .command();
        assert_eq!(
            command.script(),
            "cd /ws && python examples/inference.py -i '/ws/my assets/a.json' -o /ws/out"
        );
    }

    #[test]
    fn listing_commands_tolerate_missing_directories() {
        assert_eq!(
            RemoteCommand::list_files("/ws/assets").script(),
            "if [ -d /ws/assets ]; then find /ws/assets -type f; fi"
        );
        assert_eq!(
            RemoteCommand::list_matching("/ws/out", "*.jpg").script(),
            "if [ -d /ws/out ]; then find /ws/out -maxdepth 1 -type f -name '*.jpg'; fi"
        );
        assert_eq!(RemoteCommand::make_dir("/ws/a b").script(), "mkdir -p '/ws/a b'");
    }
}
