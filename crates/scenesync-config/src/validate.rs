//! Validation from parsed documents into the typed configuration.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::loader::{
    ConfigDocument, DiscoveryDocument, DispatchDocument, LocalDocument, RemoteDocument,
    RemotePathsDocument, ScenesDocument,
};
use crate::model::{
    DiscoverySettings, DispatchSettings, LocalPaths, PipelineConfig, RemotePaths, RemoteSettings,
    RetrySettings, SceneRange,
};

pub(crate) fn pipeline_config(document: ConfigDocument) -> ConfigResult<PipelineConfig> {
    Ok(PipelineConfig {
        remote: remote_settings(document.remote)?,
        local: local_paths(document.local)?,
        remote_paths: remote_paths(document.remote_paths)?,
        scenes: scene_range(&document.scenes)?,
        discovery: discovery_settings(document.discovery)?,
        dispatch: dispatch_settings(document.dispatch)?,
    })
}

fn remote_settings(document: RemoteDocument) -> ConfigResult<RemoteSettings> {
    let host = document.host.trim().to_string();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ConfigError::invalid(
            "remote",
            "host",
            "must be a non-empty hostname",
            Some(document.host),
        ));
    }

    let port = document.port.unwrap_or(defaults::SSH_PORT);
    if port == 0 {
        return Err(ConfigError::invalid(
            "remote",
            "port",
            "must be between 1 and 65535",
            Some(port.to_string()),
        ));
    }

    let user = document
        .user
        .map_or_else(|| defaults::SSH_USER.to_string(), |user| user.trim().to_string());
    if user.is_empty() {
        return Err(ConfigError::invalid(
            "remote",
            "user",
            "must not be empty",
            None,
        ));
    }

    let call_timeout_secs = document
        .call_timeout_secs
        .unwrap_or(defaults::CALL_TIMEOUT_SECS);
    if call_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "remote",
            "call_timeout_secs",
            "must be positive",
            Some("0".to_string()),
        ));
    }

    let dispatch_timeout = match document.dispatch_timeout_secs {
        Some(0) => {
            return Err(ConfigError::invalid(
                "remote",
                "dispatch_timeout_secs",
                "must be positive when set",
                Some("0".to_string()),
            ));
        }
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    let ssh_options = document.ssh_options.unwrap_or_else(|| {
        defaults::SSH_OPTIONS
            .iter()
            .map(ToString::to_string)
            .collect()
    });

    Ok(RemoteSettings {
        host,
        port,
        user,
        identity_file: document.identity_file,
        ssh_options,
        call_timeout: Duration::from_secs(call_timeout_secs),
        dispatch_timeout,
        retry: RetrySettings {
            max_retries: document.retry.max_retries.unwrap_or(defaults::RETRY_MAX),
            base_delay: Duration::from_millis(
                document
                    .retry
                    .base_delay_ms
                    .unwrap_or(defaults::RETRY_BASE_DELAY_MS),
            ),
        },
    })
}

fn local_paths(document: LocalDocument) -> ConfigResult<LocalPaths> {
    let paths = LocalPaths {
        source_root: document.source_root,
        staging_dir: document.staging_dir,
        state_dir: document
            .state_dir
            .unwrap_or_else(|| PathBuf::from(defaults::STATE_DIR)),
        template_path: document.template_path,
    };

    // A staging rebuild removes the whole staging directory.
    let staging = normalise(&paths.staging_dir);
    if overlaps(&staging, &normalise(&paths.source_root)) {
        return Err(ConfigError::invalid(
            "local",
            "staging_dir",
            "must not overlap source_root",
            Some(paths.staging_dir.display().to_string()),
        ));
    }
    if overlaps(&staging, &normalise(&paths.state_dir)) {
        return Err(ConfigError::invalid(
            "local",
            "staging_dir",
            "must not overlap state_dir",
            Some(paths.staging_dir.display().to_string()),
        ));
    }
    Ok(paths)
}

/// Lexical absolute form of `path`; the directory need not exist.
fn normalise(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    let mut normalised = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalised.pop();
            }
            other => normalised.push(other),
        }
    }
    normalised
}

fn overlaps(left: &Path, right: &Path) -> bool {
    left.starts_with(right) || right.starts_with(left)
}

fn remote_paths(document: RemotePathsDocument) -> ConfigResult<RemotePaths> {
    let base = absolute_remote_path("base", &document.base)?;
    let assets = match document.assets {
        Some(assets) => absolute_remote_path("assets", &assets)?,
        None => format!("{base}/{}", defaults::ASSETS_SUBDIR),
    };
    let output = match document.output {
        Some(output) => absolute_remote_path("output", &output)?,
        None => format!("{base}/{}", defaults::OUTPUT_SUBDIR),
    };
    Ok(RemotePaths {
        base,
        assets,
        output,
    })
}

fn absolute_remote_path(field: &'static str, value: &str) -> ConfigResult<String> {
    let trimmed = value.trim();
    if !trimmed.starts_with('/') {
        return Err(ConfigError::invalid(
            "remote_paths",
            field,
            "must be an absolute path",
            Some(value.to_string()),
        ));
    }
    let normalised = trimmed.trim_end_matches('/');
    if normalised.is_empty() {
        return Err(ConfigError::invalid(
            "remote_paths",
            field,
            "must not be the filesystem root",
            Some(value.to_string()),
        ));
    }
    Ok(normalised.to_string())
}

fn scene_range(document: &ScenesDocument) -> ConfigResult<SceneRange> {
    if document.start > document.end {
        return Err(ConfigError::invalid(
            "scenes",
            "end",
            "must not be less than start",
            Some(document.end.to_string()),
        ));
    }
    Ok(SceneRange {
        start: document.start,
        end: document.end,
    })
}

fn discovery_settings(document: DiscoveryDocument) -> ConfigResult<DiscoverySettings> {
    let pattern = document
        .source_pattern
        .unwrap_or_else(|| defaults::SOURCE_PATTERN.to_string());
    let source_pattern = Regex::new(&pattern).map_err(|_| {
        ConfigError::invalid(
            "discovery",
            "source_pattern",
            "must be a valid regular expression",
            Some(pattern.clone()),
        )
    })?;

    let extension = document
        .result_extension
        .unwrap_or_else(|| defaults::RESULT_EXTENSION.to_string());
    let result_extension = extension.trim().trim_start_matches('.').to_string();
    if result_extension.is_empty() || !result_extension.chars().all(char::is_alphanumeric) {
        return Err(ConfigError::invalid(
            "discovery",
            "result_extension",
            "must be a non-empty alphanumeric extension",
            Some(extension),
        ));
    }

    Ok(DiscoverySettings {
        source_pattern,
        result_extension,
    })
}

fn dispatch_settings(document: DispatchDocument) -> ConfigResult<DispatchSettings> {
    let batch_size = document.batch_size.unwrap_or(defaults::BATCH_SIZE);
    if batch_size == 0 {
        return Err(ConfigError::invalid(
            "dispatch",
            "batch_size",
            "must be at least 1",
            Some("0".to_string()),
        ));
    }

    let program = non_empty("program", document.program, defaults::PROGRAM)?;
    let input_flag = non_empty("input_flag", document.input_flag, defaults::INPUT_FLAG)?;
    let output_flag = non_empty("output_flag", document.output_flag, defaults::OUTPUT_FLAG)?;
    let setup = match document.setup {
        Some(setup) if setup.trim().is_empty() => None,
        Some(setup) => Some(setup.trim().to_string()),
        None => Some(defaults::SETUP.to_string()),
    };

    Ok(DispatchSettings {
        batch_size,
        program,
        setup,
        input_flag,
        output_flag,
    })
}

fn non_empty(field: &'static str, value: Option<String>, fallback: &str) -> ConfigResult<String> {
    let value = value.unwrap_or_else(|| fallback.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(
            "dispatch",
            field,
            "must not be empty",
            None,
        ));
    }
    Ok(trimmed.to_string())
}
