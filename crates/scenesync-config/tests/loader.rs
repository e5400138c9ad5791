use std::fs;

use scenesync_config::{ConfigError, load_config};

const FULL: &str = r"
remote:
  host: 51.154.62.90
  port: 61080
  user: ubuntu
  identity_file: /home/ops/.ssh/worker
  ssh_options: [BatchMode=yes]
  call_timeout_secs: 30
  dispatch_timeout_secs: 7200
  retry:
    max_retries: 5
    base_delay_ms: 250
local:
  source_root: /mnt/c/isaac-sim/_out_basic_writer
  staging_dir: /tmp/cosmos_upload
  state_dir: /var/lib/scenesync
  template_path: image2image_road.json
remote_paths:
  base: /workspace/cosmos-transfer2.5
  assets: /workspace/cosmos-transfer2.5/assets/road
scenes:
  start: 0
  end: 9
discovery:
  source_pattern: '^frame_\d{6}\.png$'
  result_extension: png
dispatch:
  batch_size: 4
  program: python3 tools/infer.py
  setup: ''
";

#[test]
fn load_config_reads_every_section() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scenesync.yaml");
    fs::write(&path, FULL)?;

    let config = load_config(&path)?;
    assert_eq!(config.remote.destination(), "ubuntu@51.154.62.90");
    assert_eq!(config.remote.port, 61080);
    assert_eq!(config.remote.ssh_options, vec!["BatchMode=yes".to_string()]);
    assert_eq!(config.remote.call_timeout.as_secs(), 30);
    assert_eq!(
        config.remote.dispatch_timeout.map(|timeout| timeout.as_secs()),
        Some(7200)
    );
    assert_eq!(config.remote.retry.max_retries, 5);
    assert_eq!(config.remote.retry.base_delay.as_millis(), 250);
    assert_eq!(config.local.state_dir.to_str(), Some("/var/lib/scenesync"));
    assert_eq!(
        config.remote_paths.assets,
        "/workspace/cosmos-transfer2.5/assets/road"
    );
    assert_eq!(config.scenes.ids().count(), 10);
    assert!(config.discovery.source_pattern.is_match("frame_000001.png"));
    assert_eq!(config.discovery.result_extension, "png");
    assert_eq!(config.dispatch.batch_size, 4);
    assert_eq!(config.dispatch.program, "python3 tools/infer.py");
    assert!(config.dispatch.setup.is_none());
    Ok(())
}

#[test]
fn load_config_reports_missing_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let result = load_config(&dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
    Ok(())
}

#[test]
fn load_config_reports_missing_required_section() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("partial.yaml");
    fs::write(&path, "remote:\n  host: worker\n")?;
    let result = load_config(&path);
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
    Ok(())
}

#[test]
fn example_configuration_is_valid() -> anyhow::Result<()> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenesync.example.yaml");
    let config = load_config(&path)?;
    assert_eq!(config.remote.destination(), "root@51.154.62.90");
    assert_eq!(config.scenes.ids().collect::<Vec<_>>(), vec![3]);
    assert_eq!(config.dispatch.batch_size, 16);
    assert_eq!(config.dispatch.setup.as_deref(), Some("source .venv/bin/activate"));
    Ok(())
}

#[test]
fn staging_dir_over_source_tree_is_rejected_at_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scenesync.yaml");
    fs::write(
        &path,
        FULL.replace("staging_dir: /tmp/cosmos_upload", "staging_dir: /mnt/c/isaac-sim"),
    )?;

    let err = load_config(&path).err();
    assert!(matches!(
        err,
        Some(ConfigError::InvalidField {
            section: "local",
            field: "staging_dir",
            ..
        })
    ));
    Ok(())
}
