//! Per-item job descriptors derived from the base template.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::discovery::WorkItem;
use crate::error::{EngineError, EngineResult};

/// Base job-descriptor template (a JSON object).
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorTemplate {
    path: PathBuf,
    fields: Map<String, Value>,
}

impl DescriptorTemplate {
    /// Read the template at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not JSON, or is not a
    /// JSON object.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw =
            fs::read_to_string(path).map_err(|source| EngineError::io("template.read", path, source))?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|source| EngineError::json("template.parse", path, source))?;
        Self::from_value(path, value)
    }

    /// Wrap an already-parsed template; `path` labels errors.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Template`] when `value` is not a JSON object.
    pub fn from_value(path: &Path, value: Value) -> EngineResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                path: path.to_path_buf(),
                fields,
            }),
            _ => Err(EngineError::Template {
                path: path.to_path_buf(),
                reason: "template must be a JSON object",
            }),
        }
    }

    /// Template file the descriptor fields came from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the descriptor for `item`: template fields plus the per-item
    /// source path, result name, and single-frame settings.
    #[must_use]
    pub fn render(&self, item: &WorkItem) -> Value {
        let mut fields = self.fields.clone();
        fields.insert("video_path".to_string(), Value::from(item.video_path()));
        fields.insert("name".to_string(), Value::from(item.result_name.as_str()));
        fields.insert("num_video_frames_per_chunk".to_string(), Value::from(1));
        fields.insert("max_frames".to_string(), Value::from(1));
        Value::Object(fields)
    }
}

/// Serialize `descriptor` to `path` with four-space indentation.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_descriptor(path: &Path, descriptor: &Value) -> EngineResult<()> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    descriptor
        .serialize(&mut serializer)
        .map_err(|source| EngineError::json("descriptor.serialize", path, source))?;
    buffer.push(b'\n');
    let mut file =
        fs::File::create(path).map_err(|source| EngineError::io("descriptor.create", path, source))?;
    file.write_all(&buffer)
        .map_err(|source| EngineError::io("descriptor.write", path, source))
}
