use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{ChatReelError, Result};
use crate::schema::{Conversation, RenderSpec};

/// A conversation document as read from disk.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub conversation: Conversation,
    /// Hex SHA-256 of the raw document; stable across runs.
    pub fingerprint: String,
}

impl LoadedSpec {
    /// Default artifact stem, e.g. `chatreel-1a2b3c4d5e6f`.
    pub fn artifact_stem(&self) -> String {
        format!("chatreel-{}", &self.fingerprint[..12])
    }
}

/// Read a YAML or JSON render document and validate it.
pub fn load_and_validate_spec(path: &Path) -> Result<LoadedSpec> {
    let contents = fs::read_to_string(path).map_err(|error| {
        ChatReelError::io(format!("failed to read conversation {}", path.display()), error)
    })?;
    let spec = parse_spec(&contents).map_err(|error| match error {
        ChatReelError::Validation(message) => {
            ChatReelError::validation(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;
    let conversation = Conversation::new(spec)?;
    Ok(LoadedSpec {
        conversation,
        fingerprint: sha256_hex(contents.as_bytes()),
    })
}

/// Parse a render document. JSON is accepted since it is a subset of YAML.
pub fn parse_spec(contents: &str) -> Result<RenderSpec> {
    serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        ChatReelError::validation(format!("failed to parse document at {location}: {error}"))
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
