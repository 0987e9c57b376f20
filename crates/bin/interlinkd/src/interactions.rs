//! Interaction definitions file.
//!
//! ```toml
//! [[interactions]]
//! name = "hall"
//!
//! [[interactions.modules]]
//! id = "6f1c…"
//! type_name = "frame_listener"
//! config = { port = 8000 }
//!
//! [[interactions.routes]]
//! source = "6f1c…"
//! target = "…"
//! event = "trigger"
//! ```

use std::path::Path;

use serde::Deserialize;

use interlink_domain::interaction::Interaction;

use crate::config::ConfigError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InteractionsFile {
    interactions: Vec<Interaction>,
}

/// Read every interaction definition from `path`. A missing file yields none.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read(path: &Path) -> Result<Vec<Interaction>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no interactions file, starting empty");
            Ok(Vec::new())
        }
        Err(err) => Err(ConfigError::Io(err)),
    }
}

fn parse(content: &str) -> Result<Vec<Interaction>, ConfigError> {
    let file: InteractionsFile = toml::from_str(content)?;
    Ok(file.interactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_parse_interactions_with_module_config() {
        let content = r#"
            [[interactions]]
            name = "hall"

            [[interactions.modules]]
            id = "6f1c5a52-8f3e-4e53-9c1e-2d0d7c1f0a11"
            type_name = "frame_listener"
            config = { port = 9000, mode = "streaming" }

            [[interactions.modules]]
            id = "0b7e0c1d-3c55-4d6f-8a0e-9f1a2b3c4d5e"
            type_name = "virtual_light"

            [[interactions.routes]]
            source = "6f1c5a52-8f3e-4e53-9c1e-2d0d7c1f0a11"
            target = "0b7e0c1d-3c55-4d6f-8a0e-9f1a2b3c4d5e"
            event = "stream"
        "#;

        let interactions = parse(content).unwrap();

        assert_eq!(interactions.len(), 1);
        let hall = &interactions[0];
        assert!(hall.enabled);
        assert_eq!(hall.modules[0].config.get("port"), Some(&json!(9000)));
        assert!(hall.modules[1].config.is_empty());
        assert_eq!(hall.routes[0].event, "stream");
        assert!(hall.validate().is_ok());
    }

    #[test]
    fn should_return_nothing_when_file_not_found() {
        assert!(read(Path::new("nonexistent-interactions.toml")).unwrap().is_empty());
    }

    #[test]
    fn should_reject_interaction_without_name() {
        let content = r#"
            [[interactions]]
            enabled = false
        "#;
        assert!(matches!(parse(content), Err(ConfigError::Parse(_))));
    }
}
