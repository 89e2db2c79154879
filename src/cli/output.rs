use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Serialize `value` for the structured formats; `None` for human output.
    pub fn render<T: Serialize>(&self, value: &T) -> Result<Option<String>> {
        match self {
            OutputFormat::Human => Ok(None),
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map(Some)
                .context("Failed to encode JSON output"),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .map(Some)
                .context("Failed to encode YAML output"),
        }
    }

    /// Print `value` in this format, or call `human` for the text rendering.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<()> {
        match self.render(value)? {
            Some(text) => println!("{}", text.trim_end()),
            None => println!("{}", human()),
        }
        Ok(())
    }
}
