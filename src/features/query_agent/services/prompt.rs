use chrono::{DateTime, Local};
use minijinja::{context, Environment};

use crate::features::query_agent::error::AgentError;

const TEMPLATE_NAME: &str = "query_agent/system.jinja";
const SYSTEM_TEMPLATE: &str =
    include_str!("../../../../templates/prompts/query_agent/system.jinja");

/// System framing for every conversation
pub struct SystemPrompt {
    env: Environment<'static>,
    station_name: String,
}

impl SystemPrompt {
    pub fn new(station_name: impl Into<String>) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, SYSTEM_TEMPLATE)?;

        Ok(Self {
            env,
            station_name: station_name.into(),
        })
    }

    /// Render with the station-local time so relative dates resolve correctly
    pub fn render(&self, now: DateTime<Local>) -> Result<String, AgentError> {
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| AgentError::Internal(format!("system prompt missing: {}", e)))?;

        template
            .render(context! {
                station_name => &self.station_name,
                day_name => now.format("%A").to_string(),
                date => now.format("%Y-%m-%d").to_string(),
                time => now.format("%H:%M").to_string(),
                utc_offset => now.format("%:z").to_string(),
            })
            .map_err(|e| AgentError::Internal(format!("failed to render system prompt: {}", e)))
    }
}
