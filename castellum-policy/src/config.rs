use std::env;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PolicyConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnv(String),
}

/// Configuration for the policy enforcer and the audit-event publisher,
/// loaded the way the teacher's `ServiceConfig::from_env` composes its
/// per-concern sub-configs.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub policy_file: String,
    pub rabbitmq_url: Option<String>,
    pub rabbitmq_queue: Option<String>,
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, PolicyConfigError> {
        let policy_file = env::var("CASTELLUM_POLICY_FILE")
            .map_err(|_| PolicyConfigError::MissingEnv("CASTELLUM_POLICY_FILE".to_string()))?;

        let rabbitmq_url = env::var("RABBITMQ_URL").ok();
        let rabbitmq_queue = env::var("RABBITMQ_QUEUE").ok();

        if rabbitmq_url.is_none() {
            info!("RABBITMQ_URL not set, audit events will be logged and dropped");
        }

        Ok(Self {
            policy_file,
            rabbitmq_url,
            rabbitmq_queue,
        })
    }
}
