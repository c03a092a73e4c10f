use std::{env, path::PathBuf};

use anyhow::Result;

pub const DEFAULT_EMAIL_DOMAIN: &str = "university.edu";
pub const DEFAULT_LOG_FILTER: &str = "coursehubd=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub tracks_path: Option<PathBuf>,
    pub email_domain: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            tracks_path: None,
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let workspace = non_empty_var("COURSEHUB_WORKSPACE").map(PathBuf::from);
        let tracks_path = non_empty_var("COURSEHUB_TRACKS_PATH").map(PathBuf::from);

        let email_domain = non_empty_var("COURSEHUB_EMAIL_DOMAIN")
            .map(|v| v.trim_start_matches('@').to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_EMAIL_DOMAIN.to_string());

        let log_filter =
            non_empty_var("COURSEHUB_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            workspace,
            tracks_path,
            email_domain,
            log_filter,
        })
    }
}
