use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_image_model: String,
    pub gemini_api_base_url: String,
    pub gemini_timeout_seconds: u64,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub public_dir: PathBuf,
    pub max_upload_bytes: usize,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_trimmed(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env_trimmed(name).unwrap_or_else(|| default.to_string()))
}

fn normalize_base_url(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_GEMINI_BASE_URL.to_string();
    }
    trimmed.to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = env_trimmed("GOOGLE_API_KEY")
            .or_else(|| env_trimmed("GEMINI_API_KEY"))
            .unwrap_or_default();

        let mut max_upload_bytes = env_usize("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            max_upload_bytes = DEFAULT_MAX_UPLOAD_BYTES;
        }

        Ok(Config {
            host: env_string("HOST", "0.0.0.0"),
            port: env_u16("PORT", 5000),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: env_path("LOG_DIR", "logs"),
            gemini_api_key,
            gemini_image_model: env_trimmed("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            gemini_api_base_url: normalize_base_url(env_string(
                "GEMINI_API_BASE_URL",
                DEFAULT_GEMINI_BASE_URL,
            )),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90).max(1),
            upload_dir: env_path("UPLOAD_DIR", "uploads"),
            output_dir: env_path("OUTPUT_DIR", "outputs"),
            public_dir: env_path("PUBLIC_DIR", "public"),
            max_upload_bytes,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        assert_eq!(
            normalize_base_url("http://localhost:8080/".to_string()),
            "http://localhost:8080"
        );
    }

    #[test]
    fn blank_base_url_uses_google_endpoint() {
        assert_eq!(normalize_base_url("  ".to_string()), DEFAULT_GEMINI_BASE_URL);
    }
}
