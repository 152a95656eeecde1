//! Runner configuration — loaded from environment variables.

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Default timeout in seconds for a single pipeline step.
    pub step_timeout_secs: u64,
    /// Seconds to wait for a provisioned service to accept connections.
    pub service_ready_timeout_secs: u64,
    /// Bytes of stdout/stderr tail kept per step.
    pub log_tail_bytes: usize,
    /// Docker binary used to provision service containers.
    pub docker_bin: String,
    /// Image used for the mysql service.
    pub mysql_image: String,
    /// Image used for the postgres service.
    pub postgres_image: String,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let step_timeout_secs = std::env::var("HELO_CI_STEP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(600);
        let service_ready_timeout_secs = std::env::var("HELO_CI_SERVICE_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        let log_tail_bytes = std::env::var("HELO_CI_LOG_TAIL_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(65536);
        let docker_bin =
            std::env::var("HELO_CI_DOCKER").unwrap_or_else(|_| "docker".to_string());
        let mysql_image =
            std::env::var("HELO_CI_MYSQL_IMAGE").unwrap_or_else(|_| "mysql:8.0".to_string());
        let postgres_image = std::env::var("HELO_CI_POSTGRES_IMAGE")
            .unwrap_or_else(|_| "postgres:16-alpine".to_string());

        Self {
            step_timeout_secs,
            service_ready_timeout_secs,
            log_tail_bytes,
            docker_bin,
            mysql_image,
            postgres_image,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 600,
            service_ready_timeout_secs: 60,
            log_tail_bytes: 65536,
            docker_bin: "docker".to_string(),
            mysql_image: "mysql:8.0".to_string(),
            postgres_image: "postgres:16-alpine".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.step_timeout_secs, 600);
        assert_eq!(config.service_ready_timeout_secs, 60);
        assert_eq!(config.log_tail_bytes, 65536);
        assert_eq!(config.docker_bin, "docker");
        assert_eq!(config.mysql_image, "mysql:8.0");
    }
}
