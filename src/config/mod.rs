use std::env;
use std::path::PathBuf;

/// Gateway configuration, read once at startup
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Staging directory for uploaded documents (default: "./uploads")
    pub temp_dir: PathBuf,

    /// Listen host (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 8001)
    pub port: u16,

    /// Processing device label reported to clients and passed to the engine (default: "cpu")
    pub torch_device: String,

    /// Maximum upload size in bytes (default: 100 MB)
    pub max_file_size: usize,

    /// Converter type: "marker" or "disabled" (default: "marker")
    pub converter_type: String,

    /// Executable used by the marker converter (default: "marker_single")
    pub marker_command: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./uploads"),
            host: "0.0.0.0".to_string(),
            port: 8001,
            torch_device: "cpu".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100 MB
            converter_type: "marker".to_string(),
            marker_command: "marker_single".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            temp_dir: lookup("TEMP_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.temp_dir),

            host: lookup("HOST").unwrap_or(default.host),

            port: lookup("MARKER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            torch_device: lookup("TORCH_DEVICE").unwrap_or(default.torch_device),

            max_file_size: lookup("MAX_FILE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            converter_type: lookup("CONVERTER_TYPE").unwrap_or(default.converter_type),

            marker_command: lookup("MARKER_COMMAND").unwrap_or(default.marker_command),
        }
    }

    /// Create config for development and tests (engine disabled, custom staging dir)
    pub fn development(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            host: "127.0.0.1".to_string(),
            converter_type: "disabled".to_string(),
            ..Self::default()
        }
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
