//! Command Line Interface (CLI) arguments.

use std::num::NonZeroUsize;

use clap::Parser;

/// Parse a `username:password` pair.
fn parse_user(user: &str) -> Result<(String, String), String> {
    match user.split_once(':') {
        Some((username, password)) if !username.is_empty() && !password.is_empty() => {
            Ok((username.to_string(), password.to_string()))
        }
        _ => Err(format!("expected <username>:<password>, got '{}'", user)),
    }
}

/// Parse a byte count with an optional unit, such as `512MiB` or `2GB`.
fn parse_bytes(size: &str) -> Result<usize, String> {
    let bytes = byte_unit::Byte::parse_str(size, true).map_err(|err| err.to_string())?;
    usize::try_from(bytes.as_u64()).map_err(|err| err.to_string())
}

/// Equipment statistics server command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "EQUIPSTAT_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "EQUIPSTAT_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "EQUIPSTAT_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/equipstat/certs/cert.pem",
        env = "EQUIPSTAT_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/equipstat/certs/key.pem",
        env = "EQUIPSTAT_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "EQUIPSTAT_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Number of most recent upload summaries to retain
    #[arg(long, default_value_t = crate::retention::DEFAULT_CAPACITY, env = "EQUIPSTAT_RETENTION_CAPACITY")]
    pub retention_capacity: NonZeroUsize,
    /// Directory of the database persisting upload summaries. Summaries are kept in memory only
    /// if not set.
    #[arg(long, env = "EQUIPSTAT_DATA_DIR")]
    pub data_dir: Option<String>,
    /// User allowed to log in, as <username>:<password>. May be repeated.
    #[arg(long = "user", env = "EQUIPSTAT_USERS", value_delimiter = ',', value_parser = parse_user)]
    pub users: Vec<(String, String)>,
    /// Lifetime of access tokens in seconds
    #[arg(long, default_value_t = 300, env = "EQUIPSTAT_ACCESS_TOKEN_TTL")]
    pub access_token_ttl: u64,
    /// Lifetime of refresh tokens in seconds
    #[arg(long, default_value_t = 86400, env = "EQUIPSTAT_REFRESH_TOKEN_TTL")]
    pub refresh_token_ttl: u64,
    /// Maximum size of an uploaded file, such as 16MiB
    #[arg(long, default_value = "16MiB", env = "EQUIPSTAT_MAX_UPLOAD_SIZE", value_parser = parse_bytes)]
    pub max_upload_size: usize,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "EQUIPSTAT_USE_RAYON")]
    pub use_rayon: bool,
    /// Optional limit on the number of uploads summarised concurrently.
    /// Defaults to one less than the number of CPUs.
    #[arg(long, env = "EQUIPSTAT_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Optional limit on the memory held by uploads being summarised, such as 1GiB.
    #[arg(long, env = "EQUIPSTAT_MEMORY_LIMIT", value_parser = parse_bytes)]
    pub memory_limit: Option<usize>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CommandLineArgs::try_parse_from(["equipstat"]).unwrap();
        assert_eq!("0.0.0.0", args.host);
        assert_eq!(8080, args.port);
        assert_eq!(5, args.retention_capacity.get());
        assert_eq!(16 * 1024 * 1024, args.max_upload_size);
        assert!(args.users.is_empty());
        assert!(args.data_dir.is_none());
        assert!(args.memory_limit.is_none());
    }

    #[test]
    fn users_and_limits() {
        let args = CommandLineArgs::try_parse_from([
            "equipstat",
            "--user",
            "operator:secret",
            "--user",
            "viewer:pa:ss",
            "--retention-capacity",
            "10",
            "--memory-limit",
            "1KiB",
        ])
        .unwrap();
        assert_eq!(
            vec![
                ("operator".to_string(), "secret".to_string()),
                ("viewer".to_string(), "pa:ss".to_string()),
            ],
            args.users
        );
        assert_eq!(10, args.retention_capacity.get());
        assert_eq!(Some(1024), args.memory_limit);
    }

    #[test]
    fn invalid_arguments() {
        assert!(CommandLineArgs::try_parse_from(["equipstat", "--user", "operator"]).is_err());
        assert!(CommandLineArgs::try_parse_from(["equipstat", "--user", ":secret"]).is_err());
        assert!(
            CommandLineArgs::try_parse_from(["equipstat", "--retention-capacity", "0"]).is_err()
        );
        assert!(
            CommandLineArgs::try_parse_from(["equipstat", "--max-upload-size", "lots"]).is_err()
        );
    }
}
