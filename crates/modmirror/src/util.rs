//! Assorted utilities.

pub mod checksum;
pub mod ext;
pub mod file;
mod log_level;

pub use log_level::LogLevel;

/// Returns all environment variables beginning with a given prefix as a single newline-separated
/// string.
pub fn dump_env(prefix: &str) -> String {
    dump_env_lines(prefix).join("\n")
}

/// Returns all environment variables beginning with a given prefix as `KEY=value` strings.
pub fn dump_env_lines(prefix: &str) -> Vec<String> {
    std::env::vars()
        .filter_map(|(k, v)| {
            if k.starts_with(prefix) {
                Some(format!("{}={}", k, v))
            } else {
                None
            }
        })
        .collect::<Vec<String>>()
}
