//! Line-oriented `key=value` configuration with generated defaults.
//!
//! Unparsable or missing entries fall back to documented defaults, and a
//! missing file is regenerated with a commented template instead of failing
//! startup.

use log::{info, warn};
use shared::DEFAULT_PORT;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

const ADDRESS_KEY: &str = "Address";
const PORT_KEY: &str = "Port";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Local address the server binds to. Defaults to any.
    pub address: IpAddr,
    /// Port the server listens on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from `path`. A missing file triggers
    /// generation of a default one rather than a hard failure.
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            info!("no configuration at {}, generating defaults", path.display());
            Self::generate_default(path)?;
            return Ok(Self::default());
        }
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Writes the commented default configuration file.
    pub fn generate_default(path: &Path) -> io::Result<()> {
        fs::write(path, default_file_contents())
    }

    fn parse(contents: &str) -> Self {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("ignoring config line without '=': {}", line);
                continue;
            };
            let value = value.trim();

            match key.trim() {
                ADDRESS_KEY => match value.parse() {
                    Ok(address) => config.address = address,
                    Err(_) => warn!(
                        "unparsable {} '{}', using default {}",
                        ADDRESS_KEY, value, config.address
                    ),
                },
                PORT_KEY => match value.parse::<u16>() {
                    Ok(port) if port > 0 => config.port = port,
                    _ => warn!(
                        "unparsable {} '{}', using default {}",
                        PORT_KEY, value, config.port
                    ),
                },
                other => warn!("unknown config key '{}'", other),
            }
        }

        config
    }
}

fn default_file_contents() -> String {
    format!(
        "# Default configuration file for the relay server\n\
         # Comment out lines with a '#' to prevent them from being read. Defaults will be used for missing values.\n\
         \n\
         # Local IP address and port that the server will run on. Defaults to any local address and port {port}.\n\
         # Only change these if you really have to.\n\
         #{address_key}=\n\
         {port_key}={port}\n",
        port = DEFAULT_PORT,
        address_key = ADDRESS_KEY,
        port_key = PORT_KEY,
    )
}
