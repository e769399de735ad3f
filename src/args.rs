//! Command line argument parsing for egressgate.
//!
//! This module defines the CLI interface using [`clap`] for argument parsing.
//! Network placement and output verbosity come from the command line; policy
//! comes from environment variables (see [`crate::env_vars`]).
//!
//! # Example
//!
//! ```no_run
//! use egressgate::args::Args;
//! use clap::Parser;
//!
//! let args = Args::parse();
//! if let Err(e) = args.validate() {
//!     eprintln!("Configuration error: {}", e);
//!     std::process::exit(1);
//! }
//! ```

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

/// Command line arguments for egressgate.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(
    long_about = "Forward proxy that decides, per request, whether outbound traffic may leave the network\n\nExample usage:\n  egressgate --listen 8080\n  CLOUD_PLATFORM=AWS ENFORCE_ALLOWED_EGRESS_DOMAINS=true ALLOWED_EGRESS_DOMAINS='*.example.com' egressgate -l 3128 --json-logs"
)]
#[command(
    after_help = "Environment variables:\n  CLOUD_PLATFORM                  AWS or GOOGLE (selects the filter chain)\n  PROXY_TYPE                      STANDALONE, SHARED_VPC or TRANSIT\n  ENFORCE_ALLOWED_EGRESS_DOMAINS  true to enforce ALLOWED_EGRESS_DOMAINS\n  ALLOWED_EGRESS_DOMAINS          Comma-separated domains, '*' matches one label\n  ALLOWED_PROXY_ADDRESS           Only client address allowed besides 127.0.0.1\n  UPGRADE_HTTP_REQUESTS           true to send http:// requests over HTTPS\n  WEBHOOK_TARGET                  On-premises target for /proxy/ requests\n  ENABLE_METRICS_EXPORT           false or 0 to disable metrics export\n\nRun with --verbose to list every variable and its status."
)]
pub struct Args {
    /// Address to bind to
    #[arg(
        long,
        short = 'b',
        help = "Bind address for incoming proxy connections",
        value_name = "ADDRESS",
        default_value = "0.0.0.0"
    )]
    pub bind: String,

    /// Port to listen on for incoming requests
    #[arg(
        long,
        short = 'l',
        help = "Listen port for incoming proxy connections",
        value_name = "PORT",
        default_value_t = 8080
    )]
    pub listen: u16,

    /// Enable verbose output
    #[arg(
        long,
        short = 'v',
        help = "Show detailed configuration and startup information"
    )]
    pub verbose: bool,

    /// Enable quiet mode (minimal output)
    #[arg(
        long,
        short = 'q',
        help = "Suppress configuration output, show only essential messages",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output logs in JSON format (for structured logging)
    #[arg(long, help = "Output logs in JSON format for structured logging")]
    pub json_logs: bool,
}

impl Args {
    /// Validates the parsed command line arguments.
    ///
    /// - The listen port must be greater than 0
    /// - The bind address must be a valid IP address
    ///
    /// # Example
    ///
    /// ```
    /// use egressgate::args::Args;
    /// use clap::Parser;
    ///
    /// let args = Args::try_parse_from(["egressgate", "-l", "0"]).unwrap();
    /// assert!(args.validate().is_err());
    ///
    /// let args = Args::try_parse_from(["egressgate", "-l", "3128"]).unwrap();
    /// assert!(args.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        if self.listen == 0 {
            return Err("Listen port must be greater than 0".to_string());
        }

        self.bind_ip()?;
        Ok(())
    }

    /// Socket address to listen on.
    pub fn listen_addr(&self) -> Result<SocketAddr, String> {
        Ok(SocketAddr::new(self.bind_ip()?, self.listen))
    }

    fn bind_ip(&self) -> Result<IpAddr, String> {
        self.bind
            .parse()
            .map_err(|_| format!("Invalid bind address: '{}'", self.bind))
    }
}
