//! # CLI
//!
//! This module defines the command-line interface of `rpcdeck` using `clap`.
//!
//! It is responsible for parsing the startup arguments and turning them into the
//! [`ConnectionOptions`] the engine connects with.
use clap::Parser;
use rpcdeck_core::{ConnectionOptions, TlsOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rpcdeck", version, about = "Interactive dynamic gRPC shell")]
pub struct Cli {
    /// The server to connect to (e.g. localhost:50051 or http://localhost:50051).
    /// When omitted, the last successful connection is restored.
    #[arg(short, long)]
    pub address: Option<String>,

    /// Do not discover services through server reflection
    #[arg(long)]
    pub no_reflect: bool,

    /// Metadata attached to every call
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Connect over TLS
    #[arg(long)]
    pub tls: bool,

    /// PEM file with the CA certificate to trust (implies --tls)
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Server name to verify the certificate against (implies --tls)
    #[arg(long)]
    pub domain: Option<String>,

    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Directory holding the saved workspace. Defaults to the platform config directory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl Cli {
    /// Options for `address` with every transport setting given on the command line.
    pub fn connection_options(&self, address: impl Into<String>) -> ConnectionOptions {
        let tls = (self.tls || self.ca_cert.is_some() || self.domain.is_some()).then(|| {
            TlsOptions {
                domain_name: self.domain.clone(),
                ca_certificate: self.ca_cert.clone(),
            }
        });

        ConnectionOptions {
            address: address.into(),
            reflect: !self.no_reflect,
            tls,
            metadata: self.headers.clone(),
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}
