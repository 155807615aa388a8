//! Node monitor configuration.
//!
//! Options are read from a properties-style file (`key = value`, `#`
//! comments) passed as the first command-line argument. Anything left unset
//! falls back to values detected from the host.

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use darter_proto::ResourceVector;

use crate::resources::SystemResources;

/// Default port on which the node monitor serves intake.
pub const DEFAULT_NODE_MONITOR_PORT: u16 = 20501;

/// Well-known port on which schedulers serve `GetTask`.
pub const DEFAULT_GET_TASK_PORT: u16 = 20507;

/// Admission policy selected by `node_monitor.policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Fifo,
    Bounded,
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fifo" => Ok(PolicyKind::Fifo),
            "bounded" => Ok(PolicyKind::Bounded),
            other => bail!("unknown admission policy: {other} (expected fifo or bounded)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname advertised to schedulers for the `GetTask` callback.
    pub hostname: String,

    /// Port on which the node monitor serves intake.
    pub port: u16,

    /// Port on which schedulers serve `GetTask`.
    pub get_task_port: u16,

    /// Launcher pool size.
    pub cpu_cores: usize,

    /// Resource capacity of this worker.
    pub capacity: ResourceVector,

    pub policy: PolicyKind,

    /// Statically configured application backends (`appId=host:port`).
    pub app_backends: Vec<(String, SocketAddr)>,
}

impl Default for Config {
    fn default() -> Self {
        let system = SystemResources::measure();
        Self {
            hostname: "127.0.0.1".to_string(),
            port: DEFAULT_NODE_MONITOR_PORT,
            get_task_port: DEFAULT_GET_TASK_PORT,
            cpu_cores: system.cpu_cores.max(1) as usize,
            capacity: system.capacity(),
            policy: PolicyKind::Fifo,
            app_backends: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config = Self::default();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                bail!("config line {}: expected key = value", index + 1);
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "node_monitor.hostname" => config.hostname = value.to_string(),
                "node_monitor.port" => {
                    config.port = value
                        .parse()
                        .with_context(|| format!("invalid node_monitor.port: {value}"))?;
                }
                "get_task.port" => {
                    config.get_task_port = value
                        .parse()
                        .with_context(|| format!("invalid get_task.port: {value}"))?;
                }
                "node_monitor.cpu_cores" => {
                    let cores: usize = value
                        .parse()
                        .with_context(|| format!("invalid node_monitor.cpu_cores: {value}"))?;
                    if cores == 0 {
                        bail!("node_monitor.cpu_cores must be at least 1");
                    }
                    config.cpu_cores = cores;
                }
                "node_monitor.capacity.mem" => {
                    config.capacity.memory_bytes = value
                        .parse()
                        .with_context(|| format!("invalid node_monitor.capacity.mem: {value}"))?;
                }
                "node_monitor.capacity.cpu" => {
                    config.capacity.cpu_cores = value
                        .parse()
                        .with_context(|| format!("invalid node_monitor.capacity.cpu: {value}"))?;
                }
                "node_monitor.policy" => config.policy = value.parse()?,
                "node_monitor.app_backends" => {
                    config.app_backends = parse_app_backends(value)?;
                }
                other => bail!("unrecognized config option: {other}"),
            }
        }

        Ok(config)
    }
}

/// Parses `appA=host:port,appB=host:port` into the static backend registry.
fn parse_app_backends(value: &str) -> Result<Vec<(String, SocketAddr)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (app_id, addr) = entry
                .split_once('=')
                .with_context(|| format!("bad backend entry {entry}: expected appId=host:port"))?;
            let addr: SocketAddr = addr
                .trim()
                .parse()
                .with_context(|| format!("bad backend address for {app_id}: {addr}"))?;
            Ok((app_id.trim().to_string(), addr))
        })
        .collect()
}
