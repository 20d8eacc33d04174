//! Subcommands of the `mcpod` binary.

use clap::{Args, Subcommand, ValueEnum};

use mcpod_core::{
    CatalogEntry, DEFAULT_GATEWAY_PORT, McpServerType, RuntimeSettings, WorkloadTemplate,
};
use mcpod_runtime::Launcher;

use crate::parser::parse_key_value;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve(ServeArgs),

    /// Manage catalog definitions
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// Add or replace a catalog entry
    Add(CatalogAddArgs),

    /// List catalog entries
    List,
}

/// How pods are launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LauncherKind {
    /// `docker run -i` per pod
    Docker,
    /// Plain child processes (development)
    Direct,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "MCPOD_PORT", default_value_t = DEFAULT_GATEWAY_PORT)]
    pub port: u16,

    /// How pods are launched
    #[arg(long, env = "MCPOD_LAUNCHER", value_enum, default_value_t = LauncherKind::Docker)]
    pub launcher: LauncherKind,

    /// Docker CLI used by the docker launcher
    #[arg(long = "docker-bin", env = "MCPOD_DOCKER_BIN", default_value = "docker")]
    pub docker_bin: String,

    /// Allowed CORS origin (repeatable); all origins when absent
    #[arg(
        long = "allowed-origin",
        env = "MCPOD_ALLOWED_ORIGINS",
        value_delimiter = ','
    )]
    pub allowed_origins: Vec<String>,

    /// Seconds to wait for a new pod to become addressable
    #[arg(long, env = "MCPOD_PROVISION_TIMEOUT_SECS")]
    pub provision_timeout_secs: Option<u64>,

    /// Milliseconds to wait before discovering tools on a new pod
    #[arg(long, env = "MCPOD_DISCOVERY_GRACE_MS")]
    pub discovery_grace_ms: Option<u64>,

    /// Attempts per discovery step
    #[arg(long, env = "MCPOD_DISCOVERY_ATTEMPTS")]
    pub discovery_attempts: Option<u32>,

    /// Seconds a proxied exchange may wait for pod output
    #[arg(long, env = "MCPOD_PROXY_IDLE_TIMEOUT_SECS")]
    pub proxy_idle_timeout_secs: Option<u64>,

    /// Seconds after which a pending installation counts as interrupted at startup
    #[arg(long, env = "MCPOD_STALE_PENDING_AFTER_SECS")]
    pub stale_pending_after_secs: Option<u64>,

    /// Seconds between pod health checks
    #[arg(long, env = "MCPOD_HEALTH_INTERVAL_SECS")]
    pub health_interval_secs: Option<u64>,

    /// Log lines returned when the caller asks for none
    #[arg(long, env = "MCPOD_DEFAULT_LOG_LINES")]
    pub default_log_lines: Option<usize>,
}

impl ServeArgs {
    pub fn launcher(&self) -> Launcher {
        match self.launcher {
            LauncherKind::Docker => Launcher::Docker {
                binary: self.docker_bin.clone(),
            },
            LauncherKind::Direct => Launcher::Direct,
        }
    }

    /// Defaults with every given override applied.
    pub fn settings(&self) -> RuntimeSettings {
        let defaults = RuntimeSettings::default();
        RuntimeSettings {
            provision_timeout_secs: self
                .provision_timeout_secs
                .unwrap_or(defaults.provision_timeout_secs),
            discovery_grace_ms: self
                .discovery_grace_ms
                .unwrap_or(defaults.discovery_grace_ms),
            discovery_attempts: self
                .discovery_attempts
                .unwrap_or(defaults.discovery_attempts),
            proxy_idle_timeout_secs: self
                .proxy_idle_timeout_secs
                .unwrap_or(defaults.proxy_idle_timeout_secs),
            stale_pending_after_secs: self
                .stale_pending_after_secs
                .unwrap_or(defaults.stale_pending_after_secs),
            health_interval_secs: self
                .health_interval_secs
                .unwrap_or(defaults.health_interval_secs),
            default_log_lines: self.default_log_lines.unwrap_or(defaults.default_log_lines),
            ..defaults
        }
    }
}

#[derive(Args)]
pub struct CatalogAddArgs {
    /// Catalog id referenced by install requests
    pub id: String,

    /// Display name
    pub name: String,

    /// Container image (local entries)
    #[arg(long)]
    pub image: Option<String>,

    /// Entrypoint override
    #[arg(long)]
    pub command: Option<String>,

    /// Argument after the entrypoint (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Environment baked into the definition, KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    #[arg(long)]
    pub description: Option<String>,

    /// The server runs elsewhere; no pod is managed
    #[arg(long)]
    pub remote: bool,
}

impl CatalogAddArgs {
    pub fn into_entry(self) -> CatalogEntry {
        let (server_type, workload) = if self.remote {
            (McpServerType::Remote, None)
        } else {
            let workload = WorkloadTemplate {
                image: self.image.unwrap_or_default(),
                command: self.command,
                args: self.args,
                env: self.env.into_iter().collect(),
            };
            (McpServerType::Local, Some(workload))
        };

        CatalogEntry {
            id: self.id,
            name: self.name,
            description: self.description,
            server_type,
            workload,
        }
    }
}
