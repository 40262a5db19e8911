use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "soljudge", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Number of judge workers to spawn
    #[arg(long = "threads", short = 't', default_value_t = 4)]
    pub threads: u8,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub lessons: Vec<LessonConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SandboxConfig {
    /// Image with the Foundry toolchain preinstalled (fast path)
    pub fast_image: Option<String>,
    /// Generic base image that installs the toolchain at run time (slow path)
    pub slow_image: Option<String>,
    pub fast_timeout_secs: Option<u64>,
    pub slow_timeout_secs: Option<u64>,
    /// Host solc binary, used only by the degraded syntax-only tier
    pub solc_path: Option<PathBuf>,
    /// Parent directory for ephemeral build trees
    pub work_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LessonConfig {
    /// Every id that resolves to this lesson, aliases included
    pub ids: Vec<String>,
    pub reference_dir: String,
    pub reference_test_file: String,
    pub contract_name: String,
}
