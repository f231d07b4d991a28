use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "code-service", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
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
    pub engine: EngineConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    pub problems: Vec<ProblemConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Connection settings for the remote execution engine (a Judge0-compatible
/// batch API).
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    /// Upper bound in seconds for one blocking batch call
    pub wait_timeout: Option<u64>,
}

#[derive(Deserialize, Debug)]
pub struct JudgeConfig {
    /// Number of concurrent worker tasks pulling from the job queue
    #[serde(default = "default_concurrency")]
    pub concurrency: u8,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> u8 {
    5
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    pub id: u32,
    pub name: String,
    pub cases: Vec<TestCaseConfig>,
}

/// One (input, expected output) pair. Case order in the config is the order
/// the judge runs them in.
#[derive(Deserialize, Debug, Clone)]
pub struct TestCaseConfig {
    pub input: String,
    pub expected_output: String,
}
