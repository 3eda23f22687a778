//! Load testing through llmperf.
//!
//! llmperf drives concurrent requests against the endpoint and writes a
//! `<name>_summary.json` file. This module runs it as a child process, computes
//! where that file lands and reads back the fields worth printing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::aws::Credentials;
use crate::errors::{EndpointError, EndpointResult};

/// llmperf entry point.
pub const LLMPERF_SCRIPT: &str = "token_benchmark_ray.py";

/// Benchmark settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Path to the llmperf checkout.
    pub llmperf_dir: PathBuf,
    /// Python interpreter; looked up on `PATH` when unset.
    pub python: Option<String>,
    /// Concurrent requests.
    pub concurrency: u32,
    /// Requests to complete before stopping.
    pub max_requests: u32,
    /// Overall timeout in seconds.
    pub timeout_secs: u64,
    /// Results directory, relative to the llmperf checkout unless absolute.
    pub results_dir: PathBuf,
    /// Mean prompt length in tokens.
    pub mean_input_tokens: u32,
    /// Prompt length standard deviation.
    pub stddev_input_tokens: u32,
    /// Mean generation length in tokens.
    pub mean_output_tokens: u32,
    /// Generation length standard deviation.
    pub stddev_output_tokens: u32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            llmperf_dir: PathBuf::from("llmperf"),
            python: None,
            concurrency: 5,
            max_requests: 100,
            timeout_secs: 600,
            results_dir: PathBuf::from("results"),
            mean_input_tokens: 550,
            stddev_input_tokens: 150,
            mean_output_tokens: 150,
            stddev_output_tokens: 10,
        }
    }
}

/// A single benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkRequest {
    /// Endpoint name.
    pub target: String,
    /// Concurrent requests.
    pub concurrency: u32,
    /// Requests to complete before stopping.
    pub max_requests: u32,
    /// Overall timeout in seconds.
    pub timeout_secs: u64,
    /// Results directory.
    pub results_dir: PathBuf,
    /// Mean prompt length in tokens.
    pub mean_input_tokens: u32,
    /// Prompt length standard deviation.
    pub stddev_input_tokens: u32,
    /// Mean generation length in tokens.
    pub mean_output_tokens: u32,
    /// Generation length standard deviation.
    pub stddev_output_tokens: u32,
}

impl BenchmarkRequest {
    /// Build a request for a target from configuration.
    pub fn new(target: impl Into<String>, config: &BenchmarkConfig) -> Self {
        Self {
            target: target.into(),
            concurrency: config.concurrency,
            max_requests: config.max_requests,
            timeout_secs: config.timeout_secs,
            results_dir: config.results_dir.clone(),
            mean_input_tokens: config.mean_input_tokens,
            stddev_input_tokens: config.stddev_input_tokens,
            mean_output_tokens: config.mean_output_tokens,
            stddev_output_tokens: config.stddev_output_tokens,
        }
    }

    /// File name llmperf gives the summary of this run.
    ///
    /// llmperf joins model and token means with `_`, replaces every run of
    /// characters outside `[A-Za-z0-9_-]` with `-` and collapses repeated `-`.
    pub fn summary_file_name(&self) -> String {
        static INVALID: OnceLock<Regex> = OnceLock::new();
        static DASHES: OnceLock<Regex> = OnceLock::new();
        let invalid = INVALID.get_or_init(|| Regex::new(r"[^\w-]+").expect("valid regex"));
        let dashes = DASHES.get_or_init(|| Regex::new(r"-{2,}").expect("valid regex"));

        let raw = format!(
            "{}_{}_{}",
            self.target, self.mean_input_tokens, self.mean_output_tokens
        );
        let name = invalid.replace_all(&raw, "-");
        let name = dashes.replace_all(&name, "-");
        format!("{name}_summary.json")
    }

    /// Command-line arguments for `token_benchmark_ray.py`.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--model".to_string(),
            self.target.clone(),
            "--llm-api".to_string(),
            "sagemaker".to_string(),
            "--max-num-completed-requests".to_string(),
            self.max_requests.to_string(),
            "--timeout".to_string(),
            self.timeout_secs.to_string(),
            "--num-concurrent-requests".to_string(),
            self.concurrency.to_string(),
            "--results-dir".to_string(),
            self.results_dir.display().to_string(),
            "--mean-input-tokens".to_string(),
            self.mean_input_tokens.to_string(),
            "--stddev-input-tokens".to_string(),
            self.stddev_input_tokens.to_string(),
            "--mean-output-tokens".to_string(),
            self.mean_output_tokens.to_string(),
            "--stddev-output-tokens".to_string(),
            self.stddev_output_tokens.to_string(),
        ]
    }
}

/// Summary fields read from llmperf's results file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BenchmarkSummary {
    /// Concurrency the run used.
    #[serde(default)]
    pub num_concurrent_requests: Option<u32>,
    /// Mean prompt length in tokens.
    pub mean_input_tokens: f64,
    /// Mean generation length in tokens.
    pub mean_output_tokens: f64,
    /// Mean time to first token in seconds.
    pub results_ttft_s_mean: f64,
    /// Mean output throughput in tokens per second.
    #[serde(default)]
    pub results_mean_output_throughput_token_per_s: Option<f64>,
    /// Mean inter-token latency in seconds.
    #[serde(default)]
    pub results_inter_token_latency_s_mean: Option<f64>,
}

impl BenchmarkSummary {
    /// Read a summary file.
    ///
    /// # Errors
    /// Returns [`EndpointError::MissingSummary`] when the file does not exist
    /// and [`EndpointError::Serialization`] when required fields are missing.
    pub fn from_path(path: &Path) -> EndpointResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EndpointError::MissingSummary(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(concurrency) = self.num_concurrent_requests {
            writeln!(f, "Concurrent requests: {concurrency}")?;
        }
        writeln!(f, "Avg. Input token length: {}", self.mean_input_tokens)?;
        writeln!(f, "Avg. Output token length: {}", self.mean_output_tokens)?;
        writeln!(
            f,
            "Avg. First-Time-To-Token: {:.2}ms",
            self.results_ttft_s_mean * 1000.0
        )?;
        if let Some(throughput) = self.results_mean_output_throughput_token_per_s {
            writeln!(f, "Avg. Throughput: {throughput:.2} tokens/sec")?;
        }
        if let Some(latency) = self.results_inter_token_latency_s_mean {
            writeln!(f, "Avg. Latency: {:.2}ms/token", latency * 1000.0)?;
        }
        Ok(())
    }
}

/// Something that can load-test an endpoint.
#[async_trait]
pub trait BenchmarkRunner: Send + Sync {
    /// Run a benchmark and return its summary.
    async fn run(&self, request: &BenchmarkRequest) -> EndpointResult<BenchmarkSummary>;
}

/// Runs llmperf's `token_benchmark_ray.py`.
#[derive(Debug, Clone)]
pub struct LlmPerf {
    /// Interpreter to launch.
    program: PathBuf,
    /// Script path, relative to `dir`.
    script: String,
    /// llmperf checkout, used as working directory.
    dir: PathBuf,
    /// Extra environment for the child.
    env: Vec<(String, String)>,
}

impl LlmPerf {
    /// Create a runner for an llmperf checkout.
    ///
    /// # Errors
    /// Returns [`EndpointError::Config`] when no Python interpreter is found.
    pub fn new(config: &BenchmarkConfig) -> EndpointResult<Self> {
        let program = match config.python.as_deref() {
            Some(python) => PathBuf::from(python),
            None => which::which("python3")
                .or_else(|_| which::which("python"))
                .map_err(|_| {
                    EndpointError::Config("no python interpreter found on PATH".to_string())
                })?,
        };

        Ok(Self {
            program,
            script: LLMPERF_SCRIPT.to_string(),
            dir: config.llmperf_dir.clone(),
            env: vec![("MESSAGES_API".to_string(), "true".to_string())],
        })
    }

    /// Use a different program and script.
    #[must_use]
    pub fn with_command(mut self, program: impl Into<PathBuf>, script: impl Into<String>) -> Self {
        self.program = program.into();
        self.script = script.into();
        self
    }

    /// Hand the region and credentials to the child.
    #[must_use]
    pub fn with_aws(mut self, region: &str, credentials: &Credentials) -> Self {
        self.env.push(("AWS_REGION".to_string(), region.to_string()));
        self.env.push((
            "AWS_ACCESS_KEY_ID".to_string(),
            credentials.access_key_id.clone(),
        ));
        self.env.push((
            "AWS_SECRET_ACCESS_KEY".to_string(),
            credentials.secret_access_key.clone(),
        ));
        if let Some(token) = &credentials.session_token {
            self.env
                .push(("AWS_SESSION_TOKEN".to_string(), token.clone()));
        }
        self
    }

    /// Path the summary of a run will be written to.
    pub fn summary_path(&self, request: &BenchmarkRequest) -> PathBuf {
        self.dir
            .join(&request.results_dir)
            .join(request.summary_file_name())
    }
}

#[async_trait]
impl BenchmarkRunner for LlmPerf {
    async fn run(&self, request: &BenchmarkRequest) -> EndpointResult<BenchmarkSummary> {
        let args = request.args();
        info!(
            target = %request.target,
            concurrency = request.concurrency,
            max_requests = request.max_requests,
            "Running llmperf"
        );
        debug!(program = %self.program.display(), args = ?args, "llmperf command");

        let output = Command::new(&self.program)
            .arg(&self.script)
            .args(&args)
            .current_dir(&self.dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            warn!(status = %output.status, "llmperf exited unsuccessfully");
            return Err(EndpointError::Benchmark(format!(
                "{}: {}",
                output.status,
                tail.join("\n")
            )));
        }

        let path = self.summary_path(request);
        debug!(path = %path.display(), "Reading llmperf summary");

        let mut summary = BenchmarkSummary::from_path(&path)?;
        summary
            .num_concurrent_requests
            .get_or_insert(request.concurrency);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str) -> BenchmarkRequest {
        BenchmarkRequest::new(target, &BenchmarkConfig::default())
    }

    #[test]
    fn test_renders_ttft_in_milliseconds() {
        let summary: BenchmarkSummary = serde_json::from_str(
            r#"{"mean_input_tokens": 550, "mean_output_tokens": 150, "results_ttft_s_mean": 1.30128}"#,
        )
        .unwrap();

        let rendered = summary.to_string();
        assert!(rendered.contains("Avg. Input token length: 550\n"));
        assert!(rendered.contains("Avg. Output token length: 150\n"));
        assert!(rendered.contains("Avg. First-Time-To-Token: 1301.28ms\n"));
        assert!(!rendered.contains("Throughput"));
    }

    #[test]
    fn test_renders_all_fields() {
        let summary = BenchmarkSummary {
            num_concurrent_requests: Some(5),
            mean_input_tokens: 550.0,
            mean_output_tokens: 150.0,
            results_ttft_s_mean: 1.30128,
            results_mean_output_throughput_token_per_s: Some(163.2289),
            results_inter_token_latency_s_mean: Some(0.038_219),
        };

        assert_eq!(
            summary.to_string(),
            "Concurrent requests: 5\n\
             Avg. Input token length: 550\n\
             Avg. Output token length: 150\n\
             Avg. First-Time-To-Token: 1301.28ms\n\
             Avg. Throughput: 163.23 tokens/sec\n\
             Avg. Latency: 38.22ms/token\n"
        );
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let err = serde_json::from_str::<BenchmarkSummary>(r#"{"mean_input_tokens": 550}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_summary_file_name_matches_llmperf() {
        assert_eq!(
            request("huggingface-pytorch-tgi-inference-2024-05-01-12-30-45-123")
                .summary_file_name(),
            "huggingface-pytorch-tgi-inference-2024-05-01-12-30-45-123_550_150_summary.json"
        );
        assert_eq!(
            request("meta-llama/Meta-Llama-3.1 8B").summary_file_name(),
            "meta-llama-Meta-Llama-3-1-8B_550_150_summary.json"
        );
        assert_eq!(
            request("a//--b").summary_file_name(),
            "a-b_550_150_summary.json"
        );
    }

    #[test]
    fn test_args_cover_tool_flags() {
        let args = request("my-endpoint").args();
        let flag = |name: &str| {
            let i = args.iter().position(|a| a == name).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(flag("--model"), "my-endpoint");
        assert_eq!(flag("--llm-api"), "sagemaker");
        assert_eq!(flag("--max-num-completed-requests"), "100");
        assert_eq!(flag("--timeout"), "600");
        assert_eq!(flag("--num-concurrent-requests"), "5");
        assert_eq!(flag("--results-dir"), "results");
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope_summary.json");
        assert!(matches!(
            BenchmarkSummary::from_path(&path),
            Err(EndpointError::MissingSummary(p)) if p == path
        ));
    }
}
