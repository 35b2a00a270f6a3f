use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageLog {
    pub latency_ms: u64,
    pub llm_calls: u32,
    pub llm_input_tokens: u32,
    pub llm_output_tokens: u32,
    pub llm_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub timestamp: String,
    pub domain: String,
    pub community: String,
    pub questions: Vec<String>,
    pub threads: u32,
    pub missing_summaries: u32,
    pub skipped_batches: u32,
    pub fetch: StageLog,
    pub summarize: StageLog,
    pub synthesize: StageLog,
    pub report_issues: Vec<String>,
    pub total_latency_ms: u64,
    pub report_chars: u32,
}

impl RunLog {
    pub fn total_tokens(&self) -> u32 {
        [&self.summarize, &self.synthesize]
            .iter()
            .map(|s| s.llm_input_tokens + s.llm_output_tokens)
            .sum()
    }

    /// Actual cost in USD as reported by the LLM API, when it reports one.
    pub fn cost(&self) -> f64 {
        self.summarize.llm_cost + self.synthesize.llm_cost
    }

    pub fn summary(&self) -> String {
        format!(
            "Threads: {} | Batches: {} | Total latency: {:.1}s | Tokens used by LLM: {} | Cost: ${:.4}",
            self.threads,
            self.summarize.llm_calls,
            self.total_latency_ms as f64 / 1000.0,
            self.total_tokens(),
            self.cost(),
        )
    }
}

pub const RUNS_FILE: &str = "runs.jsonl";

/// Appends one JSON line per completed run to `{dir}/runs.jsonl`.
pub struct RunLogger {
    path: PathBuf,
}

impl RunLogger {
    pub fn new(dir: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir))?;
        Ok(Self {
            path: Path::new(dir).join(RUNS_FILE),
        })
    }

    pub fn write(&self, run_log: &RunLog) -> Result<()> {
        let mut line = serde_json::to_vec(run_log).context("Failed to serialize run log")?;
        line.push(b'\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&line))
            .with_context(|| format!("Failed to append run log to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_log() -> RunLog {
        RunLog {
            id: "run-1".into(),
            timestamp: "2024-05-01T00:00:00Z".into(),
            domain: "klaviyo".into(),
            community: "klaviyo".into(),
            questions: vec!["q".into()],
            threads: 12,
            missing_summaries: 0,
            skipped_batches: 0,
            fetch: StageLog::default(),
            summarize: StageLog {
                latency_ms: 1000,
                llm_calls: 2,
                llm_input_tokens: 200,
                llm_output_tokens: 40,
                llm_cost: 0.002,
            },
            synthesize: StageLog {
                latency_ms: 500,
                llm_calls: 1,
                llm_input_tokens: 100,
                llm_output_tokens: 20,
                llm_cost: 0.001,
            },
            report_issues: vec![],
            total_latency_ms: 2500,
            report_chars: 42,
        }
    }

    #[test]
    fn summary_totals_llm_usage() {
        let log = run_log();
        assert_eq!(log.total_tokens(), 360);
        assert_eq!(
            log.summary(),
            "Threads: 12 | Batches: 2 | Total latency: 2.5s | Tokens used by LLM: 360 | Cost: $0.0030"
        );
    }

    #[test]
    fn runs_are_appended_as_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let logger = RunLogger::new(dir.path().to_str().unwrap()).unwrap();
        logger.write(&run_log()).unwrap();
        logger.write(&run_log()).unwrap();

        let contents = fs::read_to_string(dir.path().join(RUNS_FILE)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: RunLog = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.threads, 12);
    }
}
