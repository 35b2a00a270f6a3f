pub mod report_check;
pub mod summarizer;
pub mod synthesizer;

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::info;

use crate::auth::Authorization;
use crate::config::Config;
use crate::forum::{RedditClient, RedditCredentials};
use crate::instrumentation::{RunLog, RunLogger, StageLog, Stopwatch};
use crate::llm::LlmClient;
use crate::request::ResearchRequest;
use crate::thread::{truncate_chars, Thread};

use report_check::ReportIssue;
use summarizer::Summarizer;
use synthesizer::Synthesizer;

pub struct ResearchAgent {
    forum: RedditClient,
    summarizer: Summarizer,
    synthesizer: Synthesizer,
    logger: RunLogger,
}

/// Everything one completed run produced.
#[derive(Debug)]
pub struct ResearchRun {
    pub threads: Vec<Thread>,
    pub report: String,
    pub issues: Vec<ReportIssue>,
    pub run_log: RunLog,
}

impl ResearchAgent {
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let llm = LlmClient::new(&config.llm_api_key, &config.llm_base_url, timeout)?
            .with_max_completion_tokens(config.max_completion_tokens);
        let forum = RedditClient::new(
            RedditCredentials {
                client_id: config.reddit_client_id.clone(),
                client_secret: config.reddit_client_secret.clone(),
                user_agent: config.reddit_user_agent.clone(),
            },
            &config.reddit_auth_url,
            &config.reddit_api_base,
            timeout,
        )?;
        let logger = RunLogger::new(&config.log_dir)?;

        Ok(Self {
            forum,
            summarizer: Summarizer::new(llm.clone(), config.summarizer_model.clone())
                .with_batch_size(config.batch_size)
                .with_cooldown(Duration::from_millis(config.batch_cooldown_ms))
                .skip_malformed_batches(config.skip_malformed_batches),
            synthesizer: Synthesizer::new(llm, config.synthesizer_model.clone())
                .with_repair_attempts(config.report_repair_attempts),
            logger,
        })
    }

    /// Fetch, summarize and synthesize, strictly in that order. Any stage
    /// failure ends the run.
    pub async fn run(
        &self,
        _authorization: &Authorization,
        request: &ResearchRequest,
        verbose: bool,
    ) -> Result<ResearchRun> {
        let stopwatch = Stopwatch::start();
        let run_start = Instant::now();

        // Step 1: Fetch threads + comments
        let fetch_start = Instant::now();
        let mut fetched = 0;
        let mut threads = self
            .forum
            .fetch(&request.community, request.limit, |thread| {
                fetched += 1;
                if verbose {
                    eprintln!(
                        "[fetch {}/{}] {} ⏱ {}",
                        fetched,
                        request.limit,
                        truncate_chars(&thread.title, 80),
                        stopwatch.display()
                    );
                }
            })
            .await
            .with_context(|| format!("Failed to fetch threads from r/{}", request.community))?;
        let fetch = StageLog {
            latency_ms: fetch_start.elapsed().as_millis() as u64,
            ..Default::default()
        };
        info!(
            community = %request.community,
            threads = threads.len(),
            elapsed = %stopwatch.display(),
            "fetched threads"
        );

        // Step 2: Summarise in batches
        let summarize_start = Instant::now();
        let stats = self
            .summarizer
            .summarize(&mut threads, |progress| {
                if verbose {
                    eprintln!(
                        "[summarise] {:.0}% ({}/{}) ⏱ {}",
                        progress.fraction() * 100.0,
                        progress.done,
                        progress.total,
                        stopwatch.display()
                    );
                }
            })
            .await?;
        let summarize = StageLog {
            latency_ms: summarize_start.elapsed().as_millis() as u64,
            llm_calls: stats.batches as u32,
            llm_input_tokens: stats.input_tokens,
            llm_output_tokens: stats.output_tokens,
            llm_cost: stats.cost,
        };
        info!(
            threads = threads.len(),
            community = %request.community,
            elapsed = %stopwatch.display(),
            "summarised threads"
        );

        // Step 3: Synthesize the report
        let synth_start = Instant::now();
        let synthesis = self
            .synthesizer
            .synthesize(&request.domain, &threads, &request.questions)
            .await
            .context("Failed to synthesize report")?;
        let synthesize = StageLog {
            latency_ms: synth_start.elapsed().as_millis() as u64,
            llm_calls: synthesis.calls,
            llm_input_tokens: synthesis.input_tokens,
            llm_output_tokens: synthesis.output_tokens,
            llm_cost: synthesis.cost,
        };

        if verbose {
            eprintln!(
                "[synthesizer] Generated report in {}ms ⏱ {}",
                synthesize.latency_ms,
                stopwatch.display()
            );
        }

        let run_log = RunLog {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            domain: request.domain.clone(),
            community: request.community.clone(),
            questions: request.questions.clone(),
            threads: threads.len() as u32,
            missing_summaries: stats.missing_summaries as u32,
            skipped_batches: stats.skipped_batches as u32,
            fetch,
            summarize,
            synthesize,
            report_issues: synthesis.issues.iter().map(|i| i.to_string()).collect(),
            total_latency_ms: run_start.elapsed().as_millis() as u64,
            report_chars: synthesis.report.chars().count() as u32,
        };

        self.logger.write(&run_log)?;

        Ok(ResearchRun {
            threads,
            report: synthesis.report,
            issues: synthesis.issues,
            run_log,
        })
    }
}
