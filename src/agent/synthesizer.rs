use anyhow::Result;
use tracing::{info, warn};

use super::report_check::{check_report, ReportIssue, ACTION_ITEM_COUNT};
use crate::llm::{ChatMessage, LlmClient, LlmResponse};
use crate::thread::{truncate_chars, Thread};

pub const CORPUS_CHAR_LIMIT: usize = 15_000;

pub struct Synthesizer {
    llm: LlmClient,
    model: String,
    repair_attempts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub report: String,
    pub issues: Vec<ReportIssue>,
    pub calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl Synthesis {
    fn record(&mut self, response: &LlmResponse) {
        self.calls += 1;
        self.input_tokens += response.input_tokens;
        self.output_tokens += response.output_tokens;
        self.cost += response.cost;
    }
}

impl Synthesizer {
    pub fn new(llm: LlmClient, model: String) -> Self {
        Self {
            llm,
            model,
            repair_attempts: 0,
        }
    }

    pub fn with_repair_attempts(mut self, attempts: u32) -> Self {
        self.repair_attempts = attempts;
        self
    }

    /// Writes the markdown report. The model's answer is returned verbatim;
    /// structural problems are reported in `issues` and, when repair attempts
    /// are configured, sent back to the model for another try.
    pub async fn synthesize(
        &self,
        domain: &str,
        threads: &[Thread],
        questions: &[String],
    ) -> Result<Synthesis> {
        let corpus = build_corpus(threads);
        info!(
            threads = threads.len(),
            corpus_chars = corpus.chars().count(),
            questions = questions.len(),
            "crafting report"
        );

        let mut messages = vec![
            ChatMessage::system(system_prompt(domain)),
            ChatMessage::assistant(format!("CORPUS ({} threads):\n{}", threads.len(), corpus)),
            ChatMessage::user(question_block(questions)),
        ];

        let response = self.llm.chat(&self.model, &messages).await?;
        let mut synthesis = Synthesis::default();
        synthesis.record(&response);
        synthesis.report = response.text;
        synthesis.issues = check_report(&synthesis.report, questions.len());

        for attempt in 1..=self.repair_attempts {
            if synthesis.issues.is_empty() {
                break;
            }
            warn!(attempt, issues = synthesis.issues.len(), "report structure off, asking for a revision");

            messages.push(ChatMessage::assistant(synthesis.report.clone()));
            messages.push(ChatMessage::user(repair_instructions(&synthesis.issues)));

            let response = self.llm.chat(&self.model, &messages).await?;
            synthesis.record(&response);
            synthesis.report = response.text;
            synthesis.issues = check_report(&synthesis.report, questions.len());
        }

        for issue in &synthesis.issues {
            warn!(%issue, "report structure");
        }

        Ok(synthesis)
    }
}

/// Title, gist and link of every thread, cut to the first
/// `CORPUS_CHAR_LIMIT` characters.
pub fn build_corpus(threads: &[Thread]) -> String {
    let joined = threads
        .iter()
        .map(|t| format!("{} – {} [URL]({})", t.title, t.gist(), t.url))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, CORPUS_CHAR_LIMIT).to_string()
}

fn question_block(questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("Q{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_prompt(domain: &str) -> String {
    format!(
        "You are an analyst helping a professional understand the **{domain}** space. \
You have mined Reddit audience discussions; the corpus follows as title – gist [URL](link) entries.\n\
First, give a one-paragraph snapshot of overall audience sentiment for this community.\n\
Then answer each research question in its own subsection (a markdown heading per question, at most 2 paragraphs each), \
calling out any first principles the reader should know and adding citations in [Title](URL) form right after every key evidence point.\n\
Finish with a bold **list of ACTIONABLE INSIGHTS** containing exactly {count} points.",
        domain = title_case(domain),
        count = ACTION_ITEM_COUNT,
    )
}

fn repair_instructions(issues: &[ReportIssue]) -> String {
    let list = issues
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Your report does not follow the required structure:\n{}\nRewrite the full report fixing these problems.",
        list
    )
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}
