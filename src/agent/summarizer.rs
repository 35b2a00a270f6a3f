use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{LlmClient, LlmResponse};
use crate::thread::{truncate_chars, Summary, Thread};

const SYSTEM_PROMPT: &str = r#"You are a research summarizer. You receive a JSON object mapping Reddit thread ids to the thread text (title, body and comments). Infer what redditors are saying in each thread.

For every id in the input, return an entry keyed by that same id with:
- "gist": a summary of about 50 words
- "insight1": the most useful takeaway
- "insight2": a second, different takeaway
- "sentiment": one of "positive", "neutral", "negative"

Respond with ONLY the JSON object. No other text."#;

pub const DEFAULT_BATCH_SIZE: usize = 6;
const BODY_CHARS: usize = 4000;
const COMMENT_CHARS: usize = 6000;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("summary batch {batch} is not a JSON object: {details}")]
    MalformedBatch {
        batch: usize,
        details: String,
        payload: String,
    },

    #[error(transparent)]
    Llm(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SummarizeStats {
    pub batches: usize,
    pub skipped_batches: usize,
    pub missing_summaries: usize,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl SummarizeStats {
    fn record(&mut self, response: &LlmResponse) {
        self.batches += 1;
        self.input_tokens += response.input_tokens;
        self.output_tokens += response.output_tokens;
        self.cost += response.cost;
    }
}

pub struct Summarizer {
    llm: LlmClient,
    model: String,
    batch_size: usize,
    cooldown: Duration,
    skip_malformed: bool,
}

impl Summarizer {
    pub fn new(llm: LlmClient, model: String) -> Self {
        Self {
            llm,
            model,
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown: Duration::from_millis(500),
            skip_malformed: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn skip_malformed_batches(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    /// Attaches a summary to every thread, one model call per batch.
    pub async fn summarize(
        &self,
        threads: &mut [Thread],
        mut on_progress: impl FnMut(BatchProgress),
    ) -> Result<SummarizeStats, SummarizeError> {
        let total = threads.len();
        let batch_count = total.div_ceil(self.batch_size);
        let mut stats = SummarizeStats::default();
        let mut done = 0;

        for (index, chunk) in threads.chunks_mut(self.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.cooldown).await;
            }

            info!(
                batch = index + 1,
                of = batch_count,
                first = truncate_chars(&chunk[0].title, 80),
                "summarising"
            );

            let payload = batch_payload(chunk);
            let response = self
                .llm
                .complete(&self.model, Some(SYSTEM_PROMPT), &payload)
                .await?;
            stats.record(&response);

            match parse_batch(&response.text) {
                Ok(entries) => stats.missing_summaries += attach(chunk, &entries),
                Err(details) if self.skip_malformed => {
                    warn!(batch = index + 1, %details, payload = %response.text, "skipping malformed batch");
                    for thread in chunk.iter_mut() {
                        thread.summary = Some(Summary::default());
                    }
                    stats.skipped_batches += 1;
                }
                Err(details) => {
                    return Err(SummarizeError::MalformedBatch {
                        batch: index + 1,
                        details,
                        payload: response.text,
                    })
                }
            }

            done += chunk.len();
            on_progress(BatchProgress { done, total });
        }

        info!(
            threads = total,
            batches = stats.batches,
            missing = stats.missing_summaries,
            "summarising complete"
        );
        Ok(stats)
    }
}

/// `{id: "title\n\nbody\n\nComments:\ncomments"}` with body and comments cut
/// to their character budgets.
pub fn batch_payload(chunk: &[Thread]) -> String {
    let entries: Map<String, Value> = chunk
        .iter()
        .map(|t| {
            let text = format!(
                "{}\n\n{}\n\nComments:\n{}",
                t.title,
                truncate_chars(&t.body, BODY_CHARS),
                truncate_chars(&t.comments, COMMENT_CHARS)
            );
            (t.id.clone(), Value::String(text))
        })
        .collect();
    Value::Object(entries).to_string()
}

fn parse_batch(text: &str) -> Result<Map<String, Value>, String> {
    // Models sometimes wrap the object in prose or a code fence.
    let json_str = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };

    match serde_json::from_str::<Value>(json_str) {
        Ok(Value::Object(entries)) => Ok(entries),
        Ok(other) => Err(format!("expected an object, got {}", type_name(&other))),
        Err(e) => Err(e.to_string()),
    }
}

/// Returns how many threads got the empty summary.
fn attach(chunk: &mut [Thread], entries: &Map<String, Value>) -> usize {
    let mut missing = 0;
    for thread in chunk.iter_mut() {
        let summary = match entries.get(&thread.id) {
            Some(value) => serde_json::from_value::<Summary>(value.clone()).unwrap_or_else(|e| {
                warn!(id = %thread.id, error = %e, "unusable summary entry");
                Summary::default()
            }),
            None => {
                warn!(id = %thread.id, "model returned no summary");
                Summary::default()
            }
        };
        if summary.is_empty() {
            missing += 1;
        }
        thread.summary = Some(summary);
    }
    missing
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::completion_body;
    use crate::thread::{sample_thread, Sentiment};
    use serde_json::json;

    fn threads(n: usize) -> Vec<Thread> {
        (0..n)
            .map(|i| sample_thread(&format!("t{}", i), &format!("Thread {}", i)))
            .collect()
    }

    fn summarizer(server: &mockito::Server) -> Summarizer {
        let url = format!("{}/v1/chat/completions", server.url());
        let llm = LlmClient::new("sk-test", &url, Duration::from_secs(5)).unwrap();
        Summarizer::new(llm, "o3".into()).with_cooldown(Duration::ZERO)
    }

    fn summaries_for(ids: impl Iterator<Item = String>) -> String {
        let entries: Map<String, Value> = ids
            .map(|id| {
                let entry = json!({
                    "gist": format!("gist of {}", id),
                    "insight1": "one",
                    "insight2": "two",
                    "sentiment": "positive"
                });
                (id, entry)
            })
            .collect();
        Value::Object(entries).to_string()
    }

    #[test]
    fn batches_preserve_order_and_count() {
        let all = threads(13);
        for size in 1..=14 {
            let rejoined: Vec<&str> = all
                .chunks(size)
                .flat_map(|c| c.iter().map(|t| t.id.as_str()))
                .collect();
            let original: Vec<&str> = all.iter().map(|t| t.id.as_str()).collect();
            assert_eq!(rejoined, original, "batch size {}", size);
        }
    }

    #[test]
    fn payload_truncates_body_and_comments() {
        let mut thread = sample_thread("abc", "A title");
        thread.body = "b".repeat(5000);
        thread.comments = "c".repeat(7000);

        let payload: Map<String, Value> =
            serde_json::from_str(&batch_payload(&[thread])).unwrap();
        let text = payload["abc"].as_str().unwrap();

        assert!(text.starts_with("A title\n\n"));
        assert_eq!(text.matches('b').count(), 4000);
        assert_eq!(text.matches('c').count(), 6000);
        assert!(text.contains("\n\nComments:\n"));
    }

    #[test]
    fn parse_batch_accepts_fenced_objects_and_rejects_arrays() {
        let fenced = "```json\n{\"a\": {\"gist\": \"g\"}}\n```";
        assert!(parse_batch(fenced).unwrap().contains_key("a"));
        assert!(parse_batch("[1, 2]").is_err());
        assert!(parse_batch("no json here").is_err());
    }

    #[tokio::test]
    async fn twelve_threads_in_batches_of_six_take_two_calls() {
        let mut server = mockito::Server::new_async().await;
        let mut all = threads(12);
        let body = summaries_for(all.iter().map(|t| t.id.clone()));
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body(&body))
            .expect(2)
            .create_async()
            .await;

        let mut fractions = Vec::new();
        let stats = summarizer(&server)
            .with_batch_size(6)
            .summarize(&mut all, |p| fractions.push(p.fraction()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fractions, vec![0.5, 1.0]);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.input_tokens, 200);
        assert!(all.iter().all(|t| t.gist() == format!("gist of {}", t.id)));
        assert_eq!(
            all[0].summary.as_ref().unwrap().sentiment,
            Some(Sentiment::Positive)
        );
    }

    #[tokio::test]
    async fn thread_missing_from_response_gets_empty_summary() {
        let mut server = mockito::Server::new_async().await;
        let mut all = threads(3);
        let body = summaries_for(["t0".to_string(), "t2".to_string()].into_iter());
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body(&body))
            .create_async()
            .await;

        let stats = summarizer(&server)
            .summarize(&mut all, |_| {})
            .await
            .unwrap();

        assert_eq!(stats.missing_summaries, 1);
        assert_eq!(all[1].summary, Some(Summary::default()));
        assert_eq!(
            serde_json::to_value(all[1].summary.as_ref().unwrap()).unwrap(),
            json!({})
        );
        assert_eq!(all[2].gist(), "gist of t2");
    }

    #[tokio::test]
    async fn malformed_batch_aborts_by_default() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body("Sorry, I cannot help with that."))
            .create_async()
            .await;

        let mut all = threads(2);
        let err = summarizer(&server)
            .summarize(&mut all, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, SummarizeError::MalformedBatch { batch: 1, .. }));
    }

    #[tokio::test]
    async fn malformed_batch_can_be_skipped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body("[\"not\", \"an\", \"object\"]"))
            .expect(2)
            .create_async()
            .await;

        let mut all = threads(4);
        let mut fractions = Vec::new();
        let stats = summarizer(&server)
            .with_batch_size(2)
            .skip_malformed_batches(true)
            .summarize(&mut all, |p| fractions.push(p.fraction()))
            .await
            .unwrap();

        assert_eq!(stats.skipped_batches, 2);
        assert_eq!(fractions, vec![0.5, 1.0]);
        assert!(all.iter().all(|t| t.summary == Some(Summary::default())));
    }

    #[tokio::test]
    async fn llm_failure_propagates() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let mut all = threads(1);
        let err = summarizer(&server)
            .summarize(&mut all, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::Llm(_)));
        assert!(all[0].summary.is_none());
    }
}
