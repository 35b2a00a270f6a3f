use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One fetched forum post with its flattened comment text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub body: String,
    pub comments: String,
    pub url: String,
    pub created: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl Thread {
    pub fn gist(&self) -> &str {
        self.summary.as_ref().map(|s| s.gist.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// Model-produced annotation for a thread. The default value is the empty
/// mapping a thread receives when the model returned nothing usable for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gist: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub insight1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub insight2: String,
    #[serde(
        default,
        deserialize_with = "lenient_sentiment",
        skip_serializing_if = "Option::is_none"
    )]
    pub sentiment: Option<Sentiment>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.gist.is_empty()
            && self.insight1.is_empty()
            && self.insight2.is_empty()
            && self.sentiment.is_none()
    }
}

// Models drift on the label ("Mixed", "POSITIVE", null); anything unrecognised
// is dropped rather than failing the whole entry.
fn lenient_sentiment<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Sentiment>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(Sentiment::parse))
}

/// Row of the "gists & insights" dump written after summarization.
#[derive(Debug, Serialize)]
pub struct GistRow<'a> {
    pub title: &'a str,
    #[serde(flatten)]
    pub summary: Summary,
    pub url: &'a str,
}

pub fn gist_rows(threads: &[Thread]) -> Vec<GistRow<'_>> {
    threads
        .iter()
        .map(|t| GistRow {
            title: &t.title,
            summary: t.summary.clone().unwrap_or_default(),
            url: &t.url,
        })
        .collect()
}

/// First `max_chars` characters of `s`, cut on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
pub(crate) fn sample_thread(id: &str, title: &str) -> Thread {
    Thread {
        id: id.to_string(),
        title: title.to_string(),
        body: String::new(),
        comments: String::new(),
        url: format!("https://example.com/{}", id),
        created: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        summary: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_serializes_as_empty_object() {
        let json = serde_json::to_string(&Summary::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn summary_tolerates_odd_sentiment_labels() {
        let s: Summary =
            serde_json::from_str(r#"{"gist":"g","sentiment":"POSITIVE"}"#).unwrap();
        assert_eq!(s.sentiment, Some(Sentiment::Positive));

        let s: Summary = serde_json::from_str(r#"{"gist":"g","sentiment":"mixed"}"#).unwrap();
        assert_eq!(s.sentiment, None);
        assert_eq!(s.gist, "g");

        let s: Summary = serde_json::from_str(r#"{"sentiment":null}"#).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn created_serializes_as_calendar_date() {
        let json = serde_json::to_value(sample_thread("abc", "t")).unwrap();
        assert_eq!(json["created"], "2024-05-01");
        assert!(json.get("summary").is_none());
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn gist_rows_flatten_summary() {
        let mut t = sample_thread("a1", "Title");
        t.summary = Some(Summary {
            gist: "short".into(),
            sentiment: Some(Sentiment::Negative),
            ..Default::default()
        });
        let rows = serde_json::to_value(gist_rows(&[t])).unwrap();
        assert_eq!(rows[0]["title"], "Title");
        assert_eq!(rows[0]["gist"], "short");
        assert_eq!(rows[0]["sentiment"], "negative");
        assert_eq!(rows[0]["url"], "https://example.com/a1");
    }
}
