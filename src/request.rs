use thiserror::Error;
use tracing::warn;

pub const MIN_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 200;
pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_QUESTIONS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please specify a subreddit (no default community for domain '{domain}')")]
    MissingCommunity { domain: String },

    #[error("enter at least one research question")]
    NoQuestions,

    #[error("thread limit {limit} is outside {min}..={max}")]
    LimitOutOfRange { limit: usize, min: usize, max: usize },
}

/// Community suggested for a genre label when none is given.
pub fn default_community(domain: &str) -> Option<&'static str> {
    match domain {
        "horror" => Some("horror"),
        "sci-fi" => Some("scifi"),
        "rom-com" => Some("romcom"),
        "superhero" => Some("marvelstudios"),
        "documentary" => Some("documentaries"),
        "animation" => Some("animation"),
        "crime" => Some("TrueFilm"),
        "thriller" => Some("Thrillers"),
        _ => None,
    }
}

/// Validated parameters of one research run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchRequest {
    pub domain: String,
    pub community: String,
    pub limit: usize,
    pub questions: Vec<String>,
}

impl ResearchRequest {
    pub fn new<S: AsRef<str>>(
        domain: &str,
        community: Option<&str>,
        limit: usize,
        questions: impl IntoIterator<Item = S>,
    ) -> Result<Self, ValidationError> {
        let domain = domain.trim().to_lowercase();

        let community = community
            .map(|c| c.trim().trim_start_matches("r/").to_string())
            .filter(|c| !c.is_empty())
            .or_else(|| default_community(&domain).map(String::from))
            .ok_or_else(|| ValidationError::MissingCommunity {
                domain: domain.clone(),
            })?;

        let mut questions: Vec<String> = questions
            .into_iter()
            .map(|q| q.as_ref().trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if questions.is_empty() {
            return Err(ValidationError::NoQuestions);
        }
        if questions.len() > MAX_QUESTIONS {
            warn!(
                given = questions.len(),
                kept = MAX_QUESTIONS,
                "too many research questions, keeping the first ones"
            );
            questions.truncate(MAX_QUESTIONS);
        }

        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            return Err(ValidationError::LimitOutOfRange {
                limit,
                min: MIN_LIMIT,
                max: MAX_LIMIT,
            });
        }

        Ok(Self {
            domain,
            community,
            limit,
            questions,
        })
    }
}

/// One question per non-blank line.
pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
