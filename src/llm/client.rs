//! Chat-completions grading client
//!
//! Writing and speaking exercises have no single right answer, so they are
//! graded by an upstream chat-completions model against the exercise rubric.
//! The model is instructed to reply with a strict JSON object; anything else
//! is treated as an upstream failure, never as a zero score.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{KalikeError, Result};

/// Score a submission must reach to count as a qualifying activity
pub const PASSING_SCORE: i64 = 60;

#[derive(Debug, Clone)]
pub struct ModelClientConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

/// Grade returned by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelGrade {
    /// 0-100
    pub score: i64,
    pub feedback: String,
}

impl ModelGrade {
    pub fn is_passing(&self) -> bool {
        self.score >= PASSING_SCORE
    }
}

pub struct ModelClient {
    config: ModelClientConfig,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl ModelClient {
    pub fn new(config: ModelClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("kalike/1.0")
            .build()
            .unwrap_or_default();

        Self {
            config,
            http_client,
        }
    }

    /// Grade a free-form written answer against the exercise rubric
    pub async fn grade_writing(&self, prompt: &str, rubric: &str, answer: &str) -> Result<ModelGrade> {
        let system = "You grade Kannada language learning exercises. \
            Reply with ONLY a JSON object: {\"score\": <integer 0-100>, \"feedback\": \"<one or two sentences>\"}.";
        let user = format!(
            "Exercise prompt: {prompt}\nRubric: {rubric}\nLearner's written answer: {answer}"
        );
        self.grade(system, &user).await
    }

    /// Grade a transcribed spoken answer against the exercise rubric
    pub async fn grade_speaking(
        &self,
        prompt: &str,
        rubric: &str,
        transcript: &str,
    ) -> Result<ModelGrade> {
        let system = "You grade spoken Kannada exercises from transcripts. \
            Judge word choice and phrasing only, not audio quality. \
            Reply with ONLY a JSON object: {\"score\": <integer 0-100>, \"feedback\": \"<one or two sentences>\"}.";
        let user = format!(
            "Exercise prompt: {prompt}\nRubric: {rubric}\nTranscript of learner's answer: {transcript}"
        );
        self.grade(system, &user).await
    }

    async fn grade(&self, system: &str, user: &str) -> Result<ModelGrade> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut request = self.http_client.post(&self.config.api_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KalikeError::Upstream(format!("Grading model request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Grading model returned error status");
            return Err(KalikeError::Upstream(format!(
                "Grading model returned status {}",
                status
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| KalikeError::Upstream(format!("Grading model response unreadable: {}", e)))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| KalikeError::Upstream("Grading model returned no choices".to_string()))?;

        let grade = parse_grade(content)?;
        debug!(score = grade.score, "Model grade parsed");
        Ok(grade)
    }
}

/// Parse the model's reply into a grade.
///
/// Tolerates code fences around the JSON, since models add them despite
/// instructions. Scores are clamped to 0-100.
fn parse_grade(content: &str) -> Result<ModelGrade> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let grade: ModelGrade = serde_json::from_str(trimmed).map_err(|_| {
        KalikeError::Upstream(format!(
            "Grading model reply was not a grade object: {}",
            truncate_for_log(content)
        ))
    })?;

    Ok(ModelGrade {
        score: grade.score.clamp(0, 100),
        feedback: grade.feedback,
    })
}

fn truncate_for_log(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let grade = parse_grade(r#"{"score": 85, "feedback": "Good use of honorifics."}"#).unwrap();
        assert_eq!(grade.score, 85);
        assert!(grade.is_passing());
    }

    #[test]
    fn test_parse_fenced_json() {
        let grade =
            parse_grade("```json\n{\"score\": 40, \"feedback\": \"Verb endings need work.\"}\n```")
                .unwrap();
        assert_eq!(grade.score, 40);
        assert!(!grade.is_passing());
    }

    #[test]
    fn test_parse_clamps_out_of_range_scores() {
        let grade = parse_grade(r#"{"score": 140, "feedback": "ok"}"#).unwrap();
        assert_eq!(grade.score, 100);
        let grade = parse_grade(r#"{"score": -5, "feedback": "ok"}"#).unwrap();
        assert_eq!(grade.score, 0);
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_grade("The answer looks fine to me!").unwrap_err();
        assert!(matches!(err, KalikeError::Upstream(_)));
    }

    #[test]
    fn test_passing_boundary() {
        assert!(ModelGrade { score: PASSING_SCORE, feedback: String::new() }.is_passing());
        assert!(!ModelGrade { score: PASSING_SCORE - 1, feedback: String::new() }.is_passing());
    }
}
