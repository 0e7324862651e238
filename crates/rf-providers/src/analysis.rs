//! Analysis kinds, their typed results, and the prompts that produce them.

use std::fmt;

use rf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// The four analyses run over every transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Summary,
    ActionItems,
    KeyPoints,
    Sentiment,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Summary,
        AnalysisKind::ActionItems,
        AnalysisKind::KeyPoints,
        AnalysisKind::Sentiment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::ActionItems => "action_items",
            AnalysisKind::KeyPoints => "key_points",
            AnalysisKind::Sentiment => "sentiment",
        }
    }

    /// Prompt asking the model for this analysis as JSON.
    pub fn prompt(self, transcript: &str) -> String {
        let instructions = match self {
            AnalysisKind::Summary => {
                "Provide a concise summary of the following conversation or recording. \
                 Focus on the main topics discussed, key decisions made, and the overall \
                 purpose of the conversation. Keep it to 2-3 paragraphs.\n\
                 Respond with JSON: {\"summary\": string}"
            }
            AnalysisKind::ActionItems => {
                "Extract all action items, tasks and to-dos mentioned in the following \
                 conversation, in the order they come up. Use the [mm:ss] markers to give \
                 the time each one is mentioned, in milliseconds.\n\
                 Respond with JSON: {\"action_items\": [{\"text\": string, \"timestamp_ms\": integer}]}"
            }
            AnalysisKind::KeyPoints => {
                "Identify the 5-10 most important key points of the following conversation: \
                 main topics, decisions or conclusions, notable statements and critical \
                 information shared.\n\
                 Respond with JSON: {\"key_points\": [string]}"
            }
            AnalysisKind::Sentiment => {
                "Analyze the overall sentiment of the following conversation. The label is \
                 one of positive, neutral or negative; the score ranges from -1.0 (very \
                 negative) to 1.0 (very positive).\n\
                 Respond with JSON: {\"label\": string, \"score\": number}"
            }
        };
        format!("{instructions}\n\nTranscript:\n{transcript}")
    }

    /// Parse the model's JSON answer into the typed result for this kind.
    pub fn parse(self, text: &str) -> Result<AnalysisResult> {
        let body = strip_code_fence(text);
        let parsed = match self {
            AnalysisKind::Summary => serde_json::from_str::<SummaryBody>(body)
                .map(|b| AnalysisResult::Summary { text: b.summary }),
            AnalysisKind::ActionItems => serde_json::from_str::<ActionItemsBody>(body)
                .map(|b| AnalysisResult::ActionItems { items: b.action_items }),
            AnalysisKind::KeyPoints => serde_json::from_str::<KeyPointsBody>(body)
                .map(|b| AnalysisResult::KeyPoints { points: b.key_points }),
            AnalysisKind::Sentiment => {
                serde_json::from_str::<Sentiment>(body).map(AnalysisResult::Sentiment)
            }
        };
        // Malformed model output is retried like a 5xx.
        parsed.map_err(|e| {
            Error::provider("analysis", None, format!("unparseable {self} result: {e}"))
        })
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action item, in transcript order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub text: String,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

/// Overall conversation sentiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

/// Typed output of one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Summary { text: String },
    ActionItems { items: Vec<ActionItem> },
    KeyPoints { points: Vec<String> },
    Sentiment(Sentiment),
}

impl AnalysisResult {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisResult::Summary { .. } => AnalysisKind::Summary,
            AnalysisResult::ActionItems { .. } => AnalysisKind::ActionItems,
            AnalysisResult::KeyPoints { .. } => AnalysisKind::KeyPoints,
            AnalysisResult::Sentiment(_) => AnalysisKind::Sentiment,
        }
    }
}

#[derive(Deserialize)]
struct SummaryBody {
    summary: String,
}

#[derive(Deserialize)]
struct ActionItemsBody {
    action_items: Vec<ActionItem>,
}

#[derive(Deserialize)]
struct KeyPointsBody {
    key_points: Vec<String>,
}

/// Models sometimes wrap JSON in a Markdown code fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
