//! Structured transcript produced by the Transcribe stage.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Full transcript plus time-stamped, speaker-labelled segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

/// One utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_ms: u64,
    pub end_ms: u64,
    /// Diarized speaker index; `None` when diarization was off.
    pub speaker_id: Option<u32>,
    pub text: String,
}

impl Transcript {
    /// Number of distinct speakers across all segments.
    pub fn speaker_count(&self) -> usize {
        self.segments
            .iter()
            .filter_map(|s| s.speaker_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Render as `[mm:ss] Speaker N: text` lines for the analysis prompts.
    ///
    /// Falls back to the full text when there are no segments.
    pub fn format_for_analysis(&self) -> String {
        if self.segments.is_empty() {
            return self.full_text.clone();
        }
        self.segments
            .iter()
            .map(|s| {
                let speaker = match s.speaker_id {
                    Some(id) => format!("Speaker {id}"),
                    None => "Unknown Speaker".to_string(),
                };
                format!("[{}] {speaker}: {}", format_timestamp(s.start_ms), s.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `mm:ss`, or `h:mm:ss` past the first hour.
pub fn format_timestamp(ms: u64) -> String {
    let total = ms / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_ms: u64, speaker_id: Option<u32>, text: &str) -> Segment {
        Segment {
            start_ms,
            end_ms: start_ms + 1000,
            speaker_id,
            text: text.into(),
        }
    }

    #[test]
    fn formats_speakers_and_timestamps() {
        let t = Transcript {
            full_text: "hi there bye".into(),
            confidence: None,
            duration_ms: None,
            segments: vec![
                seg(0, Some(0), "hi there"),
                seg(65_500, Some(1), "bye"),
                seg(3_725_000, None, "late"),
            ],
        };
        assert_eq!(
            t.format_for_analysis(),
            "[00:00] Speaker 0: hi there\n[01:05] Speaker 1: bye\n[1:02:05] Unknown Speaker: late"
        );
        assert_eq!(t.speaker_count(), 2);
    }

    #[test]
    fn no_segments_uses_full_text() {
        let t = Transcript {
            full_text: "just text".into(),
            confidence: Some(0.9),
            duration_ms: Some(1000),
            segments: vec![],
        };
        assert_eq!(t.format_for_analysis(), "just text");
        assert_eq!(t.speaker_count(), 0);
    }
}
