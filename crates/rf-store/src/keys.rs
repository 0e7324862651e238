//! Content-key layout.
//!
//! ```text
//! uploads/{recording_id}/{file_name}
//! jobs/{job_id}/{stage}/{file}
//! ```

use rf_core::{JobId, RecordingId, Stage};

/// File name of a stage's primary output.
pub fn stage_file_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Convert => "video.mp4",
        Stage::ExtractAudio => "audio.wav",
        Stage::Transcribe => "transcript.json",
        Stage::Analyze => "analysis.json",
    }
}

/// Key of the primary output of `stage` for `job_id`.
pub fn stage_output(job_id: JobId, stage: Stage) -> String {
    format!("jobs/{job_id}/{stage}/{}", stage_file_name(stage))
}

/// Key of one analysis sub-artifact (e.g. `summary`).
pub fn analysis_part(job_id: JobId, part: &str) -> String {
    format!("jobs/{job_id}/{}/{part}.json", Stage::Analyze)
}

/// Key for a raw upload.
pub fn upload(recording_id: RecordingId, file_name: &str) -> String {
    format!("uploads/{recording_id}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_keys_do_not_depend_on_attempt() {
        let job = JobId::new();
        assert_eq!(
            stage_output(job, Stage::ExtractAudio),
            format!("jobs/{job}/extract_audio/audio.wav")
        );
        assert_eq!(stage_output(job, Stage::Convert), stage_output(job, Stage::Convert));
    }

    #[test]
    fn analysis_parts_live_under_analyze() {
        let job = JobId::new();
        let key = analysis_part(job, "sentiment");
        assert_eq!(key, format!("jobs/{job}/analyze/sentiment.json"));
        assert!(crate::validate_key(&key).is_ok());
    }

    #[test]
    fn upload_key() {
        let rec = RecordingId::new();
        assert_eq!(upload(rec, "a.webm"), format!("uploads/{rec}/a.webm"));
    }
}
