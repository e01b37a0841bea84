use serde::{Deserialize, Serialize};

/// One row of crash history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashHistoryRecord {
    pub id: i64,
    pub dump_file_path: String,
    /// SHA-256 of the dump file, when the caller computed one.
    pub dump_hash: Option<String>,
    /// RFC 3339 capture time of the crash.
    pub crash_time: String,
    pub bugcheck_code: u32,
    pub bugcheck_name: String,
    pub suspected_driver: Option<String>,
    pub confidence: f64,
    /// Full `AnalysisResult` serialized as JSON.
    pub analysis_result: String,
    pub ai_analysis: Option<String>,
    /// RFC 3339 insertion time.
    pub created_at: String,
}

impl CrashHistoryRecord {
    /// Decode the stored analysis back into its structured form.
    pub fn analysis(&self) -> serde_json::Result<crate::model::AnalysisResult> {
        serde_json::from_str(&self.analysis_result)
    }
}

/// Aggregates over a window of crash history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashStatistics {
    pub total_crashes: usize,
    /// `(code, name, count)`, most frequent first, at most five.
    pub top_bugchecks: Vec<(u32, String, usize)>,
    /// `(driver, count)`, most frequent first, at most five.
    pub top_drivers: Vec<(String, usize)>,
    /// Window size in days the statistics cover.
    pub days: u32,
}
