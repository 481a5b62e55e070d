//! Atomic package writers and segment concatenation.

pub mod atomic;
pub mod browser_ready;
pub mod concat;
pub mod package;

pub use atomic::{append_jsonl, atomic_write_json, atomic_write_text, write_marker};
pub use browser_ready::make_browser_ready;
pub use concat::concat_mp4;
pub use package::{
    build_incident, update_incident_after_analysis, write_done, write_incident,
    write_needs_cloud, write_result, AnalysisResult, Incident, PackagePaths,
};
