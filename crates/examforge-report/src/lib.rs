//! examforge-report — Markdown rendering and JSON persistence for
//! evaluation outcomes and analysis reports.

pub mod json;
pub mod markdown;

pub use json::TestReport;
pub use markdown::render_markdown;
