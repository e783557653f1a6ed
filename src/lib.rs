//! # BugHunter
//! BugHunter parses crash reports produced by Breakpad's `minidump_stackwalk`
//! and reduces the crashed thread's stack to a Socorro-style crash signature
//! used to deduplicate crashes found by the Sisyphus test farm.
//!
//! Parsing and signature generation never fail: malformed or truncated
//! reports yield a best-effort result with the anomalies listed in the
//! report's `messages`.
//!
//! ```
//! use bughunter::report::CrashReport;
//!
//! let report = CrashReport::from_breakpad("");
//! assert_eq!(report.signature(), "(no signature)");
//! ```

pub mod breakpad;
pub mod constants;
pub mod error;
pub mod report;
pub mod signature;
pub mod stacktrace;
