//! Reconciliation engine
//!
//! - `page_fetcher`: walks a ranking source page by page
//! - `coalesce`: source/stored/now resolution of dates and ratings
//! - `qualified_reconciler`: full-snapshot diff of the qualified list
//! - `ranked_merger`: watermark-bounded merge of newly ranked entries
//! - `change_notifier`: post-commit change events

pub mod change_notifier;
pub mod coalesce;
pub mod page_fetcher;
pub mod qualified_reconciler;
pub mod ranked_merger;

pub use change_notifier::ChangeNotifier;
pub use page_fetcher::{FetchOutcome, PageFetcher};
pub use qualified_reconciler::{
    QualifiedContext, QualifiedDiff, QualifiedReport, QualifiedSetReconciler, QualifiedSnapshot,
};
pub use ranked_merger::{RankedReport, RankedWatermarkMerger};
