//! Output module for run reporting and output file layout
//!
//! This module handles:
//! - The run report accumulated by the crawler and its printed summary
//! - Naming per-run entity files and maintaining the `latest` pointer

mod report;
mod run_files;

pub use report::{print_report, CrawlReport, IrreducibleRange};
pub use run_files::{latest_link_path, output_file_name, prepare_run_output};
