//! On-disk layout for batch artifacts.
//!
//! Everything lives under a single data directory:
//!
//! ```text
//! <data_dir>/
//!   projects/<project_id>/template.pdf
//!   batches/<batch_id>/archive.zip
//!   batches/<batch_id>/source/<filename>
//!   batches/<batch_id>/issued/<filename>
//! ```

mod filesystem;

pub use filesystem::BatchStore;
