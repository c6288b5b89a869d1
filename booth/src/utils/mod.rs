//! Utility modules for BoothMail.
//!
//! # Modules
//!
//! - [`fsops`]: Move and write-then-rename helpers
//! - [`naming`]: Recipient-derived file and folder names
//! - [`settle`]: Waiting for a newly created file to finish being written

pub mod fsops;
pub mod naming;
pub mod settle;

pub use fsops::{move_path, write_atomic};
pub use naming::{
    archive_file_name, batch_folder_name, capture_extension, capture_file_name, timestamp_now,
    unique_path, ARCHIVE_EXTENSION, BATCH_FOLDER_PREFIX, METADATA_FILE_NAME, SENT_FOLDER_NAME,
};
pub use settle::{wait_until_settled, SettlePolicy};
