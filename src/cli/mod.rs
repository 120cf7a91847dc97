//! One-shot command line entry
//!
//! ```bash
//! ftp-import import --bucket my-bucket --host ftp.example.com --file data.csv
//! ```

pub mod commands;

pub use commands::{cmd_import, ImportArgs};
