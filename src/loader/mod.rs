//! Loader Module
//!
//! Reads pretrained embedding tables from text sources.

mod text;

pub use text::{load_path, load_reader, parse_line, read_entries, EntryReader, LoaderConfig};
