//! Text Embedding Format
//!
//! Whitespace-delimited lines: a token followed by its float components.
//!
//! ```text
//! 2 3            <- optional "count dim" header (word2vec text)
//! the 0.418 0.24968 -0.41242
//! cat -0.3 0.11 0.82
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::vector::{EmbeddingStore, StoreBuilder};

/// Loader configuration
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Stop after this many entries (None = read everything)
    pub max_entries: Option<usize>,
    /// Fold tokens to lowercase while reading
    pub lowercase: bool,
}

impl LoaderConfig {
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }
}

/// Parse one line into a (token, vector) pair.
///
/// Returns `Ok(None)` for blank lines. `line_no` is 1-based and only used
/// for error reporting.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<(String, Vec<f32>)>> {
    let mut fields = line.split_whitespace();

    let Some(token) = fields.next() else {
        return Ok(None);
    };

    let vector = fields
        .enumerate()
        .map(|(i, field)| {
            field.parse::<f32>().map_err(|e| EmbeddingError::Parse {
                line: line_no,
                reason: format!("field {} ('{}') of '{}': {}", i + 1, field, token, e),
            })
        })
        .collect::<Result<Vec<f32>>>()?;

    if vector.is_empty() {
        return Err(EmbeddingError::Parse {
            line: line_no,
            reason: format!("token '{}' has no vector components", token),
        });
    }

    Ok(Some((token.to_string(), vector)))
}

/// True for a word2vec-style "count dim" header line
fn is_header(line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields.len() == 2 && fields.iter().all(|f| f.parse::<u64>().is_ok())
}

/// Streaming reader over a text embedding source
pub struct EntryReader<R> {
    reader: R,
    config: LoaderConfig,
    line_no: usize,
    emitted: usize,
    buf: String,
}

impl<R: BufRead> EntryReader<R> {
    pub fn new(reader: R, config: LoaderConfig) -> Self {
        Self {
            reader,
            config,
            line_no: 0,
            emitted: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    fn next_entry(&mut self) -> Result<Option<(String, Vec<f32>)>> {
        if self.config.max_entries.is_some_and(|max| self.emitted >= max) {
            return Ok(None);
        }

        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if self.line_no == 1 && is_header(&self.buf) {
                debug!(header = self.buf.trim(), "Skipping header line");
                continue;
            }

            match parse_line(&self.buf, self.line_no)? {
                Some((token, vector)) => {
                    self.emitted += 1;
                    let token = if self.config.lowercase {
                        token.to_lowercase()
                    } else {
                        token
                    };
                    return Ok(Some((token, vector)));
                }
                None => {
                    debug!(line = self.line_no, "Skipping blank line");
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for EntryReader<R> {
    type Item = Result<(String, Vec<f32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Read every entry from a text source into memory
pub fn read_entries<R: BufRead>(reader: R, config: LoaderConfig) -> Result<Vec<(String, Vec<f32>)>> {
    EntryReader::new(reader, config).collect()
}

/// Stream a text source into a store builder and build it.
pub fn load_reader<R: BufRead>(
    reader: R,
    config: LoaderConfig,
    mut builder: StoreBuilder,
) -> Result<EmbeddingStore> {
    let start = Instant::now();
    let mut entries = EntryReader::new(reader, config);

    for entry in entries.by_ref() {
        let (token, vector) = entry?;
        builder.push(token, vector)?;
    }

    let lines = entries.lines_read();
    let store = builder.build()?;

    info!(
        lines = lines,
        entries = store.len(),
        dimension = store.dimension().unwrap_or(0),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded embeddings"
    );

    Ok(store)
}

/// Load a text embedding file from disk
pub fn load_path<P: AsRef<Path>>(
    path: P,
    config: LoaderConfig,
    builder: StoreBuilder,
) -> Result<EmbeddingStore> {
    let path: PathBuf = path.as_ref().to_path_buf();
    info!(path = %path.display(), "Loading embeddings");

    let file = File::open(&path)?;
    load_reader(BufReader::new(file), config, builder)
}
