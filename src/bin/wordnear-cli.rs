//! WORDNEAR CLI
//!
//! Load an embedding table and look up nearest words, either once from the
//! command line or interactively.

use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use wordnear::loader::{load_path, LoaderConfig};
use wordnear::projection::{project_neighbors, ProjectionConfig};
use wordnear::{
    DuplicatePolicy, EmbeddingStore, Metrics, RankerConfig, SimilarityRanker, SimilarityResult,
    StoreBuilder, ZeroVectorPolicy,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ZeroVectorArg {
    /// Rank zero-norm comparisons at the maximum distance (2.0)
    Max,
    /// Fail the query
    Reject,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DuplicateArg {
    /// Keep the last vector seen for a token
    Last,
    /// Fail the load
    Reject,
}

/// WORDNEAR CLI - Nearest words by cosine distance
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Embedding file (token followed by its components, one per line)
    #[arg(short, long)]
    embeddings: PathBuf,

    /// Word to look up; starts an interactive session when omitted
    #[arg(short, long)]
    word: Option<String>,

    /// Number of neighbors
    #[arg(short, default_value_t = 10)]
    k: usize,

    /// Leave the query word out of its own neighbors
    #[arg(long, default_value_t = false)]
    exclude_self: bool,

    /// Print 2D projected coordinates of the neighbors
    #[arg(long, default_value_t = false)]
    project: bool,

    /// Only read the first N entries of the file
    #[arg(long)]
    limit: Option<usize>,

    /// Lowercase tokens while loading
    #[arg(long, default_value_t = false)]
    lowercase: bool,

    /// Zero-norm vector handling
    #[arg(long, value_enum, default_value_t = ZeroVectorArg::Max)]
    zero_vector: ZeroVectorArg,

    /// Duplicate token handling
    #[arg(long, value_enum, default_value_t = DuplicateArg::Last)]
    duplicates: DuplicateArg,

    /// Store size from which a query is scanned on several threads
    #[arg(long, default_value_t = 50_000)]
    parallel_threshold: usize,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wordnear=info".parse()?))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut loader_config = LoaderConfig::default().with_lowercase(args.lowercase);
    if let Some(limit) = args.limit {
        loader_config = loader_config.with_max_entries(limit);
    }

    let builder = StoreBuilder::new().duplicate_policy(match args.duplicates {
        DuplicateArg::Last => DuplicatePolicy::LastWriteWins,
        DuplicateArg::Reject => DuplicatePolicy::Reject,
    });

    let store = load_path(&args.embeddings, loader_config, builder)?;

    let ranker = SimilarityRanker::new(
        RankerConfig::default()
            .with_zero_vector_policy(match args.zero_vector {
                ZeroVectorArg::Max => ZeroVectorPolicy::MaxDistance,
                ZeroVectorArg::Reject => ZeroVectorPolicy::Reject,
            })
            .with_parallel_threshold(args.parallel_threshold),
    );

    let session = Session {
        store,
        ranker,
        metrics: Metrics::new(),
        exclude_self: args.exclude_self,
        projection: ProjectionConfig::default(),
    };

    match args.word {
        Some(word) => {
            let result = session.neighbors(&word, args.k)?;
            print_result(&result);
            if args.project {
                session.print_projection(&result);
            }
        }
        None => session.repl(args.k)?,
    }

    Ok(())
}

struct Session {
    store: EmbeddingStore,
    ranker: SimilarityRanker,
    metrics: Metrics,
    exclude_self: bool,
    projection: ProjectionConfig,
}

impl Session {
    fn neighbors(&self, word: &str, k: usize) -> anyhow::Result<SimilarityResult> {
        let start = Instant::now();
        match self.ranker.neighbors_of(&self.store, word, k, self.exclude_self) {
            Ok(result) => {
                self.metrics
                    .record_query("word", self.store.len(), start.elapsed());
                Ok(result)
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e.into())
            }
        }
    }

    fn print_projection(&self, result: &SimilarityResult) {
        println!("\n{:<24} {:>12} {:>12}", "token", "x", "y");
        for labeled in project_neighbors(result, &self.projection) {
            println!(
                "{:<24} {:>12.5} {:>12.5}",
                labeled.token, labeled.point.x, labeled.point.y
            );
        }
    }

    fn repl(&self, default_k: usize) -> anyhow::Result<()> {
        info!(
            "Loaded {} words ({} dimensions)",
            self.store.len(),
            self.store.dimension().unwrap_or(0)
        );
        println!("Type 'help' for available commands, 'quit' to exit.\n");

        loop {
            print!("wordnear> ");
            io::stdout().flush()?;

            let mut input = String::new();
            if io::stdin().read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
                println!("Goodbye!");
                break;
            }

            if input.eq_ignore_ascii_case("help") {
                print_help();
                continue;
            }

            if let Err(e) = self.execute(input, default_k) {
                eprintln!("Error: {}", e);
            }
        }

        Ok(())
    }

    fn execute(&self, input: &str, default_k: usize) -> anyhow::Result<()> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(cmd) = parts.first().map(|c| c.to_uppercase()) else {
            return Ok(());
        };

        match cmd.as_str() {
            "NEAR" | "PLOT" => {
                let Some(word) = parts.get(1) else {
                    anyhow::bail!("{} requires a word: {} <word> [k]", cmd, cmd);
                };
                let k = parse_k(parts.get(2).copied(), default_k)?;
                let result = self.neighbors(word, k)?;
                print_result(&result);
                if cmd == "PLOT" {
                    self.print_projection(&result);
                }
            }

            "VEC" => {
                let Some(word) = parts.get(1) else {
                    anyhow::bail!("VEC requires a word: VEC <word>");
                };
                let vector = self.store.get(word)?;
                println!("{:?}", vector);
            }

            "STATS" => {
                println!(
                    "Words: {} | Dimensions: {}",
                    self.store.len(),
                    self.store.dimension().unwrap_or(0)
                );
                println!("{}", self.metrics.summary());
            }

            _ => anyhow::bail!("Unknown command: {}. Type 'help' for available commands.", cmd),
        }

        Ok(())
    }
}

fn parse_k(raw: Option<&str>, default_k: usize) -> anyhow::Result<usize> {
    match raw {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| anyhow::anyhow!("k must be a non-negative integer, got '{}'", raw)),
        None => Ok(default_k),
    }
}

fn print_result(result: &SimilarityResult) {
    if result.is_empty() {
        println!("(no results)");
        return;
    }
    for (rank, neighbor) in result.iter().enumerate() {
        println!("{:>3}. {:<24} {:.6}", rank + 1, neighbor.token, neighbor.distance);
    }
}

fn print_help() {
    println!(
        r#"
Available commands:

  NEAR <word> [k]   - Nearest words by cosine distance
  PLOT <word> [k]   - Nearest words with 2D projected coordinates
  VEC <word>        - Print a word's vector
  STATS             - Table size and query statistics

  help              - Show this help
  quit / exit       - Exit the CLI

Examples:
  NEAR king
  NEAR king 20
  PLOT frog 8
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let store = EmbeddingStore::build(vec![
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.0, 1.0]),
            ("c", vec![1.0, 1.0]),
        ])
        .unwrap();
        Session {
            store,
            ranker: SimilarityRanker::default(),
            metrics: Metrics::new(),
            exclude_self: false,
            projection: ProjectionConfig::default(),
        }
    }

    #[test]
    fn test_parse_k() {
        assert_eq!(parse_k(None, 10).unwrap(), 10);
        assert_eq!(parse_k(Some("3"), 10).unwrap(), 3);
        assert!(parse_k(Some("three"), 10).is_err());
        assert!(parse_k(Some("-1"), 10).is_err());
    }

    #[test]
    fn test_near_rejects_bad_k() {
        let session = session();
        assert!(session.execute("NEAR a x", 2).is_err());
        assert!(session.execute("PLOT a -4", 2).is_err());
        assert!(session.execute("near a 2", 2).is_ok());
        assert_eq!(session.metrics.total_queries(), 1);
    }

    #[test]
    fn test_trailing_args_ignored_without_k() {
        let session = session();
        assert!(session.execute("VEC a extra", 2).is_ok());
        assert!(session.execute("STATS now please", 2).is_ok());
        assert!(session.execute("VEC missing extra", 2).is_err());
    }

    #[test]
    fn test_unknown_and_blank_commands() {
        let session = session();
        assert!(session.execute("FROB a", 2).is_err());
        assert!(session.execute("   ", 2).is_ok());
    }
}
