//! CLI argument definitions using clap
//!
//! Commands:
//! - livedoc watch-doc --fixture <path> --path <doc>
//! - livedoc watch-query --fixture <path> --collection <col>
//! - livedoc check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// livedoc - live document bindings over a fixture-backed store
#[derive(Parser, Debug)]
#[command(name = "livedoc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch one document while the fixture's writes are applied
    WatchDoc {
        /// Fixture file (documents, policies, writes)
        #[arg(long)]
        fixture: PathBuf,

        /// Document path, e.g. users/u1
        #[arg(long)]
        path: String,

        /// Sign in as this uid
        #[arg(long)]
        uid: Option<String>,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Watch a query while the fixture's writes are applied
    WatchQuery {
        /// Fixture file (documents, policies, writes)
        #[arg(long)]
        fixture: PathBuf,

        /// Collection path, e.g. orgs/org1/customers
        #[arg(long)]
        collection: String,

        /// Equality filter FIELD=VALUE; VALUE is parsed as JSON when possible
        #[arg(long = "where-eq", value_name = "FIELD=VALUE")]
        where_eq: Vec<String>,

        /// Field to order by
        #[arg(long)]
        order_by: Option<String>,

        /// Order descending
        #[arg(long, requires = "order_by")]
        desc: bool,

        /// Maximum number of documents
        #[arg(long)]
        limit: Option<usize>,

        /// Sign in as this uid
        #[arg(long)]
        uid: Option<String>,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./livedoc.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_query() {
        let cli = Cli::try_parse_from([
            "livedoc",
            "watch-query",
            "--fixture",
            "f.json",
            "--collection",
            "users",
            "--where-eq",
            "ownerId=u1",
            "--order-by",
            "age",
            "--desc",
            "--limit",
            "2",
        ])
        .unwrap();

        match cli.command {
            Command::WatchQuery {
                collection,
                where_eq,
                desc,
                limit,
                ..
            } => {
                assert_eq!(collection, "users");
                assert_eq!(where_eq, vec!["ownerId=u1".to_string()]);
                assert!(desc);
                assert_eq!(limit, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_desc_requires_order_by() {
        let parsed = Cli::try_parse_from([
            "livedoc",
            "watch-query",
            "--fixture",
            "f.json",
            "--collection",
            "users",
            "--desc",
        ]);
        assert!(parsed.is_err());
    }
}
