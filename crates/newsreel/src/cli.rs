use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "newsreel", version, about = "NNTP news reader")]
pub struct Cli {
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "option",
        value_name = "KEY=VALUE",
        help = "Override a config option (repeatable)"
    )]
    pub options: Vec<String>,

    #[arg(
        short,
        long,
        help = "Log level or filter directive; defaults to LogLevel from the config"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List newsgroups, optionally filtered by a wildmat such as `comp.*`
    Groups { pattern: Option<String> },
    /// Select a group and print its article count and watermarks
    Group { name: String },
    /// Print a whole article
    Article {
        /// Article number or <message-id>
        spec: String,
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Print an article's headers
    Head {
        spec: String,
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Print an article's body
    Body {
        spec: String,
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Print overview records for a range such as `100-200` or `100-`
    Xover {
        range: String,
        #[arg(short, long)]
        group: String,
        #[arg(long, help = "Request zlib-compressed overview data (XZVER)")]
        compress: bool,
    },
    /// Post the article in FILE (headers, blank line, body)
    Post { file: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "newsreel",
            "-c",
            "/etc/newsreel.conf",
            "-o",
            "Port=1119",
            "--option",
            "Encryption=no",
            "-l",
            "debug",
            "groups",
        ])
        .expect("parse");
        assert_eq!(cli.config.unwrap(), PathBuf::from("/etc/newsreel.conf"));
        assert_eq!(cli.options, vec!["Port=1119", "Encryption=no"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Groups { pattern: None }));
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["newsreel", "group", "misc.test"]).expect("parse");
        assert!(cli.config.is_none());
        assert!(cli.options.is_empty());
        assert!(cli.log_level.is_none());
        assert!(matches!(cli.command, Command::Group { name } if name == "misc.test"));
    }

    #[test]
    fn article_accepts_optional_group() {
        let cli = Cli::try_parse_from(["newsreel", "body", "42", "-g", "misc.test"])
            .expect("parse");
        match cli.command {
            Command::Body { spec, group } => {
                assert_eq!(spec, "42");
                assert_eq!(group.as_deref(), Some("misc.test"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn xover_requires_group() {
        assert!(Cli::try_parse_from(["newsreel", "xover", "1-10"]).is_err());
        let cli = Cli::try_parse_from(["newsreel", "xover", "1-10", "--group", "misc.test", "--compress"])
            .expect("parse");
        assert!(matches!(cli.command, Command::Xover { compress: true, .. }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["newsreel"]).is_err());
    }
}
