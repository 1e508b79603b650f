//! Clap argument types.

use clap::Parser;
use std::path::PathBuf;

use prlens::config::Config;
use prlens::models::ChatStyle;

/// Stream an AI code review of a pull request or merge request.
#[derive(Parser, Debug)]
#[command(
    name = "prlens",
    version = prlens::constants::VERSION,
    about = super::ABOUT_STYLED,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Review a GitHub pull request or GitLab merge request.
    Review(Box<ReviewArgs>),

    /// Manage the session result cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print version and build information.
    Version,
}

/// Cache management subcommands.
#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Remove all cached reviews.
    Clear,
    /// Show cache statistics (entry count and size).
    Stats,
    /// Print the cache directory path.
    Path,
}

/// Arguments for the `review` subcommand.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    /// Pull request or merge request page URL.
    pub url: String,

    /// Title to use instead of the page title.
    #[arg(long)]
    pub title: Option<String>,

    /// Ignore any cached review and ask the backend again.
    #[arg(long, default_value_t = false)]
    pub rerun: bool,

    /// Keep the review open and read commands from stdin:
    /// `r` to rerun, `o` to open the external link, `q` to quit.
    #[arg(long, short = 'i', default_value_t = false)]
    pub interactive: bool,

    /// Neither read nor write the session cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Chat backend: api or web.
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<ChatStyle>,

    /// Model name.
    #[arg(long)]
    pub model: Option<String>,

    /// Also save the finished review as an HTML file.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

fn parse_backend(value: &str) -> Result<ChatStyle, String> {
    value.parse()
}

impl ReviewArgs {
    /// Apply CLI flags on top of loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.provider.backend = backend;
        }
        if let Some(ref model) = self.model {
            config.provider.model = Some(model.clone());
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn review(args: &[&str]) -> ReviewArgs {
        match parse(args).command {
            Command::Review(args) => *args,
            other => panic!("expected review command, got {other:?}"),
        }
    }

    #[test]
    fn review_takes_url() {
        let args = review(&["prlens", "review", "https://github.com/o/r/pull/1"]);
        assert_eq!(args.url, "https://github.com/o/r/pull/1");
        assert!(!args.rerun);
        assert!(!args.interactive);
        assert!(args.backend.is_none());
    }

    #[test]
    fn review_flags() {
        let args = review(&[
            "prlens",
            "review",
            "https://gitlab.com/g/p/-/merge_requests/2",
            "--title",
            "Fix it",
            "--rerun",
            "-i",
            "--no-cache",
            "--backend",
            "WEB",
            "--model",
            "gpt-4",
            "-o",
            "review.html",
        ]);
        assert_eq!(args.title.as_deref(), Some("Fix it"));
        assert!(args.rerun && args.interactive && args.no_cache);
        assert_eq!(args.backend, Some(ChatStyle::Web));
        assert_eq!(args.output, Some(PathBuf::from("review.html")));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Cli::try_parse_from(["prlens", "review", "u", "--backend", "bard"]).unwrap_err();
        assert!(err.to_string().contains("unsupported backend"));
    }

    #[test]
    fn flags_override_config() {
        let args = review(&["prlens", "review", "u", "--backend", "web", "--model", "m", "--no-cache"]);
        let mut config = Config::default();
        config.provider.model = Some("from-file".into());
        args.apply_to(&mut config);
        assert_eq!(config.provider.backend, ChatStyle::Web);
        assert_eq!(config.provider.model.as_deref(), Some("m"));
        assert!(!config.cache.enabled);
    }

    #[test]
    fn cache_actions() {
        assert!(matches!(
            parse(&["prlens", "cache", "stats"]).command,
            Command::Cache {
                action: CacheAction::Stats
            }
        ));
        assert!(matches!(parse(&["prlens", "version"]).command, Command::Version));
    }
}
