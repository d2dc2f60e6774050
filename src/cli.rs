use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::post::{TextSource, Visibility};

#[derive(Parser, Debug)]
#[command(name = "linkedin-post", version, about = "Publish a text post to LinkedIn.")]
pub struct Cli {
    /// Post text (inline). Read from stdin when neither this nor --from-file is given
    #[arg(conflicts_with = "from_file")]
    pub text: Option<String>,

    /// Read post text from a file
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Visible to 1st-degree connections only (default: public)
    #[arg(long)]
    pub connections_only: bool,

    /// Attach an image (jpg/png/gif, max 100 MB)
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Clear saved OAuth token and re-authorize
    #[arg(long)]
    pub reset_auth: bool,

    /// Clear all saved credentials and re-prompt from scratch
    #[arg(long)]
    pub reset_keys: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn text_source(&self) -> TextSource {
        match (&self.text, &self.from_file) {
            (Some(text), _) => TextSource::Inline(text.clone()),
            (None, Some(path)) => TextSource::File(path.clone()),
            (None, None) => TextSource::Stdin,
        }
    }

    pub fn visibility(&self) -> Visibility {
        if self.connections_only {
            Visibility::Connections
        } else {
            Visibility::Public
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["linkedin-post", "Hello world!"]);
        assert_eq!(cli.text_source(), TextSource::Inline("Hello world!".into()));
        assert_eq!(cli.visibility(), Visibility::Public);
        assert!(!cli.reset_auth && !cli.reset_keys);
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "linkedin-post",
            "--connections-only",
            "--image",
            "pic.png",
            "--reset-auth",
            "-vv",
            "Private update",
        ]);
        assert_eq!(cli.visibility(), Visibility::Connections);
        assert_eq!(cli.image, Some(PathBuf::from("pic.png")));
        assert!(cli.reset_auth);
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_stdin_when_no_text() {
        let cli = Cli::parse_from(["linkedin-post"]);
        assert_eq!(cli.text_source(), TextSource::Stdin);

        let cli = Cli::parse_from(["linkedin-post", "--from-file", "post.txt"]);
        assert_eq!(cli.text_source(), TextSource::File("post.txt".into()));
    }

    #[test]
    fn test_text_and_file_conflict() {
        let result = Cli::try_parse_from(["linkedin-post", "inline", "--from-file", "post.txt"]);
        assert!(result.is_err());
    }
}
