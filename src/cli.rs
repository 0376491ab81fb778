//! Minimal CLI parsing for one-shot runs and settings overrides.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    /// Run a single scrape in the foreground and exit
    pub once: bool,
    pub config_path: Option<PathBuf>,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--once" => options.once = true,
                "--config" => {
                    if let Some(value) = args.next() {
                        options.config_path = Some(PathBuf::from(value));
                    }
                }
                _ if arg.starts_with("--config=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.config_path = Some(PathBuf::from(value));
                    }
                }
                _ => {}
            }
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let options = CliOptions::parse(args(&["--once", "--config", "/etc/scraper.json"]));
        assert!(options.once);
        assert_eq!(options.config_path, Some(PathBuf::from("/etc/scraper.json")));
    }

    #[test]
    fn test_parse_equals_form_and_unknown_args() {
        let options = CliOptions::parse(args(&["--verbose", "--config=scraper.json"]));
        assert!(!options.once);
        assert_eq!(options.config_path, Some(PathBuf::from("scraper.json")));
        assert_eq!(CliOptions::parse(args(&[])), CliOptions::default());
    }
}
