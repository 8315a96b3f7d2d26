use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use previewar_core::{Provider, Settings};

/// `previewar` - find the clearest product photo on a retailer page.
///
/// Given a product URL, the tool identifies the product, collects its
/// dimensions and images, asks a model which image shows the product least
/// occluded, and builds the segmentation target and negative prompt for
/// downstream inpainting.
#[derive(Parser, Debug)]
#[command(name = "previewar", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// AI provider: openai, claude, openrouter or kimi.
    #[arg(long, global = true, env = "PREVIEWAR_PROVIDER")]
    pub provider: Option<String>,

    /// Model name. Defaults to the provider's default model.
    #[arg(long, global = true, env = "PREVIEWAR_MODEL")]
    pub model: Option<String>,

    /// Path to the settings file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the best image and HTML dumps.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Fetch pages even when robots.txt disallows it.
    #[arg(long, global = true, default_value_t = false)]
    pub no_robots: bool,

    /// Neither read nor write the report cache.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify the retailer and product nouns for a URL.
    Identify { url: String },

    /// Fetch a product page and extract dimension strings and image URLs.
    Scrape {
        url: String,

        /// Retailer name; guessed from the domain when omitted.
        #[arg(long)]
        company: Option<String>,

        /// Write page.html and page_filtered.html to the output directory.
        #[arg(long, default_value_t = false)]
        dump_html: bool,
    },

    /// Pick the best product image and save it as PNG.
    Select {
        url: String,

        /// Cap on candidate images sent for ranking (0 = no cap).
        #[arg(long)]
        max_images: Option<usize>,

        /// Print the page analysis to stderr before the report.
        #[arg(long, default_value_t = false)]
        print_scrape: bool,

        /// Where to save the image. Defaults to <output-dir>/best_image.png.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build the segmentation target and negative prompt for a product.
    Prompt { url: String },

    /// Manage provider API keys in the OS keychain.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Manage the report cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or create the settings file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// Store a key.
    Set {
        #[arg(value_parser = parse_provider)]
        provider: Provider,
        key: String,
    },
    /// Remove a stored key.
    Delete {
        #[arg(value_parser = parse_provider)]
        provider: Provider,
    },
    /// Show where each provider's key comes from.
    Status,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove expired reports.
    Clear {
        /// Remove every report, not only expired ones.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective settings as TOML.
    Show,
    /// Write a settings file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn parse_provider(name: &str) -> Result<Provider, String> {
    Provider::parse(name).map_err(|e| e.to_string())
}

impl Cli {
    /// Fold global and per-command flags into the loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) -> Result<()> {
        let global = &self.global;

        if let Some(name) = &global.provider {
            let provider = Provider::parse(name)?;
            if provider.as_str() != settings.provider && global.model.is_none() {
                // A model from the file belongs to the file's provider
                settings.model = None;
            }
            settings.provider = provider.as_str().to_string();
        }
        if let Some(model) = &global.model {
            settings.model = Some(model.clone());
        }
        if let Some(dir) = &global.output_dir {
            settings.output_dir = dir.clone();
        }
        if global.no_robots {
            settings.respect_robots = false;
        }

        match &self.command {
            Command::Scrape { dump_html: true, .. } => settings.dump_html = true,
            Command::Select {
                max_images: Some(n), ..
            } => settings.max_images = *n,
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("previewar").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["select", "https://x.com/p", "--no-robots", "--provider", "claude"]);
        assert!(cli.global.no_robots);
        assert_eq!(cli.global.provider.as_deref(), Some("claude"));
        assert!(matches!(cli.command, Command::Select { .. }));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let cli = parse(&[
            "--output-dir",
            "/tmp/out",
            "select",
            "https://x.com/p",
            "--max-images",
            "5",
        ]);
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings).unwrap();

        assert_eq!(settings.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(settings.max_images, 5);
        assert!(settings.respect_robots);
        assert!(!settings.dump_html);
    }

    #[test]
    fn test_switching_provider_drops_file_model() {
        let cli = parse(&["--provider", "anthropic", "identify", "https://x.com/p"]);
        let mut settings = Settings {
            model: Some("gpt-4.1".to_string()),
            ..Settings::default()
        };
        cli.apply_overrides(&mut settings).unwrap();

        assert_eq!(settings.provider, "claude");
        assert_eq!(settings.model, None);
    }

    #[test]
    fn test_explicit_model_is_kept() {
        let cli = parse(&["--provider", "kimi", "--model", "kimi-k2", "prompt", "https://x.com/p"]);
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings).unwrap();

        assert_eq!(settings.provider, "kimi");
        assert_eq!(settings.model.as_deref(), Some("kimi-k2"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let cli = parse(&["--provider", "llama", "identify", "https://x.com/p"]);
        let err = cli.apply_overrides(&mut Settings::default()).unwrap_err();
        assert!(err.to_string().contains("Unknown AI provider"));

        assert!(Cli::try_parse_from(["previewar", "key", "set", "llama", "sk-1"]).is_err());
    }

    #[test]
    fn test_scrape_dump_html_flag() {
        let cli = parse(&["scrape", "https://x.com/p", "--dump-html", "--company", "IKEA"]);
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings).unwrap();
        assert!(settings.dump_html);
    }
}
