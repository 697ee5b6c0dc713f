use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use newsletter_generator::config::{Config, RunOverrides, SummaryLength};
use newsletter_generator::profile::{analyze_interests, ProfileStore};
use newsletter_generator::web::{self, AppState};
use newsletter_generator::{NewsletterError, NewsletterPipeline, OutputFormat, UserProfile};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

/// Exit code for runs that produced no output file.
const EXIT_NO_OUTPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Personalized newsletter generator", long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to config/config.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, summarize and render one newsletter
    Generate {
        /// Saved profile to generate for
        #[arg(long)]
        profile: Option<String>,

        /// Comma-separated interests, overriding the profile's
        #[arg(long)]
        interests: Option<String>,

        #[arg(long)]
        max_articles: Option<usize>,

        #[arg(long)]
        threshold: Option<f64>,

        /// Output format, repeatable (markdown, pdf)
        #[arg(long = "format")]
        formats: Vec<OutputFormat>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// short, medium or long
        #[arg(long)]
        length: Option<String>,

        #[arg(long)]
        no_images: bool,
    },
    /// List saved profiles
    Profiles,
    /// Manage one profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Normalize free-form interests and suggest feeds
    Analyze { text: String },
    /// Start the web GUI
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
    /// Create or overwrite a profile
    Save {
        #[arg(long)]
        name: String,
        /// Comma-separated interests
        #[arg(long)]
        interests: String,
    },
    Show {
        #[arg(long)]
        name: String,
    },
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            match e.downcast_ref::<NewsletterError>() {
                Some(run_error) if run_error.is_run_level() => ExitCode::from(EXIT_NO_OUTPUT),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let store = ProfileStore::new(config.newsletter.profiles_dir.clone());

    match cli.command {
        Commands::Generate {
            profile,
            interests,
            max_articles,
            threshold,
            formats,
            output_dir,
            length,
            no_images,
        } => {
            let summary_length = length.as_deref().map(parse_length).transpose()?;
            let overrides = RunOverrides {
                max_articles,
                relevance_threshold: threshold,
                output_formats: if formats.is_empty() { None } else { Some(formats) },
                output_dir,
                summary_length,
                include_images: if no_images { Some(false) } else { None },
            };
            let config = config.with_overrides(&overrides)?;
            let profile = resolve_profile(&store, profile.as_deref(), interests.as_deref())?;

            info!(
                "Generating newsletter for {} ({} interests, {} feeds)",
                profile.name,
                profile.interests.len(),
                config.feeds.len()
            );
            let pipeline = NewsletterPipeline::from_config(&config)?;
            let report = pipeline.run(&config, &profile).await?;

            println!(
                "Newsletter with {} articles ({} summarized offline)",
                report.document.article_count(),
                report.degraded_count
            );
            for output in &report.outputs {
                println!("  {}: {}", output.format, output.path.display());
            }
            for (format, reason) in &report.failed_formats {
                warn!("{} output failed: {}", format, reason);
            }
            for failure in &report.feed_failures {
                warn!("Feed {} failed: {}", failure.url, failure.reason);
            }
        }
        Commands::Profiles => {
            let names = store.list()?;
            if names.is_empty() {
                println!("No saved profiles in {}", store.dir().display());
            }
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Profile { action } => match action {
            ProfileAction::Save { name, interests } => {
                let interests = split_interests(&interests);
                let mut profile = match store.load(&name) {
                    Ok(mut existing) => {
                        existing.interests = interests;
                        existing
                    }
                    Err(NewsletterError::ProfileNotFound { .. }) => UserProfile::new(name.trim(), interests),
                    Err(e) => return Err(e.into()),
                };
                let path = store.save(&mut profile)?;
                println!("Saved profile {} to {}", profile.name, path.display());
            }
            ProfileAction::Show { name } => {
                let profile = store.load(&name)?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
            ProfileAction::Delete { name } => {
                if !store.delete(&name)? {
                    bail!("Profile not found: {}", name);
                }
                println!("Deleted profile {}", name);
            }
        },
        Commands::Analyze { text } => {
            let analysis = analyze_interests(&text)?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Serve { addr } => {
            let state = AppState::from_config(config)?;
            web::serve(addr, state).await?;
        }
    }

    Ok(())
}

/// Explicit interests win over the saved profile's; the saved profile still
/// contributes its name, weights and preferred sources.
fn resolve_profile(store: &ProfileStore, name: Option<&str>, interests: Option<&str>) -> Result<UserProfile> {
    let loaded = match name {
        Some(name) => match store.load(name) {
            Ok(profile) => Some(profile),
            Err(NewsletterError::ProfileNotFound { .. }) if interests.is_some() => {
                warn!("Profile {} not found, using the given interests", name);
                None
            }
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let profile = match (loaded, interests) {
        (Some(mut profile), Some(interests)) => {
            profile.interests = split_interests(interests);
            profile
        }
        (Some(profile), None) => profile,
        (None, Some(interests)) => UserProfile::new(name.unwrap_or("cli"), split_interests(interests)),
        (None, None) => {
            warn!("No profile or interests given, every article counts as relevant");
            UserProfile::new("default", Vec::new())
        }
    };
    Ok(profile)
}

fn split_interests(text: &str) -> Vec<String> {
    text.split(',')
        .map(|interest| interest.trim().to_string())
        .filter(|interest| !interest.is_empty())
        .collect()
}

fn parse_length(value: &str) -> Result<SummaryLength> {
    match value.to_ascii_lowercase().as_str() {
        "short" => Ok(SummaryLength::Short),
        "medium" => Ok(SummaryLength::Medium),
        "long" => Ok(SummaryLength::Long),
        other => bail!("Unknown summary length: {} (expected short, medium or long)", other),
    }
}
