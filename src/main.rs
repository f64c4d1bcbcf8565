// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;

use mtpe::app_config::{self, Config, EditorKind, MtEngineKind};
use mtpe::app_controller::Controller;
use mtpe::translation::glossary::{GlossaryEntry, MatchScope};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for the MT engine selection
#[derive(Debug, Clone, ValueEnum)]
enum CliMtEngine {
    Anthropic,
    Passthrough,
}

impl From<CliMtEngine> for MtEngineKind {
    fn from(engine: CliMtEngine) -> Self {
        match engine {
            CliMtEngine::Anthropic => MtEngineKind::Anthropic,
            CliMtEngine::Passthrough => MtEngineKind::Passthrough,
        }
    }
}

/// CLI Wrapper for the post-editor selection
#[derive(Debug, Clone, ValueEnum)]
enum CliEditor {
    Anthropic,
    Passthrough,
}

impl From<CliEditor> for EditorKind {
    fn from(editor: CliEditor) -> Self {
        match editor {
            CliEditor::Anthropic => EditorKind::Anthropic,
            CliEditor::Passthrough => EditorKind::Passthrough,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a plain-text document
    Translate(TranslateArgs),

    /// Inspect and curate the glossary
    Glossary {
        #[command(subcommand)]
        action: GlossaryAction,
    },

    /// Inspect the translation memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Generate shell completions for mtpe
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input document (paragraphs separated by blank lines)
    #[arg(value_name = "INPUT_FILE")]
    input_file: PathBuf,

    /// Output file (default: <name>.<target>.<ext> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Source language code (e.g., 'ru', 'de', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// MT engine to use
    #[arg(long, value_enum)]
    mt_engine: Option<CliMtEngine>,

    /// Post-editor to use
    #[arg(long, value_enum)]
    llm_editor: Option<CliEditor>,

    /// Segments per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Batches processed at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Do not enforce the glossary
    #[arg(long)]
    no_glossary: bool,

    /// Do not read or update the translation memory
    #[arg(long)]
    no_memory: bool,

    /// Mask glossary terms before machine translation
    #[arg(long)]
    protect_terms: bool,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum GlossaryAction {
    /// List every entry
    List,

    /// Add or overwrite an entry
    Add {
        /// Source term
        source: String,
        /// Mandated rendering
        target: String,
        /// Match the source term with its exact case
        #[arg(long)]
        case_sensitive: bool,
        /// Only match the term as a whole word
        #[arg(long)]
        whole_word: bool,
    },

    /// Remove an entry
    Remove {
        /// Source term
        source: String,
    },

    /// Merge entries from another glossary JSON file
    Import {
        /// File to import
        file: PathBuf,
    },

    /// Write the glossary to another file
    Export {
        /// Destination file
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryAction {
    /// Show entry count and reuse
    Stats,

    /// Find stored translations similar to a text
    Search {
        /// Text to look for
        text: String,
        /// Minimum similarity (0.0 - 1.0)
        #[arg(long, default_value_t = 0.7)]
        min_similarity: f32,
    },

    /// Export the memory as TMX 1.4
    ExportTmx {
        /// Destination file
        file: PathBuf,
    },
}

/// mtpe - machine translation with LLM post-editing
///
/// Translates long documents through a machine translation pass and an LLM
/// post-editing pass, enforcing a glossary and reusing a translation memory.
#[derive(Parser, Debug)]
#[command(name = "mtpe")]
#[command(version)]
#[command(about = "Document translation with MT, LLM post-editing, glossary and translation memory")]
#[command(long_about = "mtpe translates plain-text documents paragraph by paragraph: machine translation first, then LLM post-editing, with glossary enforcement and translation memory reuse.

EXAMPLES:
    mtpe translate book.txt                      # Translate using default config
    mtpe translate -f book.txt                   # Force overwrite existing output
    mtpe translate -s de -t en -b 3 book.txt     # German to English, 3 paragraphs per batch
    mtpe glossary add Pintek Pintek              # Keep a brand name untranslated
    mtpe memory search \"Good morning\"            # Look up similar stored translations
    mtpe completions bash > mtpe.bash            # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. The Anthropic API key may also be given
    through ANTHROPIC_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Color code and emoji for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "❌ "),
            Level::Warn => ("1;33", "🚧 "),
            Level::Info => ("1;32", " "),
            Level::Debug => ("1;36", "🔍 "),
            Level::Trace => ("1;35", "📋 "),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, emoji) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, emoji, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger with the most verbose level; the effective level
    // is set through log::set_max_level once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "mtpe", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(&cli.config_path)?;
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    log::set_max_level(config.log_level.into());

    match cli.command {
        Commands::Translate(args) => run_translate(config, args).await,
        Commands::Glossary { action } => run_glossary(config, action),
        Commands::Memory { action } => run_memory(config, action),
        Commands::Completions { .. } => Ok(()),
    }
}

async fn run_translate(mut config: Config, args: TranslateArgs) -> Result<()> {
    // Override config with CLI options if provided
    if let Some(source_language) = args.source_language {
        config.source_language = source_language;
    }
    if let Some(target_language) = args.target_language {
        config.target_language = target_language;
    }
    if let Some(engine) = args.mt_engine {
        config.pipeline.mt_engine = engine.into();
    }
    if let Some(editor) = args.llm_editor {
        config.pipeline.llm_editor = editor.into();
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(concurrency) = args.concurrency {
        config.pipeline.max_concurrent_batches = concurrency;
    }
    if args.no_glossary {
        config.pipeline.use_glossary = false;
    }
    if args.no_memory {
        config.pipeline.use_translation_memory = false;
    }
    if args.protect_terms {
        config.pipeline.protect_terms = true;
    }

    // Validate the configuration after loading and overriding
    config.validate().context("Configuration validation failed")?;

    info!(
        "mtpe: {} -> {} ({} MT, {} post-editor)",
        config.source_language, config.target_language, config.pipeline.mt_engine, config.pipeline.llm_editor
    );

    let controller = Controller::with_config(config)?;
    let Some(report) = controller
        .translate_file(&args.input_file, args.output, args.force_overwrite)
        .await?
    else {
        return Ok(());
    };

    if let Some(path) = &args.report {
        Controller::write_report(&report, path)?;
        info!("Run report written to {:?}", path);
    }

    if report.cancelled {
        warn!("Run cancelled, {} segments left untranslated", report.skipped.len());
    }
    if !report.failed.is_empty() {
        error!(
            "{} segments failed: {:?}",
            report.failed.len(),
            report.failed_indices()
        );
        return Err(anyhow!("Translation incomplete: {} segments failed", report.failed.len()));
    }

    Ok(())
}

fn run_glossary(config: Config, action: GlossaryAction) -> Result<()> {
    let controller = Controller::with_config(config)?;
    let mut stdout = std::io::stdout();

    match action {
        GlossaryAction::List => {
            let entries = controller.glossary_list()?;
            for entry in &entries {
                writeln!(stdout, "{}\t{}", entry.source, entry.target)?;
            }
            info!("{} glossary entries", entries.len());
        }
        GlossaryAction::Add {
            source,
            target,
            case_sensitive,
            whole_word,
        } => {
            let scope = if whole_word { MatchScope::WholeWord } else { MatchScope::Substring };
            let entry = GlossaryEntry::new(&source, &target)
                .case_sensitive(case_sensitive)
                .scope(scope);
            if controller.glossary_add(entry)? {
                info!("Updated '{}' -> '{}'", source, target);
            } else {
                info!("Added '{}' -> '{}'", source, target);
            }
        }
        GlossaryAction::Remove { source } => {
            if controller.glossary_remove(&source)? {
                info!("Removed '{}'", source);
            } else {
                warn!("'{}' is not in the glossary", source);
            }
        }
        GlossaryAction::Import { file } => {
            let summary = controller.glossary_import(&file)?;
            info!("Imported {:?}: {} added, {} updated", file, summary.added, summary.updated);
        }
        GlossaryAction::Export { file } => {
            let count = controller.glossary_export(&file)?;
            info!("Exported {} entries to {:?}", count, file);
        }
    }

    Ok(())
}

fn run_memory(config: Config, action: MemoryAction) -> Result<()> {
    let controller = Controller::with_config(config)?;
    let mut stdout = std::io::stdout();

    match action {
        MemoryAction::Stats => {
            let stats = controller.memory_stats()?;
            writeln!(stdout, "entries: {}\nreuses:  {}", stats.entries, stats.total_uses)?;
        }
        MemoryAction::Search { text, min_similarity } => {
            let matches = controller.memory_search(&text, min_similarity)?;
            if matches.is_empty() {
                warn!("No stored translation at or above {:.2}", min_similarity);
            }
            for m in matches {
                writeln!(stdout, "{:.2}\t{}\t{}", m.similarity, m.source, m.translation)?;
            }
        }
        MemoryAction::ExportTmx { file } => {
            let count = controller.memory_export_tmx(&file)?;
            info!("Exported {} translation units to {:?}", count, file);
        }
    }

    Ok(())
}
