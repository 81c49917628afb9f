use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command, CommandFactory, FromArgMatches, Parser};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::info;

use crate::config::{Config, LevelSpec, Settings, DEFAULT_OUTPUT, DEFAULT_YT_DLP};
use crate::core::spreadsheet::{self, Source};
use crate::core::sync::{sync, SyncOptions};
use crate::core::{DownloaderEngine, YtDlp};
use crate::logging::{LevelFlag, LevelSetting, LogLevelResolver, LOG_LEVEL_ENV};
use crate::utils::{prepare_output_dir, split_options};

pub const LOG_LEVEL_ID: &str = "log_level";
pub const QUIET_ID: &str = "quiet";
const LOGGING_GROUP: &str = "logging";
const LOGGING_HEADING: &str = "Logging";
const HEAD_ROWS: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "local-playlist-syncer")]
#[command(about = "Synchronizes media files with yt-dlp from a spreadsheet of media metadata")]
#[command(version)]
pub struct Cli {
    /// Spreadsheet (csv/tsv/json/ndjson), '-' for standard input, or a database URI when --query is given
    #[arg(value_name = "SPREADSHEET")]
    pub spreadsheet: String,

    /// Output folder [default: media]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Spreadsheet format (inferred from the file extension, mandatory for standard input)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Abort after finishing processing of an erroneous entry
    #[arg(short, long)]
    pub abort_on_error: bool,

    /// Sync just the first entry as a trial
    #[arg(short = '1', long)]
    pub just_one: bool,

    /// SQL queries to read the data (the spreadsheet argument is then the connection URI)
    #[arg(short = 'q', long = "query", value_name = "SQL", num_args = 1.., action = ArgAction::Append)]
    pub queries: Vec<String>,

    /// Options passed through to yt-dlp, split like a shell command line
    #[arg(short = 'y', long, allow_hyphen_values = true)]
    pub yt_dlp_options: Option<String>,

    /// yt-dlp program to run [default: yt-dlp]
    #[arg(long, value_name = "PROGRAM")]
    pub yt_dlp: Option<String>,

    /// Column holding the media links (detected when omitted)
    #[arg(long, value_name = "NAME")]
    pub link_column: Option<String>,

    /// Write every row with its status to this CSV file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Config file to use instead of the default locations
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Level selected by one of the logging flags, if any.
    #[arg(skip)]
    pub log_level: Option<LevelSetting>,
}

impl Cli {
    /// The derived command plus the logging group built from `resolver`.
    pub fn command_with(resolver: &LogLevelResolver) -> Command {
        add_log_level_args(Self::command(), resolver)
    }

    pub fn parse_with(resolver: &LogLevelResolver) -> Self {
        Self::try_parse_with(resolver, std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_with<I, T>(resolver: &LogLevelResolver, args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command_with(resolver).try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        cli.log_level = log_level_from_matches(&matches, resolver);
        Ok(cli)
    }

    pub fn into_settings(self, config: Config, resolver: &LogLevelResolver) -> Result<Settings> {
        let env = std::env::var(LOG_LEVEL_ENV).ok();
        self.settings_from(config, env.as_deref(), resolver)
    }

    fn settings_from(
        self,
        config: Config,
        env_level: Option<&str>,
        resolver: &LogLevelResolver,
    ) -> Result<Settings> {
        let log_level = effective_log_level(
            self.log_level,
            env_level,
            config.log_level.as_ref(),
            resolver,
        )?;

        let yt_dlp_options = match self.yt_dlp_options.or(config.yt_dlp_options) {
            Some(options) => split_options(&options)?,
            None => Vec::new(),
        };
        let queries = if self.queries.is_empty() {
            config.queries.unwrap_or_default()
        } else {
            self.queries
        };

        Ok(Settings {
            spreadsheet: self.spreadsheet,
            output: self
                .output
                .or(config.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            format: self.format.or(config.format),
            abort_on_error: self.abort_on_error || config.abort_on_error.unwrap_or(false),
            just_one: self.just_one || config.just_one.unwrap_or(false),
            queries,
            yt_dlp_options,
            yt_dlp: self
                .yt_dlp
                .or(config.yt_dlp)
                .unwrap_or_else(|| DEFAULT_YT_DLP.to_string()),
            link_column: self.link_column.or(config.link_column),
            report: self.report.or(config.report),
            log_level,
        })
    }
}

fn level_flag_id(flag: &LevelFlag) -> String {
    format!("level_{}", flag.key.to_lowercase())
}

/// Adds `--log-level`, one flag per level and `--quiet`, all mutually exclusive.
///
/// A level flag gets a short option when its shortest unique prefix is a
/// single free character, and a hidden long alias when the prefix is longer.
pub fn add_log_level_args(cmd: Command, resolver: &LogLevelResolver) -> Command {
    let mut taken_shorts: HashSet<char> = cmd.get_arguments().filter_map(Arg::get_short).collect();
    taken_shorts.extend(['h', 'V', 'l']);
    let mut taken_longs: HashSet<String> = cmd
        .get_arguments()
        .filter_map(Arg::get_long)
        .map(str::to_string)
        .collect();
    taken_longs.extend(["help", "version", "log-level", QUIET_ID].map(String::from));

    let parser = resolver.clone();
    let mut cmd = cmd.arg(
        Arg::new(LOG_LEVEL_ID)
            .short('l')
            .long("log-level")
            .value_name("LEVEL")
            .help(format!(
                "Set logging level by name, unambiguous prefix or number [env: {}] [default: WARNING]",
                LOG_LEVEL_ENV
            ))
            .value_parser(move |s: &str| parser.resolve(s))
            .allow_negative_numbers(true)
            .help_heading(LOGGING_HEADING),
    );
    let mut group = vec![LOG_LEVEL_ID.to_string(), QUIET_ID.to_string()];

    for flag in resolver.flags() {
        let long = flag.long();
        if !taken_longs.insert(long.clone()) {
            continue;
        }
        let id = level_flag_id(flag);
        let mut arg = Arg::new(id.clone())
            .long(long)
            .action(ArgAction::SetTrue)
            .help(format!("Set logging level to {}", flag.name))
            .help_heading(LOGGING_HEADING);

        let prefix = flag.short_prefix();
        let mut chars = prefix.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                if taken_shorts.insert(c) {
                    arg = arg.short(c);
                }
            }
            _ => {
                if taken_longs.insert(prefix.clone()) {
                    arg = arg.alias(prefix);
                }
            }
        }

        cmd = cmd.arg(arg);
        group.push(id);
    }

    cmd.arg(
        Arg::new(QUIET_ID)
            .long("quiet")
            .action(ArgAction::SetTrue)
            .help("Disable logging entirely")
            .help_heading(LOGGING_HEADING),
    )
    .group(ArgGroup::new(LOGGING_GROUP).args(group).multiple(false))
}

fn flag_set(matches: &ArgMatches, id: &str) -> bool {
    matches
        .try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

pub fn log_level_from_matches(
    matches: &ArgMatches,
    resolver: &LogLevelResolver,
) -> Option<LevelSetting> {
    if flag_set(matches, QUIET_ID) {
        return Some(LevelSetting::Quiet);
    }
    if let Ok(Some(value)) = matches.try_get_one::<i32>(LOG_LEVEL_ID) {
        return Some(LevelSetting::Level(*value));
    }
    resolver
        .flags()
        .iter()
        .find(|flag| flag_set(matches, &level_flag_id(flag)))
        .map(|flag| LevelSetting::Level(flag.value))
}

/// Command line beats the environment, which beats the config file.
pub fn effective_log_level(
    from_cli: Option<LevelSetting>,
    from_env: Option<&str>,
    from_config: Option<&LevelSpec>,
    resolver: &LogLevelResolver,
) -> Result<LevelSetting> {
    if let Some(setting) = from_cli {
        return Ok(setting);
    }
    if let Some(env) = from_env.filter(|env| !env.trim().is_empty()) {
        let value = resolver
            .resolve(env)
            .with_context(|| format!("Invalid {} environment variable", LOG_LEVEL_ENV))?;
        return Ok(LevelSetting::Level(value));
    }
    if let Some(spec) = from_config {
        let value = spec
            .resolve(resolver)
            .context("Invalid log-level in config file")?;
        return Ok(LevelSetting::Level(value));
    }
    Ok(LevelSetting::default())
}

/// Every link goes through yt-dlp with the user's options.
pub fn downloader_engine(settings: &Settings) -> DownloaderEngine {
    let mut engine = DownloaderEngine::new();
    engine.register_downloader(Box::new(YtDlp::new(
        settings.yt_dlp.clone(),
        settings.yt_dlp_options.clone(),
    )));
    engine
}

/// Reads the spreadsheet, syncs every row and prints the outcome.
pub async fn run(settings: Settings) -> Result<()> {
    prepare_output_dir(&settings.output)?;

    let (source, format) = Source::detect(
        &settings.spreadsheet,
        &settings.queries,
        settings.format.as_deref(),
    )?;
    let table = tokio::task::spawn_blocking(move || spreadsheet::read(&source, format)).await??;
    info!("Read {} rows from {}", table.len(), settings.spreadsheet);

    let engine = downloader_engine(&settings);
    let options = SyncOptions {
        output: settings.output.clone(),
        link_column: settings.link_column.clone(),
        abort_on_error: settings.abort_on_error,
        just_one: settings.just_one,
    };
    let report = sync(table, &engine, &options).await?;

    println!("{}", report.table.head(HEAD_ROWS));

    if let Some(path) = &settings.report {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        report.table.write_csv(file)?;
        info!("Report written to {}", path.display());
    }

    if report.aborted {
        anyhow::bail!(
            "Aborted after an erroneous entry ({} failed)",
            report.failures()
        );
    }
    Ok(())
}
