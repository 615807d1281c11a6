use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use metamorph_core::{
    app_paths, apply_plan, collect_media_files, generate_plan, load_config, load_metadata_import,
    load_rules, ApplyOutcome, CandidateStatus, MetadataStore, PlanOptions, RenamePlan, Rule,
    RuleKind,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "metamorph_core=info,metamorph_cli=info";

#[derive(Debug, Parser)]
#[command(name = "metamorph-cli")]
#[command(about = "ルールチェーンでメディアファイル名を一括リネームします")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rename(RenameArgs),
    Rules(RulesArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
}

#[derive(Debug, Args)]
struct RulesArgs {
    #[command(subcommand)]
    action: RulesAction,
}

#[derive(Debug, Subcommand)]
enum RulesAction {
    /// ルールファイルを読み込み、正規表現も含めて検証します
    Check { path: PathBuf },
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(long = "input", required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long)]
    rules: Option<PathBuf>,
    #[arg(long)]
    metadata: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    recursive: bool,
    #[arg(long, default_value_t = false)]
    include_hidden: bool,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long = "override", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rename(args) => cmd_rename(args),
        Commands::Rules(rules) => match rules.action {
            RulesAction::Check { path } => cmd_rules_check(&path),
        },
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("FILE=NAME 形式で指定してください: {raw}")),
    }
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    let config = load_config()?;
    let rules = match args.rules.as_deref() {
        Some(path) => load_rules(path)?,
        None => config.rules.clone(),
    };
    if rules.is_empty() {
        anyhow::bail!("ルールがありません。--rules でルールファイルを指定してください。");
    }

    let recursive = args.recursive || config.recursive_default;
    let include_hidden = args.include_hidden || config.include_hidden_default;
    let mut files = Vec::new();
    for input in &args.inputs {
        for file in collect_media_files(input, recursive, include_hidden, &config.media_extensions)?
        {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }

    let store = match args.metadata.as_deref() {
        Some(path) => load_metadata_import(path)?.into_store(&files),
        None => MetadataStore::default(),
    };
    let options = PlanOptions {
        overrides: args.overrides.into_iter().collect::<HashMap<_, _>>(),
    };

    tracing::info!(files = files.len(), rules = rules.len(), "リネーム計画を作成します");
    let plan = generate_plan(&files, &rules, &store, &options);

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        OutputFormat::Table => {
            print_table(&plan);
        }
    }

    if !args.apply {
        eprintln!("dry-runモード: 実ファイルは変更していません。適用するには --apply を指定してください。");
        return Ok(());
    }

    let report = apply_plan(&plan, || false);
    for file in &report.files {
        if let ApplyOutcome::Failed(message) = &file.outcome {
            eprintln!("失敗: {} ({message})", file.original_path.display());
        }
    }
    eprintln!(
        "適用完了: {}件 (スキップ {}件, 失敗 {}件)",
        report.renamed, report.skipped, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{}件のリネームに失敗しました", report.failed);
    }
    Ok(())
}

fn cmd_rules_check(path: &Path) -> Result<()> {
    let rules = load_rules(path)?;
    let mut invalid = 0usize;
    for (i, rule) in rules.iter().enumerate() {
        let state = if rule.enabled { "有効" } else { "無効" };
        match check_rule(rule) {
            Ok(()) => println!("{:>3}. [{state}] {}", i + 1, rule.display_name()),
            Err(err) => {
                invalid += 1;
                println!("{:>3}. [{state}] {} -> {err:#}", i + 1, rule.display_name());
            }
        }
    }
    if invalid > 0 {
        anyhow::bail!("{invalid}件のルールが不正です");
    }
    println!("{}件のルールを確認しました", rules.len());
    Ok(())
}

// 正規表現はファイル名に当てるまで失敗しないため、ダミーのパスで一度適用してみる。
fn check_rule(rule: &Rule) -> Result<()> {
    if let RuleKind::RegexReplace { .. } = rule.kind {
        metamorph_core::apply_rule(rule, Path::new("check.mkv"), None, None)
            .with_context(|| format!("ルールを適用できません: {}", rule.display_name()))?;
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_table(plan: &RenamePlan) {
    println!("元ファイル -> 新ファイル (状態)");
    for candidate in &plan.candidates {
        let status = match &candidate.status {
            CandidateStatus::Pending if candidate.overridden => "pending/override".to_string(),
            CandidateStatus::Pending => "pending".to_string(),
            CandidateStatus::Unchanged => "unchanged".to_string(),
            CandidateStatus::Collision => "collision".to_string(),
            CandidateStatus::Error(message) => format!("error: {message}"),
        };
        println!(
            "{} -> {} ({status})",
            candidate.original_path.display(),
            candidate
                .target_path
                .file_name()
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
    }

    println!(
        "\n集計: planned={} pending={} unchanged={} collision={} error={}",
        plan.stats.planned,
        plan.stats.pending,
        plan.stats.unchanged,
        plan.stats.collisions,
        plan.stats.errors
    );
}
