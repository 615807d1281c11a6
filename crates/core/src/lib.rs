mod apply;
mod chain;
mod config;
mod metadata;
mod planner;
mod rule;
mod sanitize;
mod template;
mod transform;

pub use apply::{apply_plan, AppliedFile, ApplyOutcome, ApplyReport};
pub use chain::{evaluate, evaluate_preview, sequence_number, ChainError};
pub use config::{
    app_paths, load_config, load_config_from, load_metadata_import, load_rules, save_config,
    save_rules, AppConfig, AppPaths, RuleSet, DEFAULT_MEDIA_EXTENSIONS,
};
pub use metadata::{
    csv_row_metadata, merge_metadata, CsvTable, EpisodeInfo, MetaValue, Metadata,
    MetadataImport, MetadataStore,
};
pub use planner::{
    collect_media_files, generate_plan, CandidateStatus, PlanOptions, RenameCandidate,
    RenamePlan, RenameStats,
};
pub use rule::{CaseMode, Rule, RuleError, RuleKind, TrimSide};
pub use sanitize::sanitize_filename;
pub use template::{format_template, split_name_ext, zero_pad};
pub use transform::apply_rule;
