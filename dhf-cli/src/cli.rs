use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Device History File management for medical devices")]
pub struct Cli {
    /// Path to the DHF data file (overrides DHF_DATA_FILE and the settings file)
    #[clap(long, global = true)]
    pub data_file: Option<PathBuf>,

    /// Directory holding the Markdown report templates
    #[clap(long, global = true)]
    pub reports_dir: Option<PathBuf>,

    /// Show debug logging (RUST_LOG takes precedence)
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show project metadata, the current user and item counts
    Summary,

    /// Show a single item by ID
    Show {
        /// Item ID (e.g. UN001, R002, PR010, SS003)
        id: String,

        /// Print the item as JSON
        #[clap(long)]
        json: bool,
    },

    /// Update fields of an item; fields not mentioned are kept
    Update {
        /// Item ID
        id: String,

        /// Field assignment, may be repeated (e.g. --set title="New title")
        #[clap(long = "set", short = 's', conflicts_with = "patch")]
        set: Vec<String>,

        /// JSON object with the fields to merge
        #[clap(long)]
        patch: Option<String>,
    },

    /// Change the display name of a group (its key is kept)
    RenameGroup {
        /// Category (user_needs, risks, product_requirements,
        /// software_specifications or hardware_specifications)
        category: String,

        /// Storage key of the group
        group_key: String,

        /// New display name
        new_name: String,
    },

    /// Set the effect text of a mitigation link
    LinkEffect {
        /// Mitigation link ID (e.g. ML001)
        link_id: String,

        /// New effect description
        effect: String,
    },

    /// List all risks with rating names and RBM score
    Risks {
        /// Print as JSON
        #[clap(long)]
        json: bool,
    },

    /// List items that can be used as link targets
    Linkable {
        /// Print as JSON
        #[clap(long)]
        json: bool,
    },

    /// Show a traceability view
    Trace {
        /// One of user-needs-to-requirements, requirements-to-specifications,
        /// risks-to-mitigations, specifications-to-risks
        direction: String,

        /// Print as JSON
        #[clap(long)]
        json: bool,
    },

    /// Manage risk rating options
    #[clap(subcommand)]
    Config(ConfigCommand),

    /// List and generate reports
    #[clap(subcommand)]
    Report(ReportCommand),

    /// Report identifiers that are stored more than once
    Check,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// List the options of one or all rating types
    List {
        /// Rating type (severity, probability, probability_occurrence,
        /// probability_harm); all types when omitted
        config_type: Option<String>,
    },

    /// Add an option; the next free ID is assigned
    Add {
        /// Rating type
        config_type: String,

        /// Display name of the option
        #[clap(long)]
        name: Option<String>,

        /// Description of the option
        #[clap(long)]
        description: Option<String>,

        /// Use interactive mode (prompts)
        #[clap(long)]
        interactive: bool,
    },

    /// Remove an option
    Remove {
        /// Rating type
        config_type: String,

        /// Option ID (e.g. S3)
        id: String,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Rename an option and optionally change its description
    Update {
        /// Rating type
        config_type: String,

        /// Option ID
        id: String,

        /// New display name
        #[clap(long)]
        name: String,

        /// New description
        #[clap(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// List available report templates
    List,

    /// Generate a report from a template
    Generate {
        /// Template name (file name without .md)
        name: String,

        /// Write the report to this file instead of stdout
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },
}
