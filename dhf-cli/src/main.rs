mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::path::Path;

use dhf_core::{
    assess_risks, current_user, duplicate_ids, generate_report, item_detail, linkable_items,
    list_templates, patch_from_assignments, patch_from_json, summary, traceability, CategoryKind,
    ConfigType, DhfError, DhfStore, ItemRef, Overrides, Settings, TraceDirection,
};

use crate::cli::{Cli, Command, ConfigCommand, ReportCommand};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::resolve(Overrides {
        data_file: cli.data_file.clone(),
        reports_dir: cli.reports_dir.clone(),
    })?;
    let mut store = DhfStore::open(&settings.data_file);

    match &cli.command {
        Command::Summary => show_summary(&mut store)?,
        Command::Show { id, json } => show_item(&mut store, id, *json)?,
        Command::Update { id, set, patch } => update_item(&mut store, id, set, patch.as_deref())?,
        Command::RenameGroup {
            category,
            group_key,
            new_name,
        } => rename_group(&mut store, category, group_key, new_name)?,
        Command::LinkEffect { link_id, effect } => {
            if !store.update_mitigation_effect(link_id, effect)? {
                anyhow::bail!("Mitigation link '{}' not found", link_id);
            }
            println!("{} Effect of {} updated", "✓".green(), link_id);
        }
        Command::Risks { json } => list_risks(&mut store, *json)?,
        Command::Linkable { json } => list_linkable(&mut store, *json)?,
        Command::Trace { direction, json } => show_trace(&mut store, direction, *json)?,
        Command::Config(config_cmd) => handle_config_command(config_cmd, &mut store)?,
        Command::Report(report_cmd) => {
            handle_report_command(report_cmd, &mut store, &settings.reports_dir)?
        }
        Command::Check => check_duplicates(&mut store)?,
    }

    Ok(())
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(store: &mut DhfStore) -> Result<&dhf_core::DhfDocument> {
    let path = store.path().to_path_buf();
    store
        .document()
        .with_context(|| format!("Failed to load DHF data from {:?}", path))
}

fn parse_config_type(value: &str) -> Result<ConfigType> {
    ConfigType::from_key(value).ok_or_else(|| {
        DhfError::Validation(format!(
            "unknown configuration type '{}' (expected severity, probability, probability_occurrence or probability_harm)",
            value
        ))
        .into()
    })
}

fn print_refs(refs: &[ItemRef], indent: &str) {
    if refs.is_empty() {
        println!("{}{}", indent, "(none)".dimmed());
    }
    for item in refs {
        println!("{}{} {}", indent, item.id.cyan(), item.title);
    }
}

fn show_summary(store: &mut DhfStore) -> Result<()> {
    let user = current_user();
    let doc = load(store)?;
    let counts = summary(doc);

    let field = |name: &str, default: &str| {
        doc.metadata_str(name).unwrap_or(default).to_string()
    };
    println!("{}", field("project_name", "Unknown Project").blue().bold());
    println!("{}: {}", "Device".cyan(), field("device_type", "Unknown Device"));
    println!("{}: {}", "Version".cyan(), field("version", "1.0"));
    if user.email.is_empty() {
        println!("{}: {}", "User".cyan(), user.name);
    } else {
        println!("{}: {} <{}>", "User".cyan(), user.name, user.email);
    }
    println!();

    for (kind, count) in &counts.counts {
        println!("  {:<26} {}", kind.key(), count);
    }
    println!("  {:<26} {}", "mitigation_links", counts.mitigation_links);
    Ok(())
}

fn show_item(store: &mut DhfStore, id: &str, json: bool) -> Result<()> {
    let doc = load(store)?;
    let detail = item_detail(doc, id).with_context(|| format!("Item '{}' not found", id))?;

    if json {
        let mut value = serde_json::to_value(&detail.record)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("id".to_string(), serde_json::Value::from(id));
            object.insert(
                "location".to_string(),
                serde_json::Value::from(detail.location.to_string()),
            );
            if !detail.linked_risks.is_empty() {
                object.insert(
                    "linked_risks".to_string(),
                    serde_json::to_value(&detail.linked_risks)?,
                );
            }
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}: {}", "ID".blue(), id);
    println!("{}: {}", "Location".blue(), detail.location);
    print!("{}", serde_yaml::to_string(&detail.record)?);
    if !detail.linked_risks.is_empty() {
        println!("{}: {}", "Linked risks".blue(), detail.linked_risks.join(", "));
    }
    Ok(())
}

fn update_item(
    store: &mut DhfStore,
    id: &str,
    assignments: &[String],
    patch_json: Option<&str>,
) -> Result<()> {
    let patch = match patch_json {
        Some(text) => patch_from_json(text)?,
        None => patch_from_assignments(assignments)?,
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to update: use --set field=value or --patch '<json>'");
    }

    if !store.update_item(id, &patch)? {
        anyhow::bail!("Item '{}' not found", id);
    }
    println!("{} Updated {} ({} field(s))", "✓".green(), id, patch.len());
    Ok(())
}

fn rename_group(store: &mut DhfStore, category: &str, group_key: &str, new_name: &str) -> Result<()> {
    let kind = CategoryKind::from_key(category)
        .ok_or_else(|| DhfError::Validation(format!("unknown category '{}'", category)))?;
    if !store.rename_group(kind, group_key, new_name)? {
        anyhow::bail!("Group '{}' not found in {}", group_key, kind);
    }
    println!("{} {} is now shown as '{}'", "✓".green(), group_key, new_name);
    Ok(())
}

fn list_risks(store: &mut DhfStore, json: bool) -> Result<()> {
    let risks = assess_risks(load(store)?);
    if json {
        println!("{}", serde_json::to_string_pretty(&risks)?);
        return Ok(());
    }
    if risks.is_empty() {
        println!("{}", "No risks defined.".yellow());
        return Ok(());
    }

    println!(
        "{:<8} {:<36} {:<10} {:<10} {:<10} {}",
        "ID", "Title", "Occurr.", "Harm", "Severity", "RBM"
    );
    for risk in &risks {
        let score = risk.rbm_score.to_string();
        let score = match risk.rbm_score {
            s if s >= 18 => score.red(),
            s if s >= 8 => score.yellow(),
            _ => score.green(),
        };
        println!(
            "{:<8} {:<36} {:<10} {:<10} {:<10} {}",
            risk.id,
            risk.title,
            risk.probability_occurrence,
            risk.probability_harm,
            risk.severity,
            score
        );
    }
    Ok(())
}

fn list_linkable(store: &mut DhfStore, json: bool) -> Result<()> {
    let linkable = linkable_items(load(store)?);
    if json {
        println!("{}", serde_json::to_string_pretty(&linkable)?);
        return Ok(());
    }
    for (label, refs) in [
        ("User needs", &linkable.user_needs),
        ("Risks", &linkable.risks),
        ("Product requirements", &linkable.product_requirements),
    ] {
        println!("{}", label.blue().bold());
        print_refs(refs, "  ");
    }
    Ok(())
}

fn show_trace(store: &mut DhfStore, direction: &str, json: bool) -> Result<()> {
    let direction = TraceDirection::from_name(direction).ok_or_else(|| {
        let known: Vec<&str> = TraceDirection::ALL.iter().map(|d| d.name()).collect();
        DhfError::Validation(format!(
            "unknown direction '{}' (expected one of: {})",
            direction,
            known.join(", ")
        ))
    })?;

    let view = traceability(load(store)?, direction);
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", direction.to_string().blue().bold());
    for row in view.rows() {
        println!("{} {}", row.source.id.green(), row.source.title);
        print_refs(&row.targets, "  -> ");
    }
    Ok(())
}

fn handle_config_command(cmd: &ConfigCommand, store: &mut DhfStore) -> Result<()> {
    match cmd {
        ConfigCommand::List { config_type } => {
            let types = match config_type {
                Some(value) => vec![parse_config_type(value)?],
                None => ConfigType::ALL.to_vec(),
            };
            let doc = load(store)?;
            for config_type in types {
                let stored = doc.stored_options(config_type);
                let in_use = doc.ids_in_use(config_type);
                let heading = if stored.is_empty() {
                    format!("{} (defaults)", config_type)
                } else {
                    config_type.to_string()
                };
                println!("{}", heading.blue().bold());
                for (id, option) in doc.options(config_type) {
                    let marker = if in_use.contains(&id) { "*" } else { " " };
                    println!(
                        " {} {:<5} {:<12} {}",
                        marker,
                        id.cyan(),
                        option.name,
                        option.description.dimmed()
                    );
                }
            }
            println!("\n{}", "* referenced by at least one risk".dimmed());
        }
        ConfigCommand::Add {
            config_type,
            name,
            description,
            interactive,
        } => {
            let config_type = parse_config_type(config_type)?;
            let (name, description) = if *interactive || name.is_none() {
                let input = prompts::prompt_new_option(config_type, name.as_deref())?;
                (input.name, input.description)
            } else {
                (
                    name.clone().unwrap_or_default(),
                    description.clone().unwrap_or_default(),
                )
            };
            let id = store.add_config_option(config_type, &name, &description)?;
            println!("{} Added {} option {}", "✓".green(), config_type, id.green());
        }
        ConfigCommand::Remove {
            config_type,
            id,
            yes,
        } => {
            let config_type = parse_config_type(config_type)?;
            let users = load(store)?.risks_using_option(config_type, id);
            if !users.is_empty() {
                println!(
                    "{} {} is still referenced by: {}",
                    "Warning:".yellow(),
                    id,
                    users.join(", ")
                );
                if !*yes && !prompts::confirm_option_removal(id, &users)? {
                    println!("{}", "Removal cancelled.".yellow());
                    return Ok(());
                }
            }
            if !store.remove_config_option(config_type, id)? {
                anyhow::bail!("Option '{}' not found in {}", id, config_type);
            }
            println!("{} Removed {} option {}", "✓".green(), config_type, id);
        }
        ConfigCommand::Update {
            config_type,
            id,
            name,
            description,
        } => {
            let config_type = parse_config_type(config_type)?;
            if !store.update_config_option(config_type, id, name, description.as_deref())? {
                anyhow::bail!("Option '{}' not found in {}", id, config_type);
            }
            println!("{} Updated {} option {}", "✓".green(), config_type, id);
        }
    }
    Ok(())
}

fn handle_report_command(cmd: &ReportCommand, store: &mut DhfStore, reports_dir: &Path) -> Result<()> {
    match cmd {
        ReportCommand::List => {
            let templates = list_templates(reports_dir)?;
            if templates.is_empty() {
                println!(
                    "{} {}",
                    "No report templates found in".yellow(),
                    reports_dir.display()
                );
            }
            for template in templates {
                println!("{:<32} {}", template.name.cyan(), template.title);
                println!("{:<32} {}", "", template.description.dimmed());
            }
        }
        ReportCommand::Generate { name, output } => {
            let now = chrono::Local::now().naive_local();
            let report = generate_report(reports_dir, name, load(store)?, now)?
                .with_context(|| format!("Report template '{}' not found", name))?;
            match output {
                Some(path) => {
                    fs::write(path, &report.content)
                        .with_context(|| format!("Failed to write report to {:?}", path))?;
                    println!(
                        "{} Generated {} for {} at {}",
                        "✓".green(),
                        path.display(),
                        report.title,
                        report.generated_date
                    );
                }
                None => print!("{}", report.content),
            }
        }
    }
    Ok(())
}

fn check_duplicates(store: &mut DhfStore) -> Result<()> {
    let duplicates = duplicate_ids(load(store)?);
    if duplicates.is_empty() {
        println!("{} No duplicate identifiers", "✓".green());
        return Ok(());
    }
    for (id, locations) in &duplicates {
        println!("{} {} is stored {} times:", "Warning:".yellow(), id, locations.len());
        for (i, location) in locations.iter().enumerate() {
            let note = if i == 0 { " (used)" } else { "" };
            println!("  {}{}", location, note.green());
        }
    }
    anyhow::bail!("{} duplicate identifier(s) found", duplicates.len())
}
