//! `sheetsync mappings list|add|update|remove`

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use sheetsync_core::{Mapping, MappingPatch, NewMapping};

use super::print_json;
use crate::client::ApiClient;

#[derive(Subcommand, Debug)]
pub enum MappingsCommand {
    /// List configured mappings.
    List,
    /// Register a new mapping.
    Add(AddArgs),
    /// Change fields of an existing mapping.
    Update(UpdateArgs),
    /// Delete a mapping by id.
    Remove {
        /// Mapping id.
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub source_sheet: String,
    #[arg(long)]
    pub source_tab: String,
    #[arg(long)]
    pub dest_sheet: String,
    #[arg(long)]
    pub dest_tab: String,
    /// Display name.
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Mapping id.
    pub id: String,
    #[arg(long)]
    pub source_sheet: Option<String>,
    #[arg(long)]
    pub source_tab: Option<String>,
    #[arg(long)]
    pub dest_sheet: Option<String>,
    #[arg(long)]
    pub dest_tab: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "destination")]
    destination: String,
}

impl From<&Mapping> for MappingRow {
    fn from(m: &Mapping) -> Self {
        Self {
            id: m.id.to_string(),
            name: m.name.clone(),
            source: format!("{} / {}", m.source_sheet_id, m.source_tab),
            destination: format!("{} / {}", m.dest_sheet_id, m.dest_tab),
        }
    }
}

pub fn run(client: &ApiClient, command: MappingsCommand, json: bool) -> Result<()> {
    match command {
        MappingsCommand::List => list(client, json),
        MappingsCommand::Add(args) => add(client, args, json),
        MappingsCommand::Update(args) => update(client, args, json),
        MappingsCommand::Remove { id } => remove(client, &id, json),
    }
}

fn list(client: &ApiClient, json: bool) -> Result<()> {
    let mappings: Vec<Mapping> = client.get("/api/mappings")?;
    if json {
        return print_json(&mappings);
    }
    if mappings.is_empty() {
        println!("No mappings configured.");
        println!("Run: sheetsync mappings add --source-sheet <id> --source-tab <tab> ...");
        return Ok(());
    }

    let rows: Vec<MappingRow> = mappings.iter().map(MappingRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(client: &ApiClient, args: AddArgs, json: bool) -> Result<()> {
    let new = NewMapping {
        source_sheet_id: Some(args.source_sheet),
        source_tab: Some(args.source_tab),
        dest_sheet_id: Some(args.dest_sheet),
        dest_tab: Some(args.dest_tab),
        name: Some(args.name),
        description: args.description,
    };
    let mapping: Mapping = client.post_json("/api/mappings", &new)?;
    if json {
        return print_json(&mapping);
    }
    println!("✓ Added mapping '{}' ({})", mapping.name, mapping.id);
    Ok(())
}

fn update(client: &ApiClient, args: UpdateArgs, json: bool) -> Result<()> {
    let patch = MappingPatch {
        source_sheet_id: args.source_sheet,
        source_tab: args.source_tab,
        dest_sheet_id: args.dest_sheet,
        dest_tab: args.dest_tab,
        name: args.name,
        description: args.description,
    };
    if patch == MappingPatch::default() {
        bail!("nothing to change for mapping '{}'", args.id);
    }
    let mapping: Mapping = client.put_json(&format!("/api/mappings/{}", args.id), &patch)?;
    if json {
        return print_json(&mapping);
    }
    println!("✓ Updated mapping '{}' ({})", mapping.name, mapping.id);
    Ok(())
}

fn remove(client: &ApiClient, id: &str, json: bool) -> Result<()> {
    let reply: Value = client.delete(&format!("/api/mappings/{id}"))?;
    if json {
        return print_json(&reply);
    }
    println!("✓ Removed mapping {id}");
    Ok(())
}
