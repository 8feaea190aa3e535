//! `hv types` -- show (and optionally sync) the configured issue type
//! hierarchy.

use anyhow::Result;
use chrono::Utc;

use harvest_core::hierarchy::{IssueTypeHierarchy, TypeId};
use harvest_storage::Storage;
use harvest_ui::styles::{ICON_WARN, render_accent, render_muted, render_warn, tree_prefix};

use crate::cli::TypesArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

pub fn run(ctx: &RuntimeContext, args: &TypesArgs) -> Result<()> {
    let (_, config) = ctx.load_config()?;
    let hierarchy = config.issue_hierarchy()?;
    let warnings = hierarchy.warnings();

    let synced = if args.sync {
        let (_, store) = ctx.open_store()?;
        let types: Vec<_> = hierarchy.types().cloned().collect();
        Some(store.sync_issue_types(&types, Utc::now())?)
    } else {
        None
    };

    if ctx.json {
        let types: Vec<_> = hierarchy.types().collect();
        output_json(&serde_json::json!({
            "types": types,
            "roots": hierarchy.roots(),
            "depth": hierarchy.depth(),
            "warnings": warnings,
            "synced": synced,
        }));
        return Ok(());
    }

    for root in hierarchy.roots() {
        print_type(&hierarchy, *root, &mut Vec::new());
    }
    println!(
        "{}",
        render_muted(&format!(
            "{} types, {} levels; unmatched types are stored as {:?}",
            hierarchy.len(),
            hierarchy.depth(),
            hierarchy.unknown().name
        ))
    );
    for w in &warnings {
        println!("{}", render_warn(&format!("{ICON_WARN} {w}")));
    }
    if let Some(s) = synced {
        println!(
            "Synced issue_types: {} added, {} updated, {} removed",
            s.added, s.updated, s.removed
        );
    }
    Ok(())
}

/// Prints a type and its allowed children. Validation guarantees the
/// hierarchy is acyclic.
fn print_type(h: &IssueTypeHierarchy, id: TypeId, last_flags: &mut Vec<bool>) {
    let Some(t) = h.get(id) else {
        return;
    };
    println!(
        "{}{} {}",
        tree_prefix(last_flags),
        render_accent(&t.name),
        render_muted(&format!("({})", t.id))
    );
    let n = t.children.len();
    for (i, child) in t.children.iter().enumerate() {
        last_flags.push(i + 1 == n);
        print_type(h, *child, last_flags);
        last_flags.pop();
    }
}
