//! `hv issues` -- query harvested issues.

use std::collections::HashSet;

use anyhow::{Result, bail};
use serde::Serialize;

use harvest_core::filter::IssueFilter;
use harvest_core::hierarchy::{IssueTypeHierarchy, TypeId};
use harvest_core::issue::Issue;
use harvest_storage::{SqliteStore, Storage};
use harvest_ui::styles::{render_issue_compact, render_muted, tree_prefix};

use crate::cli::{IssuesArgs, IssuesCommands, IssuesListArgs, IssuesShowArgs, IssuesTreeArgs};
use crate::context::RuntimeContext;
use crate::output::{
    ISSUE_HEADERS, format_issue_detail, format_issue_row, output_json, output_table, type_name,
};

pub fn run(ctx: &RuntimeContext, args: &IssuesArgs) -> Result<()> {
    let (config, store) = ctx.open_store()?;
    let hierarchy = config.issue_hierarchy()?;
    match &args.command {
        IssuesCommands::List(a) => list(ctx, &store, &hierarchy, a),
        IssuesCommands::Show(a) => show(ctx, &store, &hierarchy, a),
        IssuesCommands::Tree(a) => tree(ctx, &store, &hierarchy, a),
        IssuesCommands::Count => {
            let count = store.count_issues()?;
            if ctx.json {
                output_json(&serde_json::json!({ "count": count }));
            } else {
                println!("{count}");
            }
            Ok(())
        }
    }
}

/// `--type` accepts a numeric id or a configured type name (case-insensitive).
fn resolve_type(hierarchy: &IssueTypeHierarchy, value: &str) -> Result<TypeId> {
    if let Ok(id) = value.parse::<TypeId>() {
        return Ok(id);
    }
    if let Some(t) = hierarchy.find_by_name(value) {
        return Ok(t.id);
    }
    if let Some(t) = hierarchy
        .types()
        .find(|t| t.name.eq_ignore_ascii_case(value))
    {
        return Ok(t.id);
    }
    if value.eq_ignore_ascii_case(&hierarchy.unknown().name) {
        return Ok(hierarchy.unknown().id);
    }
    bail!("unknown issue type {value:?} (see 'hv types')")
}

fn build_filter(hierarchy: &IssueTypeHierarchy, args: &IssuesListArgs) -> Result<IssueFilter> {
    Ok(IssueFilter {
        type_id: args
            .issue_type
            .as_deref()
            .map(|t| resolve_type(hierarchy, t))
            .transpose()?,
        parent_key: args.parent.clone(),
        status: args.status.clone(),
        assignee: args.assignee.clone(),
        source: None,
        label: args.label.clone(),
        summary_contains: args.search.clone(),
        no_parent: args.roots,
        limit: args.limit,
    })
}

fn list(
    ctx: &RuntimeContext,
    store: &SqliteStore,
    hierarchy: &IssueTypeHierarchy,
    args: &IssuesListArgs,
) -> Result<()> {
    let issues = store.list_issues(&build_filter(hierarchy, args)?)?;

    if ctx.json {
        output_json(&issues);
        return Ok(());
    }
    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = issues
        .iter()
        .map(|i| format_issue_row(i, hierarchy))
        .collect();
    output_table(ISSUE_HEADERS, &rows);
    Ok(())
}

#[derive(Serialize)]
struct IssueWithChildren {
    #[serde(flatten)]
    issue: Issue,
    children: Vec<Issue>,
}

fn children_of(store: &SqliteStore, key: &str) -> Result<Vec<Issue>> {
    Ok(store.list_issues(&IssueFilter {
        parent_key: Some(key.to_string()),
        ..Default::default()
    })?)
}

fn show(
    ctx: &RuntimeContext,
    store: &SqliteStore,
    hierarchy: &IssueTypeHierarchy,
    args: &IssuesShowArgs,
) -> Result<()> {
    let issue = store.get_issue(&args.key)?;
    let children = children_of(store, &issue.key)?;

    if ctx.json {
        output_json(&IssueWithChildren { issue, children });
        return Ok(());
    }

    println!("{}", format_issue_detail(&issue, hierarchy));
    if !children.is_empty() {
        println!();
        println!("Children ({}):", children.len());
        for child in &children {
            println!("  {}", render_issue_compact(child, type_name(child, hierarchy)));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TreeNode {
    #[serde(flatten)]
    issue: Issue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeNode>,
}

/// Builds the stored subtree below `issue`. `seen` guards against parent
/// links that loop back.
fn build_tree(
    store: &SqliteStore,
    issue: Issue,
    depth: u32,
    seen: &mut HashSet<String>,
) -> Result<TreeNode> {
    let mut children = Vec::new();
    if depth > 0 {
        for child in children_of(store, &issue.key)? {
            if seen.insert(child.key.clone()) {
                children.push(build_tree(store, child, depth - 1, seen)?);
            }
        }
    }
    Ok(TreeNode { issue, children })
}

fn print_tree(node: &TreeNode, hierarchy: &IssueTypeHierarchy, last_flags: &mut Vec<bool>) {
    println!(
        "{}{}",
        tree_prefix(last_flags),
        render_issue_compact(&node.issue, type_name(&node.issue, hierarchy))
    );
    let n = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        last_flags.push(i + 1 == n);
        print_tree(child, hierarchy, last_flags);
        last_flags.pop();
    }
}

fn tree(
    ctx: &RuntimeContext,
    store: &SqliteStore,
    hierarchy: &IssueTypeHierarchy,
    args: &IssuesTreeArgs,
) -> Result<()> {
    let starts = match &args.key {
        Some(key) => vec![store.get_issue(key)?],
        None => store.list_issues(&IssueFilter {
            no_parent: true,
            ..Default::default()
        })?,
    };

    let mut seen: HashSet<String> = starts.iter().map(|i| i.key.clone()).collect();
    let mut forest = Vec::with_capacity(starts.len());
    for start in starts {
        forest.push(build_tree(store, start, args.depth, &mut seen)?);
    }

    if ctx.json {
        output_json(&forest);
        return Ok(());
    }
    if forest.is_empty() {
        println!("{}", render_muted("No issues stored. Run 'hv reload run' first."));
        return Ok(());
    }
    for node in &forest {
        print_tree(node, hierarchy, &mut Vec::new());
    }
    Ok(())
}
