//! CLI output: error mapping and text/JSON presentation of query results.

use crate::error::ResourceError;
use crate::filter::{FilterDescription, FilterType};
use crate::markers::MarkerInfo;
use crate::resource::{Resource, ResourceHandle};
use crate::workspace::ResourceSummary;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Map an error to the line printed on stderr. Workspace errors get a
/// stable category prefix.
pub fn map_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<ResourceError>() {
        Some(err) => format!("error[{:?}]: {}", err.kind(), err),
        None => format!("error: {:#}", e),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn decorations(summary: &ResourceSummary) -> String {
    let mut tags = Vec::new();
    if summary.phantom {
        tags.push("phantom".to_string());
    }
    if summary.kind == crate::types::ResourceKind::Project && !summary.open {
        tags.push("closed".to_string());
    }
    if summary.link {
        let target = summary
            .link_target
            .as_ref()
            .map(|t| t.display().to_string())
            .unwrap_or_default();
        tags.push(format!("-> {}", target));
    }
    if summary.is_virtual {
        tags.push("virtual".to_string());
    }
    if summary.derived {
        tags.push("derived".to_string());
    }
    if summary.hidden {
        tags.push("hidden".to_string());
    }
    if summary.team_private {
        tags.push("team-private".to_string());
    }
    if summary.markers > 0 {
        tags.push(format!("{} markers", summary.markers));
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(", "))
    }
}

/// Indented tree, one resource per line, relative to the first entry.
pub fn format_tree(entries: &[ResourceSummary], json: bool) -> anyhow::Result<String> {
    if json {
        return to_json(&entries);
    }
    let base = entries.first().map_or(0, |e| e.path.segment_count());
    let mut out = String::new();
    for entry in entries {
        let indent = "  ".repeat(entry.path.segment_count() - base);
        let name = entry.path.last_segment().unwrap_or("/");
        let name = if entry.kind.is_container() {
            format!("{}/", name).blue().bold().to_string()
        } else if entry.phantom {
            name.dimmed().to_string()
        } else {
            name.to_string()
        };
        out.push_str(&format!("{}{}{}\n", indent, name, decorations(entry).dimmed()));
    }
    Ok(out.trim_end().to_string())
}

pub fn format_members(members: &[ResourceSummary], json: bool) -> anyhow::Result<String> {
    if json {
        return to_json(&members);
    }
    if members.is_empty() {
        return Ok("No members".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Kind", "Stamp", "Flags"]);
    for member in members {
        table.add_row(vec![
            member.path.last_segment().unwrap_or("/").to_string(),
            member.kind.to_string(),
            member.modification_stamp.to_string(),
            decorations(member).trim().to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_summary(summary: &ResourceSummary, charset: Option<&str>, json: bool) -> anyhow::Result<String> {
    if json {
        let mut value = serde_json::to_value(summary)?;
        if let (Some(map), Some(charset)) = (value.as_object_mut(), charset) {
            map.insert("effective_charset".to_string(), charset.into());
        }
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    let mut lines = vec![
        format!("{} {}", summary.kind.to_string().bold(), summary.path),
        format!("  node:     {}", summary.node_id),
        format!("  stamp:    {}", summary.modification_stamp),
        format!("  local:    {}", if summary.local_exists { "yes" } else { "no" }),
    ];
    if let Some(charset) = charset {
        lines.push(format!("  charset:  {}", charset));
    }
    if let Some(target) = &summary.link_target {
        lines.push(format!("  link:     {}", target.display()));
    }
    if summary.filters > 0 {
        lines.push(format!("  filters:  {}", summary.filters));
    }
    let tags = decorations(summary);
    if !tags.is_empty() {
        lines.push(format!("  flags:   {}", tags));
    }
    Ok(lines.join("\n"))
}

fn filter_mode(filter_type: FilterType) -> String {
    let mut parts = vec![if filter_type.contains(FilterType::INCLUDE_ONLY) {
        "include"
    } else {
        "exclude"
    }];
    if filter_type.contains(FilterType::FILES) {
        parts.push("files");
    }
    if filter_type.contains(FilterType::FOLDERS) {
        parts.push("folders");
    }
    if filter_type.contains(FilterType::INHERITABLE) {
        parts.push("inheritable");
    }
    parts.join(",")
}

pub fn format_filters(filters: &[FilterDescription], json: bool) -> anyhow::Result<String> {
    if json {
        let rows: Vec<serde_json::Value> = filters
            .iter()
            .map(|f| {
                serde_json::json!({
                    "id": f.id(),
                    "mode": filter_mode(f.filter_type()),
                    "matcher": f.matcher(),
                })
            })
            .collect();
        return to_json(&rows);
    }
    if filters.is_empty() {
        return Ok("No filters".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Mode", "Matcher"]);
    for filter in filters {
        table.add_row(vec![
            filter.id().to_string(),
            filter_mode(filter.filter_type()),
            format!("{:?}", filter.matcher()),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_markers(markers: &[(Resource, MarkerInfo)]) -> String {
    if markers.is_empty() {
        return "No markers".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Resource", "Id", "Type", "Message"]);
    for (resource, marker) in markers {
        table.add_row(vec![
            resource.path().to_string(),
            marker.id.to_string(),
            marker.marker_type.clone(),
            marker
                .string_attribute(crate::markers::attributes::MESSAGE)
                .unwrap_or("")
                .to_string(),
        ]);
    }
    table.to_string()
}
