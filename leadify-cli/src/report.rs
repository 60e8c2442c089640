//! Markdown report rendering
//!
//! Consumes the engine's read-only `ReportSnapshot` and renders a
//! categorized document. Three styles: bullets (default), narrative, and
//! executive. The renderer is deliberately outside the engine; it only
//! reads the snapshot.

use chrono::Local;
use leadify_engine::{EntityRecord, ReportSnapshot};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Report style requested by the assignment or CLI flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportStyle {
    Bullets,
    Narrative,
    Executive,
}

impl std::str::FromStr for ReportStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bullets" => Ok(ReportStyle::Bullets),
            "narrative" => Ok(ReportStyle::Narrative),
            "executive" => Ok(ReportStyle::Executive),
            other => Err(format!(
                "unknown report style '{}', expected bullets, narrative or executive",
                other
            )),
        }
    }
}

/// Render a snapshot to markdown
pub fn render(snapshot: &ReportSnapshot, style: ReportStyle) -> String {
    let header = format!(
        "# {}\n\n**Generated**: {}  \n**Cycles run**: {}  \n**Sources**: {} accepted, {} rejected  \n**Entities found**: {}\n",
        snapshot.objective,
        Local::now().format("%Y-%m-%d %H:%M"),
        snapshot.cycles_run,
        snapshot.sources_accepted,
        snapshot.sources_rejected,
        snapshot.total_entities(),
    );

    let body = match style {
        ReportStyle::Bullets => render_bullets(snapshot),
        ReportStyle::Narrative => render_narrative(snapshot),
        ReportStyle::Executive => render_executive(snapshot),
    };

    format!(
        "{}\n{}\n## Sources\n\n{}\n\n---\n*Report generated by Leadify*\n",
        header,
        body,
        render_citations(snapshot)
    )
}

fn render_bullets(snapshot: &ReportSnapshot) -> String {
    let mut out = String::new();
    for (title, entities) in tier_sections(snapshot) {
        out.push_str(&format!("## {} ({})\n\n", title, entities.len()));
        if entities.is_empty() {
            out.push_str("None.\n\n");
            continue;
        }
        for entity in entities {
            out.push_str(&render_entity(entity));
        }
        out.push('\n');
    }
    out
}

fn render_entity(entity: &EntityRecord) -> String {
    let mut lines = vec![format!(
        "- **{}**{}\n",
        entity.name,
        entity
            .location
            .as_deref()
            .map(|l| format!(" — {}", l))
            .unwrap_or_default()
    )];

    for (label, field) in [
        ("Industry", "industry"),
        ("Size", "size"),
        ("Website", "website"),
    ] {
        if let Some(attr) = entity.attribute(field) {
            if let leadify_engine::research::types::AttributeValue::Text(ref value) = attr.value {
                lines.push(format!("  - {}: {}\n", label, value));
            }
        }
    }

    for (label, field) in [
        ("Decision makers", "decision_makers"),
        ("Need signals", "need_signals"),
        ("Contacts", "contacts"),
    ] {
        if let Some(attr) = entity.attribute(field) {
            if let leadify_engine::research::types::AttributeValue::List(ref values) = attr.value {
                lines.push(format!("  - {}: {}\n", label, values.join("; ")));
            }
        }
    }

    lines.push(format!(
        "  - Evidence: {} source{}\n",
        entity.distinct_sources(),
        if entity.distinct_sources() == 1 { "" } else { "s" }
    ));

    lines.concat()
}

fn render_narrative(snapshot: &ReportSnapshot) -> String {
    let mut out = String::from("## Findings\n\n");
    for (title, entities) in tier_sections(snapshot) {
        if entities.is_empty() {
            continue;
        }
        let names: Vec<String> = entities
            .iter()
            .map(|e| match e.location.as_deref() {
                Some(loc) => format!("{} ({})", e.name, loc),
                None => e.name.clone(),
            })
            .collect();
        out.push_str(&format!(
            "{} prospects — {}: {}.\n\n",
            title,
            entities.len(),
            names.join(", ")
        ));
    }
    out
}

fn render_executive(snapshot: &ReportSnapshot) -> String {
    let mut out = String::from("## Key Discoveries\n\n");
    out.push_str(&format!(
        "{} entities across {} cycles: {} hot, {} warm, {} cold.\n\n",
        snapshot.total_entities(),
        snapshot.cycles_run,
        snapshot.hot.len(),
        snapshot.warm.len(),
        snapshot.cold.len(),
    ));

    if !snapshot.hot.is_empty() {
        out.push_str("Ready for outreach:\n\n");
        for entity in &snapshot.hot {
            out.push_str(&render_entity(entity));
        }
        out.push('\n');
    }

    out.push_str(
        "## Next Steps\n\nWarm entries need the missing fields filled before outreach; \
         a follow-up assignment scoped to those gaps is the quickest path.\n",
    );
    out
}

fn tier_sections(snapshot: &ReportSnapshot) -> [(&'static str, &Vec<EntityRecord>); 3] {
    [
        ("Hot", &snapshot.hot),
        ("Warm", &snapshot.warm),
        ("Cold", &snapshot.cold),
    ]
}

fn render_citations(snapshot: &ReportSnapshot) -> String {
    let mut urls = BTreeSet::new();
    for entity in snapshot
        .hot
        .iter()
        .chain(&snapshot.warm)
        .chain(&snapshot.cold)
    {
        for provenance in &entity.provenance {
            urls.insert(provenance.url.clone());
        }
    }

    urls.iter()
        .enumerate()
        .map(|(i, url)| format!("{}. <{}>", i + 1, url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write a rendered report next to a timestamped file name
pub fn write_report(
    output_dir: &Path,
    objective: &str,
    content: &str,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let stem: String = objective
        .chars()
        .take(50)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let path = output_dir.join(format!(
        "{}_{}.md",
        stem.trim_matches('_'),
        Local::now().format("%Y%m%d_%H%M")
    ));

    std::fs::write(&path, content)?;
    Ok(path)
}
