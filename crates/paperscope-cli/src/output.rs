use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use paperscope_core::{
    AdvancedSearchOptions, ChatMessage, ChatRole, ConditionGroup, FilterNode, MatchOperator,
    Paper, PaperId, SummaryEntry, SummaryStatus,
};
use paperscope_core::models::{Project, ProjectWithPapers, to_papers};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", sep)?;
    }
    Ok(())
}

/// Print search hits, the active filter and a shareable query string.
pub fn print_search_results(
    w: &mut dyn Write,
    query: &str,
    papers: &[Paper],
    options: Option<&AdvancedSearchOptions>,
    share: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, &format!("RESULTS FOR \"{}\"", query), color)?;
    if let Some(options) = options.filter(|o| o.is_active()) {
        let msg = format!("Filter: {}", describe_options(options));
        if color.enabled() {
            writeln!(w, "{}", msg.dimmed())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    writeln!(w)?;

    if papers.is_empty() {
        writeln!(w, "No papers found.")?;
    }
    for paper in papers {
        print_paper_line(w, paper, color)?;
    }

    writeln!(w)?;
    writeln!(w, "  {} result(s)", papers.len())?;
    if color.enabled() {
        writeln!(w, "  Share: {}", share.cyan())?;
    } else {
        writeln!(w, "  Share: {}", share)?;
    }
    Ok(())
}

fn print_paper_line(w: &mut dyn Write, paper: &Paper, color: ColorMode) -> std::io::Result<()> {
    let year = if paper.year > 0 {
        paper.year.to_string()
    } else {
        "n.d.".to_string()
    };
    let author = if paper.author.is_empty() {
        "Unknown authors"
    } else {
        paper.author.as_str()
    };
    if color.enabled() {
        writeln!(
            w,
            "[{}] {} ({})",
            paper.paper_id.to_string().cyan(),
            truncate(&paper.title, 80).bold(),
            year
        )?;
        writeln!(w, "      {}", truncate(author, 80).dimmed())?;
    } else {
        writeln!(w, "[{}] {} ({})", paper.paper_id, truncate(&paper.title, 80), year)?;
        writeln!(w, "      {}", truncate(author, 80))?;
    }
    Ok(())
}

/// Report where a downloaded PDF was written.
pub fn print_pdf_saved(
    w: &mut dyn Write,
    paper_id: PaperId,
    path: &Path,
    bytes: usize,
    cached: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let source = if cached { "cache" } else { "server" };
    if color.enabled() {
        writeln!(
            w,
            "[{}] -> {} ({} bytes from {})",
            paper_id,
            path.display().green(),
            bytes,
            source
        )
    } else {
        writeln!(
            w,
            "[{}] -> {} ({} bytes from {})",
            paper_id,
            path.display(),
            bytes,
            source
        )
    }
}

pub fn print_summary(
    w: &mut dyn Write,
    paper_id: PaperId,
    entry: &SummaryEntry,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, &format!("SUMMARY OF PAPER {}", paper_id), color)?;
    match entry.status {
        SummaryStatus::Success => {
            writeln!(w, "{}", entry.summary.as_deref().unwrap_or(""))?;
        }
        SummaryStatus::Error => {
            let msg = entry.error.as_deref().unwrap_or("Unknown error");
            if color.enabled() {
                writeln!(w, "{} {}", "ERROR:".red(), msg)?;
            } else {
                writeln!(w, "ERROR: {}", msg)?;
            }
        }
        SummaryStatus::Idle | SummaryStatus::Loading => {
            writeln!(w, "No summary available.")?;
        }
    }
    Ok(())
}

pub fn print_chat(
    w: &mut dyn Write,
    messages: &[ChatMessage],
    color: ColorMode,
) -> std::io::Result<()> {
    for message in messages {
        let label = match message.role {
            ChatRole::User => "You:",
            ChatRole::Assistant => "AI:",
        };
        if color.enabled() {
            match message.role {
                ChatRole::User => writeln!(w, "{} {}", label.bold(), message.content)?,
                ChatRole::Assistant => writeln!(w, "{} {}", label.cyan(), message.content)?,
            }
        } else {
            writeln!(w, "{} {}", label, message.content)?;
        }
    }
    Ok(())
}

pub fn print_projects(
    w: &mut dyn Write,
    projects: &[Project],
    color: ColorMode,
) -> std::io::Result<()> {
    if projects.is_empty() {
        writeln!(w, "No projects yet.")?;
        return Ok(());
    }
    for project in projects {
        if color.enabled() {
            writeln!(
                w,
                "[{}] {} {}",
                project.project_id.to_string().cyan(),
                project.project_name.bold(),
                project.created_date().dimmed()
            )?;
        } else {
            writeln!(
                w,
                "[{}] {} {}",
                project.project_id,
                project.project_name,
                project.created_date()
            )?;
        }
    }
    Ok(())
}

pub fn print_project(
    w: &mut dyn Write,
    project: &ProjectWithPapers,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(
        w,
        &format!(
            "{} (created {})",
            project.project.project_name,
            project.project.created_date()
        ),
        color,
    )?;
    if project.papers.is_empty() {
        writeln!(w, "No papers in this project.")?;
    }
    for paper in to_papers(&project.papers) {
        print_paper_line(w, &paper, color)?;
    }
    Ok(())
}

/// Human-readable rendering of a filter, e.g.
/// `2019..=2021, (title contains "graph" OR NOT abstract contains "survey")`.
pub fn describe_options(options: &AdvancedSearchOptions) -> String {
    let mut parts = Vec::new();
    match (options.year_from, options.year_to) {
        (Some(from), Some(to)) => parts.push(format!("{}..={}", from, to)),
        (Some(from), None) => parts.push(format!("{}..", from)),
        (None, Some(to)) => parts.push(format!("..={}", to)),
        (None, None) => {}
    }
    if !options.root.is_empty() {
        parts.push(describe_group(&options.root));
    }
    parts.join(", ")
}

fn describe_group(group: &ConditionGroup) -> String {
    let children: Vec<String> = group
        .children
        .iter()
        .map(|node| match node {
            FilterNode::Condition(c) => {
                let negation = match c.operator {
                    MatchOperator::Contains => "",
                    MatchOperator::NotContains => "NOT ",
                };
                format!("{}{} contains \"{}\"", negation, c.field.as_str(), c.value)
            }
            FilterNode::Group(g) => describe_group(g),
        })
        .collect();
    format!("({})", children.join(&format!(" {} ", group.operator.as_str())))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
