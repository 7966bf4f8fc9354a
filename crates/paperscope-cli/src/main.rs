use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperscope_core::{
    AdvancedSearchOptions, ApiError, ConditionGroup, Config, GroupOperator, PaperId, ProjectId,
    Session, SummaryStatus, TextCondition, TextField, config_file, deserialize_options,
    search_query_string,
};
use paperscope_core::config_file::{ApiConfig, CacheConfig, ConfigFile};
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Search, read, summarise and chat about academic papers
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base URL of the paper backend
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token from `paperscope login`
    #[arg(long, global = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search papers, optionally with an advanced filter
    Search {
        /// Free-text query
        query: Vec<String>,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Download PDFs into a directory
    Pdf {
        /// Paper ids; repeated ids are served from the in-memory cache
        #[arg(required = true)]
        paper_ids: Vec<PaperId>,

        /// Directory to write `paper_<id>.pdf` files into
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Ask the backend for an AI summary of a paper
    Summarize { paper_id: PaperId },

    /// Chat about a paper. Without a message, starts an interactive session
    Chat {
        paper_id: PaperId,
        message: Vec<String>,
    },

    /// Log in and print the access token
    Login { username: String },

    /// Manage project collections
    Projects {
        #[command(subcommand)]
        action: ProjectsCommand,
    },

    /// Convert filters to and from their URL form
    Filter {
        #[command(subcommand)]
        action: FilterCommand,
    },

    /// Inspect or write the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print where the config file lives
    Path,
    /// Write the resolved settings to a config file
    Init {
        /// Write here instead of the platform config directory
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectsCommand {
    /// List your projects
    List,
    /// Create a project
    Create { name: Vec<String> },
    /// Delete a project
    Delete { project_id: ProjectId },
    /// Show the papers in a project
    Show { project_id: ProjectId },
    /// Add a paper to a project
    Add {
        project_id: ProjectId,
        paper_id: PaperId,
    },
    /// Remove a paper from a project
    Remove {
        project_id: ProjectId,
        paper_id: PaperId,
    },
}

#[derive(Subcommand, Debug)]
enum FilterCommand {
    /// Print the URL value for a filter
    Encode {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Describe a URL filter value
    Decode { value: String },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Earliest publication year (inclusive)
    #[arg(long)]
    year_from: Option<i32>,

    /// Latest publication year (inclusive)
    #[arg(long)]
    year_to: Option<i32>,

    /// Title must contain TEXT (repeatable)
    #[arg(long = "title", value_name = "TEXT")]
    title: Vec<String>,

    /// Abstract must contain TEXT (repeatable)
    #[arg(long = "abstract", value_name = "TEXT")]
    abstract_text: Vec<String>,

    /// Title must not contain TEXT (repeatable)
    #[arg(long, value_name = "TEXT")]
    not_title: Vec<String>,

    /// Abstract must not contain TEXT (repeatable)
    #[arg(long, value_name = "TEXT")]
    not_abstract: Vec<String>,

    /// Match any condition instead of all of them
    #[arg(long)]
    any: bool,

    /// A filter in URL form, as printed by `filter encode`
    #[arg(
        long,
        value_name = "ENCODED",
        conflicts_with_all = ["year_from", "year_to", "title", "abstract_text", "not_title", "not_abstract", "any"]
    )]
    filters: Option<String>,
}

impl FilterArgs {
    /// The filter described by the flags, or `None` when nothing is set.
    fn to_options(&self) -> anyhow::Result<Option<AdvancedSearchOptions>> {
        if let Some(encoded) = &self.filters {
            let options = deserialize_options(Some(encoded.as_str()))
                .context("--filters is not a valid filter value")?;
            return Ok(Some(options).filter(|o| o.is_active()));
        }

        let operator = if self.any {
            GroupOperator::Or
        } else {
            GroupOperator::And
        };
        let mut root = ConditionGroup::new(operator);
        for value in &self.title {
            root.push(TextCondition::contains(TextField::Title, value));
        }
        for value in &self.abstract_text {
            root.push(TextCondition::contains(TextField::Abstract, value));
        }
        for value in &self.not_title {
            root.push(TextCondition::not_contains(TextField::Title, value));
        }
        for value in &self.not_abstract {
            root.push(TextCondition::not_contains(TextField::Abstract, value));
        }

        let options = AdvancedSearchOptions::new(self.year_from, self.year_to, root);
        Ok(Some(options).filter(|o| o.is_active()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let color = ColorMode(!cli.no_color && std::io::stdout().is_terminal());
    let mut out: Box<dyn Write> = Box::new(std::io::stdout());

    let config = resolve_config(&cli);
    tracing::debug!(?config, "resolved configuration");
    let session = Session::from_config(&config)?;

    match cli.command {
        Command::Search { query, filters } => {
            let query = query.join(" ");
            let options = filters.to_options()?;
            let pb = spinner(format!("Searching for \"{}\"...", query));
            let papers = session.search(&query, options.as_ref()).await;
            pb.finish_and_clear();
            let papers = papers.map_err(explain)?;
            let share = search_query_string(&query, options.as_ref());
            output::print_search_results(
                &mut out,
                &query,
                &papers,
                options.as_ref(),
                &share,
                color,
            )?;
        }
        Command::Pdf { paper_ids, out_dir } => {
            download_pdfs(&session, &paper_ids, &out_dir, &mut out, color).await?;
        }
        Command::Summarize { paper_id } => {
            let pb = spinner(format!("Summarising paper {}...", paper_id));
            let entry = session.summaries().summarise(paper_id, false).await;
            pb.finish_and_clear();
            output::print_summary(&mut out, paper_id, &entry, color)?;
            if entry.status == SummaryStatus::Error {
                anyhow::bail!("Could not summarise paper {}", paper_id);
            }
        }
        Command::Chat { paper_id, message } => {
            if message.is_empty() {
                interactive_chat(&session, paper_id, &mut out, color).await?;
            } else {
                let pb = spinner("Waiting for an answer...");
                let result = session.chat().send_message(paper_id, &message.join(" ")).await;
                pb.finish_and_clear();
                output::print_chat(&mut out, &session.chat().messages(paper_id), color)?;
                result.map_err(explain)?;
            }
        }
        Command::Login { username } => {
            let response = session.login(&username).await.map_err(explain)?;
            writeln!(out, "Logged in as {}", response.user.user_name)?;
            writeln!(out, "export PAPERSCOPE_TOKEN={}", response.access_token)?;
        }
        Command::Projects { action } => {
            projects_command(&session, action, &mut out, color).await?;
        }
        Command::Filter { action } => filter_command(&action, &mut out)?,
        Command::Config { action } => config_command(&config, action, &mut out)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(cli: &Cli) -> Config {
    let mut config = Config::from_config_file(&config_file::load_config());

    if let Some(url) = cli
        .api_url
        .clone()
        .or_else(|| std::env::var("PAPERSCOPE_API_URL").ok())
    {
        config.api_base_url = url;
    }
    if let Some(secs) = cli.timeout.or_else(|| {
        std::env::var("PAPERSCOPE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
    }) {
        config.timeout_secs = secs;
    }
    config.access_token = cli
        .token
        .clone()
        .or_else(|| std::env::var("PAPERSCOPE_TOKEN").ok())
        .filter(|t| !t.is_empty());
    config
}

fn spinner(message: impl Into<std::borrow::Cow<'static, str>>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Attach a hint to errors the user can fix.
fn explain(e: ApiError) -> anyhow::Error {
    match e {
        ApiError::Unauthorized(_) => anyhow::Error::new(e)
            .context("Not logged in. Run `paperscope login <username>` and set PAPERSCOPE_TOKEN"),
        ApiError::RateLimited { .. } => {
            anyhow::Error::new(e).context("The server is busy, try again shortly")
        }
        other => anyhow::Error::new(other),
    }
}

async fn download_pdfs(
    session: &Session,
    paper_ids: &[PaperId],
    out_dir: &Path,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut failed = 0;
    for &paper_id in paper_ids {
        let cached = session.pdfs().contains(paper_id);
        let pb = spinner(format!("Fetching PDF for paper {}...", paper_id));
        let result = session.pdf(paper_id).await;
        pb.finish_and_clear();

        match result {
            Ok(blob) => {
                let path = out_dir.join(format!("paper_{}.pdf", paper_id));
                std::fs::write(&path, &blob)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                output::print_pdf_saved(out, paper_id, &path, blob.len(), cached, color)?;
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(paper_id, error = %e, "pdf download failed");
                writeln!(out, "[{}] -> failed: {}", paper_id, e)?;
            }
        }
    }

    let cache = session.pdfs();
    tracing::debug!(
        hits = cache.hits(),
        misses = cache.misses(),
        evictions = cache.evictions(),
        "pdf cache stats"
    );
    if failed > 0 {
        anyhow::bail!("{} of {} downloads failed", failed, paper_ids.len());
    }
    Ok(())
}

async fn interactive_chat(
    session: &Session,
    paper_id: PaperId,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    writeln!(
        out,
        "Chatting about paper {}. Type /clear to start over, /quit to leave.",
        paper_id
    )?;
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        match line.trim() {
            "/quit" => break,
            "/clear" => {
                session.chat().clear_session(paper_id);
                writeln!(out, "History cleared.")?;
                continue;
            }
            _ => {}
        }

        let pb = spinner("Waiting for an answer...");
        let result = session.chat().send_message(paper_id, &line).await;
        pb.finish_and_clear();
        match result {
            Ok(Some(reply)) => output::print_chat(out, std::slice::from_ref(&reply), color)?,
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "chat turn failed");
                if let Some(apology) = session.chat().messages(paper_id).last() {
                    output::print_chat(out, std::slice::from_ref(apology), color)?;
                }
            }
        }
    }
    Ok(())
}

async fn projects_command(
    session: &Session,
    action: ProjectsCommand,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    let api = session.api();
    match action {
        ProjectsCommand::List => {
            let projects = api.list_projects().await.map_err(explain)?;
            output::print_projects(out, &projects, color)?;
        }
        ProjectsCommand::Create { name } => {
            let name = name.join(" ");
            if name.trim().is_empty() {
                anyhow::bail!("Project name must not be empty");
            }
            let project = api.create_project(&name).await.map_err(explain)?;
            writeln!(
                out,
                "Created project {} ({})",
                project.project_name, project.project_id
            )?;
        }
        ProjectsCommand::Delete { project_id } => {
            api.delete_project(project_id).await.map_err(explain)?;
            writeln!(out, "Deleted project {}", project_id)?;
        }
        ProjectsCommand::Show { project_id } => {
            let project = api.project_papers(project_id).await.map_err(explain)?;
            output::print_project(out, &project, color)?;
        }
        ProjectsCommand::Add {
            project_id,
            paper_id,
        } => {
            let project = api
                .add_paper_to_project(project_id, paper_id)
                .await
                .map_err(explain)?;
            output::print_project(out, &project, color)?;
        }
        ProjectsCommand::Remove {
            project_id,
            paper_id,
        } => {
            let project = api
                .remove_paper_from_project(project_id, paper_id)
                .await
                .map_err(explain)?;
            output::print_project(out, &project, color)?;
        }
    }
    Ok(())
}

fn filter_command(action: &FilterCommand, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        FilterCommand::Encode { filters } => {
            let Some(options) = filters.to_options()? else {
                anyhow::bail!("No filter given; pass at least one of --year-from, --year-to, --title, --abstract, --not-title, --not-abstract");
            };
            match options.to_url_param() {
                Some(encoded) => writeln!(out, "{}", encoded)?,
                None => anyhow::bail!("Filter could not be encoded"),
            }
        }
        FilterCommand::Decode { value } => match deserialize_options(Some(value.as_str())) {
            Some(options) => writeln!(out, "{}", output::describe_options(&options))?,
            None => anyhow::bail!("Not a valid filter value"),
        },
    }
    Ok(())
}

/// The settings worth persisting; the token stays out of the file.
fn config_to_file(config: &Config) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            base_url: Some(config.api_base_url.clone()),
            timeout_secs: Some(config.timeout_secs),
        }),
        cache: Some(CacheConfig {
            pdf_capacity: Some(config.pdf_cache_capacity),
        }),
    }
}

fn config_command(config: &Config, action: ConfigCommand, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        ConfigCommand::Path => match config_file::config_path() {
            Some(path) => writeln!(out, "{}", path.display())?,
            None => anyhow::bail!("Could not determine config directory"),
        },
        ConfigCommand::Init { path, force } => {
            if !force
                && let Some(existing) = path
                    .clone()
                    .or_else(config_file::config_path)
                    .filter(|p| p.exists())
            {
                anyhow::bail!(
                    "{} already exists; pass --force to overwrite it",
                    existing.display()
                );
            }
            let file = config_to_file(config);
            let written = match path {
                Some(path) => config_file::save_to_path(&file, &path).map(|()| path),
                None => config_file::save_config(&file),
            }
            .map_err(anyhow::Error::msg)?;
            writeln!(out, "Wrote {}", written.display())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperscope_core::{FilterNode, MatchOperator};

    #[test]
    fn no_flags_means_no_filter() {
        assert_eq!(FilterArgs::default().to_options().unwrap(), None);
    }

    #[test]
    fn flags_build_a_group() {
        let args = FilterArgs {
            year_from: Some(2020),
            title: vec!["graph".into()],
            not_abstract: vec!["survey".into()],
            any: true,
            ..Default::default()
        };
        let options = args.to_options().unwrap().unwrap();
        assert_eq!(options.year_from, Some(2020));
        assert_eq!(options.root.operator, GroupOperator::Or);
        assert_eq!(options.root.children.len(), 2);
        match &options.root.children[1] {
            FilterNode::Condition(c) => {
                assert_eq!(c.field, TextField::Abstract);
                assert_eq!(c.operator, MatchOperator::NotContains);
                assert_eq!(c.value, "survey");
            }
            other => panic!("expected a condition, got {other:?}"),
        }
    }

    #[test]
    fn encoded_filters_are_decoded() {
        let options = AdvancedSearchOptions::new(Some(1999), None, ConditionGroup::default());
        let args = FilterArgs {
            filters: options.to_url_param(),
            ..Default::default()
        };
        assert_eq!(args.to_options().unwrap(), Some(options));
    }

    #[test]
    fn bad_encoded_filters_are_an_error() {
        let args = FilterArgs {
            filters: Some("not json!!".into()),
            ..Default::default()
        };
        assert!(args.to_options().is_err());
    }

    #[test]
    fn cli_parses_search_flags() {
        let cli = Cli::parse_from([
            "paperscope",
            "search",
            "graph",
            "networks",
            "--year-to",
            "2022",
            "--abstract",
            "attention",
            "--no-color",
        ]);
        assert!(cli.no_color);
        match cli.command {
            Command::Search { query, filters } => {
                assert_eq!(query, vec!["graph", "networks"]);
                assert_eq!(filters.year_to, Some(2022));
                assert_eq!(filters.abstract_text, vec!["attention"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn filters_flag_conflicts_with_builders() {
        let parsed = Cli::try_parse_from([
            "paperscope",
            "search",
            "x",
            "--filters",
            "abc",
            "--title",
            "y",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn flag_beats_file_for_api_url() {
        let cli = Cli::parse_from(["paperscope", "--api-url", "http://flag.example", "login", "ada"]);
        assert_eq!(resolve_config(&cli).api_base_url, "http://flag.example");
    }

    #[test]
    fn config_init_writes_settings_without_token() {
        let dir = std::env::temp_dir().join(format!("paperscope_cli_test_{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_file(&path);
        let config = Config {
            api_base_url: "https://papers.example".into(),
            pdf_cache_capacity: 3,
            access_token: Some("secret-token".into()),
            ..Config::default()
        };

        let mut out = Vec::new();
        let init = |force| ConfigCommand::Init {
            path: Some(path.clone()),
            force,
        };
        config_command(&config, init(false), &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Wrote "));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret-token"));
        let loaded = config_file::load_from_path(&path).unwrap();
        assert_eq!(Config::from_config_file(&loaded).api_base_url, "https://papers.example");
        assert_eq!(Config::from_config_file(&loaded).pdf_cache_capacity, 3);

        assert!(config_command(&config, init(false), &mut Vec::new()).is_err());
        config_command(&config, init(true), &mut Vec::new()).unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
