use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use ytconv_api::ApiClient;
use ytconv_config::{
    YtconvConfigData, config_exists, load_config, normalize_base_url, open_in_editor,
    resolve_base_url, resolve_default_bitrate, resolve_default_format, resolve_default_quality,
    resolve_max_poll_failures, resolve_poll_interval, resolve_quality_policy,
    resolve_simple_output, resolve_timeout, save_config, set_config_value,
};
use ytconv_core::{Bitrate, ConvertError, ConvertResult, Job, OutputType, is_allowed_youtube_url, validate_url};
use ytconv_workflow::{
    JobPoller, JobView, OutputSelection, PollSettings, PollState, Workflow, WorkflowSettings,
};

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow an existing job until it finishes
    Status {
        job_id: String,
        /// Directory to save the converted file into
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check that the backend can reach its job queue
    Ping,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Open config file in editor
    Edit,
}

#[derive(Debug, Parser)]
#[command(name = "ytconv")]
#[command(version, about = "Convert videos to mp3/mp4 through a conversion backend", long_about = None)]
struct Cli {
    /// Output format: mp3 (audio) or mp4 (video)
    #[arg(long, short = 'f')]
    format: Option<OutputType>,
    /// Preferred mp4 quality; replaced by the best parsed option
    #[arg(long, short = 'q')]
    quality: Option<String>,
    /// mp3 bitrate in kbps (128, 192 or 320)
    #[arg(long, short = 'b')]
    bitrate: Option<Bitrate>,
    /// File with one URL per line
    #[arg(long)]
    input: Option<String>,
    /// Directory to save finished files into
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    /// Print only download links
    #[arg(long)]
    simple: bool,
    /// Backend base URL, overrides config and environment
    #[arg(long)]
    api_base: Option<String>,
    #[arg(value_name = "URL")]
    urls: Vec<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

struct Session {
    api: Arc<ApiClient>,
    settings: WorkflowSettings,
    simple: bool,
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    // Handle config commands first
    if let Some(Commands::Config { action }) = cli.command {
        if let Err(err) = handle_config_command(action) {
            exit_with(&err);
        }
        return;
    }

    let mut config = load_config().unwrap_or_else(|err| exit_with(&err));
    let session = build_session(&cli, &mut config).unwrap_or_else(|err| exit_with(&err));

    match &cli.command {
        Some(Commands::Status { job_id, output }) => {
            let output = output.clone().or_else(|| session.output.clone());
            if let Err(err) = follow_job(&session, job_id, output.as_deref()).await {
                exit_with(&err);
            }
            return;
        }
        Some(Commands::Ping) => {
            match session.api.ping().await {
                Ok(true) => println!("{} backend queue is reachable", style("✓").green()),
                Ok(false) => {
                    eprintln!("{} backend answered but its queue is down", style("Error:").red());
                    std::process::exit(1);
                }
                Err(err) => exit_with(&err),
            }
            return;
        }
        Some(Commands::Config { .. }) | None => {}
    }

    let urls = gather_inputs(&cli).unwrap_or_else(|err| exit_with(&err));
    if urls.is_empty() {
        eprintln!("{} no input URLs provided", style("Error:").red());
        std::process::exit(1);
    }

    let selection = resolve_selection(&cli, &config).unwrap_or_else(|err| exit_with(&err));
    let mut workflow = Workflow::new(session.api.clone(), session.settings.clone(), selection);

    let mut success = 0usize;
    let mut failed = 0usize;

    for url in urls {
        match process_url(&session, &mut workflow, &url).await {
            Ok(()) => success += 1,
            Err(err) => {
                failed += 1;
                eprintln!("{} {url}: {}", style("Failed").red(), err.user_message());
            }
        }
    }

    if !session.simple {
        print_summary(success + failed, success, failed);
    }
    if failed > 0 {
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn exit_with(err: &ConvertError) -> ! {
    eprintln!("{} {err}", style("Error:").red());
    std::process::exit(1);
}

fn build_session(cli: &Cli, config: &mut YtconvConfigData) -> ConvertResult<Session> {
    let base_url = match &cli.api_base {
        Some(value) => normalize_base_url(value),
        None => resolve_or_prompt_base_url(config),
    };
    let api = ApiClient::try_new(base_url.clone(), resolve_timeout(config))?;
    tracing::debug!(%base_url, "using backend");

    let settings = WorkflowSettings {
        base_url,
        poll: PollSettings {
            interval: resolve_poll_interval(config),
            max_failures: resolve_max_poll_failures(config),
        },
        quality_policy: resolve_quality_policy(config)?,
    };

    Ok(Session {
        api: Arc::new(api),
        settings,
        simple: cli.simple || resolve_simple_output(config).unwrap_or(false),
        output: cli.output.clone(),
    })
}

fn resolve_selection(cli: &Cli, config: &YtconvConfigData) -> ConvertResult<OutputSelection> {
    let output_type = match cli.format.or(resolve_default_format(config)?) {
        Some(output_type) => output_type,
        None if io::stdin().is_terminal() => prompt_format()?,
        None => OutputType::default(),
    };

    Ok(OutputSelection {
        output_type,
        quality: cli
            .quality
            .clone()
            .unwrap_or_else(|| resolve_default_quality(config)),
        bitrate: match cli.bitrate {
            Some(bitrate) => bitrate,
            None => resolve_default_bitrate(config)?,
        },
    })
}

fn gather_inputs(cli: &Cli) -> ConvertResult<Vec<String>> {
    let mut urls = cli.urls.clone();

    if let Some(path) = &cli.input {
        let content = fs::read_to_string(path).map_err(|err| {
            ConvertError::InvalidInput(format!("failed to read input file: {err}"))
        })?;
        urls.extend(parse_lines(&content));
    }

    if urls.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| ConvertError::InvalidInput(format!("failed to read stdin: {err}")))?;
        urls.extend(parse_lines(&buffer));
    }

    Ok(urls)
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}

fn resolve_or_prompt_base_url(config: &mut YtconvConfigData) -> String {
    // Environment and an existing config file never prompt
    if std::env::var(ytconv_config::ENV_BASE_URL).is_ok() || config_exists().unwrap_or(true) {
        return resolve_base_url(config);
    }
    if !io::stdin().is_terminal() {
        return resolve_base_url(config);
    }

    // Config file doesn't exist - first time setup
    let theme = ColorfulTheme::default();
    println!(
        "{} Let's configure your ytconv settings",
        style("First-time setup:").bold().cyan()
    );

    let input: String = Input::with_theme(&theme)
        .with_prompt("Backend base URL")
        .default(ytconv_config::DEFAULT_BASE_URL.to_string())
        .interact_text()
        .unwrap_or_else(|_| ytconv_config::DEFAULT_BASE_URL.to_string());

    config.api.base_url = Some(normalize_base_url(&input));

    if let Err(err) = save_config(config) {
        eprintln!("{} {err}", style("Warning:").yellow());
    } else {
        println!(
            "{} Config file created at ~/.ytconv/config.toml",
            style("✓").green()
        );
    }

    resolve_base_url(config)
}

fn prompt_format() -> ConvertResult<OutputType> {
    let options = [OutputType::Mp3, OutputType::Mp4];
    let labels = ["MP3 (Audio)", "MP4 (Video)"];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select output format")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|err| ConvertError::InvalidInput(format!("selection failed: {err}")))?;

    Ok(options[selection])
}

fn handle_config_command(action: ConfigAction) -> ConvertResult<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = load_config()?;
            let value = get_nested_config_value(&config, &key);
            match value {
                Some(v) => println!("{} = {}", key, v),
                None => println!("{} = <null>", key),
            }
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            set_config_value(&key, &value)?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
            Ok(())
        }
        ConfigAction::List => {
            let config = load_config()?;
            println!("Current configuration:");
            for section in ["api", "default", "poll", "output"] {
                println!("\n[{section}]");
                for key in config_keys(section) {
                    let value = get_nested_config_value(&config, &format!("{section}.{key}"));
                    println!("{key} = {}", value.as_deref().unwrap_or("<null>"));
                }
            }
            Ok(())
        }
        ConfigAction::Edit => {
            open_in_editor()?;
            Ok(())
        }
    }
}

fn config_keys(section: &str) -> &'static [&'static str] {
    match section {
        "api" => &["base_url", "timeout_secs"],
        "default" => &["format", "quality", "bitrate", "quality_policy"],
        "poll" => &["interval_ms", "max_failures"],
        "output" => &["simple"],
        _ => &[],
    }
}

fn get_nested_config_value(config: &YtconvConfigData, key_path: &str) -> Option<String> {
    let parts: Vec<&str> = key_path.split('.').collect();

    match parts.as_slice() {
        ["api", "base_url"] => config.api.base_url.clone(),
        ["api", "timeout_secs"] => config.api.timeout_secs.map(|v| v.to_string()),
        ["default", "format"] => config.default.format.clone(),
        ["default", "quality"] => config.default.quality.clone(),
        ["default", "bitrate"] => config.default.bitrate.map(|v| v.to_string()),
        ["default", "quality_policy"] => config.default.quality_policy.clone(),
        ["poll", "interval_ms"] => config.poll.interval_ms.map(|v| v.to_string()),
        ["poll", "max_failures"] => config.poll.max_failures.map(|v| v.to_string()),
        ["output", "simple"] => config.output.simple.map(|b| b.to_string()),
        _ => None,
    }
}

// Runs before any request is sent; a malformed link never reaches the backend.
fn check_url(url: &str) -> ConvertResult<()> {
    validate_url(url)?;
    if !is_allowed_youtube_url(url.trim()) {
        tracing::warn!(%url, "url is not a YouTube link; the backend may reject it");
    }
    Ok(())
}

async fn process_url(
    session: &Session,
    workflow: &mut Workflow<ApiClient>,
    url: &str,
) -> ConvertResult<()> {
    check_url(url)?;

    workflow.set_url(url);
    let Some(job_id) = workflow.convert().await? else {
        return Err(ConvertError::InvalidInput("empty url".to_string()));
    };

    if !session.simple {
        if let Some(video) = workflow.video() {
            print_video(video);
        }
        print_selection(workflow);
        println!("  {} {job_id}", style("Job:").dim());
    }

    let simple = session.simple;
    let base_url = session.settings.base_url.clone();
    let poller = workflow
        .poller_mut()
        .ok_or_else(|| ConvertError::InvalidInput("job was not started".to_string()))?;
    let final_state = watch_job(poller, &base_url, simple).await;

    finish_job(session, &job_id, &final_state, session.output.as_deref()).await
}

async fn follow_job(session: &Session, job_id: &str, output: Option<&Path>) -> ConvertResult<()> {
    let mut poller = JobPoller::spawn(
        session.api.clone(),
        job_id.to_string(),
        session.settings.poll.clone(),
    );
    let final_state = watch_job(&mut poller, &session.settings.base_url, session.simple).await;
    finish_job(session, job_id, &final_state, output).await
}

async fn watch_job(poller: &mut JobPoller, base_url: &str, simple: bool) -> PollState {
    let job_id = poller.job_id().to_string();
    let mut last_line = String::new();
    poller
        .wait(|state| {
            if simple {
                return;
            }
            let Some(job) = state.job() else {
                return;
            };
            let line = status_line(&JobView::new(&job_id, Some(job), base_url));
            if line != last_line {
                println!("  {line}");
                last_line = line;
            }
        })
        .await
}

async fn finish_job(
    session: &Session,
    job_id: &str,
    state: &PollState,
    output: Option<&Path>,
) -> ConvertResult<()> {
    match state {
        PollState::Done(job) if job.is_finished() => {
            let view = JobView::new(job_id, Some(job), &session.settings.base_url);
            let link = view.download_url.clone().ok_or_else(|| {
                ConvertError::Parse("finished job has no download url".to_string())
            })?;
            if session.simple {
                println!("{link}");
            } else {
                println!("{} {link}", style("Download:").green());
            }
            if let Some(dir) = output {
                save_download(session, job, dir).await?;
            }
            Ok(())
        }
        PollState::Done(job) => {
            let view = JobView::new(job_id, Some(job), &session.settings.base_url);
            Err(ConvertError::JobFailed(view.error.unwrap_or_default()))
        }
        PollState::GaveUp { error, failures, .. } => Err(ConvertError::Network(format!(
            "stopped polling after {failures} failed status checks: {error}"
        ))),
        PollState::Pending | PollState::Running(_) => Err(ConvertError::Network(
            "job polling stopped unexpectedly".to_string(),
        )),
    }
}

async fn save_download(session: &Session, job: &Job, dir: &Path) -> ConvertResult<()> {
    let path = session.api.download(job, dir).await?;
    if !session.simple {
        println!("{} {}", style("Saved:").green(), path.display());
    }
    Ok(())
}

fn print_video(video: &ytconv_core::VideoMetadata) {
    let channel = video.channel.as_deref().unwrap_or("-");
    let duration = video
        .duration
        .map(|seconds| format!("{seconds}s"))
        .unwrap_or_else(|| "-".to_string());
    println!("{} {}", style("Video:").cyan(), video.title);
    println!("  {} {channel} • {duration}", style("Channel:").dim());
}

fn print_selection(workflow: &Workflow<ApiClient>) {
    let selection = workflow.selection();
    let detail = match selection.output_type {
        OutputType::Mp4 => selection.quality.clone(),
        OutputType::Mp3 => format!("{} kbps", selection.bitrate),
    };
    println!(
        "  {} {} ({detail})",
        style("Format:").dim(),
        selection.output_type
    );
}

fn status_line(view: &JobView) -> String {
    let status = match view.status.as_str() {
        "finished" => style("finished").green().to_string(),
        "failed" => style("failed").red().to_string(),
        other => style(other).yellow().to_string(),
    };
    format!(
        "{status} {} {:>3}%",
        style(format!("[{}]", view.stage)).dim(),
        view.progress
    )
}

fn print_summary(total: usize, success: usize, failed: usize) {
    println!(
        "{} Total: {} | Success: {} | Failed: {}",
        style("Summary:").bold(),
        total,
        success,
        failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lines_skips_blanks_and_comments() {
        let content = "https://youtu.be/a\n\n   \n# later\n  https://www.youtube.com/watch?v=b  \n";
        assert_eq!(
            parse_lines(content),
            vec![
                "https://youtu.be/a".to_string(),
                "https://www.youtube.com/watch?v=b".to_string()
            ]
        );
    }

    #[test]
    fn malformed_url_is_rejected_before_convert() {
        assert!(check_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(check_url("https://vimeo.com/1").is_ok());
        assert!(matches!(
            check_url("youtube.com/watch?v=abc"),
            Err(ConvertError::InvalidInput(_))
        ));
        assert!(matches!(
            check_url("file:///etc/passwd"),
            Err(ConvertError::InvalidInput(_))
        ));
    }

    #[test]
    fn cli_parses_format_and_bitrate() {
        let cli = Cli::try_parse_from([
            "ytconv",
            "--format",
            "mp3",
            "--bitrate",
            "320",
            "https://youtu.be/abc",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputType::Mp3));
        assert_eq!(cli.bitrate.map(|b| b.kbps()), Some(320));
        assert_eq!(cli.urls, vec!["https://youtu.be/abc".to_string()]);
    }

    #[test]
    fn cli_rejects_unsupported_bitrate() {
        assert!(Cli::try_parse_from(["ytconv", "--bitrate", "256", "https://youtu.be/abc"]).is_err());
    }

    #[test]
    fn cli_status_subcommand() {
        let cli = Cli::try_parse_from(["ytconv", "status", "job-1", "--output", "/tmp"]).unwrap();
        match cli.command {
            Some(Commands::Status { job_id, output }) => {
                assert_eq!(job_id, "job-1");
                assert_eq!(output, Some(PathBuf::from("/tmp")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn nested_config_lookup() {
        let mut config = YtconvConfigData::default();
        config.default.bitrate = Some(128);
        config.api.base_url = Some("http://10.0.0.2:8000".to_string());
        assert_eq!(
            get_nested_config_value(&config, "default.bitrate").as_deref(),
            Some("128")
        );
        assert_eq!(
            get_nested_config_value(&config, "api.base_url").as_deref(),
            Some("http://10.0.0.2:8000")
        );
        assert_eq!(get_nested_config_value(&config, "api.unknown"), None);
    }
}
