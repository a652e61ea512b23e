//! Reframe command-line front-end
//!
//! Usage:
//!   reframe [--config <file>] [--verbose] <command> [args]
//!
//! Commands:
//!   create <video>                          Create a project from a video
//!   list                                    List projects, newest first
//!   status <project>                        Show a project's contents and next step
//!   extract <project> [--threshold <n>]     Split the video into keyframes
//!   import <project> <path>...              Replace the modified images
//!   compose <project> [--timing <file>]     Compose modified images into a video
//!   delete <project>                        Delete a project
//!   config [init]                           Show (or write) the configuration
//!
//! `<project>` is a project directory name under the workspace, or a path.

use std::io::Write;
use std::path::PathBuf;

use reframe_lib::config::{get_config_path, Config};
use reframe_lib::jobs::{self, ComposeJob, ExtractJob, JobEvent, JobFailure};
use reframe_lib::{Error, ErrorKind, ProjectStore, StageReport};

struct Cli {
    config_path: PathBuf,
    verbose: bool,
    command: String,
    args: Vec<String>,
}

fn parse_args(raw: Vec<String>) -> Result<Cli, Error> {
    let mut config_path = None;
    let mut verbose = false;
    let mut command = None;
    let mut args = Vec::new();

    let mut iter = raw.into_iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" if command.is_none() => {
                let path = iter
                    .next()
                    .ok_or_else(|| Error::InvalidInput("--config needs a file".into()))?;
                config_path = Some(PathBuf::from(path));
            }
            "--verbose" | "-v" => verbose = true,
            _ if command.is_none() => command = Some(arg),
            _ => args.push(arg),
        }
    }

    Ok(Cli {
        config_path: config_path.unwrap_or_else(get_config_path),
        verbose,
        command: command.ok_or_else(|| Error::InvalidInput(format!("no command given\n\n{}", USAGE)))?,
        args,
    })
}

const USAGE: &str = "usage: reframe [--config <file>] [--verbose] \
<create|list|status|extract|import|compose|delete|config> [args]";

/// Remove `--name <value>` from `args`
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>, Error> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(Error::InvalidInput(format!("{} needs a value", name)));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn single_arg(args: &[String], what: &str) -> Result<String, Error> {
    match args {
        [one] => Ok(one.clone()),
        _ => Err(Error::InvalidInput(format!("expected exactly one {}", what))),
    }
}

/// Single-line progress on stderr, redrawn when the percentage changes
struct ProgressLine {
    label: &'static str,
    last: Option<u64>,
}

impl ProgressLine {
    fn new(label: &'static str) -> Self {
        Self { label, last: None }
    }

    fn update(&mut self, current: u64, total: u64) {
        let key = if total > 0 { current * 100 / total } else { current };
        if self.last == Some(key) {
            return;
        }
        self.last = Some(key);

        let mut stderr = std::io::stderr();
        let _ = if total > 0 {
            write!(stderr, "\r{} {}/{} ({}%)", self.label, current, total, key)
        } else {
            write!(stderr, "\r{} {}", self.label, current)
        };
        let _ = stderr.flush();
    }

    fn finish(&self) {
        if self.last.is_some() {
            eprintln!();
        }
    }
}

fn forward_event<T>(progress: &mut ProgressLine, event: &JobEvent<T>) {
    match event {
        JobEvent::Progress { current, total } => progress.update(*current, *total),
        JobEvent::Log(message) => log::debug!("{}", message),
        _ => {}
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_or_default(&cli.config_path);
    log::debug!("Using config {} (workspace {})", cli.config_path.display(), config.workspace_root.display());

    let mut args = cli.args;
    if cli.command == "config" {
        return run_config(&config, &cli.config_path, &args);
    }

    let store = ProjectStore::new(&config.workspace_root)?;

    match cli.command.as_str() {
        "create" => {
            let video = single_arg(&args, "video path")?;
            let project = store.create_project_from_video(&video)?;
            println!("Created {} at {}", project.name, project.root.display());
        }

        "list" => {
            let projects = store.list_projects()?;
            if projects.is_empty() {
                println!("No projects in {}", store.projects_root().display());
            }
            for project in projects {
                let stage = StageReport::from_state(&store.get_project_state(&project)?);
                println!(
                    "{}  created {}  next: {}",
                    project.name,
                    project.created_at,
                    stage.current_stage().label()
                );
            }
        }

        "status" => {
            let project = store.find_project(&single_arg(&args, "project")?)?;
            let state = store.get_project_state(&project)?;

            println!("{} ({})", project.name, project.root.display());
            match &project.original_video {
                Some(video) => println!("  video:     {}", video.display()),
                None => println!("  video:     none"),
            }
            println!("  keyframes: {}", state.frame_count);
            println!("  modified:  {}", state.modified_count);
            if let Some(timing) = &state.selected_timing {
                let info = store.read_timing_info(timing)?;
                println!(
                    "  timing:    {} ({} scenes, {} frames at {} fps)",
                    timing.display(),
                    info.scene_count,
                    info.duration_frames,
                    info.fps
                );
            }
            for output in &state.output_files {
                println!("  output:    {}", output.display());
            }
            println!();
            print!("{}", StageReport::from_state(&state));
        }

        "extract" => {
            let threshold = match take_option(&mut args, "--threshold")? {
                Some(value) => value
                    .parse::<u64>()
                    .map_err(|_| Error::InvalidInput(format!("invalid threshold '{}'", value)))?,
                None => config.threshold,
            };
            let project = store.find_project(&single_arg(&args, "project")?)?;

            let job = ExtractJob::new(project)
                .with_threshold(threshold)
                .with_format(config.keyframe_format);
            let mut progress = ProgressLine::new("Extracting");
            let result = jobs::spawn_extract(job)?.join(|event| forward_event(&mut progress, event));
            progress.finish();
            println!("{}", jobs::extract_message(&result?));
        }

        "import" => {
            if args.len() < 2 {
                return Err(Error::InvalidInput("import needs a project and at least one path".into()).into());
            }
            let project = store.find_project(&args[0])?;
            let copied = store.replace_modified_images(&project, &args[1..])?;
            println!("Imported {} images into {}", copied, project.modified_dir.display());
        }

        "compose" => {
            let timing = take_option(&mut args, "--timing")?;
            let project = store.find_project(&single_arg(&args, "project")?)?;
            let timing = match timing {
                Some(path) => PathBuf::from(path),
                None => store
                    .get_project_state(&project)?
                    .selected_timing
                    .ok_or_else(|| Error::not_found("Timing file", &project.timestamps_dir))?,
            };

            let job = ComposeJob::new(project, timing)
                .with_canvas_policy(config.canvas_policy)
                .with_encoder(config.encoder_config());
            let mut progress = ProgressLine::new("Composing");
            let result = jobs::spawn_compose(job)?.join(|event| forward_event(&mut progress, event));
            progress.finish();
            println!("{}", jobs::compose_message(&result?));
        }

        "delete" => {
            let dir = store.project_dir(&single_arg(&args, "project")?);
            store.delete_project(&dir)?;
            println!("Deleted {}", dir.display());
        }

        other => {
            return Err(Error::InvalidInput(format!("unknown command '{}'\n\n{}", other, USAGE)).into());
        }
    }

    Ok(())
}

fn run_config(config: &Config, config_path: &std::path::Path, args: &[String]) -> anyhow::Result<()> {
    match args {
        [] => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(config)?);
        }
        [sub] if sub == "init" => {
            config.save(config_path)?;
            println!("Wrote {}", config_path.display());
        }
        _ => return Err(Error::InvalidInput("usage: reframe config [init]".into()).into()),
    }
    Ok(())
}

fn error_kind(err: &anyhow::Error) -> ErrorKind {
    if let Some(e) = err.downcast_ref::<Error>() {
        e.kind()
    } else if let Some(e) = err.downcast_ref::<JobFailure>() {
        e.kind
    } else {
        ErrorKind::IoFailure
    }
}

fn main() {
    let cli = match parse_args(std::env::args().collect()) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error[{}]: {}", e.kind(), e);
            std::process::exit(1);
        }
    };

    reframe_lib::init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error[{}]: {}", error_kind(&e), e);
        std::process::exit(1);
    }
}
