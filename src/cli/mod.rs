mod jobs;
mod serve;
mod watch;

use anyhow::Result;
use console::style;
use std::sync::Arc;

use crate::core::config::DocpackConfig;
use crate::core::store::{FileSubstrate, JobStore};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Run the stream relay API server")
        .text("--api-host <host>   Bind address (default 127.0.0.1)")
        .text("--api-port <port>   Bind port (default 17990)")
        .print();

    GuideSection::new("Client")
        .command("watch <job_id>", "Follow a job and keep its record up to date")
        .text("--owner <o> --repo <r> [--branch main]")
        .text("--api-url <url>     Server to stream from (default: configured server)")
        .text("--token <t>         Credential sent as a Bearer token")
        .text("--direct            Poll RunPod from this process instead")
        .text("--frames            Print raw SSE frames instead of the job view")
        .print();

    GuideSection::new("Job records")
        .command("jobs list", "List tracked jobs")
        .command("jobs show <id>", "Show one job with its logs")
        .command("jobs repo <owner> <repo>", "Show the job tracked for a repository")
        .command("jobs attach <id>", "Record --s3-key/--url of a finished docpack")
        .command("jobs remove <id>", "Forget one job")
        .command("jobs clear", "Forget every job")
        .print();

    GuideSection::new("Global")
        .text("--verbose, -v       Debug logging")
        .blank()
        .text("Configuration: ~/.docpack/config.toml, RUNPOD_API_KEY, RUNPOD_ENDPOINT_ID,")
        .text("RUNPOD_BASE_URL, DOCPACK_DATA_DIR")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("docpack").green()
    );
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(api_port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchArgs {
    pub job_id: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub direct: bool,
    pub frames: bool,
}

pub(crate) fn parse_watch_args(args: &[String], start: usize) -> Result<WatchArgs, String> {
    let mut job_id: Option<String> = None;
    let mut owner: Option<String> = None;
    let mut repo: Option<String> = None;
    let mut branch = "main".to_string();
    let mut api_url: Option<String> = None;
    let mut token: Option<String> = None;
    let mut direct = false;
    let mut frames = false;

    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--owner" | "--repo" | "--branch" | "--api-url" | "--token" => {
                let Some(value) = value else {
                    return Err(format!("{} needs a value", args[i]));
                };
                match args[i].as_str() {
                    "--owner" => owner = Some(value),
                    "--repo" => repo = Some(value),
                    "--branch" => branch = value,
                    "--api-url" => api_url = Some(value),
                    _ => token = Some(value),
                }
                i += 2;
            }
            "--direct" => {
                direct = true;
                i += 1;
            }
            "--frames" => {
                frames = true;
                i += 1;
            }
            "--verbose" | "-v" => i += 1,
            other if other.starts_with("--") => return Err(format!("Unknown option {}", other)),
            other => {
                if job_id.is_some() {
                    return Err(format!("Unexpected argument {}", other));
                }
                job_id = Some(other.to_string());
                i += 1;
            }
        }
    }

    if direct && api_url.is_some() {
        return Err("--direct and --api-url cannot be combined".to_string());
    }
    Ok(WatchArgs {
        job_id: job_id.ok_or("A job id is required")?,
        owner: owner.ok_or("--owner is required")?,
        repo: repo.ok_or("--repo is required")?,
        branch,
        api_url,
        token,
        direct,
        frames,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobsCommand {
    List,
    Show(String),
    Repo { owner: String, repo: String },
    Remove(String),
    Clear,
    Attach {
        id: String,
        s3_key: Option<String>,
        url: Option<String>,
    },
}

pub(crate) fn parse_jobs_args(args: &[String], start: usize) -> Result<JobsCommand, String> {
    let positional: Vec<&str> = args[start.min(args.len())..]
        .iter()
        .map(String::as_str)
        .filter(|a| !matches!(*a, "--verbose" | "-v"))
        .collect();
    let arg = |idx: usize, what: &str| -> Result<String, String> {
        positional
            .get(idx)
            .filter(|a| !a.starts_with("--"))
            .map(|a| a.to_string())
            .ok_or_else(|| format!("Missing {}", what))
    };

    match positional.first().copied().unwrap_or("list") {
        "list" => Ok(JobsCommand::List),
        "show" => Ok(JobsCommand::Show(arg(1, "job id")?)),
        "repo" => Ok(JobsCommand::Repo {
            owner: arg(1, "owner")?,
            repo: arg(2, "repo")?,
        }),
        "remove" | "rm" => Ok(JobsCommand::Remove(arg(1, "job id")?)),
        "clear" => Ok(JobsCommand::Clear),
        "attach" => {
            let id = arg(1, "job id")?;
            let mut s3_key = None;
            let mut url = None;
            let mut i = 2;
            while i < positional.len() {
                match positional[i] {
                    "--s3-key" => {
                        s3_key = positional.get(i + 1).map(|v| v.to_string());
                        i += 2;
                    }
                    "--url" => {
                        url = positional.get(i + 1).map(|v| v.to_string());
                        i += 2;
                    }
                    other => return Err(format!("Unknown option {}", other)),
                }
            }
            if s3_key.is_none() && url.is_none() {
                return Err("attach needs --s3-key and/or --url".to_string());
            }
            Ok(JobsCommand::Attach { id, s3_key, url })
        }
        other => Err(format!("Unknown jobs command '{}'", other)),
    }
}

async fn open_store(data_dir: &std::path::Path) -> Result<JobStore> {
    let substrate = Arc::new(FileSubstrate::new(data_dir));
    Ok(JobStore::open(substrate).await?)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    crate::logging::init(verbose);

    let data_dir = NativePlatform::data_dir();
    let config = DocpackConfig::load(&data_dir).await?;

    let cmd = args.get(1).map(String::as_str).unwrap_or("help");
    match cmd {
        "serve" => {
            let (api_host, api_port) = parse_api_server_flags(
                &args,
                2,
                config.server.host.clone(),
                config.server.port,
            );
            serve::run_serve(&config, api_host, api_port).await?;
        }
        "watch" => match parse_watch_args(&args, 2) {
            Ok(watch_args) => {
                let store = open_store(&data_dir).await?;
                watch::run_watch(&config, store, watch_args).await?;
            }
            Err(e) => {
                print_error(&e);
                print_help();
            }
        },
        "jobs" => match parse_jobs_args(&args, 2) {
            Ok(command) => {
                let store = open_store(&data_dir).await?;
                jobs::run_jobs(&store, command).await?;
            }
            Err(e) => {
                print_error(&e);
                print_help();
            }
        },
        "help" | "--help" | "-h" => print_help(),
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
        }
    }
    Ok(())
}
