use anyhow::Result;
use console::style;

use super::JobsCommand;
use crate::core::job::{JobRecord, JobStatus, ResultLocator};
use crate::core::store::JobStore;
use crate::core::terminal::{print_error, print_info, print_link, print_status, print_success, print_warn};

fn status_label(status: JobStatus) -> String {
    let label = status.as_str();
    match status {
        JobStatus::Completed => style(label).green().to_string(),
        JobStatus::Failed => style(label).red().to_string(),
        JobStatus::Processing => style(label).cyan().to_string(),
        JobStatus::Queued => style(label).yellow().to_string(),
    }
}

pub(crate) fn summary_line(record: &JobRecord) -> String {
    format!(
        "{:<24} {}/{}@{}  {} {:.0}%  {}",
        record.id,
        record.repo_owner,
        record.repo_name,
        record.branch,
        record.status.as_str(),
        record.progress,
        record.created_at.format("%Y-%m-%d %H:%M")
    )
}

fn print_record(record: &JobRecord) {
    println!("\n {}", style(&record.id).bold().underlined());
    print_status(
        "Repository",
        &format!("{}/{} ({})", record.repo_owner, record.repo_name, record.branch),
    );
    print_status(
        "Status",
        &format!("{} {:.0}%", status_label(record.status), record.progress),
    );
    print_status("Created", &record.created_at.to_rfc3339());
    if let Some(done) = record.completed_at {
        print_status("Finished", &done.to_rfc3339());
    }
    if let Some(err) = &record.error_message {
        print_status("Error", err);
    }
    print_status("Data chunks", &record.data_chunks.len().to_string());
    if let Some(key) = &record.s3_key {
        print_status("S3 key", key);
    }
    if let Some(url) = &record.docpack_url {
        print_link("Docpack", url);
    }
    if !record.logs.is_empty() {
        println!("\n {}", style("Logs").bold());
        for line in &record.logs {
            println!("  | {}", line);
        }
    }
    println!();
}

pub async fn run_jobs(store: &JobStore, command: JobsCommand) -> Result<()> {
    match command {
        JobsCommand::List => {
            let records = store.list().await;
            if records.is_empty() {
                print_info("No jobs tracked yet.");
                return Ok(());
            }
            for record in &records {
                println!("  {}", summary_line(record));
            }
        }
        JobsCommand::Show(id) => match store.get(&id).await {
            Some(record) => print_record(&record),
            None => print_error(&format!("No job with id '{}'", id)),
        },
        JobsCommand::Repo { owner, repo } => match store.get_by_repo(&owner, &repo).await {
            Some(record) => print_record(&record),
            None => print_info(&format!("No job tracked for {}/{}", owner, repo)),
        },
        JobsCommand::Remove(id) => {
            if store.remove(&id).await? {
                print_success(&format!("Removed job {}", id));
            } else {
                print_warn(&format!("No job with id '{}'", id));
            }
        }
        JobsCommand::Clear => {
            let count = store.list().await.len();
            store.clear().await?;
            print_success(&format!("Removed {} job(s)", count));
        }
        JobsCommand::Attach { id, s3_key, url } => {
            let locator = ResultLocator {
                s3_key,
                docpack_url: url,
            };
            match store.attach_result(&id, locator).await? {
                Some(record) => {
                    print_success(&format!("Result recorded for job {}", record.id));
                    print_record(&record);
                }
                None => print_error(&format!(
                    "Job '{}' is unknown or has not completed; results can only be attached to completed jobs",
                    id
                )),
            }
        }
    }
    Ok(())
}
