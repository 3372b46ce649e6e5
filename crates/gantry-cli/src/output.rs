//! Console rendering of run events.

use async_trait::async_trait;
use console::style;
use gantry_core::Result;
use gantry_core::events::Event;
use gantry_core::ports::EventSink;
use gantry_core::run::{JobStatus, LogStream, RunStatus};

pub struct ConsoleEventSink;

#[async_trait]
impl EventSink for ConsoleEventSink {
    async fn publish(&self, event: Event) -> Result<()> {
        match event {
            Event::RunStarted(p) => {
                println!(
                    "{} {} ({} jobs)",
                    style("▶").cyan(),
                    style(&p.pipeline_name).bold(),
                    p.job_count
                );
            }
            Event::RunCompleted(p) => {
                let badge = match p.status {
                    RunStatus::Success => style("✓ success").green(),
                    RunStatus::Failure => style("✗ failure").red(),
                    RunStatus::Cancelled => style("⊘ cancelled").yellow(),
                    _ => style("…").dim(),
                };
                println!("{} {} in {}ms", badge, p.pipeline_name, p.duration_ms);
            }
            Event::JobStarted(p) => {
                println!("{} {}", style("●").cyan(), style(&p.job).bold());
            }
            Event::JobCompleted(p) => {
                let badge = match p.status {
                    JobStatus::Success => style("✓").green(),
                    JobStatus::Failure => style("✗").red(),
                    JobStatus::Cancelled => style("⊘").yellow(),
                    _ => style("○").dim(),
                };
                println!("{} {} ({}ms)", badge, p.job, p.duration_ms);
            }
            Event::JobSkipped(p) => {
                println!("{} {} ({})", style("○").dim(), style(&p.job).dim(), p.cause);
            }
            Event::StepOutput(p) => {
                let line = format!("  {} | {}", p.step, p.content);
                match p.stream {
                    LogStream::Stdout => println!("{}", line),
                    LogStream::Stderr => println!("{}", style(line).dim()),
                }
            }
            Event::ArtifactUploaded(p) => {
                println!(
                    "{} artifact {} ({} bytes)",
                    style("⇡").cyan(),
                    style(&p.name).bold(),
                    p.size_bytes
                );
            }
        }
        Ok(())
    }
}
