//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, run reports, human-readable durations and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::execute::{ExecutionReport, TargetReport, TargetState};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIP: &str = "-";
  pub const CACHED: &str = "=";
}

/// Format a duration at millisecond precision.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  if millis == 0 {
    return "0ms".to_string();
  }
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// One status line for a finished target.
pub fn target_line(target: &TargetReport) -> String {
  match target.state {
    TargetState::Succeeded if target.cached => format!("{} {} (cached)", symbols::CACHED, target.name),
    TargetState::Succeeded => format!(
      "{} {} ({})",
      symbols::SUCCESS,
      target.name,
      format_duration(target.duration)
    ),
    TargetState::Failed => format!("{} {} failed", symbols::ERROR, target.name),
    TargetState::Skipped => match &target.failed_dependency {
      Some(dependency) => format!("{} {} skipped ({} failed)", symbols::SKIP, target.name, dependency),
      None => format!("{} {} skipped", symbols::SKIP, target.name),
    },
    TargetState::Pending | TargetState::Running => format!("{} {} {}", symbols::INFO, target.name, target.state),
  }
}

/// Headline of a successful run. Cached targets are mentioned only when
/// there are some.
pub fn success_line(report: &ExecutionReport) -> String {
  let cached = report.cached();
  let built = report.count(TargetState::Succeeded).saturating_sub(cached);
  if cached == 0 {
    format!("{built} target(s) built")
  } else {
    format!("{built} target(s) built, {cached} cached")
  }
}

fn print_target(target: &TargetReport) {
  let line = target_line(target);
  match target.state {
    TargetState::Succeeded => println!("  {}", line.if_supports_color(Stream::Stdout, |s| s.green())),
    TargetState::Failed => println!("  {}", line.if_supports_color(Stream::Stdout, |s| s.red())),
    TargetState::Skipped => println!("  {}", line.if_supports_color(Stream::Stdout, |s| s.yellow())),
    TargetState::Pending | TargetState::Running => println!("  {}", line),
  }
}

fn print_captured(label: &str, text: &str) {
  let text = text.trim_end();
  if text.is_empty() {
    return;
  }
  eprintln!("  {}:", label.if_supports_color(Stream::Stderr, |s| s.dimmed()));
  for line in text.lines() {
    eprintln!("    {}", line);
  }
}

/// Print a run report: one line per target, the first failure with its
/// captured output, then a summary.
pub fn print_report(report: &ExecutionReport, elapsed: Duration, verbose: bool) {
  for target in &report.targets {
    print_target(target);
    if verbose && target.state == TargetState::Succeeded {
      for line in target.stdout.lines() {
        println!("    {}", line);
      }
    }
  }

  if let Some(failure) = &report.first_failure {
    println!();
    print_error(&failure.error);
    print_captured("stdout", &failure.stdout);
    print_captured("stderr", &failure.stderr);
  }

  println!();
  if report.is_success() {
    print_success(&success_line(report));
  } else {
    print_error("Build failed");
  }
  print_stat("Succeeded", &report.count(TargetState::Succeeded).to_string());
  if report.cached() > 0 {
    print_stat("Cached", &report.cached().to_string());
  }
  print_stat("Failed", &report.count(TargetState::Failed).to_string());
  print_stat("Skipped", &report.count(TargetState::Skipped).to_string());
  print_stat("Duration", &format_duration(elapsed));
}

#[cfg(test)]
mod tests {
  use super::*;

  fn report(name: &str, state: TargetState) -> TargetReport {
    TargetReport {
      name: name.to_string(),
      state,
      cached: false,
      duration: Duration::from_millis(1500),
      stdout: String::new(),
      stderr: String::new(),
      error: None,
      failed_dependency: None,
    }
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::ZERO), "0ms");
    assert_eq!(format_duration(Duration::from_micros(50_400)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
  }

  #[test]
  fn target_lines_describe_state() {
    assert_eq!(target_line(&report("lib", TargetState::Succeeded)), "✓ lib (1s 500ms)");
    assert_eq!(target_line(&report("lib", TargetState::Failed)), "✗ lib failed");

    let mut cached = report("lib", TargetState::Succeeded);
    cached.cached = true;
    assert_eq!(target_line(&cached), "= lib (cached)");

    let mut skipped = report("test", TargetState::Skipped);
    skipped.failed_dependency = Some("lib".to_string());
    assert_eq!(target_line(&skipped), "- test skipped (lib failed)");
  }

  #[test]
  fn success_line_counts_built_and_cached() {
    let mut run = ExecutionReport {
      targets: vec![report("lib", TargetState::Succeeded), report("test", TargetState::Succeeded)],
      first_failure: None,
    };
    assert_eq!(success_line(&run), "2 target(s) built");

    run.targets[0].cached = true;
    assert_eq!(success_line(&run), "1 target(s) built, 1 cached");
  }
}
