//! Long-running kiosk loop: commands arrive one per line on stdin and each
//! answer is printed as one JSON line on stdout.
//!
//! ```text
//! scan <image-path> [in|out]
//! register <employee-id>
//! rebuild
//! quit
//! ```
//!
//! Commands run concurrently, so scans keep being answered from the
//! published index while a registration rebuilds it.

use crate::attendance::Mode;
use crate::service::AttendanceService;
use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq)]
pub enum KioskCommand {
    Scan { image: PathBuf, mode: Mode },
    Register { employee: String },
    Rebuild,
    Quit,
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str, default_mode: Mode) -> Option<Result<KioskCommand, String>> {
    let mut words = line.split_whitespace();
    let verb = words.next()?;
    if verb.starts_with('#') {
        return None;
    }

    let parsed = match verb {
        "scan" => match (words.next(), words.next()) {
            (None, _) => Err("usage: scan <image-path> [in|out]".to_string()),
            (Some(path), mode) => parse_mode(mode, default_mode).map(|mode| KioskCommand::Scan {
                image: PathBuf::from(path),
                mode,
            }),
        },
        "register" => match words.next() {
            Some(employee) => Ok(KioskCommand::Register {
                employee: employee.to_string(),
            }),
            None => Err("usage: register <employee-id>".to_string()),
        },
        "rebuild" => Ok(KioskCommand::Rebuild),
        "quit" | "exit" => Ok(KioskCommand::Quit),
        other => Err(format!("unknown command: {other}")),
    };

    let parsed = parsed.and_then(|cmd| match words.next() {
        Some(extra) => Err(format!("unexpected argument: {extra}")),
        None => Ok(cmd),
    });
    Some(parsed)
}

fn parse_mode(word: Option<&str>, default_mode: Mode) -> Result<Mode, String> {
    match word {
        None => Ok(default_mode),
        Some("in") => Ok(Mode::In),
        Some("out") => Ok(Mode::Out),
        Some(other) => Err(format!("mode must be in or out, got {other}")),
    }
}

/// Serve stdin until EOF or `quit`, then wait for in-flight commands.
pub async fn run(service: Arc<AttendanceService>, default_mode: Mode) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();

    tracing::info!(indexed = service.indexed(), "kiosk ready");

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line, default_mode) {
            None => continue,
            Some(Ok(KioskCommand::Quit)) => break,
            Some(Ok(command)) => command,
            Some(Err(message)) => {
                println!("{}", json!({ "error": message }));
                continue;
            }
        };

        let service = Arc::clone(&service);
        tasks.spawn(async move {
            println!("{}", execute(&service, command).await);
        });

        // Reap finished commands so the set does not grow without bound.
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::error!(error = %e, "kiosk command panicked");
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "kiosk command panicked");
        }
    }
    tracing::info!("kiosk stopped");
    Ok(())
}

async fn execute(service: &AttendanceService, command: KioskCommand) -> serde_json::Value {
    let result = match command {
        KioskCommand::Scan { image, mode } => service
            .scan_file(&image, mode)
            .await
            .map(|outcome| json!({ "command": "scan", "image": image, "result": outcome })),
        KioskCommand::Register { employee } => service.register(&employee).await.map(|r| {
            json!({
                "command": "register",
                "employee": employee,
                "used": r.registration.used,
                "skipped": r.registration.skipped,
                "indexed": r.report.indexed(),
            })
        }),
        KioskCommand::Rebuild => service.rebuild().await.map(|report| {
            json!({
                "command": "rebuild",
                "indexed": report.indexed(),
                "missing": report.missing,
            })
        }),
        KioskCommand::Quit => Ok(json!({ "command": "quit" })),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "kiosk command failed");
        json!({ "error": format!("{e:#}") })
    })
}
