use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use lookahead::prelude::*;
use lookahead::{SCHEDULER_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", "-".repeat(72).dimmed());
    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());
    println!("{}", "-".repeat(72).dimmed());
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// A callback that announces its label when dispatched.
fn announce(label: String) -> Callback {
    callback(move |ctx, _| {
        println!(
            "\n<-- [{}] {} @ playback {:.3}s",
            timestamp().dimmed(),
            label.green().bold(),
            ctx.playback_time
        );
    })
}

/// A pulse that queues its next beat `spacing` seconds after its own time.
fn metronome(spacing: f64) -> Callback {
    callback(move |ctx, args| {
        let time = args
            .first()
            .and_then(|a| a.downcast_ref::<f64>())
            .copied()
            .unwrap_or(ctx.playback_time);
        let beat = args
            .get(1)
            .and_then(|a| a.downcast_ref::<u64>())
            .copied()
            .unwrap_or(0);
        println!(
            "\n<-- [{}] {} {} @ {:.3}s",
            timestamp().dimmed(),
            "METRO".magenta().bold(),
            beat + 1,
            ctx.playback_time
        );
        let next = time + spacing;
        ctx.target
            .insert(next, metronome(spacing), vec![arg(next), arg(beat + 1)])
            .ok();
    })
}

/// Prints the scheduler's activity stream while `watching` is set.
fn spawn_event_listener(scheduler: &Scheduler, watching: Arc<AtomicBool>) {
    let mut events_rx = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(SchedulerEvent::TickProcessed { dispatched: 0, .. }) => {}
                Ok(event) => {
                    if watching.load(Ordering::Relaxed) {
                        println!("<-- [SCHEDULER] {:?}", event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    if watching.load(Ordering::Relaxed) {
                        println!("<-- [SCHEDULER] ... {} event(s) skipped", skipped);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_help() {
    println!("Available commands:");
    println!("  start                 - Arms the scheduler's timer.");
    println!("  stop [reset]          - Disarms the timer; 'reset' also clears the queue.");
    println!("  insert <T> <LABEL>    - Schedules LABEL at T seconds on the clock.");
    println!("  next <LABEL>          - Schedules LABEL one window past playback time.");
    println!("  metro <BPM>           - Starts a self-rescheduling pulse at BPM.");
    println!("  remove [ID]           - Removes event ID, or every pending event.");
    println!("  events                - Lists pending events.");
    println!("  time                  - Shows clock and playback time.");
    println!("  watch on|off          - Toggles printing of the scheduler's event stream.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SchedulerConfig::load(None)?;
    let scheduler = Scheduler::builder(Arc::new(SystemClock::new()))
        .config(config)
        .build()?;

    let watching = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&scheduler, watching.clone());

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    info!("{} ready.", SCHEDULER_NAME.cyan());
    println!("Type 'help' for commands or 'exit' to quit.");

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting lookshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "start" => {
                scheduler.start(None)?;
                println!("--> Scheduler running.");
            }
            "stop" => {
                let reset = args.get(1) == Some(&"reset");
                scheduler.stop(reset);
                println!("--> Scheduler stopped{}.", if reset { " and cleared" } else { "" });
            }
            "insert" => match (args.get(1), args.get(2)) {
                (Some(time), Some(_)) => {
                    let label = args[2..].join(" ");
                    match scheduler.insert(*time, announce(label), Vec::new()) {
                        Ok(id) => println!("--> Scheduled event {}.", id),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                _ => println!("Usage: insert <SECONDS> <LABEL>"),
            },
            "next" => {
                if args.len() < 2 {
                    println!("Usage: next <LABEL>");
                    continue;
                }
                let label = args[1..].join(" ");
                match scheduler.next_tick(announce(label), Vec::new()) {
                    Ok(id) => println!("--> Scheduled event {} on the next window.", id),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "metro" => match args.get(1).and_then(|b| b.parse::<f64>().ok()) {
                Some(bpm) if bpm > 0.0 => {
                    let start = scheduler.current_time();
                    let id = scheduler.insert(start, metronome(60.0 / bpm), vec![arg(start)])?;
                    println!("--> Metronome at {} BPM starting with event {}.", bpm, id);
                }
                _ => println!("Usage: metro <BPM>"),
            },
            "remove" => match args.get(1) {
                None => {
                    scheduler.remove(None);
                    println!("--> All pending events removed.");
                }
                Some(raw) => match raw.trim_start_matches('#').parse::<u64>() {
                    Ok(id) => {
                        scheduler.remove(EventId(id));
                        println!("--> Removed event #{} (if it was pending).", id);
                    }
                    Err(_) => println!("Error: '{}' is not an event id.", raw),
                },
            },
            "events" => {
                let events = scheduler.events();
                println!("Pending events ({}):", events.len());
                for event in events {
                    println!("  {:>6}  at {:.3}s", event.id.to_string(), event.time);
                }
            }
            "time" => {
                println!(
                    "  clock {:.3}s | playback {:.3}s | {}",
                    scheduler.current_time(),
                    scheduler.playback_time(),
                    if scheduler.is_running() { "running".green() } else { "stopped".red() }
                );
            }
            "watch" => match args.get(1) {
                Some(&"on") => {
                    watching.store(true, Ordering::Relaxed);
                    println!("--> Watching the scheduler's event stream.");
                }
                Some(&"off") => {
                    watching.store(false, Ordering::Relaxed);
                    println!("--> Stopped watching.");
                }
                _ => println!("Usage: watch on|off"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    scheduler.stop(true);
    Ok(())
}
