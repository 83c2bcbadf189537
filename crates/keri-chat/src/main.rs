//! An interactive terminal client of the KERI chat API.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use keri_chat::{
    Ask, AskLog, ChatClient, ClientError, DEFAULT_TIMEOUT, DEFAULT_URL,
    SessionStore,
};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

const BAR_CHAR: &str = "▎";
const SESSION_ID: &str = "cli";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url =
        env::var("KERI_CHAT_URL").unwrap_or_else(|_| DEFAULT_URL.to_owned());
    let timeout = match env::var("KERI_CHAT_TIMEOUT_SECS") {
        Ok(secs) => secs.parse().map(Duration::from_secs).with_context(|| {
            format!("invalid KERI_CHAT_TIMEOUT_SECS: {secs:?}")
        })?,
        Err(_) => DEFAULT_TIMEOUT,
    };

    let mut sessions =
        SessionStore::new(ChatClient::new(&url).with_timeout(timeout));
    if let Some(path) = log_path() {
        debug!("logging answers to {}", path.display());
        sessions = sessions.with_log(AskLog::new(path));
    }

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!("Ask about KERI, CESR or ACDC ({url}). /reset starts over.");

    // One reader for the whole session, pasted lines stay buffered.
    let mut input = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_line(&mut input).await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/reset" {
            sessions.reset(SESSION_ID);
            println!("{}", "History cleared.".dimmed());
            continue;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");
        progress_bar.enable_steady_tick(Duration::from_millis(100));

        let mut started = false;
        let result = sessions
            .ask(Ask::new(SESSION_ID, line), |chunk| {
                // Finish the progress bar before printing anything else.
                if !started {
                    progress_bar.finish_and_clear();
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    started = true;
                }
                print!("{}", chunk.bright_white());
                std::io::stdout().flush().ok();
            })
            .await;
        progress_bar.finish_and_clear();
        if started {
            println!();
        }

        match result {
            Ok(answer) => {
                for citation in &answer.citations {
                    println!(
                        "{}[{}] {}",
                        BAR_CHAR.bright_yellow(),
                        citation.number,
                        citation.source.dimmed()
                    );
                }
            }
            Err(ClientError::Incomplete(_)) => {
                eprintln!(
                    "{}",
                    "⚠️  The answer was cut off, it may be incomplete.".yellow()
                );
            }
            Err(err) => {
                eprintln!("{} {err}", format!("[{}]", err.code()).red());
            }
        }
        println!();
    }

    Ok(())
}

fn log_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("KERI_CHAT_LOG") {
        return (!path.is_empty()).then(|| PathBuf::from(path));
    }
    let home = env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".keri-chat").join("log.jsonl"))
}

async fn read_line<R>(input: &mut Lines<R>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match input.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_pasted_lines() {
        let pasted = b"What is KERI?\n/reset\nAnd CESR?";
        let mut input = BufReader::new(&pasted[..]).lines();
        assert_eq!(read_line(&mut input).await.unwrap(), "What is KERI?");
        assert_eq!(read_line(&mut input).await.unwrap(), "/reset");
        assert_eq!(read_line(&mut input).await.unwrap(), "And CESR?");
        assert_eq!(read_line(&mut input).await, None);
    }
}
