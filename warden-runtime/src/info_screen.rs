//! Interactive screen shown while a worker runs in the foreground

use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Menu entries, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoMenuChoice {
    OpenBrowser,
    ShutDown,
}

impl InfoMenuChoice {
    pub const ALL: [InfoMenuChoice; 2] = [InfoMenuChoice::OpenBrowser, InfoMenuChoice::ShutDown];

    pub fn label(self) -> &'static str {
        match self {
            InfoMenuChoice::OpenBrowser => "Open browser with service info",
            InfoMenuChoice::ShutDown => "Shut down service",
        }
    }

    /// Accepts the 1-based menu number or the first letter of the label
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "1" | "o" | "open" => Some(InfoMenuChoice::OpenBrowser),
            "2" | "s" | "shutdown" | "q" | "quit" => Some(InfoMenuChoice::ShutDown),
            _ => None,
        }
    }
}

/// Header, status line and single-choice menu for one worker
pub struct InfoScreen {
    service_id: String,
    info_url: String,
}

impl InfoScreen {
    pub fn new(service_id: impl Into<String>, info_url: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            info_url: info_url.into(),
        }
    }

    pub fn header(&self) -> String {
        format!(
            "{}\n{} {}",
            format!("Warden worker: {}", self.service_id).bright_cyan().bold(),
            "Service info available at".normal(),
            self.info_url.bright_green()
        )
    }

    pub fn menu(&self) -> String {
        InfoMenuChoice::ALL
            .iter()
            .enumerate()
            .map(|(index, choice)| {
                format!("  {} {}", format!("[{}]", index + 1).bright_yellow(), choice.label())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Show the screen and serve menu choices until the user asks to shut
    /// down. Ctrl-C and end of input count as shutting down.
    pub async fn run(&self) -> RuntimeResult<()> {
        println!("{}", self.header());
        println!();

        loop {
            println!("{}", self.menu());

            match prompt().await? {
                Some(InfoMenuChoice::OpenBrowser) => {
                    if let Err(e) = self.open_in_browser() {
                        warn!("{}", e);
                    }
                }
                Some(InfoMenuChoice::ShutDown) => return Ok(()),
                None => println!("{}", "Please pick one of the options".bright_red()),
            }
        }
    }

    pub fn open_in_browser(&self) -> RuntimeResult<()> {
        debug!("Opening {}", self.info_url);
        open::that(&self.info_url).map_err(|source| RuntimeError::Browser {
            url: self.info_url.clone(),
            source,
        })
    }
}

async fn prompt() -> RuntimeResult<Option<InfoMenuChoice>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut editor = DefaultEditor::new()?;
        editor.readline(&"warden> ".bright_green().to_string())
    })
    .await
    .map_err(|e| RuntimeError::Prompt(e.to_string()))?;

    match line {
        Ok(line) => Ok(InfoMenuChoice::parse(&line)),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            Ok(Some(InfoMenuChoice::ShutDown))
        }
        Err(e) => Err(RuntimeError::Prompt(e.to_string())),
    }
}
