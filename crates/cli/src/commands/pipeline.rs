use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Args;
use closer_agent::runtime::{AnalyzeRequest, EmailRequest, GenerateRequest};
use closer_core::errors::{ApplicationError, DomainError};

use crate::commands::{run_pipeline, CommandResult, GlobalOptions};

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[arg(long, help = "Transcript file to analyze")]
    pub transcript: Option<PathBuf>,
    #[arg(long, help = "Client name; with --text, analyze inline text instead of a file")]
    pub client: Option<String>,
    #[arg(long, requires = "client", help = "Inline transcript text")]
    pub text: Option<String>,
    #[arg(long, help = "Override the configured LLM model")]
    pub model: Option<String>,
    #[arg(long, help = "Where to write the extracted JSON")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long, help = "Analyzed client data JSON")]
    pub client_data: Option<PathBuf>,
    #[arg(long, help = "Client name, used when no client data is given")]
    pub client_name: Option<String>,
    #[arg(long)]
    pub website: Option<String>,
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[arg(long, help = "Proposal HTML; defaults to the newest proposal")]
    pub proposal: Option<PathBuf>,
    #[arg(long, help = "Client name or slug for the project name")]
    pub client: Option<String>,
}

#[derive(Debug, Args)]
pub struct EmailArgs {
    #[arg(long)]
    pub to: String,
    #[arg(long)]
    pub client_name: String,
    #[arg(long)]
    pub link: Option<String>,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub attachment: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PackageArgs {
    #[arg(long, help = "Proposal HTML; defaults to the newest proposal")]
    pub proposal: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct QuickArgs {
    #[arg(long, help = "Client name; prompted for when omitted")]
    pub client: Option<String>,
    #[arg(long, help = "Transcript file; read from stdin when omitted")]
    pub transcript: Option<PathBuf>,
}

pub fn analyze(options: &GlobalOptions, args: AnalyzeArgs) -> CommandResult {
    run_pipeline("analyze", options, |runtime| async move {
        let outcome = match (args.transcript, args.text) {
            (Some(path), _) => {
                runtime
                    .analyze_transcript_file(&path, args.model.as_deref(), args.output.as_deref())
                    .await?
            }
            (None, Some(text)) => {
                runtime
                    .analyze_transcript(AnalyzeRequest {
                        client_name: args.client.unwrap_or_default(),
                        transcript: text,
                        model: args.model,
                    })
                    .await?
            }
            (None, None) => {
                return Err(DomainError::MissingField("--transcript or --text".to_string()).into());
            }
        };
        let message = format!("analyzed transcript for {}", outcome.client_name);
        Ok((message, outcome))
    })
}

pub fn generate(options: &GlobalOptions, args: GenerateArgs) -> CommandResult {
    run_pipeline("generate", options, |runtime| async move {
        let outcome = runtime
            .generate_proposal(GenerateRequest {
                client_data: args.client_data,
                client_name: args.client_name,
                website: args.website,
                output: args.output,
            })
            .await?;
        let message = format!("proposal written to {}", outcome.proposal_path.display());
        Ok((message, outcome))
    })
}

pub fn deploy(options: &GlobalOptions, args: DeployArgs) -> CommandResult {
    run_pipeline("deploy", options, |runtime| async move {
        let outcome = runtime.deploy_proposal(args.proposal, args.client).await?;
        Ok((format!("deployed to {}", outcome.url), outcome))
    })
}

pub fn email(options: &GlobalOptions, args: EmailArgs) -> CommandResult {
    run_pipeline("email", options, |runtime| async move {
        let outcome = runtime
            .send_proposal_email(EmailRequest {
                to: args.to,
                client_name: args.client_name,
                proposal_link: args.link,
                subject: args.subject,
                body: args.body,
                attachment_path: args.attachment,
            })
            .await?;
        Ok((format!("email sent to {}", outcome.to), outcome))
    })
}

pub fn package(options: &GlobalOptions, args: PackageArgs) -> CommandResult {
    run_pipeline("package", options, |runtime| async move {
        let outcome = runtime.package_proposal(args.proposal).await?;
        Ok((outcome.email_copy.clone(), outcome))
    })
}

pub fn quick(options: &GlobalOptions, args: QuickArgs) -> CommandResult {
    let client = match args.client {
        Some(client) => client,
        None => match prompt_line("Client name: ") {
            Ok(client) => client,
            Err(error) => return CommandResult::from_error("quick", error),
        },
    };
    let transcript = match args.transcript {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) => {
                return CommandResult::from_error(
                    "quick",
                    ApplicationError::NotFound(format!("`{}`: {error}", path.display())),
                );
            }
        },
        None => {
            eprintln!("Paste the transcript, then press Enter on two empty lines (or Ctrl-D):");
            match read_until_blank_lines(io::stdin().lock()) {
                Ok(text) => text,
                Err(error) => return CommandResult::from_error("quick", error.into()),
            }
        }
    };

    run_pipeline("quick", options, |runtime| async move {
        let outcome = runtime.quick_proposal(&client, &transcript).await?;
        Ok((format!("proposal for {} is live at {}", outcome.client, outcome.url), outcome))
    })
}

fn prompt_line(prompt: &str) -> Result<String, ApplicationError> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(DomainError::MissingField("client_name".to_string()).into());
    }
    Ok(line)
}

/// Reads lines until two consecutive blank lines or EOF. The blank terminator is dropped.
pub fn read_until_blank_lines(reader: impl BufRead) -> io::Result<String> {
    let mut lines = Vec::new();
    let mut blank_run = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 2 {
                break;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::read_until_blank_lines;

    #[test]
    fn stops_at_two_blank_lines() {
        let input = "Sam: hi\n\nJo: hello\n\n\nignored\n";
        let text = read_until_blank_lines(Cursor::new(input)).expect("read");
        assert_eq!(text, "Sam: hi\n\nJo: hello");
    }

    #[test]
    fn eof_ends_the_transcript() {
        let text = read_until_blank_lines(Cursor::new("one line")).expect("read");
        assert_eq!(text, "one line");
    }
}
