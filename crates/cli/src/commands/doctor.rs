use closer_core::config::{AppConfig, DeployMode};
use closer_core::template::TemplateSet;
use closer_core::workspace::Workspace;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::GlobalOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

const CHECKS_AFTER_CONFIG: [&str; 6] =
    ["workspace", "templates", "llm_key", "google_credentials", "vercel_token", "npx"];

pub fn run(options: &GlobalOptions, json_output: bool) -> (bool, String) {
    let report = build_report(options);
    let healthy = report.overall_status == CheckStatus::Pass;

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (healthy, output);
    }

    (healthy, render_human(&report))
}

pub fn build_report(options: &GlobalOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match options.load_config() {
        Ok(config) => {
            checks.push(pass("config_validation", "configuration loaded and validated"));
            checks.push(check_workspace(&config));
            checks.push(check_templates(&config));
            checks.push(check_llm_key(&config));
            checks.push(check_google_credentials(&config));
            checks.push(check_vercel_token(&config));
            checks.push(check_npx(&config));
        }
        Err(error) => {
            checks.push(fail("config_validation", error.to_string()));
            checks.extend(CHECKS_AFTER_CONFIG.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    // Skipped checks are not applicable to this configuration and do not fail the run.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_workspace(config: &AppConfig) -> DoctorCheck {
    let workspace = Workspace::new(config.workspace.root_dir.clone());
    let dirs = [workspace.transcripts_dir(), workspace.proposals_dir(), workspace.deploy_dir()];
    for dir in &dirs {
        if let Err(error) = std::fs::create_dir_all(dir) {
            return fail("workspace", format!("`{}` is not writable: {error}", dir.display()));
        }
    }
    let probe = workspace.root().join(".doctor-probe");
    match std::fs::write(&probe, b"ok").and_then(|()| std::fs::remove_file(&probe)) {
        Ok(()) => pass("workspace", format!("`{}` is writable", workspace.root().display())),
        Err(error) => fail("workspace", format!("`{}` is not writable: {error}", workspace.root().display())),
    }
}

fn check_templates(config: &AppConfig) -> DoctorCheck {
    match TemplateSet::load(config.workspace.template_dir.as_deref()) {
        Ok(_) => {
            let source = match &config.workspace.template_dir {
                Some(dir) => format!("loaded from `{}`", dir.display()),
                None => "embedded templates parsed".to_string(),
            };
            pass("templates", source)
        }
        Err(error) => fail("templates", error.to_string()),
    }
}

fn check_llm_key(config: &AppConfig) -> DoctorCheck {
    match config.llm.require_api_key() {
        Ok(Some(_)) => pass("llm_key", format!("{} key present", config.llm.provider.as_str())),
        Ok(None) => pass("llm_key", format!("{} runs without a key", config.llm.provider.as_str())),
        Err(error) => fail("llm_key", error.to_string()),
    }
}

fn check_google_credentials(config: &AppConfig) -> DoctorCheck {
    let google = &config.google;
    let has_token = google.token_path.exists()
        || google
            .token_base64
            .as_ref()
            .is_some_and(|token| !token.expose_secret().trim().is_empty());
    if has_token {
        pass("google_credentials", "authorized token available")
    } else {
        fail(
            "google_credentials",
            format!(
                "no token at `{}`; set GOOGLE_TOKEN_BASE64 to a pre-authorized token",
                google.token_path.display()
            ),
        )
    }
}

fn check_vercel_token(config: &AppConfig) -> DoctorCheck {
    match config.deploy.require_vercel_token() {
        Ok(_) => pass("vercel_token", "token present"),
        Err(_) if config.deploy.mode == DeployMode::Cli => DoctorCheck {
            name: "vercel_token",
            status: CheckStatus::Skipped,
            details: "cli mode can use a logged-in Vercel CLI".to_string(),
        },
        Err(error) => fail("vercel_token", error.to_string()),
    }
}

fn check_npx(config: &AppConfig) -> DoctorCheck {
    match (which::which("npx"), config.deploy.mode) {
        (Ok(path), _) => pass("npx", format!("found at `{}`", path.display())),
        (Err(error), DeployMode::Cli) => fail("npx", format!("cli deploy mode needs npx: {error}")),
        (Err(_), DeployMode::Api) => DoctorCheck {
            name: "npx",
            status: CheckStatus::Skipped,
            details: "not needed in api deploy mode".to_string(),
        },
    }
}

fn pass(name: &'static str, details: impl Into<String>) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Pass, details: details.into() }
}

fn fail(name: &'static str, details: impl Into<String>) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Fail, details: details.into() }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
