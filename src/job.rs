//! Unattended runs driven by environment variables.

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::models::{Credentials, SecurityAnswers, SheetTarget};
use crate::pipeline::{run_once, PortfolioSource, RunOutcome, SnapshotSink};

pub const PAN_VAR: &str = "PAN";
pub const PASSWORD_VAR: &str = "PASSWORD";
pub const SECURITY_QUESTIONS_VAR: &str = "SECURITY_QUESTIONS_JSON";
pub const SPREADSHEET_ID_VAR: &str = "SPREADSHEET_ID";
pub const SHEET_NAME_VAR: &str = "SHEET_NAME";

/// Everything a job run needs, validated up front.
#[derive(Debug)]
pub struct JobInput {
    pub credentials: Credentials,
    pub target: SheetTarget,
}

impl JobInput {
    /// Read the job variables through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F, default_tab: &str) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let pan = get(PAN_VAR);
        let password = get(PASSWORD_VAR);
        let questions = get(SECURITY_QUESTIONS_VAR);
        let spreadsheet_id = get(SPREADSHEET_ID_VAR);

        let missing: Vec<&str> = [
            (PAN_VAR, pan.is_none()),
            (PASSWORD_VAR, password.is_none()),
            (SECURITY_QUESTIONS_VAR, questions.is_none()),
            (SPREADSHEET_ID_VAR, spreadsheet_id.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(pan), Some(password), Some(questions), Some(spreadsheet_id)) =
            (pan, password, questions, spreadsheet_id)
        else {
            return Err(Error::InvalidInput(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        };

        let answers = SecurityAnswers::from_json(&questions)?;
        let tab = get(SHEET_NAME_VAR).unwrap_or_else(|| default_tab.to_string());

        Ok(Self {
            credentials: Credentials::new(pan, password, answers),
            target: SheetTarget::new(spreadsheet_id).with_tab(Some(tab)),
        })
    }
}

/// Process exit status for a run result: 0 on success, 1 otherwise.
pub fn exit_status<T>(result: &Result<T>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Scrape and append once for an already validated input.
pub async fn execute(
    input: &JobInput,
    source: &dyn PortfolioSource,
    sink: &dyn SnapshotSink,
) -> Result<RunOutcome> {
    info!(spreadsheet_id = %input.target.spreadsheet_id, "Starting snapshot job");
    let outcome = run_once(source, sink, &input.credentials, Some(&input.target)).await?;
    info!(
        updated_cells = outcome.sheet.as_ref().and_then(|s| s.updated_cells()).unwrap_or(0),
        "Snapshot job completed"
    );
    Ok(outcome)
}

/// Validate the environment, then run. Invalid input never reaches `source`.
pub async fn run<F>(
    lookup: F,
    default_tab: &str,
    source: &dyn PortfolioSource,
    sink: &dyn SnapshotSink,
) -> u8
where
    F: Fn(&str) -> Option<String>,
{
    let input = match JobInput::from_lookup(lookup, default_tab) {
        Ok(input) => input,
        Err(err) => {
            error!(error = %err, "Invalid job input");
            return 1;
        }
    };

    let result = execute(&input, source, sink).await;
    if let Err(err) = &result {
        error!(error = %err, "Snapshot job failed");
    }
    exit_status(&result)
}
