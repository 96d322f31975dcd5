// UI layer: the few interactive prompts the binary needs on first run.
// The watcher itself never prompts; `main` resolves everything here and
// hands the watcher a finished `Settings`.

use anyhow::Result;
use dialoguer::{Input, Password};

use crate::config::{ApiSection, StateFile};

/// Return the stored `[API]` section, asking the user for it (and storing
/// it in `state`) when this is the first run. The caller saves `state`.
pub fn api_section_or_prompt(state: &mut StateFile) -> Result<ApiSection> {
    if let Some(api) = &state.api {
        return Ok(api.clone());
    }
    let api = prompt_api_section()?;
    state.api = Some(api.clone());
    Ok(api)
}

/// Ask for the API key and the resubmission delay.
pub fn prompt_api_section() -> Result<ApiSection> {
    // `Password` keeps the key off the screen and out of scrollback.
    let api_key: String = Password::new().with_prompt("Enter your API key").interact()?;

    // Non-numeric input is rejected by the parser and re-prompted;
    // the validator covers zero.
    let resubmission_delay: u64 = Input::new()
        .with_prompt("Enter the delay between resubmissions in seconds")
        .validate_with(|delay: &u64| -> Result<(), &'static str> {
            if *delay > 0 {
                Ok(())
            } else {
                Err("Please provide a positive integer for the delay!")
            }
        })
        .interact_text()?;

    Ok(ApiSection {
        api_key,
        resubmission_delay,
        request_timeout: None,
    })
}

/// Ask for the algorithm label. The answer is not echoed back once entered.
pub fn prompt_algorithm() -> Result<String> {
    let algorithm: String = Input::new()
        .with_prompt("Enter the value for algorithm")
        .report(false)
        .interact_text()?;
    Ok(algorithm.trim().to_string())
}
