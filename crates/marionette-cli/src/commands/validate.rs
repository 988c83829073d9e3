use std::path::Path;

use crate::commands::load_json;
use crate::exit_codes;

use marionette_core::config::RuntimeConfig;
use marionette_core::model::TestFlow;
use marionette_core::validate::validate;

pub fn run(path: &Path, _config: &RuntimeConfig) -> anyhow::Result<i32> {
    let mut flow: TestFlow = match load_json(path, "flow") {
        Ok(f) => f,
        Err(code) => return Ok(code),
    };
    flow.auto_number_steps();

    let report = validate(&flow);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }

    if report.is_valid() {
        println!(
            "'{}' is valid ({} steps, {} warnings)",
            flow.test_name,
            flow.steps.len(),
            report.warnings.len()
        );
        Ok(exit_codes::SUCCESS)
    } else {
        println!(
            "'{}' is invalid ({} errors)",
            flow.test_name,
            report.errors.len()
        );
        Ok(exit_codes::TEST_FAILURE)
    }
}
