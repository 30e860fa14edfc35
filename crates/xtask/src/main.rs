use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use arcade_domain::{placeholder_keys, DiscussionStep, Stage, StepEdit, StepId, StepKind};

const USAGE: &str = "Usage: cargo xtask <command>

Commands:
  validate-stages <stages.json>
  edit-step <stages.json> <stage-client-id> <step-id> <edit.json>";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["validate-stages", path] => validate_stages(Path::new(path)),
        ["edit-step", path, stage, step, edit] => {
            edit_step(Path::new(path), stage, &StepId::new(*step), Path::new(edit))
        }
        [cmd, ..] => anyhow::bail!("Unknown or incomplete xtask command: {cmd}\n\n{USAGE}"),
        [] => anyhow::bail!("{USAGE}"),
    }
}

fn read_stages(path: &Path) -> anyhow::Result<Vec<Stage>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Report structural defects (errors) and unknown placeholders (warnings).
fn validate_stages(path: &Path) -> anyhow::Result<()> {
    let stages = read_stages(path)?;
    let mut errors = 0;

    for stage in &stages {
        for defect in stage.validate_references() {
            println!("error: stage {}: {defect}", stage.client_id);
            errors += 1;
        }
        for (step, key) in unknown_placeholders(stage) {
            println!("warning: stage {}: step {step} reads {{{{{key}}}}}, which no step in this stage saves", stage.client_id);
        }
    }

    if errors > 0 {
        anyhow::bail!("{errors} defect(s) in {}", path.display());
    }
    println!("{} stage(s) ok", stages.len());
    Ok(())
}

/// Apply a JSON step edit and write the stages back.
fn edit_step(path: &Path, stage_id: &str, step_id: &StepId, edit_path: &Path) -> anyhow::Result<()> {
    let mut stages = read_stages(path)?;
    let raw = std::fs::read_to_string(edit_path)
        .with_context(|| format!("reading {}", edit_path.display()))?;
    let edit: StepEdit =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", edit_path.display()))?;

    let stage = stages
        .iter_mut()
        .find(|s| s.client_id.as_str() == stage_id)
        .with_context(|| format!("no stage {stage_id} in {}", path.display()))?;
    stage.apply_step_edit(step_id, edit)?;

    let out = serde_json::to_string_pretty(&stages)?;
    std::fs::write(path, out).with_context(|| format!("writing {}", path.display()))?;
    println!("updated step {step_id} in stage {stage_id}");
    Ok(())
}

/// Placeholder roots read by a step that no step in the stage writes. Values
/// may still come from room state, so these are only warnings.
fn unknown_placeholders(stage: &Stage) -> Vec<(StepId, String)> {
    let saved: BTreeSet<String> = stage.steps().flat_map(saved_keys).collect();

    let mut unknown = Vec::new();
    for step in stage.steps() {
        for text in templated_texts(step) {
            for key in placeholder_keys(text) {
                let root = key.split('.').next().unwrap_or_default().to_string();
                if !saved.contains(&root) {
                    unknown.push((step.step_id.clone(), root));
                }
            }
        }
    }
    unknown
}

fn saved_keys(step: &DiscussionStep) -> Vec<String> {
    match &step.kind {
        StepKind::RequestUserInput(input) => vec![input.save_response_variable_name.clone()],
        StepKind::Prompt(prompt) => prompt
            .json_response_data
            .iter()
            .map(|field| field.name.clone())
            .collect(),
        _ => Vec::new(),
    }
}

fn templated_texts(step: &DiscussionStep) -> Vec<&str> {
    match &step.kind {
        StepKind::SystemMessage(s) => vec![s.message.as_str()],
        StepKind::RequestUserInput(s) => vec![s.message.as_str()],
        StepKind::Prompt(s) => vec![
            s.prompt_text.as_str(),
            s.response_format.as_str(),
            s.custom_system_role.as_str(),
        ],
        StepKind::EndOfPhaseReflection(s) => s
            .questions
            .iter()
            .map(String::as_str)
            .chain([s.message.as_str()])
            .collect(),
        StepKind::Conditional(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_domain::Flow;

    #[test]
    fn placeholders_saved_in_the_stage_are_known() {
        let stage = Stage::discussion(
            "intro",
            vec![Flow::new(
                "f1",
                vec![
                    DiscussionStep::new("ask", StepKind::request_user_input("Name?", "name")),
                    DiscussionStep::new("hi", StepKind::system_message("Hi {{name}}, you have {{score.total}}")),
                ],
            )],
        );

        assert_eq!(
            unknown_placeholders(&stage),
            vec![(StepId::new("hi"), "score".to_string())]
        );
    }
}
