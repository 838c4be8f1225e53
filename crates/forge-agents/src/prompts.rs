//! Prompt constants and request builders for the producer collaborators.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes
//! so a given artifact can be traced back to the prompt that produced it.

use coordination::{ArtifactId, ArtifactLayout, CombinedResult, TaskMetadata};

use crate::agents::{GenerationRequest, RequestKind};
use crate::error::OrchestratorError;

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Generator preamble.
///
/// The Generator writes a complete artifact from scratch. It answers with a
/// single JSON object so the artifact id and file contents never have to be
/// recovered from prose.
pub const GENERATOR_PREAMBLE: &str = "\
You are a generator of hands-on Kubernetes learning exercises. Each exercise is a \
directory of files that a test harness deploys and checks against a live cluster.

## Exercise layout
- __init__.py: empty file.
- instruction.md: the user-facing challenge. References {{variables}} from session.json.
- concept.md: a short explanation of the concept being taught.
- session.json: a plain JSON object of template variables, for example \
  {\"namespace\": \"{{random_name()}}{{random_number(1,10)}}{{student_id()}}\"}. \
  It is NOT a Jinja template itself.
- setup.template.yaml: at minimum a Namespace named {{namespace}}, plus any prerequisites.
- answer.template.yaml: the complete solution, including the Namespace.
- test_01_setup.py: deploys setup.template.yaml.
- test_02_ready.py: waits until the resources from setup.template.yaml are ready.
- test_03_answer.py: deploys answer.template.yaml. It must be skipped when the \
  SKIP_ANSWER_TESTS environment variable is set.
- test_04_challenge.py: optional, only when the task needs pre-validation actions.
- test_05_check.py: validates the solution with kubectl and JSON parsing. It must FAIL \
  when the answer was not deployed.
- test_06_cleanup.py: deletes the namespace.

## Rules
- Template variables use {{ variable }} syntax. Loops and conditionals live in YAML \
  comments: #{% for i in [1,2,3] %} ... #{% endfor %}.
- Parse kubectl JSON output in checks and assert on specific fields.
- Use try/except and .get() for JSON access in checks.
- YAML is indented with 2 spaces.
- Include resource limits in pod specs.

## Output format
Reply with ONE JSON object and nothing else:
{\"artifact_id\": \"NNN_descriptive_name\", \"summary\": \"...\", \
\"files\": [{\"path\": \"instruction.md\", \"content\": \"...\"}]}
Paths are relative to the exercise directory. Write every required file.";

/// Fixer preamble.
///
/// The Fixer patches an existing artifact in place. It must only return the
/// files it changed.
pub const FIXER_PREAMBLE: &str = "\
You repair broken Kubernetes learning exercises. You are given the failure reasons, \
the full test output, and the current contents of every file in the exercise.

## Your job
1. Read every file to understand the exercise.
2. Identify which specific files are broken from the error messages.
3. Make targeted fixes to ONLY the broken files.
4. Return ONLY the fixed files. Do not return files that work.

## Debugging hints
- test_02_ready.py checks resources from setup.template.yaml, not answer.template.yaml. \
  Read session.json and setup.template.yaml to find the correct variable names.
- Do not just increase timeouts. Fix the root cause.
- Test flow: test_01 deploys setup, test_02 waits for it, test_03 deploys the answer, \
  test_05 validates the answer, test_06 cleans up.
- test_05_check.py must fail when the answer was not deployed.

## Output format
Reply with ONE JSON object and nothing else:
{\"artifact_id\": \"<the exercise id you were given>\", \"summary\": \"...\", \
\"files\": [{\"path\": \"test_02_ready.py\", \"content\": \"...\"}]}";

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn comma_list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

fn task_details(metadata: &TaskMetadata) -> String {
    format!(
        "- Concept: {}\n- Description: {}\n- Difficulty: {}\n- Objective: {}",
        metadata.topic, metadata.description, metadata.difficulty, metadata.objective
    )
}

/// Build the first generation request of a run.
///
/// `existing_ids` and `covered_topics` steer the Generator away from ids and
/// concepts that already exist.
pub fn build_generation_request(
    artifact_id: Option<&ArtifactId>,
    metadata: &TaskMetadata,
    layout: &ArtifactLayout,
    artifacts_dir_name: &str,
    existing_ids: &[String],
    covered_topics: &[String],
) -> GenerationRequest {
    let mut prompt = match artifact_id {
        Some(id) => format!(
            "Generate a complete learning exercise with ID '{id}' about '{}'.",
            metadata.topic
        ),
        None => format!(
            "Generate a complete learning exercise about '{}'. Choose a new ID of the form \
             NNN_descriptive_name (three digits 001-999, lowercase words joined by underscores).",
            metadata.topic
        ),
    };

    prompt.push_str(&format!("\n\nTask Details:\n{}", task_details(metadata)));
    prompt.push_str(&format!(
        "\n\nEXISTING EXERCISES (avoid these IDs): {}",
        comma_list_or_none(existing_ids)
    ));
    prompt.push_str(&format!(
        "\n\nPREVIOUSLY COVERED CONCEPTS (this is a new concept): {}",
        comma_list_or_none(covered_topics)
    ));
    match artifact_id {
        Some(id) => prompt.push_str(&format!("\n\nCreate directory: {artifacts_dir_name}/{id}/")),
        None => prompt.push_str(&format!("\n\nCreate directory: {artifacts_dir_name}/<ID>/")),
    }
    prompt.push_str(&format!(
        "\n\nCreate ALL required files: {}.",
        layout.required_files.join(", ")
    ));
    prompt.push_str(
        "\nMake sure all files are syntactically correct and the checks will pass.",
    );

    GenerationRequest {
        kind: RequestKind::Generate,
        artifact_id: artifact_id.cloned(),
        prompt,
        attempt: 1,
    }
}

/// Failure reasons phrased for a producer: one line per failed verdict.
pub fn producer_failure_reasons(combined: &CombinedResult) -> Vec<String> {
    let mut reasons = Vec::new();
    if !combined.validation.valid {
        reasons.push(format!("Validation: {}", combined.validation.reason));
    }
    if !combined.test.valid {
        reasons.push(format!("Tests: {}", combined.test.reason));
    }
    reasons
}

/// Build the request for the next attempt after a failure.
///
/// When the artifact directory exists the Fixer patches it in place. When it
/// does not (the producer never wrote anything) the Generator is asked to
/// create it again under the same id.
///
/// Topic and description must be present; their absence is a metadata
/// propagation defect and aborts the run.
pub fn repair_request(
    combined: &CombinedResult,
    raw_output: Option<&str>,
    artifact_exists: bool,
    artifacts_dir_name: &str,
    layout: &ArtifactLayout,
) -> Result<GenerationRequest, OrchestratorError> {
    let id = combined.artifact_id();
    let metadata = &combined.metadata;
    if metadata.topic.trim().is_empty() || metadata.description.trim().is_empty() {
        return Err(OrchestratorError::MissingMetadata {
            artifact_id: id.to_string(),
            topic: metadata.topic.clone(),
            description: metadata.description.clone(),
        });
    }

    let reasons = producer_failure_reasons(combined);
    let attempt = combined.retry_count + 1;
    let dir = format!("{artifacts_dir_name}/{id}/");

    if !artifact_exists {
        let mut prompt = format!(
            "Generate a complete learning exercise with ID '{id}' about '{}'. \
             This is retry attempt {} of {}.",
            metadata.topic, combined.retry_count, combined.max_retries
        );
        prompt.push_str(&format!(
            "\n\nPREVIOUS ATTEMPT FAILED:\n{}",
            bullet_list(&reasons)
        ));
        prompt.push_str(&format!(
            "\n\nIMPORTANT: You MUST use the exact ID '{id}'. Do not generate a new ID."
        ));
        prompt.push_str(&format!("\n\nCreate directory: {dir}"));
        prompt.push_str(&format!("\n\nTask Details:\n{}", task_details(metadata)));
        prompt.push_str(&format!(
            "\n\nCreate ALL required files: {}.",
            layout.required_files.join(", ")
        ));
        return Ok(GenerationRequest {
            kind: RequestKind::Generate,
            artifact_id: Some(id.clone()),
            prompt,
            attempt,
        });
    }

    let mut prompt = format!(
        "Fix the failed exercise '{id}' located in '{dir}'.\n\nThis is repair attempt {} of {}.",
        combined.retry_count, combined.max_retries
    );
    prompt.push_str(&format!(
        "\n\nEXERCISE FAILED WITH THESE ERRORS:\n{}",
        bullet_list(&reasons)
    ));
    if let Some(raw) = raw_output.filter(|r| !r.is_empty()) {
        prompt.push_str(&format!("\n\nFULL TEST OUTPUT:\n```\n{raw}\n```"));
    }
    prompt.push_str(&format!(
        "\n\nYOUR TASK:\
         \n1. READ all files from '{dir}' to understand the exercise\
         \n2. ANALYZE the errors and identify which files are broken\
         \n3. Make TARGETED FIXES to ONLY the broken files\
         \n4. WRITE ONLY the fixed files back to '{dir}'\
         \n\nCRITICAL: DO NOT rewrite all files! Only fix the broken ones!\
         \n- If a file is missing, create it\
         \n- If a file is broken, fix and write only that file\
         \n- If a file is working, DO NOT write it"
    ));
    prompt.push_str(&format!(
        "\n\nRequired files (for reference, only fix what's broken):\n{}",
        bullet_list(&layout.required_files)
    ));
    prompt.push_str(&format!(
        "\n\nTask Context:\n- Artifact ID: {id}\n{}",
        task_details(metadata)
    ));

    Ok(GenerationRequest {
        kind: RequestKind::Repair,
        artifact_id: Some(id.clone()),
        prompt,
        attempt,
    })
}
