// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Shape every edit-producing prompt asks for.
const EDIT_SHAPE_SNIPPET: &str = r#"{
  "file": "snippet.py",
  "explanation": "brief reason",
  "edits": [ { "line": <int>, "new": "replacement text (can contain \n)" } ]
}"#;

const EDIT_RULES: &str = "Rules: Use 1-based line numbers of the original code. Keep edits minimal. Maintain proper indentation in 'new'.";

fn fenced_python(code: &str) -> String {
    format!("```python\n{}\n```", code)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Preamble for the command-line fixer.
pub const FIXER_SYSTEM: &str = "You are a precise Python code fixer. Given a Python file, \
return ONLY a JSON object describing minimal, safe edits. \
Use 1-based line numbers from the ORIGINAL file. \
Each edit replaces exactly one existing line with one or more lines (multi-line allowed). \
Output must be raw JSON (no markdown, no code fences). \
Keep changes simple and focused on correctness (e.g., basic input validation, division-by-zero). \
Avoid refactors, new dependencies, or stylistic overhauls. \
Prefer the smallest fix that would make straightforward unit tests pass.";

/// Shorter preamble used by the web analyzer.
pub const SERVER_FIXER_SYSTEM: &str = "You are a precise code fixer. Return ONLY JSON edits. \
Keep changes minimal and focused. Prefer correctness over refactors. \
Preserve existing behavior unless a clear bug is identified.";

pub const FIX_INSTRUCTIONS: &str = r#"Analyze the code and identify incorrect or buggy lines (syntax or logic).
Output a compact JSON of this shape ONLY (no extra text, no markdown):
{
  "file": "<relative file path>",
  "explanation": "brief reason of the changes",
  "edits": [
    { "line": <int>, "new": "replacement text (can contain\n for multi-line)" }
  ]
}

Rules:
- Use 1-based line numbers from the original file.
- Keep edits minimal: only lines that must change to fix correctness.
- Maintain proper indentation in 'new' for any block context.
- Do NOT include markdown fences, extra commentary, or the entire original code.
"#;

/// `File:` header, fenced code, then the edit instructions.
pub fn fix_request(path: &str, content: &str) -> String {
    format!(
        "File: {}\n\nCode:\n{}\n\n{}",
        path,
        fenced_python(content),
        FIX_INSTRUCTIONS
    )
}

pub fn cli_fix_prompt(path: &str, content: &str) -> String {
    format!("{}\n\n{}", FIXER_SYSTEM, fix_request(path, content))
}

pub fn server_fix_prompt(filename: &str, code: &str) -> String {
    format!("{}\n\n{}", SERVER_FIXER_SYSTEM, fix_request(filename, code))
}

pub fn crosscheck_prompt(code: &str) -> String {
    format!(
        r#"You are a senior Python reviewer. Given the following Python code, cross-check its correctness, identify edge cases, and mentally design 3-7 meaningful unit tests. Infer whether the code would PASS or FAIL each test based on static reasoning. DO NOT output any test code or code snippets.

Return ONLY a compact JSON object with this exact shape (no extra text, no markdown fences):
{{
  "overall": "pass|fail|mixed",
  "summary": "short overall assessment",
  "tests": [
    {{ "name": "brief test name", "description": "what it checks", "status": "pass|fail", "reason": "why" }}
  ]
}}

Constraints: Do not include any fields other than those shown. Do not include any code or stack traces.

Code (for analysis):
{}
"#,
        fenced_python(code)
    )
}

pub fn fix_from_crosscheck_prompt(report_lines: &[String], code: &str) -> String {
    format!(
        "You are a precise code fixer. Modify the given Python code minimally so that it satisfies the \
failing tests described in the cross-check report. Preserve existing correct behavior. \
Return ONLY the JSON edits in this exact shape (no code blocks, no extra text):\n{}\n{}\n\n\
Cross-check report (no code shown):\n{}\n\nCode to fix:\n{}\n",
        EDIT_SHAPE_SNIPPET,
        EDIT_RULES,
        report_lines.join("\n"),
        fenced_python(code)
    )
}

/// Leading text part of a vision request; the image and the code follow as
/// separate parts.
pub fn vision_instruction(user_prompt: &str) -> String {
    format!(
        "You are a precise code fixer with vision. Compare the intended UI/function from the image \
and the user's prompt against the given Python code. Identify minimal edits to correct the code \
so that it matches the behavior/appearance implied by the image + prompt. \
Return ONLY JSON edits using this shape: {}\n{}\n\nUser prompt:\n{}",
        EDIT_SHAPE_SNIPPET, EDIT_RULES, user_prompt
    )
}

pub fn vision_code_part(code: &str) -> String {
    format!("\n\nCode to fix:\n{}", fenced_python(code))
}

pub fn summary_prompt(code: &str) -> String {
    format!(
        r#"
You are an expert code analyst. Analyze the following Python code chunk and provide a concise summary.
Describe what the function or class does, its inputs, and its outputs.
Respond in the following format, and do not include the original code in your response:

Summary: [A short summary of the code's purpose]
Inputs: [Describe the inputs or parameters, or 'None']
Outputs: [Describe the return value, or 'None']

---
Code Chunk:
{}
---
Your Analysis:
"#,
        fenced_python(code)
    )
}
