//! `linefix chunk` and `linefix summarize`: work over a whole source tree.

use anyhow::Result;
use linefix_adapters::Config;
use linefix_engine::{
    load_documents, split_documents, summarize_chunks, write_index, Chunk, ClientConfig,
    CompletionModel, LlmClient, RecursiveSplitter,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct SummarizeArgs {
    pub directory: PathBuf,
    pub glob: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub limit: Option<usize>,
    pub out: PathBuf,
}

fn chunk_tree(
    root: &Path,
    glob: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    limit: Option<usize>,
) -> Result<Option<Vec<Chunk>>> {
    let splitter = RecursiveSplitter::python(chunk_size, chunk_overlap)?;
    let documents = load_documents(root, glob, limit)?;
    if documents.is_empty() {
        return Ok(None);
    }
    tracing::info!(files = documents.len(), "splitting documents");
    Ok(Some(split_documents(&documents, &splitter)))
}

pub fn run_chunk(
    root: &Path,
    glob: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    out: &mut dyn Write,
) -> Result<()> {
    if !root.exists() {
        anyhow::bail!("Provided path does not exist: {}", root.display());
    }
    let Some(chunks) = chunk_tree(root, glob, chunk_size, chunk_overlap, None)? else {
        writeln!(out, "No documents matched the provided pattern. Nothing to split.")?;
        return Ok(());
    };

    writeln!(out, "Successfully split the project into {} chunks.", chunks.len())?;
    if let Some(first) = chunks.first() {
        writeln!(out, "\n--- Example of the first chunk: ---")?;
        writeln!(out, "{}", first.content)?;
    }
    Ok(())
}

pub async fn run_summarize(config: &Config, args: SummarizeArgs) -> Result<()> {
    let client_config = ClientConfig::from_config(config)?;
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let client = LlmClient::new(client_config)?;
    summarize_tree(
        &client,
        &config.model,
        timeout,
        config.api_key.as_deref(),
        &args,
        &mut std::io::stdout().lock(),
    )
    .await
}

async fn summarize_tree(
    llm: &dyn CompletionModel,
    model: &str,
    timeout: Duration,
    secret: Option<&str>,
    args: &SummarizeArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let chunks = chunk_tree(
        &args.directory,
        &args.glob,
        args.chunk_size,
        args.chunk_overlap,
        args.limit,
    )?
    .unwrap_or_default();
    if chunks.is_empty() {
        writeln!(out, "No chunks produced. Exiting.")?;
        return Ok(());
    }

    let run = summarize_chunks(llm, &chunks, model, timeout, secret).await;
    if run.records.is_empty() {
        writeln!(out, "No documents were processed. Exiting.")?;
        return Ok(());
    }
    if let Some(usage) = &run.usage {
        tracing::info!(
            prompt_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            "summary token usage"
        );
    }

    write_index(&args.out, &run.records)?;
    writeln!(
        out,
        "Wrote {} summaries to {} ({} chunk(s) failed).",
        run.records.len(),
        args.out.display(),
        run.failed.len()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linefix_engine::llm::{CompletionRequest, LlmResponse};
    use std::future::Future;
    use std::pin::Pin;

    struct Summarizer;

    impl CompletionModel for Summarizer {
        fn complete<'a>(
            &'a self,
            request: CompletionRequest,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<LlmResponse>> + Send + 'a>> {
            Box::pin(async move {
                Ok(LlmResponse {
                    content: "Adds numbers. key=secret-key".into(),
                    usage: None,
                    model: request.model,
                })
            })
        }
    }

    fn write_tree(dir: &Path) {
        std::fs::create_dir_all(dir.join("pkg")).unwrap();
        std::fs::write(dir.join("pkg/calc.py"), "def add(a, b):\n    return a + b\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "not python").unwrap();
    }

    #[test]
    fn chunk_prints_first_chunk() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());

        let mut out = Vec::new();
        run_chunk(dir.path(), "**/*.py", 2000, 200, &mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("Successfully split the project into 1 chunks."));
        assert!(printed.contains("--- Example of the first chunk: ---\ndef add(a, b):"));
    }

    #[test]
    fn chunk_reports_empty_match() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());

        let mut out = Vec::new();
        run_chunk(dir.path(), "**/*.rs", 2000, 200, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "No documents matched the provided pattern. Nothing to split.\n"
        );
    }

    #[test]
    fn chunk_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = run_chunk(&missing, "**/*.py", 2000, 200, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().starts_with("Provided path does not exist"));
    }

    #[tokio::test]
    async fn summarize_writes_redacted_index() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let index = dir.path().join("summary_index.json");
        let args = SummarizeArgs {
            directory: dir.path().to_path_buf(),
            glob: "**/*.py".into(),
            chunk_size: 3000,
            chunk_overlap: 200,
            limit: None,
            out: index.clone(),
        };

        let mut out = Vec::new();
        summarize_tree(
            &Summarizer,
            "gemini-1.5-pro-latest",
            Duration::from_secs(5),
            Some("secret-key"),
            &args,
            &mut out,
        )
        .await
        .unwrap();

        let written = std::fs::read_to_string(&index).unwrap();
        assert!(written.contains("Adds numbers. key=[REDACTED]"));
        assert!(!written.contains("secret-key"));
        assert!(String::from_utf8(out).unwrap().starts_with("Wrote 1 summaries"));
    }

    #[tokio::test]
    async fn summarize_with_no_chunks_exits_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let args = SummarizeArgs {
            directory: dir.path().to_path_buf(),
            glob: "**/*.py".into(),
            chunk_size: 3000,
            chunk_overlap: 200,
            limit: None,
            out: dir.path().join("index.json"),
        };

        let mut out = Vec::new();
        summarize_tree(&Summarizer, "m", Duration::from_secs(5), None, &args, &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No chunks produced. Exiting.\n");
        assert!(!args.out.exists());
    }
}
