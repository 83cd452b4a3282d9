//! Terminal and file output for the CLI commands.
use crate::pipeline::RunnerResult;
use crate::util::{condense_error, preview, strip_control_chars};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;

/// Preview width (columns) shown per article in verbose mode.
const PREVIEW_WIDTH: usize = 50;

/// Counts printed at the bottom of a scrape report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Prints the numbered scrape report followed by the summary line.
///
/// Every entry shows the URL, feed title when known, and character count;
/// `verbose` adds a one-line preview of the text. URLs that produced no
/// usable content are listed after the results.
pub fn print_scrape_report<W: Write>(
    out: &mut W,
    result: &RunnerResult,
    verbose: bool,
) -> io::Result<ScrapeSummary> {
    writeln!(out)?;
    writeln!(out, "--- Scrape results: {} ---", strip_control_chars(&result.feed_title))?;

    for (i, res) in result.results.iter().enumerate() {
        let n = i + 1;
        if let Some(e) = &res.error {
            writeln!(out, "✗ [{}] {}", n, res.url)?;
            writeln!(out, "     error: {}", condense_error(&e.to_string()))?;
            continue;
        }

        writeln!(out, "✓ [{}] {}", n, res.url)?;
        if let Some(title) = result.titles_map.get(&res.url) {
            writeln!(out, "     title: {}", strip_control_chars(title))?;
        }
        writeln!(out, "     length: {} chars", res.content.chars().count())?;
        if verbose {
            writeln!(out, "     preview: {}", single_line_preview(&res.content))?;
        }
    }

    let listed: HashSet<&str> = result.results.iter().map(|r| r.url.as_str()).collect();
    let unlisted: Vec<&String> = result
        .failed_urls
        .iter()
        .filter(|url| !listed.contains(url.as_str()))
        .collect();

    if !unlisted.is_empty() {
        writeln!(out, "Not recovered:")?;
        for url in unlisted {
            writeln!(out, "  - {}", url)?;
        }
    }

    let summary = ScrapeSummary {
        succeeded: result.results.iter().filter(|r| r.is_usable()).count(),
        failed: result.failed_urls.len(),
    };

    writeln!(out, "-------------------------------")?;
    writeln!(
        out,
        "Done: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    )?;

    Ok(summary)
}

/// Writes the whole run as pretty-printed JSON.
pub fn print_json<W: Write>(out: &mut W, result: &RunnerResult) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, result)?;
    writeln!(out)
}

/// Writes extracted text to `output_file`, or to stdout when `None`.
pub fn write_extraction(output_file: Option<&Path>, text: &str) -> io::Result<()> {
    match output_file {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!(path = %path.display(), bytes = text.len(), "Wrote extracted text");
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                writeln!(stdout)?;
            }
            stdout.flush()
        }
    }
}

fn single_line_preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let clean = strip_control_chars(&flat);
    preview(&clean, PREVIEW_WIDTH).into_owned()
}
