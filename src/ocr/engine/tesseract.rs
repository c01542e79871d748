use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::warn;

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs (is it installed?)")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keeps the requested languages tesseract actually has. Errors when none
/// of them are installed.
pub(super) fn normalize_ocr_languages(requested: &str, available: &[String]) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }

    Ok(chosen.join("+"))
}

pub(super) fn run_tesseract_tsv(path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed() -> Vec<String> {
        vec!["eng".to_string(), "jpn".to_string(), "osd".to_string()]
    }

    #[test]
    fn language_list_skips_the_header() {
        let stdout = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\njpn\n\nosd\n";
        assert_eq!(parse_language_list(stdout), installed());
    }

    #[test]
    fn missing_languages_are_dropped() {
        let langs = normalize_ocr_languages("jpn+chi_sim, eng", &installed()).expect("langs");
        assert_eq!(langs, "jpn+eng");
    }

    #[test]
    fn no_installed_language_is_an_error() {
        let err = normalize_ocr_languages("kor", &installed()).expect_err("missing");
        assert!(err.to_string().contains("kor"));
        assert!(normalize_ocr_languages("  ", &installed()).is_err());
    }
}
