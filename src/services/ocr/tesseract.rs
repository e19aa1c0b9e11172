// src/services/ocr/tesseract.rs

//! `pdftoppm` + `tesseract` command-line recognizer.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;

use super::{OcrWord, TextRecognizer};
use crate::error::{AppError, Result};

/// Recognizer shelling out to poppler and tesseract.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn render_page(&self, pdf_path: &Path, page_number: u32, dpi: u32) -> Result<PathBuf> {
        let stem = pdf_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("pdf")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>();
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let output_root = std::env::temp_dir().join(format!(
            "aip_ocr_{}_{}_{}_{}",
            stem,
            std::process::id(),
            page_number,
            stamp
        ));
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));

        let output = Command::new("pdftoppm")
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(pdf_path)
            .arg(&output_root)
            .output()
            .map_err(|e| AppError::OcrUnavailable(format!("pdftoppm: {e}")))?;

        if !output.status.success() {
            return Err(AppError::validation(format!(
                "pdftoppm failed for {} page {}: {}",
                pdf_path.display(),
                page_number,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !png_path.exists() {
            return Err(AppError::validation(format!(
                "pdftoppm produced no image for {} page {}",
                pdf_path.display(),
                page_number
            )));
        }
        Ok(png_path)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        command_available("pdftoppm", "-v") && command_available("tesseract", "--version")
    }

    fn recognize_page(&self, pdf_path: &Path, page_number: u32, dpi: u32) -> Result<Vec<OcrWord>> {
        let png_path = self.render_page(pdf_path, page_number, dpi)?;

        let output = Command::new("tesseract")
            .arg(&png_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .output();
        let _ = fs::remove_file(&png_path);
        let output = output.map_err(|e| AppError::OcrUnavailable(format!("tesseract: {e}")))?;

        if !output.status.success() {
            return Err(AppError::validation(format!(
                "tesseract failed for {} page {}: {}",
                pdf_path.display(),
                page_number,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn command_available(program: &str, version_flag: &str) -> bool {
    Command::new(program).arg(version_flag).output().is_ok()
}

/// Parse word rows (level 5) from tesseract TSV output.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let confidence: f64 = cols[10].parse().ok()?;
            let text = cols[11].replace('\u{0000}', "").trim().to_string();
            if confidence < 0.0 || text.is_empty() {
                return None;
            }
            Some(OcrWord {
                text,
                left: cols[6].parse().ok()?,
                top: cols[7].parse().ok()?,
                width: cols[8].parse().ok()?,
                height: cols[9].parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tsv_keeps_confident_words() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t1190\t1684\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t100\t200\t80\t20\t91.5\tAERÓDROMO\n\
                   5\t1\t1\t1\t1\t2\t190\t200\t40\t20\t-1\t \n\
                   5\t1\t1\t1\t1\t3\t240\t200\t60\t20\t88\tSADF\n";
        let words = parse_tsv(tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "AERÓDROMO");
        assert_eq!(words[0].left, 100.0);
        assert_eq!(words[1].text, "SADF");
    }
}
