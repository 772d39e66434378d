//! OCR through the Tesseract command line tool.
//!
//! Frames are piped to `tesseract stdin stdout ... tsv` as PNG and the TSV
//! word table is parsed into [`TextFragment`]s.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::RgbaImage;

use crate::errors::{MarketError, MarketResult};
use crate::perception::traits::TextRecognizer;
use crate::perception::types::TextFragment;

pub struct TesseractCli {
    exe: PathBuf,
    args: Vec<String>,
    language: Option<String>,
}

impl TesseractCli {
    /// Verify the executable answers `--version`; a missing engine is fatal.
    pub fn new(exe: impl Into<PathBuf>, args: Vec<String>, language: Option<String>) -> MarketResult<Self> {
        let exe = exe.into();
        let version = query_version(&exe)?;
        tracing::debug!(exe = %exe.display(), version = %version, "tesseract version");
        Ok(Self { exe, args, language })
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }
}

fn query_version(exe: &Path) -> MarketResult<String> {
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .map_err(|_| MarketError::OcrEngineMissing(exe.display().to_string()))?;
    if !output.status.success() {
        return Err(MarketError::OcrEngineMissing(exe.display().to_string()));
    }
    // Older releases print the version banner on stderr.
    let banner = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Ok(String::from_utf8_lossy(&banner)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &RgbaImage) -> MarketResult<Vec<TextFragment>> {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| MarketError::Ocr(format!("PNG encode: {e}")))?;

        let mut cmd = Command::new(&self.exe);
        cmd.arg("stdin").arg("stdout");
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }
        cmd.args(&self.args)
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| MarketError::Ocr(format!("spawn {}: {e}", self.exe.display())))?;
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| MarketError::Ocr("tesseract stdin unavailable".into()))?;
            stdin.write_all(&png)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MarketError::Ocr(stderr.trim().to_string()));
        }
        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse Tesseract TSV output, keeping only rows that carry text.
pub fn parse_tsv(tsv: &str) -> MarketResult<Vec<TextFragment>> {
    let mut lines = tsv.lines();
    let header = lines
        .next()
        .ok_or_else(|| MarketError::Ocr("empty TSV output".into()))?;
    let columns: Vec<&str> = header.split('\t').collect();
    let col = |name: &str| {
        columns
            .iter()
            .position(|c| c.trim() == name)
            .ok_or_else(|| MarketError::Ocr(format!("TSV header lacks `{name}` column")))
    };
    let (left, top, width, height, conf, text) = (
        col("left")?,
        col("top")?,
        col("width")?,
        col("height")?,
        col("conf")?,
        col("text")?,
    );

    let mut fragments = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        let Some(raw_text) = cells.get(text) else {
            continue;
        };
        let raw_text = raw_text.trim();
        if raw_text.is_empty() {
            continue;
        }
        let num = |idx: usize| -> MarketResult<f64> {
            cells
                .get(idx)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .ok_or_else(|| MarketError::Ocr(format!("malformed TSV row: {line}")))
        };
        fragments.push(TextFragment {
            text: raw_text.to_string(),
            left: num(left)? as i32,
            top: num(top)? as i32,
            width: num(width)?.max(0.0) as u32,
            height: num(height)?.max(0.0) as u32,
            confidence: num(conf)? as f32,
        });
    }
    Ok(fragments)
}
