//! Export of a question/answer exchange to Word and PDF documents.
//!
//! Both formats share one layout: a "PRML Question" heading, the question, an "Answer" heading,
//! then the answer one line at a time. The PDF uses US-letter pages with 40pt margins and a 14pt
//! line height, starting a new page when a line would cross the bottom margin.

use docx_rs::{Docx, Paragraph, Run};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const QUESTION_HEADING: &str = "PRML Question";
const ANSWER_HEADING: &str = "Answer";

const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const MARGIN_PT: f32 = 40.0;
const LINE_HEIGHT_PT: f32 = 14.0;
const HEADING_SIZE_PT: f32 = 14.0;
const BODY_SIZE_PT: f32 = 11.0;

/// Errors raised while rendering or saving an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Word document could not be packaged.
    #[error("failed to build Word document: {0}")]
    Docx(String),
    /// PDF document could not be rendered.
    #[error("failed to build PDF document: {0}")]
    Pdf(String),
    /// Output file could not be written.
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Office Open XML word-processing document (`.docx`).
    Word,
    /// Portable Document Format.
    Pdf,
}

impl std::str::FromStr for ExportFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "word" | "docx" => Ok(Self::Word),
            "pdf" => Ok(Self::Pdf),
            _ => Err(()),
        }
    }
}

impl ExportFormat {
    /// MIME type of the produced document.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Word => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pdf => "application/pdf",
        }
    }
}

/// Render the exchange as a `.docx` document.
pub fn word_bytes(question: &str, answer: &str) -> Result<Vec<u8>, ExportError> {
    let mut docx = Docx::new()
        .add_paragraph(heading(QUESTION_HEADING))
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(question)))
        .add_paragraph(heading(ANSWER_HEADING));
    for line in answer.split('\n') {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|error| ExportError::Docx(error.to_string()))?;
    Ok(buffer.into_inner())
}

fn heading(text: &str) -> Paragraph {
    // docx-rs sizes are half-points.
    Paragraph::new().add_run(Run::new().add_text(text).bold().size(28))
}

/// Render the exchange as a PDF document.
pub fn pdf_bytes(question: &str, answer: &str) -> Result<Vec<u8>, ExportError> {
    let (document, page, layer) = PdfDocument::new(
        QUESTION_HEADING,
        pt(PAGE_WIDTH_PT),
        pt(PAGE_HEIGHT_PT),
        "Layer 1",
    );
    let bold = document
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|error| ExportError::Pdf(error.to_string()))?;
    let regular = document
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|error| ExportError::Pdf(error.to_string()))?;

    let mut layer = document.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT_PT - MARGIN_PT;

    write_line(&layer, QUESTION_HEADING, HEADING_SIZE_PT, y, &bold);
    y -= 20.0;
    write_line(&layer, question, BODY_SIZE_PT, y, &regular);
    y -= 30.0;
    write_line(&layer, ANSWER_HEADING, HEADING_SIZE_PT, y, &bold);
    y -= 20.0;

    for line in answer.split('\n') {
        write_line(&layer, line, BODY_SIZE_PT, y, &regular);
        y -= LINE_HEIGHT_PT;
        if y < MARGIN_PT {
            let (next_page, next_layer) =
                document.add_page(pt(PAGE_WIDTH_PT), pt(PAGE_HEIGHT_PT), "Layer 1");
            layer = document.get_page(next_page).get_layer(next_layer);
            y = PAGE_HEIGHT_PT - MARGIN_PT;
        }
    }

    document
        .save_to_bytes()
        .map_err(|error| ExportError::Pdf(error.to_string()))
}

fn write_line(layer: &PdfLayerReference, text: &str, size: f32, y: f32, font: &IndirectFontRef) {
    layer.use_text(text, size, pt(MARGIN_PT), pt(y), font);
}

fn pt(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

/// Render the exchange in `format` and write it to `path`.
pub fn save(
    format: ExportFormat,
    question: &str,
    answer: &str,
    path: &Path,
) -> Result<(), ExportError> {
    let bytes = match format {
        ExportFormat::Word => word_bytes(question, answer)?,
        ExportFormat::Pdf => pdf_bytes(question, answer)?,
    };
    std::fs::write(path, bytes)?;
    tracing::info!(path = %path.display(), format = ?format, "Saved export");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_names() {
        assert_eq!("Word".parse::<ExportFormat>(), Ok(ExportFormat::Word));
        assert_eq!("pdf".parse::<ExportFormat>(), Ok(ExportFormat::Pdf));
        assert!("txt".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Pdf.mime_type(), "application/pdf");
    }

    #[test]
    fn word_export_is_a_zip_package() {
        let bytes = word_bytes("What is a kernel?", "A similarity function.\nSecond line")
            .expect("docx");
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn pdf_export_spans_pages_for_long_answers() {
        let long_answer = (0..200)
            .map(|index| format!("line {index}"))
            .collect::<Vec<_>>()
            .join("\n");
        let bytes = pdf_bytes("What is a kernel?", &long_answer).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));

        let document = lopdf::Document::load_mem(&bytes).expect("parse pdf");
        assert!(document.get_pages().len() > 1);
    }

    #[test]
    fn save_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("answer.pdf");
        save(ExportFormat::Pdf, "q", "a", &path).expect("save");
        assert!(std::fs::metadata(&path).expect("metadata").len() > 0);
    }
}
