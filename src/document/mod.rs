use std::{fs, path::{Path, PathBuf}};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DocQaError, Result};

pub mod splitter;

pub use splitter::{Chunk, RecursiveSplitter};

/// Extensions `load_document` knows how to read.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "doc", "docx"];

/// Raw text of one loaded file, or of one page for paged formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub source: PathBuf,
    pub page: Option<u32>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self { text: text.into(), source: source.into(), page: None }
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

pub fn load_document(path: &Path) -> Result<Vec<Document>> {
    let ext = extension_of(path);
    let docs = match ext.as_str() {
        "txt" => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            vec![Document::new(text, path)]
        }
        "md" => {
            let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            vec![Document::new(markdown_to_text(&raw), path)]
        }
        "pdf" => load_pdf(path)?,
        "doc" | "docx" => vec![Document::new(load_docx(path)?, path)],
        _ => return Err(DocQaError::UnsupportedFileType(path.display().to_string()).into()),
    };
    debug!(path = %path.display(), documents = docs.len(), "loaded document");
    Ok(docs)
}

#[cfg(feature = "markdown")]
pub fn markdown_to_text(markdown: &str) -> String {
    use pulldown_cmark::{Event, Parser, Tag};

    let mut out = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(Tag::Paragraph)
            | Event::End(Tag::Heading(..))
            | Event::End(Tag::Item)
            | Event::End(Tag::CodeBlock(_))
            | Event::End(Tag::BlockQuote) => out.push_str("\n\n"),
            _ => {}
        }
    }
    out.trim_end().to_string()
}

#[cfg(not(feature = "markdown"))]
pub fn markdown_to_text(markdown: &str) -> String {
    markdown.to_string()
}

fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    #[cfg(feature = "pdf")]
    {
        let doc = lopdf::Document::load(path).with_context(|| format!("opening PDF {}", path.display()))?;
        let mut pages = Vec::new();
        for (index, page_number) in doc.get_pages().keys().enumerate() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => pages.push(Document {
                    text,
                    source: path.to_path_buf(),
                    page: Some(index as u32),
                }),
                Err(err) => debug!(page = page_number, %err, "skipping unreadable PDF page"),
            }
        }
        Ok(pages)
    }
    #[cfg(not(feature = "pdf"))]
    {
        let _ = path;
        Err(DocQaError::FeatureDisabled { format: "PDF", feature: "pdf" }.into())
    }
}

fn load_docx(path: &Path) -> Result<String> {
    #[cfg(feature = "docx")]
    {
        use std::io::Read;

        let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("{} is not a zip-based Word document", path.display()))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .with_context(|| format!("{} has no word/document.xml", path.display()))?
            .read_to_string(&mut xml)?;
        Ok(wordprocessing_xml_to_text(&xml))
    }
    #[cfg(not(feature = "docx"))]
    {
        let _ = path;
        Err(DocQaError::FeatureDisabled { format: "Word", feature: "docx" }.into())
    }
}

#[cfg(feature = "docx")]
fn wordprocessing_xml_to_text(xml: &str) -> String {
    let spaced = xml
        .replace("</w:p>", "\n\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n");
    let mut text = String::with_capacity(spaced.len());
    let mut in_tag = false;
    for c in spaced.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    text.trim().to_string()
}

/// Copies an uploaded file into `data_dir` under its own file name.
pub fn stage_upload(src: &Path, data_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .with_context(|| format!("{} has no file name", src.display()))?;
    fs::create_dir_all(data_dir).with_context(|| format!("creating {}", data_dir.display()))?;
    let dest = data_dir.join(name);
    if dest != src {
        fs::copy(src, &dest).with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
    }
    Ok(dest)
}
