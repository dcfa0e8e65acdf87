use std::fmt;
use std::path::Path;

use resvg::usvg;
use tiny_skia::{Pixmap, Transform};

use crate::error::{VizError, VizResult};

/// Output surface chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Svg,
    Png,
    Pdf,
}

impl Format {
    pub fn from_path(path: &Path) -> VizResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                VizError::Render(format!("Output file {} has no extension", path.display()))
            })?
            .to_ascii_lowercase();

        match ext.as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            _ => Err(VizError::Render(format!(
                "Unsupported output format: .{} (use .svg, .png or .pdf)",
                ext
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Svg => "SVG",
            Format::Png => "PNG",
            Format::Pdf => "PDF",
        })
    }
}

/// Write `svg` to `path`, converting according to the extension.
pub fn write(svg: &str, path: &Path, png_scale: f32) -> VizResult<Format> {
    let format = Format::from_path(path)?;
    let bytes = match format {
        Format::Svg => svg.as_bytes().to_vec(),
        Format::Png => svg_to_png(svg, png_scale)?,
        Format::Pdf => svg_to_pdf(svg)?,
    };
    std::fs::write(path, bytes)?;
    tracing::debug!(path = %path.display(), ?format, "frame written");
    Ok(format)
}

pub fn svg_to_png(svg: &str, scale: f32) -> VizResult<Vec<u8>> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(VizError::Render(format!("Invalid PNG scale: {}", scale)));
    }

    let mut opts = usvg::Options::default();
    {
        let fontdb = opts.fontdb_mut();
        fontdb.load_system_fonts();
        if let Some(family) = sans_fallback(fontdb.faces().flat_map(|f| &f.families)) {
            fontdb.set_sans_serif_family(family);
        }
    }

    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| VizError::Render(format!("Failed to parse SVG: {}", e)))?;

    let width = (tree.size().width() * scale).ceil() as u32;
    let height = (tree.size().height() * scale).ceil() as u32;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| VizError::Render(format!("Failed to create {}x{} pixmap", width, height)))?;

    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| VizError::Render(format!("Failed to encode PNG: {}", e)))
}

pub fn svg_to_pdf(svg: &str) -> VizResult<Vec<u8>> {
    use svg2pdf::usvg::fontdb;

    let mut fontdb = fontdb::Database::new();
    fontdb.load_system_fonts();
    if let Some(family) = sans_fallback(fontdb.faces().flat_map(|f| &f.families)) {
        fontdb.set_sans_serif_family(family);
    }

    let mut opts = svg2pdf::usvg::Options::default();
    opts.fontdb = std::sync::Arc::new(fontdb);

    let tree = svg2pdf::usvg::Tree::from_str(svg, &opts)
        .map_err(|e| VizError::Render(format!("Failed to parse SVG: {}", e)))?;

    // caption glyphs become paths so the PDF never depends on font embedding
    let mut options = svg2pdf::ConversionOptions::default();
    options.embed_text = false;

    svg2pdf::to_pdf(&tree, options, svg2pdf::PageOptions::default())
        .map_err(|e| VizError::Render(format!("Failed to convert SVG to PDF: {}", e)))
}

/// resvg and svg2pdf pin different fontdb versions, so the family list is
/// passed in as plain `(name, language)` pairs.
fn sans_fallback<'a, L: 'a>(
    families: impl Iterator<Item = &'a (String, L)>,
) -> Option<String> {
    let mut first = None;
    for (family, _) in families {
        if family.to_ascii_lowercase().contains("sans") {
            return Some(family.clone());
        }
        first.get_or_insert_with(|| family.clone());
    }
    first
}
