//! SVG encoding of a planned [`Frame`].

use crate::palette::Palette;
use crate::render::{DrawOp, Frame};

const CAPTION_FONT_FAMILY: &str = "sans-serif";
const CAPTION_FONT_SIZE: f64 = 14.0;
const CAPTION_MARGIN: f64 = 10.0;

/// Encode `frame` as a standalone SVG document.
///
/// Ops are emitted in frame order, so later ops paint over earlier ones.
pub fn encode(frame: &Frame, palette: &Palette) -> String {
    let mut svg = String::new();

    for op in &frame.ops {
        match op {
            DrawOp::Clear { width, height } => {
                svg.push_str(&format!(
                    r#"<rect x="0" y="0" width="{}" height="{}" fill="{}" />"#,
                    width,
                    height,
                    escape_xml(&palette.background)
                ));
            }
            DrawOp::Disc {
                center,
                radius,
                marker,
            } => {
                svg.push_str(&format!(
                    r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" stroke="{}" stroke-width="{:.2}" />"#,
                    center.x,
                    center.y,
                    radius,
                    escape_xml(palette.fill(*marker)),
                    escape_xml(&palette.outline),
                    palette.outline_width
                ));
            }
            DrawOp::Segment { from, to } => {
                svg.push_str(&format!(
                    r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="{:.2}" />"#,
                    from.x,
                    from.y,
                    to.x,
                    to.y,
                    escape_xml(&palette.path_stroke),
                    palette.path_width
                ));
            }
        }
    }

    if let Some(caption) = caption(frame) {
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.1}" fill="{}">{}</text>"#,
            CAPTION_MARGIN,
            CAPTION_MARGIN + CAPTION_FONT_SIZE,
            CAPTION_FONT_FAMILY,
            CAPTION_FONT_SIZE,
            escape_xml(&palette.caption_color),
            escape_xml(&caption)
        ));
    }

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">{body}</svg>"#,
        w = frame.size.width,
        h = frame.size.height,
        body = svg
    )
}

/// Cost label; hidden while there is no cost to report.
pub fn caption(frame: &Frame) -> Option<String> {
    match frame.cost {
        Some(cost) if cost != 0.0 => Some(format!("Solution cost: {}", cost)),
        _ => None,
    }
}

/// XML 1.0 valid char ranges:
/// - 0x09, 0x0A, 0x0D
/// - 0x20..=0xD7FF
/// - 0xE000..=0xFFFD
/// - 0x10000..=0x10FFFF
fn is_valid_xml_char(c: char) -> bool {
    matches!(
        c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars().filter(|&c| is_valid_xml_char(c)) {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CanvasSize, City, Graph, Solution};
    use crate::render::{CITY_RADIUS, plan};

    fn solved_frame(cost: f64) -> Frame {
        let graph = Graph::new(vec![
            City::new(10.0, 10.0),
            City::new(50.0, 20.0),
            City::new(30.0, 70.0),
        ]);
        let solution = Solution {
            tour: vec![graph.cities[1], graph.cities[0], graph.cities[2]],
            cost,
        };
        plan(Some(&graph), Some(&solution), CanvasSize::new(100, 80), CITY_RADIUS)
    }

    #[test]
    fn document_has_canvas_dimensions() {
        let svg = encode(&solved_frame(1.0), &Palette::default());
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 80""#));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn discs_use_marker_colors_and_outline() {
        let svg = encode(&solved_frame(1.0), &Palette::default());
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains(
            r##"<circle cx="50.00" cy="20.00" r="5.00" fill="#008000" stroke="#000000""##
        ));
        assert!(svg.contains(r##"cx="30.00" cy="70.00" r="5.00" fill="#ff0000""##));
        assert!(svg.contains(r##"cx="10.00" cy="10.00" r="5.00" fill="#0000ff""##));
    }

    #[test]
    fn path_is_open() {
        let svg = encode(&solved_frame(1.0), &Palette::default());
        assert_eq!(svg.matches("<line").count(), 2);
        assert!(!svg.contains(r#"x1="30.00" y1="70.00" x2="50.00" y2="20.00""#));
    }

    #[test]
    fn caption_hidden_for_zero_cost() {
        assert_eq!(caption(&solved_frame(0.0)), None);
        let svg = encode(&solved_frame(0.0), &Palette::default());
        assert!(!svg.contains("<text"));
    }

    #[test]
    fn caption_shows_cost() {
        let svg = encode(&solved_frame(123.4), &Palette::default());
        assert!(svg.contains(">Solution cost: 123.4</text>"));
    }

    #[test]
    fn escape_xml_handles_specials_and_invalid_chars() {
        assert_eq!(escape_xml("a&b<c>\"'"), "a&amp;b&lt;c&gt;&quot;&apos;");
        assert_eq!(escape_xml("ok\u{0}\u{8}"), "ok");
    }
}
