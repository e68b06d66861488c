//! Standard-font resolution and text measurement
//!
//! Text edits can only draw with fonts that need no embedding, so every
//! requested family resolves to one of the 14 standard PDF fonts. Widths
//! are estimated from per-family average glyph ratios; Courier is exact,
//! the proportional families are conservative estimates.

use serde::{Deserialize, Serialize};

/// The five standard font families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontFamily {
    Helvetica,
    Times,
    Courier,
    Symbol,
    ZapfDingbats,
}

impl FontFamily {
    /// Match a requested family name to a standard family
    ///
    /// Unrecognized names fall back to Helvetica.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("times") || lower.contains("serif") && !lower.contains("sans") {
            FontFamily::Times
        } else if lower.contains("courier") || lower.contains("mono") {
            FontFamily::Courier
        } else if lower.contains("zapf") || lower.contains("dingbat") {
            FontFamily::ZapfDingbats
        } else if lower.contains("symbol") {
            FontFamily::Symbol
        } else {
            FontFamily::Helvetica
        }
    }

    /// Average glyph width as a fraction of the font size
    pub fn average_glyph_ratio(self) -> f32 {
        match self {
            FontFamily::Helvetica => 0.55,
            FontFamily::Times => 0.5,
            FontFamily::Courier => 0.6,
            FontFamily::Symbol | FontFamily::ZapfDingbats => 0.6,
        }
    }
}

/// Resolve a family plus bold/italic flags to a standard base font name
///
/// Helvetica, Times and Courier each carry four variants; Symbol and
/// ZapfDingbats have no bold or italic forms.
pub fn standard_font_name(family: FontFamily, bold: bool, italic: bool) -> &'static str {
    match (family, bold, italic) {
        (FontFamily::Helvetica, false, false) => "Helvetica",
        (FontFamily::Helvetica, true, false) => "Helvetica-Bold",
        (FontFamily::Helvetica, false, true) => "Helvetica-Oblique",
        (FontFamily::Helvetica, true, true) => "Helvetica-BoldOblique",
        (FontFamily::Times, false, false) => "Times-Roman",
        (FontFamily::Times, true, false) => "Times-Bold",
        (FontFamily::Times, false, true) => "Times-Italic",
        (FontFamily::Times, true, true) => "Times-BoldItalic",
        (FontFamily::Courier, false, false) => "Courier",
        (FontFamily::Courier, true, false) => "Courier-Bold",
        (FontFamily::Courier, false, true) => "Courier-Oblique",
        (FontFamily::Courier, true, true) => "Courier-BoldOblique",
        (FontFamily::Symbol, _, _) => "Symbol",
        (FontFamily::ZapfDingbats, _, _) => "ZapfDingbats",
    }
}

/// Estimate rendered text width at a size, in points
pub fn measure_text(text: &str, font_size: f32, family: FontFamily) -> f32 {
    text.chars().count() as f32 * font_size * family.average_glyph_ratio()
}

/// Horizontal text alignment for edits and text annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Draw origin for text of the given width anchored at `anchor_x`
pub fn aligned_origin_x(anchor_x: f32, text_width: f32, align: TextAlign) -> f32 {
    match align {
        TextAlign::Left => anchor_x,
        TextAlign::Center => anchor_x - text_width / 2.0,
        TextAlign::Right => anchor_x - text_width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_name() {
        assert_eq!(FontFamily::from_name("Times-Roman"), FontFamily::Times);
        assert_eq!(FontFamily::from_name("courier new"), FontFamily::Courier);
        assert_eq!(FontFamily::from_name("Symbol"), FontFamily::Symbol);
        assert_eq!(
            FontFamily::from_name("ZapfDingbats"),
            FontFamily::ZapfDingbats
        );
        assert_eq!(FontFamily::from_name("Arial"), FontFamily::Helvetica);
        assert_eq!(FontFamily::from_name(""), FontFamily::Helvetica);
    }

    #[test]
    fn test_twelve_variants_resolve() {
        let families = [FontFamily::Helvetica, FontFamily::Times, FontFamily::Courier];
        let mut names = std::collections::HashSet::new();
        for family in families {
            for bold in [false, true] {
                for italic in [false, true] {
                    names.insert(standard_font_name(family, bold, italic));
                }
            }
        }
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn test_symbol_fonts_ignore_styles() {
        assert_eq!(standard_font_name(FontFamily::Symbol, true, true), "Symbol");
        assert_eq!(
            standard_font_name(FontFamily::ZapfDingbats, true, false),
            "ZapfDingbats"
        );
    }

    #[test]
    fn test_measure_text_scales_with_size() {
        let narrow = measure_text("abc", 10.0, FontFamily::Times);
        let wide = measure_text("abc", 20.0, FontFamily::Times);
        assert!((wide - narrow * 2.0).abs() < 1e-6);

        assert_eq!(measure_text("ab", 10.0, FontFamily::Courier), 12.0);
        assert_eq!(measure_text("", 10.0, FontFamily::Helvetica), 0.0);
    }

    #[test]
    fn test_aligned_origin() {
        assert_eq!(aligned_origin_x(100.0, 40.0, TextAlign::Left), 100.0);
        assert_eq!(aligned_origin_x(100.0, 40.0, TextAlign::Center), 80.0);
        assert_eq!(aligned_origin_x(100.0, 40.0, TextAlign::Right), 60.0);
    }
}
