use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use tracing::debug;

use super::transliterate::to_latin1;
use super::ExportError;

pub const REPORT_TITLE: &str = "Reddit Research Report";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const SIDE_MARGIN: f32 = 10.0;
const BODY_TOP: f32 = 20.0;
const BOTTOM_MARGIN: f32 = 15.0;
const LINE_HEIGHT: f32 = 7.0;

const BODY_SIZE: f32 = 11.0;
const HEADER_SIZE: f32 = 12.0;
const FOOTER_SIZE: f32 = 8.0;

const PT_TO_MM: f32 = 25.4 / 72.0;

/// Helvetica advance widths (1/1000 em) for ' '..='~'.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

fn char_width(c: char) -> u16 {
    match c as u32 {
        code @ 0x20..=0x7E => HELVETICA_WIDTHS[(code - 0x20) as usize],
        _ => 556,
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c))).sum();
    units as f32 / 1000.0 * size * PT_TO_MM
}

/// One laid-out body line. `wrapped` marks a soft break: the next line
/// continues the same source line.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLine {
    pub text: String,
    pub wrapped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfLayout {
    pub pages: Vec<Vec<LayoutLine>>,
}

impl PdfLayout {
    /// Wraps and paginates already transliterated text.
    pub fn new(text: &str) -> Self {
        let max_width = PAGE_WIDTH - 2.0 * SIDE_MARGIN;
        let mut lines = Vec::new();

        for source in text.split('\n') {
            let segments = wrap(source, max_width);
            let last = segments.len() - 1;
            lines.extend(segments.into_iter().enumerate().map(|(i, text)| LayoutLine {
                text,
                wrapped: i < last,
            }));
        }

        let per_page = lines_per_page();
        let pages = lines.chunks(per_page).map(|c| c.to_vec()).collect();
        Self { pages }
    }

    /// The body text as laid out, with soft breaks joined back together.
    #[cfg(test)]
    pub fn body_text(&self) -> String {
        let lines: Vec<&LayoutLine> = self.pages.iter().flatten().collect();
        let mut out = String::new();
        for (i, line) in lines.iter().enumerate() {
            out.push_str(&line.text);
            if !line.wrapped && i + 1 < lines.len() {
                out.push('\n');
            }
        }
        out
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

fn lines_per_page() -> usize {
    let usable = PAGE_HEIGHT - BOTTOM_MARGIN - BODY_TOP;
    ((usable / LINE_HEIGHT).floor() as usize).max(1)
}

/// Splits a source line into segments that fit `max_width` and concatenate
/// back to the original line. Trailing spaces may hang past the margin.
fn wrap(line: &str, max_width: f32) -> Vec<String> {
    let fits = |s: &str| text_width(s.trim_end(), BODY_SIZE) <= max_width;
    let mut segments = Vec::new();
    let mut current = String::new();

    for token in tokens(line) {
        if fits(&format!("{}{}", current, token)) {
            current.push_str(token);
            continue;
        }
        if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        if fits(token) {
            current.push_str(token);
            continue;
        }
        // A single word wider than the line is broken between characters.
        for c in token.chars() {
            let mut next = current.clone();
            next.push(c);
            if !current.is_empty() && !fits(&next) {
                segments.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
    }

    segments.push(current);
    segments
}

/// Words with their trailing whitespace attached.
fn tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space = false;
    for (i, c) in line.char_indices() {
        let space = c == ' ';
        if in_space && !space {
            tokens.push(&line[start..i]);
            start = i;
        }
        in_space = space;
    }
    if start < line.len() {
        tokens.push(&line[start..]);
    }
    tokens
}

struct Fonts {
    body: IndirectFontRef,
    header: IndirectFontRef,
    footer: IndirectFontRef,
}

/// Renders the report as an A4 PDF with a title header and page-number
/// footer on every page.
pub fn render(report: &str) -> Result<Vec<u8>, ExportError> {
    let layout = PdfLayout::new(&to_latin1(report));
    debug!(pages = layout.page_count(), "laid out pdf report");
    render_layout(&layout)
}

pub fn render_layout(layout: &PdfLayout) -> Result<Vec<u8>, ExportError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "body");

    let font = |builtin| {
        doc.add_builtin_font(builtin)
            .map_err(|e| ExportError::Font(e.to_string()))
    };
    let fonts = Fonts {
        body: font(BuiltinFont::Helvetica)?,
        header: font(BuiltinFont::HelveticaBold)?,
        footer: font(BuiltinFont::HelveticaOblique)?,
    };

    for (index, lines) in layout.pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "body");
            doc.get_page(page).get_layer(layer)
        };
        draw_page(&layer, &fonts, index + 1, lines);
    }

    doc.save_to_bytes()
        .map_err(|e| ExportError::Render(e.to_string()))
}

fn draw_page(layer: &PdfLayerReference, fonts: &Fonts, page_no: usize, lines: &[LayoutLine]) {
    // printpdf measures y from the bottom edge; layout works from the top.
    let baseline = |top: f32, cell: f32, size: f32| Mm(PAGE_HEIGHT - (top + cell / 2.0 + 0.35 * size * PT_TO_MM));

    layer.use_text(
        REPORT_TITLE,
        HEADER_SIZE,
        Mm(centered_x(REPORT_TITLE, HEADER_SIZE)),
        baseline(SIDE_MARGIN, 10.0, HEADER_SIZE),
        &fonts.header,
    );

    for (i, line) in lines.iter().enumerate() {
        if line.text.trim().is_empty() {
            continue;
        }
        let top = BODY_TOP + i as f32 * LINE_HEIGHT;
        layer.use_text(
            line.text.trim_end(),
            BODY_SIZE,
            Mm(SIDE_MARGIN),
            baseline(top, LINE_HEIGHT, BODY_SIZE),
            &fonts.body,
        );
    }

    let footer = format!("Page {}", page_no);
    layer.use_text(
        footer.as_str(),
        FOOTER_SIZE,
        Mm(centered_x(&footer, FOOTER_SIZE)),
        baseline(PAGE_HEIGHT - BOTTOM_MARGIN, 10.0, FOOTER_SIZE),
        &fonts.footer,
    );
}

fn centered_x(text: &str, size: f32) -> f32 {
    (PAGE_WIDTH - text_width(text, size)) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_ascii_report() -> String {
        let paragraph = "Redditors keep comparing the new pricing to the old plan and most of them \
            think the jump is hard to justify for small teams, though a few agencies disagree. ";
        let mut report = String::from("## Q1. Pricing\n\n");
        for i in 0..60 {
            report.push_str(&paragraph.repeat(2));
            report.push_str(&format!("[Thread {}](https://example.com/{})\n\n", i, i));
        }
        report.push_str("**ACTIONABLE INSIGHTS**\n1. one\n2. two\n3. three");
        report
    }

    #[test]
    fn ascii_report_round_trips_through_layout() {
        let report = long_ascii_report();
        let layout = PdfLayout::new(&to_latin1(&report));
        assert!(layout.page_count() > 1);
        assert_eq!(layout.body_text(), report);
    }

    #[test]
    fn wrapped_lines_fit_the_text_width() {
        let layout = PdfLayout::new(&long_ascii_report());
        let max = PAGE_WIDTH - 2.0 * SIDE_MARGIN;
        for line in layout.pages.iter().flatten() {
            assert!(text_width(line.text.trim_end(), BODY_SIZE) <= max, "{:?}", line.text);
        }
        assert!(layout.pages.iter().flatten().any(|l| l.wrapped));
    }

    #[test]
    fn pages_hold_at_most_the_usable_number_of_lines() {
        assert_eq!(lines_per_page(), 37);
        let text = vec!["line"; 80].join("\n");
        let layout = PdfLayout::new(&text);
        let sizes: Vec<usize> = layout.pages.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![37, 37, 6]);
    }

    #[test]
    fn overlong_words_are_split_between_characters() {
        let word = "x".repeat(400);
        let segments = wrap(&word, 50.0);
        assert!(segments.len() > 1);
        assert_eq!(segments.concat(), word);
    }

    #[test]
    fn empty_report_lays_out_one_empty_page() {
        let layout = PdfLayout::new("");
        assert_eq!(layout.page_count(), 1);
        assert_eq!(layout.body_text(), "");
    }

    #[test]
    fn unicode_report_lays_out_identically_twice() {
        let report = "Sentiment: “mostly positive” — 👍\n\nCafé owners 東京 agree.";
        let first = PdfLayout::new(&to_latin1(report));
        let second = PdfLayout::new(&to_latin1(report));
        assert_eq!(first.body_text(), second.body_text());
        assert!(first.body_text().contains("Café owners"));
    }

    /// Text of every page of a rendered PDF, in page order.
    fn extracted_pages(bytes: &[u8]) -> Vec<String> {
        let doc = printpdf::lopdf::Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .keys()
            .map(|&page| doc.extract_text(&[page]).unwrap())
            .collect()
    }

    #[test]
    fn render_produces_a_pdf_document() {
        let bytes = render(&long_ascii_report()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn every_rendered_page_has_header_and_page_number() {
        let report = vec!["line"; 80].join("\n");
        let pages = extracted_pages(&render(&report).unwrap());
        assert_eq!(pages.len(), 3);
        for (i, text) in pages.iter().enumerate() {
            assert!(text.contains(REPORT_TITLE), "page {}: {:?}", i + 1, text);
            assert!(text.contains(&format!("Page {}", i + 1)), "page {}: {:?}", i + 1, text);
        }
    }

    #[test]
    fn rendered_ascii_body_lines_appear_in_order() {
        let report = (1..=60)
            .map(|i| format!("Line {} of the plain ascii report", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = extracted_pages(&render(&report).unwrap()).concat();

        let mut cursor = 0;
        for line in report.lines().filter(|l| !l.trim().is_empty()) {
            let found = text[cursor..]
                .find(line)
                .unwrap_or_else(|| panic!("{:?} missing after byte {}", line, cursor));
            cursor += found + line.len();
        }
    }

    #[test]
    fn rendering_unicode_twice_extracts_the_same_text() {
        let report = "Sentiment: “mostly positive” — 👍\n\nCafé owners 東京 agree.";
        let first = extracted_pages(&render(report).unwrap());
        let second = extracted_pages(&render(report).unwrap());
        assert_eq!(first, second);
        assert!(first[0].contains("owners"));
    }

    #[test]
    fn tokens_keep_trailing_spaces() {
        assert_eq!(tokens("a  bb c"), vec!["a  ", "bb ", "c"]);
        assert_eq!(tokens("  lead"), vec!["  ", "lead"]);
        assert!(tokens("").is_empty());
    }
}
