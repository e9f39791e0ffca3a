//! The standard-14 Helvetica family: registration, glyph widths and
//! WinAnsi encoding. No font files are read or embedded.

use pdf_writer::{Name, Pdf, Ref};

/// Helvetica ascender in 1000-units.
pub(crate) const ASCENT_1000: f32 = 718.0;
/// Helvetica descender in 1000-units (negative).
pub(crate) const DESCENT_1000: f32 = -207.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FontVariant {
    Regular,
    Bold,
    Oblique,
    BoldOblique,
}

impl FontVariant {
    pub(crate) const ALL: [FontVariant; 4] = [
        FontVariant::Regular,
        FontVariant::Bold,
        FontVariant::Oblique,
        FontVariant::BoldOblique,
    ];

    pub(crate) fn from_style(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontVariant::Regular,
            (true, false) => FontVariant::Bold,
            (false, true) => FontVariant::Oblique,
            (true, true) => FontVariant::BoldOblique,
        }
    }

    fn base_font(self) -> &'static [u8] {
        match self {
            FontVariant::Regular => b"Helvetica",
            FontVariant::Bold => b"Helvetica-Bold",
            FontVariant::Oblique => b"Helvetica-Oblique",
            FontVariant::BoldOblique => b"Helvetica-BoldOblique",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn is_bold(self) -> bool {
        matches!(self, FontVariant::Bold | FontVariant::BoldOblique)
    }
}

pub(crate) struct FontEntry {
    pub(crate) pdf_name: String,
    pub(crate) font_ref: Ref,
    pub(crate) widths_1000: Vec<f32>,
}

impl FontEntry {
    /// Width of a single character in 1000-units via its WinAnsi byte.
    /// Unmappable characters measure as the `?` they are drawn as.
    pub(crate) fn char_width_1000(&self, ch: char) -> f32 {
        let byte = char_to_winansi(ch).unwrap_or(b'?');
        if byte >= 32 {
            self.widths_1000[(byte - 32) as usize]
        } else {
            0.0
        }
    }

    pub(crate) fn word_width(&self, word: &str, font_size: f32) -> f32 {
        word.chars()
            .map(|ch| self.char_width_1000(ch) * font_size / 1000.0)
            .sum()
    }

    pub(crate) fn space_width(&self, font_size: f32) -> f32 {
        self.char_width_1000(' ') * font_size / 1000.0
    }
}

/// The four Helvetica variants registered once per PDF.
pub(crate) struct FontSet {
    entries: Vec<FontEntry>,
}

impl FontSet {
    pub(crate) fn register(pdf: &mut Pdf, alloc: &mut impl FnMut() -> Ref) -> Self {
        let entries = FontVariant::ALL
            .iter()
            .map(|&variant| {
                let font_ref = alloc();
                pdf.type1_font(font_ref)
                    .base_font(Name(variant.base_font()))
                    .encoding_predefined(Name(b"WinAnsiEncoding"));
                FontEntry {
                    pdf_name: format!("F{}", variant.index() + 1),
                    font_ref,
                    widths_1000: helvetica_widths(variant.is_bold()),
                }
            })
            .collect();
        FontSet { entries }
    }

    pub(crate) fn get(&self, variant: FontVariant) -> &FontEntry {
        &self.entries[variant.index()]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FontEntry> {
        self.entries.iter()
    }
}

/// Map a single Unicode char to its WinAnsi byte.
fn char_to_winansi(c: char) -> Option<u8> {
    let byte = match c as u32 {
        0x0020..=0x007E => c as u8,
        0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95, // bullet
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Convert a UTF-8 string to WinAnsi (Windows-1252) bytes for PDF Str encoding.
/// Characters outside the code page become `?`; control characters are dropped.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .filter(|c| !c.is_control())
        .map(|c| char_to_winansi(c).unwrap_or(b'?'))
        .collect()
}

const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // space../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // space../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    333, 333, 584, 584, 584, 611, 975, // :;<=>?@
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    333, 278, 333, 584, 556, 333, // [\]^_`
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a-m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n-z
    389, 280, 389, 584, // {|}~
];

/// Unaccented letter a Latin-1 letter is measured as.
fn latin1_base(byte: u8) -> Option<u8> {
    Some(match byte {
        0xC0..=0xC5 => b'A',
        0xC7 => b'C',
        0xC8..=0xCB => b'E',
        0xCC..=0xCF => b'I',
        0xD0 => b'D',
        0xD1 => b'N',
        0xD2..=0xD6 | 0xD8 => b'O',
        0xD9..=0xDC => b'U',
        0xDD => b'Y',
        0xDE => b'P',
        0xE0..=0xE5 => b'a',
        0xE7 => b'c',
        0xE8..=0xEB => b'e',
        0xEC..=0xEF => b'i',
        0xF0 | 0xF2..=0xF6 | 0xF8 => b'o',
        0xF1 => b'n',
        0xF9..=0xFC => b'u',
        0xFD | 0xFF => b'y',
        0xFE => b'p',
        0x8A => b'S',
        0x9A => b's',
        0x8E => b'Z',
        0x9E => b'z',
        0x9F => b'Y',
        _ => return None,
    })
}

/// Helvetica AFM widths at 1000 units/em for WinAnsi bytes 32..=255.
fn helvetica_widths(bold: bool) -> Vec<f32> {
    let ascii = if bold {
        &HELVETICA_BOLD_ASCII
    } else {
        &HELVETICA_ASCII
    };
    let ascii_width = |b: u8| ascii[(b - 32) as usize] as f32;
    (32u8..=255u8)
        .map(|b| match b {
            32..=126 => ascii_width(b),
            0x95 => 350.0,                               // bullet
            0x96 => 556.0,                               // en dash
            0x97 | 0x85 | 0x89 | 0x99 | 0x8C => 1000.0,  // em dash, ellipsis, per mille, TM, OE
            0x91 | 0x92 | 0x82 => if bold { 278.0 } else { 222.0 },
            0x93 | 0x94 | 0x84 => if bold { 500.0 } else { 333.0 },
            0x8B | 0x9B => 333.0,
            0x9C => 944.0,
            0xA0 => 278.0,
            0xA9 | 0xAE => 737.0,
            0xB0 => 400.0,
            0xC6 => 1000.0,
            0xE6 => 889.0,
            0xDF => 611.0,
            _ => latin1_base(b).map(ascii_width).unwrap_or(556.0),
        })
        .collect()
}
