mod layout;
mod table;

use std::path::Path;
use std::time::Instant;

use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref};

use crate::cancel::CancelFlag;
use crate::error::Error;
use crate::fonts::FontSet;
use crate::images::jpeg_info;
use crate::markup;
use crate::model::{ImageBlock, PageGeometry, RenderBlock, StyledParagraph};

use layout::{BaseTextStyle, baseline_in, build_paragraph_lines, render_line};
use table::flow_table;

struct FinishedPage {
    content: Content,
    /// Indices into the document's image list drawn on this page.
    images: Vec<usize>,
}

/// Top-to-bottom placement state: the page being filled and the y of the
/// next free slot on it.
pub(crate) struct PageFlow {
    geometry: PageGeometry,
    content: Content,
    cursor: f32,
    images: Vec<usize>,
    finished: Vec<FinishedPage>,
}

impl PageFlow {
    pub(crate) fn new(geometry: PageGeometry) -> Self {
        PageFlow {
            geometry,
            content: Content::new(),
            cursor: geometry.content_top(),
            images: Vec::new(),
            finished: Vec::new(),
        }
    }

    fn at_page_top(&self) -> bool {
        (self.cursor - self.geometry.content_top()).abs() < 0.5
    }

    fn fits(&self, height: f32) -> bool {
        self.cursor - height >= self.geometry.margin_bottom - 0.01
    }

    fn new_page(&mut self) {
        self.finished.push(FinishedPage {
            content: std::mem::replace(&mut self.content, Content::new()),
            images: std::mem::take(&mut self.images),
        });
        self.cursor = self.geometry.content_top();
    }

    /// Start a new page unless `height` fits below the cursor. Content taller
    /// than a whole page is placed at the top of a fresh page regardless.
    fn ensure(&mut self, height: f32) {
        if !self.at_page_top() && !self.fits(height) {
            self.new_page();
        }
    }

    fn advance(&mut self, height: f32) {
        self.cursor -= height;
    }

    /// Vertical gap; dropped at the top of a page, clamped at the bottom.
    fn space(&mut self, height: f32) {
        if self.at_page_top() || !height.is_finite() || height <= 0.0 {
            return;
        }
        self.cursor = (self.cursor - height).max(self.geometry.margin_bottom);
    }

    fn finish(mut self) -> Vec<FinishedPage> {
        self.new_page();
        self.finished
    }
}

fn flow_paragraph(flow: &mut PageFlow, para: &StyledParagraph, fonts: &FontSet) {
    let style = &para.style;
    let spans = markup::parse(&para.markup);
    let base = BaseTextStyle {
        font_size: style.font_size,
        color: style.text_color,
        bold: style.bold,
    };
    let x = flow.geometry.margin_left + style.left_indent;
    let width = (flow.geometry.content_width() - style.left_indent).max(1.0);
    let lines = build_paragraph_lines(&spans, base, fonts, width);
    log::debug!(
        "paragraph style={} lines={} cursor={:.1}",
        style.name,
        lines.len(),
        flow.cursor
    );

    flow.space(style.space_before);
    for line in &lines {
        let pitch = line.pitch(style.leading);
        flow.ensure(pitch);
        let baseline = baseline_in(flow.cursor, pitch, line.max_font_size);
        render_line(&mut flow.content, line, style.alignment, x, width, baseline);
        flow.advance(pitch);
    }
    flow.space(style.space_after);
}

/// Draw an image centered between the margins, shrunk to fit one page.
fn flow_image(flow: &mut PageFlow, image: &ImageBlock, name: &str, index: usize) {
    let geometry = flow.geometry;
    let (mut w, mut h) = (image.width, image.height);
    if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
        log::warn!("image {} has no usable size; skipped", image.path.display());
        return;
    }
    let scale = (geometry.content_width() / w)
        .min(geometry.content_height() / h)
        .min(1.0);
    if scale < 1.0 {
        log::debug!("shrinking image {} by {scale:.3}", image.path.display());
        w *= scale;
        h *= scale;
    }

    flow.ensure(h);
    let x = geometry.margin_left + (geometry.content_width() - w) / 2.0;
    let y = flow.cursor - h;
    flow.content.save_state();
    flow.content.transform([w, 0.0, 0.0, h, x, y]);
    flow.content.x_object(Name(name.as_bytes()));
    flow.content.restore_state();
    flow.advance(h);
    if !flow.images.contains(&index) {
        flow.images.push(index);
    }
}

/// Write an image XObject. JPEG data passes through with DCTDecode; other
/// formats are decoded and stored as Flate RGB with an optional soft mask.
fn embed_image(pdf: &mut Pdf, alloc: &mut impl FnMut() -> Ref, data: &[u8]) -> Option<Ref> {
    let xobj_ref = alloc();

    if let Some((w, h, components)) = jpeg_info(data) {
        let mut xobj = pdf.image_xobject(xobj_ref, data);
        xobj.filter(Filter::DctDecode);
        xobj.width(w as i32);
        xobj.height(h as i32);
        match components {
            1 => xobj.color_space().device_gray(),
            4 => xobj.color_space().device_cmyk(),
            _ => xobj.color_space().device_rgb(),
        };
        xobj.bits_per_component(8);
        return Some(xobj_ref);
    }

    let decoded = image::ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .decode()
        .map_err(|e| log::warn!("image decode failed: {e}"))
        .ok()?;
    let rgba: image::RgbaImage = decoded.to_rgba8();
    let (w, h) = (rgba.width(), rgba.height());
    let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);

    let rgb_data: Vec<u8> = rgba
        .pixels()
        .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
        .collect();
    let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb_data, 6);

    let smask_ref = if has_alpha {
        let alpha_data: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
        let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(&alpha_data, 6);
        let mask_ref = alloc();
        let mut mask = pdf.image_xobject(mask_ref, &compressed_alpha);
        mask.filter(Filter::FlateDecode);
        mask.width(w as i32);
        mask.height(h as i32);
        mask.color_space().device_gray();
        mask.bits_per_component(8);
        Some(mask_ref)
    } else {
        None
    };

    let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
    xobj.filter(Filter::FlateDecode);
    xobj.width(w as i32);
    xobj.height(h as i32);
    xobj.color_space().device_rgb();
    xobj.bits_per_component(8);
    if let Some(mask_ref) = smask_ref {
        xobj.s_mask(mask_ref);
    }
    Some(xobj_ref)
}

fn read_image(path: &Path) -> Option<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| log::warn!("cannot read image {}: {e}", path.display()))
        .ok()
}

/// Flow `blocks` onto pages of `geometry` and serialize the PDF.
pub fn render(
    blocks: &[RenderBlock],
    geometry: &PageGeometry,
    cancel: &CancelFlag,
) -> Result<Vec<u8>, Error> {
    let t0 = Instant::now();
    let mut pdf = Pdf::new();
    let mut next_id = 1i32;
    let mut alloc = || {
        let r = Ref::new(next_id);
        next_id += 1;
        r
    };

    let catalog_id = alloc();
    let pages_id = alloc();
    let fonts = FontSet::register(&mut pdf, &mut alloc);
    let t_fonts = t0.elapsed();

    let mut image_xobjects: Vec<(String, Ref)> = Vec::new();
    let mut flow = PageFlow::new(*geometry);
    for block in blocks {
        cancel.check()?;
        match block {
            RenderBlock::Paragraph(para) => flow_paragraph(&mut flow, para, &fonts),
            RenderBlock::Spacer(height) => flow.space(*height),
            RenderBlock::Table(table) => flow_table(&mut flow, table, &fonts)?,
            RenderBlock::Image(image) => {
                let Some(xobj_ref) = read_image(&image.path)
                    .and_then(|data| embed_image(&mut pdf, &mut alloc, &data))
                else {
                    log::warn!("skipping image {}", image.path.display());
                    continue;
                };
                let index = image_xobjects.len();
                let pdf_name = format!("Im{}", index + 1);
                flow_image(&mut flow, image, &pdf_name, index);
                image_xobjects.push((pdf_name, xobj_ref));
            }
        }
    }
    let pages = flow.finish();
    let t_layout = t0.elapsed();
    cancel.check()?;

    let n = pages.len();
    let page_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();
    let content_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(n as i32);

    for (i, page_content) in pages.into_iter().enumerate() {
        let raw = page_content.content.finish();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
        pdf.stream(content_ids[i], &compressed)
            .filter(Filter::FlateDecode);

        let mut page = pdf.page(page_ids[i]);
        page.media_box(Rect::new(0.0, 0.0, geometry.page_width, geometry.page_height))
            .parent(pages_id)
            .contents(content_ids[i]);
        let mut resources = page.resources();
        {
            let mut font_dict = resources.fonts();
            for entry in fonts.iter() {
                font_dict.pair(Name(entry.pdf_name.as_bytes()), entry.font_ref);
            }
        }
        if !page_content.images.is_empty() {
            let mut xobjects = resources.x_objects();
            for &index in &page_content.images {
                let (name, xobj_ref) = &image_xobjects[index];
                xobjects.pair(Name(name.as_bytes()), *xobj_ref);
            }
        }
    }
    let t_assembly = t0.elapsed();

    log::info!(
        "Render phases: fonts={:.1}ms, layout={:.1}ms, assembly={:.1}ms ({} pages, {} images)",
        t_fonts.as_secs_f64() * 1000.0,
        (t_layout - t_fonts).as_secs_f64() * 1000.0,
        (t_assembly - t_layout).as_secs_f64() * 1000.0,
        n,
        image_xobjects.len(),
    );

    Ok(pdf.finish())
}
