use crate::canvas::Command;
use crate::coords::field_rect;
use crate::debug::DebugLogger;
use crate::document::SourceDocument;
use crate::error::{FieldError, StampError};
use crate::field::{FieldDescriptor, FieldInput};
use crate::fit::{FittedImage, decode_data_uri, fit_image, target_pixels};
use crate::fonts::{FontResources, FontSet};
use crate::images::{EmbeddedFormat, embed_fitted};
use crate::metrics::PageMetrics;
use crate::perf::PerfLogger;
use crate::render::{Mark, render_checkbox, render_image, render_radio, render_text};
use crate::types::Rect;
use lopdf::ObjectId as LoObjectId;
use std::collections::BTreeMap;

/// Result for one entry of the field list, reported at the entry's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub index: usize,
    pub succeeded: bool,
    pub reason: Option<String>,
}

impl FieldOutcome {
    pub fn applied(index: usize) -> Self {
        Self {
            index,
            succeeded: true,
            reason: None,
        }
    }

    pub fn failed(index: usize, err: &FieldError) -> Self {
        Self {
            index,
            succeeded: false,
            reason: Some(err.to_string()),
        }
    }
}

pub(crate) struct DispatchContext<'a> {
    pub fonts: &'a FontSet,
    pub parallel_images: bool,
    pub call_id: u64,
    pub debug: Option<&'a DebugLogger>,
    pub perf: Option<&'a PerfLogger>,
}

pub(crate) struct DispatchReport {
    pub outcomes: Vec<FieldOutcome>,
    pub pages: Vec<PageMetrics>,
}

struct Planned<'a> {
    index: usize,
    page_index: usize,
    rect: Rect,
    field: &'a FieldDescriptor,
    mark: Mark<'a>,
}

/// Paint-time state shared by every field of one call. Fonts are embedded on first use.
struct CallResources<'a> {
    font_set: &'a FontSet,
    fonts: Option<FontResources>,
    images: BTreeMap<String, LoObjectId>,
    prepared: BTreeMap<usize, Result<FittedImage, FieldError>>,
    png_images: u64,
    jpeg_images: u64,
}

/// Renders every field onto its page. Field failures are recorded and skipped; only a
/// document-level failure while binding page content is returned as an error.
pub(crate) fn dispatch(
    doc: &mut SourceDocument,
    fields: &[FieldInput],
    ctx: &DispatchContext<'_>,
) -> Result<DispatchReport, StampError> {
    let mut outcomes: BTreeMap<usize, FieldOutcome> = BTreeMap::new();
    let mut planned: Vec<Planned<'_>> = Vec::with_capacity(fields.len());
    for (index, input) in fields.iter().enumerate() {
        match plan_field(doc, index, input) {
            Ok(item) => planned.push(item),
            Err(err) => {
                let kind = input.as_ref().map(|f| f.kind.as_str()).unwrap_or("invalid");
                record_failure(ctx, &mut outcomes, index, kind, None, &err);
            }
        }
    }

    let t_fit = std::time::Instant::now();
    let prepared = prepare_images(&planned, ctx.parallel_images);
    if let Some(perf) = ctx.perf {
        perf.log_span_ms("fit_images", ctx.call_id, t_fit.elapsed().as_secs_f64() * 1000.0);
    }

    // List order is paint order inside a page.
    let mut by_page: BTreeMap<usize, Vec<&Planned<'_>>> = BTreeMap::new();
    for item in &planned {
        by_page.entry(item.page_index).or_default().push(item);
    }

    let t_render = std::time::Instant::now();
    let mut resources = CallResources {
        font_set: ctx.fonts,
        fonts: None,
        images: BTreeMap::new(),
        prepared,
        png_images: 0,
        jpeg_images: 0,
    };
    let mut pages = Vec::with_capacity(by_page.len());
    for (page_index, group) in &by_page {
        let mut commands: Vec<Command> = Vec::new();
        for item in group {
            let page = Some(item.page_index + 1);
            let kind = item.field.kind.as_str();
            match render_planned(doc, item, &mut resources) {
                Ok(Some(mark)) => {
                    commands.extend(mark);
                    outcomes.insert(item.index, FieldOutcome::applied(item.index));
                    if let Some(debug) = ctx.debug {
                        debug.log_field(ctx.call_id, item.index, kind, page, "ok", None);
                    }
                }
                Ok(None) => {
                    outcomes.insert(item.index, FieldOutcome::applied(item.index));
                    if let Some(debug) = ctx.debug {
                        debug.log_field(ctx.call_id, item.index, kind, page, "noop", None);
                    }
                }
                Err(err) => record_failure(ctx, &mut outcomes, item.index, kind, page, &err),
            }
        }
        let content_bytes = doc.apply_page_overlay(
            *page_index,
            &commands,
            resources.fonts.as_ref(),
            &resources.images,
        )?;
        if let Some(debug) = ctx.debug {
            debug.log_page(ctx.call_id, page_index + 1, group.len(), content_bytes);
        }
        pages.push(PageMetrics {
            page_number: page_index + 1,
            field_count: group.len(),
            command_count: commands.len(),
            content_bytes,
        });
    }
    if let Some(perf) = ctx.perf {
        perf.log_span_ms("render", ctx.call_id, t_render.elapsed().as_secs_f64() * 1000.0);
        perf.log_counts(
            "images",
            ctx.call_id,
            &[("png", resources.png_images), ("jpeg", resources.jpeg_images)],
        );
    }

    Ok(DispatchReport {
        outcomes: outcomes.into_values().collect(),
        pages,
    })
}

fn record_failure(
    ctx: &DispatchContext<'_>,
    outcomes: &mut BTreeMap<usize, FieldOutcome>,
    index: usize,
    kind: &str,
    page: Option<usize>,
    err: &FieldError,
) {
    let outcome = FieldOutcome::failed(index, err);
    if let Some(debug) = ctx.debug {
        debug.log_field(ctx.call_id, index, kind, page, "failed", outcome.reason.as_deref());
    }
    outcomes.insert(index, outcome);
}

fn plan_field<'a>(
    doc: &SourceDocument,
    index: usize,
    input: &'a FieldInput,
) -> Result<Planned<'a>, FieldError> {
    let field = input.as_ref().map_err(Clone::clone)?;
    field.validate_geometry()?;
    let page_index = field.resolve_page_index(doc.page_count())?;
    let page = doc.page(page_index).ok_or(FieldError::PageOutOfRange {
        page: page_index as i64 + 1,
        page_count: doc.page_count(),
    })?;
    Ok(Planned {
        index,
        page_index,
        rect: field_rect(field, page.height()),
        field,
        mark: Mark::classify(field),
    })
}

/// Decodes and letterboxes every image field up front. Each job only reads its own
/// descriptor, so the work can run on the rayon pool.
fn prepare_images(
    planned: &[Planned<'_>],
    parallel: bool,
) -> BTreeMap<usize, Result<FittedImage, FieldError>> {
    let jobs: Vec<(usize, &str, &FieldDescriptor)> = planned
        .iter()
        .filter_map(|item| match item.mark {
            Mark::Image(uri) => Some((item.index, uri, item.field)),
            _ => None,
        })
        .collect();
    if parallel && jobs.len() > 1 {
        use rayon::prelude::*;
        jobs.par_iter()
            .map(|(index, uri, field)| (*index, prepare_image(uri, field)))
            .collect()
    } else {
        jobs.iter()
            .map(|(index, uri, field)| (*index, prepare_image(uri, field)))
            .collect()
    }
}

fn prepare_image(uri: &str, field: &FieldDescriptor) -> Result<FittedImage, FieldError> {
    let source = decode_data_uri(uri)?;
    let (width, height) = target_pixels(field.size.width, field.size.height)?;
    fit_image(&source, width, height)
}

/// `Ok(None)` means the field is valid but draws nothing.
fn render_planned(
    doc: &mut SourceDocument,
    item: &Planned<'_>,
    resources: &mut CallResources<'_>,
) -> Result<Option<Vec<Command>>, FieldError> {
    let commands = match item.mark {
        Mark::Skip => return Ok(None),
        Mark::Text(text) => {
            let commands = render_text(item.rect, text)?;
            ensure_fonts(doc, resources);
            commands
        }
        Mark::Checkbox { checked: false } => render_checkbox(item.rect, None),
        Mark::Checkbox { checked: true } => {
            let fonts = ensure_fonts(doc, resources);
            render_checkbox(item.rect, Some(fonts))
        }
        Mark::Radio { checked } => render_radio(item.rect, checked),
        Mark::Image(_) => {
            let fitted = resources.prepared.remove(&item.index).unwrap_or_else(|| {
                Err(FieldError::ImageFit("image was not prepared".to_string()))
            })?;
            let embedded = embed_fitted(doc.lo_mut(), &fitted)?;
            match embedded.format {
                EmbeddedFormat::Png => resources.png_images += 1,
                EmbeddedFormat::Jpeg => resources.jpeg_images += 1,
            }
            let resource_id = format!("img{}", item.index);
            resources.images.insert(resource_id.clone(), embedded.object_id);
            render_image(item.rect, &resource_id)
        }
    };
    Ok(Some(commands))
}

fn ensure_fonts<'r>(
    doc: &mut SourceDocument,
    resources: &'r mut CallResources<'_>,
) -> &'r FontResources {
    let font_set = resources.font_set;
    resources
        .fonts
        .get_or_insert_with(|| FontResources::embed(doc.lo_mut(), font_set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::make_pdf_bytes;
    use crate::field::FieldKind;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn context(fonts: &FontSet, parallel: bool) -> DispatchContext<'_> {
        DispatchContext {
            fonts,
            parallel_images: parallel,
            call_id: 1,
            debug: None,
            perf: None,
        }
    }

    fn png_uri(width: u32, height: u32) -> String {
        let img = RgbaImage::from_pixel(width, height, Rgba([20, 40, 200, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .expect("encode");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(out)
        )
    }

    fn text(page: i64, value: &str) -> FieldInput {
        Ok(FieldDescriptor::new(FieldKind::Text, 10.0, 10.0, 100.0, 20.0)
            .with_value(value)
            .on_page(page))
    }

    #[test]
    fn out_of_range_pages_fail_without_touching_neighbours() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0), (612.0, 792.0), (612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let fonts = FontSet::default();
        let fields = vec![text(1, "a"), text(0, "b"), text(999, "c"), text(3, "d")];
        let report = dispatch(&mut doc, &fields, &context(&fonts, false)).expect("dispatch");

        let succeeded: Vec<bool> = report.outcomes.iter().map(|o| o.succeeded).collect();
        assert_eq!(succeeded, vec![true, false, false, true]);
        for failed in [&report.outcomes[1], &report.outcomes[2]] {
            assert!(failed.reason.as_deref().expect("reason").contains("range"));
        }
        let touched: Vec<usize> = report.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(touched, vec![1, 3]);
    }

    #[test]
    fn bad_image_is_isolated_from_its_page_mates() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let fonts = FontSet::default();
        let fields = vec![
            text(1, "before"),
            Ok(FieldDescriptor::new(FieldKind::Signature, 10.0, 100.0, 80.0, 40.0)
                .with_value("data:image/png;base64,bm90IGFuIGltYWdl")),
            Ok(FieldDescriptor::new(FieldKind::Image, 10.0, 200.0, 80.0, 40.0)
                .with_value(png_uri(16, 8))),
        ];
        let report = dispatch(&mut doc, &fields, &context(&fonts, true)).expect("dispatch");
        assert!(report.outcomes[0].succeeded);
        assert!(!report.outcomes[1].succeeded);
        assert!(report.outcomes[1].reason.as_deref().expect("reason").contains("decode"));
        assert!(report.outcomes[2].succeeded);
        assert_eq!(report.pages[0].field_count, 3);

        let out = doc.save(false).expect("save");
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("(before) Tj"));
        assert!(text.contains("/FSIm1 Do"));
        assert!(!text.contains("/FSIm2"));
    }

    #[test]
    fn descriptor_errors_keep_their_index() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let fonts = FontSet::default();
        let fields = vec![
            Err(FieldError::Descriptor("type is required".to_string())),
            Ok(FieldDescriptor::new(FieldKind::Radio, 0.0, 0.0, -1.0, 5.0)),
            Ok(FieldDescriptor::new(FieldKind::parse("stamp"), 0.0, 0.0, 5.0, 5.0)),
        ];
        let report = dispatch(&mut doc, &fields, &context(&fonts, false)).expect("dispatch");
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].index, 0);
        assert!(!report.outcomes[0].succeeded);
        assert!(report.outcomes[1].reason.as_deref().expect("reason").contains("geometry"));
        assert_eq!(report.outcomes[2], FieldOutcome::applied(2));
        assert_eq!(report.pages[0].command_count, 0);
        assert_eq!(report.pages[0].content_bytes, 0);
    }

    #[test]
    fn fonts_are_embedded_once_and_only_when_needed() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let fonts = FontSet::default();

        let mut radios_only = SourceDocument::load(&bytes, 0).expect("load");
        let before = radios_only.lo_mut().objects.len();
        let fields = vec![Ok(FieldDescriptor::new(FieldKind::Radio, 0.0, 0.0, 10.0, 10.0))];
        dispatch(&mut radios_only, &fields, &context(&fonts, false)).expect("dispatch");
        // Two content streams and nothing else.
        assert_eq!(radios_only.lo_mut().objects.len(), before + 2);

        let mut texts = SourceDocument::load(&bytes, 0).expect("load");
        let before = texts.lo_mut().objects.len();
        let fields: Vec<FieldInput> = (0..10).map(|i| text(1, &format!("v{i}"))).collect();
        dispatch(&mut texts, &fields, &context(&fonts, false)).expect("dispatch");
        assert_eq!(texts.lo_mut().objects.len(), before + 2 + 2);
    }

    #[test]
    fn unencodable_text_fails_without_embedding_fonts() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let fonts = FontSet::default();

        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let before = doc.lo_mut().objects.len();
        let fields = vec![text(1, "\u{0141}ukasz \u{5F20}\u{4F1F}")];
        let report = dispatch(&mut doc, &fields, &context(&fonts, false)).expect("dispatch");
        assert!(!report.outcomes[0].succeeded);
        let reason = report.outcomes[0].reason.as_deref().expect("reason");
        assert!(reason.contains("cannot encode '\u{0141}'"), "{reason}");
        assert_eq!(report.pages[0].command_count, 0);
        assert_eq!(doc.lo_mut().objects.len(), before);

        let mut mixed = SourceDocument::load(&bytes, 0).expect("load");
        let fields = vec![text(1, "Ren\u{00E9}e"), text(1, "\u{0141}ukasz")];
        let report = dispatch(&mut mixed, &fields, &context(&fonts, false)).expect("dispatch");
        assert!(report.outcomes[0].succeeded);
        assert!(!report.outcomes[1].succeeded);
        let out = mixed.save(false).expect("save");
        let text = String::from_utf8_lossy(&out);
        // The fixture's page label plus the one encodable field.
        assert_eq!(text.matches(") Tj").count(), 2);
        assert!(!text.contains("ukasz"));
    }

    #[test]
    fn oversized_image_boxes_fail_in_isolation() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let fonts = FontSet::default();
        let fields = vec![
            Ok(FieldDescriptor::new(FieldKind::Signature, 0.0, 0.0, 1.0e6, 1.0e6)
                .with_value(png_uri(4, 4))),
            text(1, "after"),
        ];
        let report = dispatch(&mut doc, &fields, &context(&fonts, false)).expect("dispatch");
        assert!(!report.outcomes[0].succeeded);
        let reason = report.outcomes[0].reason.as_deref().expect("reason");
        assert!(reason.contains("image fit failed"), "{reason}");
        assert!(report.outcomes[1].succeeded);
    }

    #[test]
    fn later_fields_paint_over_earlier_ones() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let fonts = FontSet::default();
        let fields = vec![text(1, "first"), text(1, "second")];
        dispatch(&mut doc, &fields, &context(&fonts, false)).expect("dispatch");
        let out = doc.save(false).expect("save");
        let text = String::from_utf8_lossy(&out);
        let first = text.find("(first) Tj").expect("first");
        let second = text.find("(second) Tj").expect("second");
        assert!(first < second);
    }
}
