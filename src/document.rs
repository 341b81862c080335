use crate::canvas::Command;
use crate::content::{ResourceKey, ResourceNames, encode_commands, referenced_resources};
use crate::error::StampError;
use crate::fonts::FontResources;
use crate::pdfinspect::{check_input_bytes, parse_pdf};
use crate::types::{Pt, Size};
use lopdf::{
    Dictionary as LoDictionary, Document as LoDocument, Object as LoObject,
    ObjectId as LoObjectId, Stream as LoStream, dictionary,
};
use std::collections::BTreeMap;

// Bounds the /Parent walk on malformed page trees.
const MAX_INHERIT_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    /// 0-based.
    pub index: usize,
    pub size: Size,
    pub(crate) object_id: LoObjectId,
}

impl PageInfo {
    pub fn width(&self) -> Pt {
        self.size.width
    }

    pub fn height(&self) -> Pt {
        self.size.height
    }
}

/// A loaded source document. Owned by a single overlay call and consumed by `save`.
pub struct SourceDocument {
    doc: LoDocument,
    pages: Vec<PageInfo>,
}

impl SourceDocument {
    pub fn load(bytes: &[u8], max_input_bytes: usize) -> Result<Self, StampError> {
        check_input_bytes(bytes, max_input_bytes)?;
        let doc = parse_pdf(bytes)?;
        if doc.is_encrypted() {
            return Err(StampError::Encrypted);
        }
        let pages: Vec<PageInfo> = doc
            .get_pages()
            .values()
            .enumerate()
            .map(|(index, object_id)| PageInfo {
                index,
                size: page_size(&doc, *object_id),
                object_id: *object_id,
            })
            .collect();
        if pages.is_empty() {
            return Err(StampError::NoPages);
        }
        Ok(Self { doc, pages })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&PageInfo> {
        self.pages.get(index)
    }

    pub(crate) fn lo_mut(&mut self) -> &mut LoDocument {
        &mut self.doc
    }

    /// Binds the resources `commands` use onto the page and appends their content after
    /// the existing content, which is isolated in its own `q`/`Q` pair. Returns the number
    /// of content bytes written.
    pub(crate) fn apply_page_overlay(
        &mut self,
        index: usize,
        commands: &[Command],
        fonts: Option<&FontResources>,
        images: &BTreeMap<String, LoObjectId>,
    ) -> Result<usize, StampError> {
        let Some(page) = self.pages.get(index) else {
            return Ok(0);
        };
        if commands.is_empty() {
            return Ok(0);
        }
        let page_id = page.object_id;

        let mut resources = page_resources_dict(&self.doc, page_id);
        let mut font_dict = sub_dict(&self.doc, &resources, b"Font");
        let mut xobject_dict = sub_dict(&self.doc, &resources, b"XObject");
        let mut names = ResourceNames::new();
        for key in referenced_resources(commands) {
            match &key {
                ResourceKey::Font(face) => {
                    let Some(fonts) = fonts else {
                        continue;
                    };
                    let name = fresh_name(&font_dict, "FSF");
                    font_dict.set(name.as_bytes().to_vec(), fonts.object_id(*face));
                    names.insert(key, name);
                }
                ResourceKey::Image(resource_id) => {
                    let Some(object_id) = images.get(resource_id) else {
                        continue;
                    };
                    let name = fresh_name(&xobject_dict, "FSIm");
                    xobject_dict.set(name.as_bytes().to_vec(), *object_id);
                    names.insert(key, name);
                }
            }
        }
        if !font_dict.is_empty() {
            resources.set("Font", LoObject::Dictionary(font_dict));
        }
        if !xobject_dict.is_empty() {
            resources.set("XObject", LoObject::Dictionary(xobject_dict));
        }

        let overlay = encode_commands(commands, &names);
        let written = overlay.len();
        let contents = self.wrapped_contents(page_id, overlay);
        let page_mut = self
            .doc
            .get_object_mut(page_id)
            .and_then(LoObject::as_dict_mut)
            .map_err(|err| StampError::Serialize(format!("page {}: {}", index + 1, err)))?;
        page_mut.set("Resources", LoObject::Dictionary(resources));
        page_mut.set("Contents", LoObject::Array(contents));
        Ok(written)
    }

    fn wrapped_contents(&mut self, page_id: LoObjectId, overlay: Vec<u8>) -> Vec<LoObject> {
        let existing = existing_contents(&self.doc, page_id);
        let open_id = self
            .doc
            .add_object(LoStream::new(dictionary! {}, b"q\n".to_vec()));
        let mut tail = b"Q\n".to_vec();
        tail.extend_from_slice(&overlay);
        let tail_id = self.doc.add_object(LoStream::new(dictionary! {}, tail));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(LoObject::Reference(open_id));
        contents.extend(existing);
        contents.push(LoObject::Reference(tail_id));
        contents
    }

    /// Writes the document out. Consumes the model: it is not reused after serialization.
    pub fn save(mut self, compress: bool) -> Result<Vec<u8>, StampError> {
        if compress {
            self.doc.compress();
        }
        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|err| StampError::Serialize(err.to_string()))?;
        Ok(out)
    }
}

fn number(obj: &LoObject) -> Option<f32> {
    match obj {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v as f32),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> &'a LoObject {
    match obj {
        LoObject::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Looks up `key` on the page, then up the `/Parent` chain.
fn inherited_attribute<'a>(
    doc: &'a LoDocument,
    page_id: LoObjectId,
    key: &[u8],
) -> Option<&'a LoObject> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Page width/height from the (possibly inherited) MediaBox, US Letter when missing.
pub(crate) fn page_size(doc: &LoDocument, page_id: LoObjectId) -> Size {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| {
            let values: Vec<f32> = arr
                .iter()
                .filter_map(|v| number(resolve(doc, v)))
                .collect();
            (values.len() == 4).then_some(values)
        });
    match media_box {
        Some(v) => Size::new((v[2] - v[0]).abs(), (v[3] - v[1]).abs()),
        None => Size::letter(),
    }
}

fn page_resources_dict(doc: &LoDocument, page_id: LoObjectId) -> LoDictionary {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(LoObject::Dictionary(d)) => d.clone(),
        _ => LoDictionary::new(),
    }
}

fn sub_dict(doc: &LoDocument, resources: &LoDictionary, key: &[u8]) -> LoDictionary {
    match resources.get(key).map(|obj| resolve(doc, obj)) {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        _ => LoDictionary::new(),
    }
}

fn existing_contents(doc: &LoDocument, page_id: LoObjectId) -> Vec<LoObject> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(LoObject::Reference(id)) => match doc.get_object(*id) {
            Ok(LoObject::Array(items)) => items.clone(),
            _ => vec![LoObject::Reference(*id)],
        },
        Ok(LoObject::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn fresh_name(dict: &LoDictionary, prefix: &str) -> String {
    let mut n = 1usize;
    loop {
        let candidate = format!("{}{}", prefix, n);
        if !dict.has(candidate.as_bytes()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::fonts::{FontFace, FontSet};

    /// One page per entry, each with a bit of Helvetica text and its own MediaBox.
    pub(crate) fn make_pdf_bytes(sizes: &[(f32, f32)]) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids = Vec::new();
        for (i, (w, h)) in sizes.iter().enumerate() {
            let content = format!("BT /F1 18 Tf 72 72 Td (PAGE {}) Tj ET", i + 1).into_bytes();
            let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), LoObject::Real(*w), LoObject::Real(*h)],
            });
            kids.push(page_id.into());
        }
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    fn inherited_media_box_pdf() -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.4");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, b"0 0 m".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => vec![LoObject::Reference(content_id)],
        });
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 420.into(), 595.into()],
                "Resources" => dictionary! {},
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    #[test]
    fn load_reads_page_geometry_in_order() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0), (842.0, 595.0), (200.5, 300.25)]);
        let doc = SourceDocument::load(&bytes, 0).expect("load");
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.pages()[1].size, Size::new(842.0, 595.0));
        assert_eq!(doc.page(2).expect("page").height().to_milli_i64(), 300_250);
        assert!(doc.page(3).is_none());
    }

    #[test]
    fn media_box_is_inherited_from_the_page_tree() {
        let doc = SourceDocument::load(&inherited_media_box_pdf(), 0).expect("load");
        assert_eq!(doc.pages()[0].size, Size::new(420.0, 595.0));
    }

    #[test]
    fn load_rejects_bad_input() {
        assert!(matches!(SourceDocument::load(b"", 0), Err(StampError::EmptyInput)));
        assert!(matches!(
            SourceDocument::load(b"<html></html>", 0),
            Err(StampError::NotAPdf)
        ));
        assert!(matches!(
            SourceDocument::load(b"%PDF-1.7\n%%EOF", 0),
            Err(StampError::Parse(_))
        ));
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        assert!(matches!(
            SourceDocument::load(&bytes, 16),
            Err(StampError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn overlay_wraps_existing_content_and_binds_fresh_names() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let fonts = FontResources::embed(doc.lo_mut(), &FontSet::default());

        let mut canvas = Canvas::new();
        canvas.set_font(FontFace::Regular, Pt::from_i32(10));
        canvas.draw_string(Pt::from_i32(5), Pt::from_i32(5), "hi");
        let written = doc
            .apply_page_overlay(0, &canvas.finish(), Some(&fonts), &BTreeMap::new())
            .expect("apply");
        assert!(written > 0);

        let out = doc.save(false).expect("save");
        let reloaded = LoDocument::load_mem(&out).expect("reload");
        let page_id = *reloaded.get_pages().get(&1).expect("page");
        let page = reloaded.get_dictionary(page_id).expect("dict");
        let contents = page.get(b"Contents").and_then(LoObject::as_array).expect("array");
        assert_eq!(contents.len(), 3);

        let content = reloaded.get_page_content(page_id).expect("content");
        let text = String::from_utf8_lossy(&content);
        assert!(text.starts_with("q\n"));
        assert!(text.contains("(PAGE 1) Tj"));
        assert!(text.contains("Q\nBT\n/FSF1 10 Tf\n5 5 Td\n(hi) Tj\nET\n"));

        let resources = page.get(b"Resources").and_then(LoObject::as_dict).expect("resources");
        let font_dict = resources.get(b"Font").and_then(LoObject::as_dict).expect("fonts");
        assert!(font_dict.has(b"F1"));
        assert!(font_dict.has(b"FSF1"));
    }

    #[test]
    fn fresh_name_skips_existing_keys() {
        let mut dict = LoDictionary::new();
        dict.set("FSF1", 1);
        dict.set("FSF2", 2);
        assert_eq!(fresh_name(&dict, "FSF"), "FSF3");
        assert_eq!(fresh_name(&dict, "FSIm"), "FSIm1");
    }

    #[test]
    fn empty_command_list_leaves_the_page_alone() {
        let bytes = make_pdf_bytes(&[(612.0, 792.0)]);
        let mut doc = SourceDocument::load(&bytes, 0).expect("load");
        let written = doc
            .apply_page_overlay(0, &[], None, &BTreeMap::new())
            .expect("apply");
        assert_eq!(written, 0);
    }
}
