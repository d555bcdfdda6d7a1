use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::ArchiveError;

/// Entry name of the merged document in combine mode.
pub const COMBINED_PDF_NAME: &str = "combined.pdf";

/// Page attributes a page may inherit from its `Pages` ancestors. They are
/// copied onto each page because the original tree is discarded.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

const MAX_TREE_DEPTH: usize = 32;

/// Concatenates the pages of `documents`, in order, into one PDF.
pub fn merge_pdfs(documents: &[Vec<u8>]) -> Result<Vec<u8>, ArchiveError> {
    let _span = tracing::info_span!("archive.combine", documents = documents.len()).entered();

    if documents.is_empty() {
        return Err(ArchiveError::Combine("no documents to combine".to_string()));
    }

    let mut max_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (index, bytes) in documents.iter().enumerate() {
        let mut doc = Document::load_mem(bytes).map_err(|e| {
            ArchiveError::Combine(format!("document {} is not a readable PDF: {}", index + 1, e))
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let pages = doc.get_pages();
        for page_id in pages.values().copied() {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| {
                    ArchiveError::Combine(format!("document {} has a broken page: {}", index + 1, e))
                })?
                .clone();

            for key in INHERITABLE_KEYS {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(&doc, &page, key) {
                        page.set(key, value);
                    }
                }
            }

            objects.insert(page_id, Object::Dictionary(page));
            page_ids.push(page_id);
        }

        for (id, object) in doc.objects {
            match dictionary_type(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Page") => continue,
                _ => {
                    objects.entry(id).or_insert(object);
                }
            }
        }
    }

    if page_ids.is_empty() {
        return Err(ArchiveError::Combine("documents contain no pages".to_string()));
    }

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;
    merged.max_id = max_id;

    let pages_id = merged.new_object_id();
    for page_id in &page_ids {
        if let Ok(page) = merged.get_object_mut(*page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", pages_id);
        }
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.compress();

    let mut buffer = Vec::new();
    merged
        .save_to(&mut buffer)
        .map_err(|e| ArchiveError::Combine(format!("failed to write combined PDF: {}", e)))?;

    Ok(buffer)
}

fn dictionary_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|value| value.as_name().ok())
}

fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}
