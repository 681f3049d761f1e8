//! DOCX container: ordered ZIP entries plus the package-level bookkeeping
//! (media parts, relationships, content types) that image insertion needs.

use crate::error::{Error, Result};
use crate::xml::XmlTree;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_XMLNS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// A DOCX package held fully in memory.
///
/// Entries keep their original order; already-compressed media is written
/// back STORED, everything else DEFLATED.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    entries: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    /// Open a package from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Open a package from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(data))
    }

    /// Open a package from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            entries.push((entry.name().to_string(), data));
        }
        let package = DocxPackage { entries };
        if !package.has_part("word/document.xml") {
            return Err(Error::UnknownFormat);
        }
        Ok(package)
    }

    /// Raw bytes of a part, if present.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Replace a part's bytes, appending the part when it is new.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = data;
        } else {
            self.entries.push((name.to_string(), data));
        }
    }

    /// Whether a part exists.
    pub fn has_part(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// All part names in entry order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Header and footer part names, sorted for deterministic traversal.
    pub fn header_footer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|(n, _)| n.as_str())
            .filter(|n| {
                (n.starts_with("word/header") || n.starts_with("word/footer"))
                    && n.ends_with(".xml")
                    && !n["word/".len()..].contains('/')
            })
            .map(String::from)
            .collect();
        names.sort();
        names
    }

    /// Add an image under `word/media/`, continuing the `imageN` numbering
    /// already in the package. Returns the new part name.
    pub fn add_media(&mut self, ext: &str, data: &[u8]) -> String {
        let mut next = 1u32;
        for (name, _) in &self.entries {
            if let Some(rest) = name.strip_prefix("word/media/image") {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                if let Ok(n) = digits.parse::<u32>() {
                    next = next.max(n + 1);
                }
            }
        }
        let name = format!("word/media/image{next}.{ext}");
        self.entries.push((name.clone(), data.to_vec()));
        name
    }

    /// Make sure `[Content_Types].xml` carries a `Default` mapping for the
    /// given extension.
    pub fn ensure_content_type_default(&mut self, ext: &str, content_type: &str) -> Result<()> {
        let data = self
            .part(CONTENT_TYPES_PART)
            .ok_or_else(|| Error::MissingPart(CONTENT_TYPES_PART.to_string()))?;
        let mut tree = XmlTree::parse(data)?;
        let root = tree.root();
        let exists = tree.children(root).iter().any(|&child| {
            tree.name(child) == "Default"
                && tree
                    .attr(child, "Extension")
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        });
        if !exists {
            let default = tree.create_element("Default");
            tree.set_attr(default, "Extension", ext);
            tree.set_attr(default, "ContentType", content_type);
            tree.append_child(root, default);
            self.set_part(CONTENT_TYPES_PART, tree.to_bytes()?);
        }
        Ok(())
    }

    /// Register an image relationship for a part (for example
    /// `word/document.xml` -> `media/image3.png`), creating the `.rels`
    /// part when missing. An existing relationship with the same target is
    /// reused. Returns the relationship id.
    pub fn add_image_relationship(&mut self, part_name: &str, target: &str) -> Result<String> {
        let rels_name = rels_name_for(part_name);
        let mut tree = match self.part(&rels_name) {
            Some(data) => XmlTree::parse(data)?,
            None => {
                let skeleton = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
                     <Relationships xmlns=\"{RELS_XMLNS}\"/>"
                );
                XmlTree::parse_str(&skeleton)?
            }
        };
        let root = tree.root();

        let mut max_id = 0u32;
        for &child in tree.children(root) {
            if tree.name(child) != "Relationship" {
                continue;
            }
            if tree.attr(child, "Type") == Some(IMAGE_REL_TYPE)
                && tree.attr(child, "Target") == Some(target)
            {
                if let Some(id) = tree.attr(child, "Id") {
                    return Ok(id.to_string());
                }
            }
            if let Some(id) = tree.attr(child, "Id") {
                if let Some(n) = id.strip_prefix("rId").and_then(|s| s.parse::<u32>().ok()) {
                    max_id = max_id.max(n);
                }
            }
        }

        let rel_id = format!("rId{}", max_id + 1);
        let rel = tree.create_element("Relationship");
        tree.set_attr(rel, "Id", &rel_id);
        tree.set_attr(rel, "Type", IMAGE_REL_TYPE);
        tree.set_attr(rel, "Target", target);
        tree.append_child(root, rel);
        self.set_part(&rels_name, tree.to_bytes()?);
        Ok(rel_id)
    }

    /// Serialize the package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Write the package to disk via a temp file in the destination
    /// directory, then persist over the target path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(temp.as_file_mut())?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        for (name, data) in &self.entries {
            let method = if name.starts_with("word/media/") {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default().compression_method(method);
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }
}

/// `.rels` part name for a given part (`word/x.xml` ->
/// `word/_rels/x.xml.rels`).
fn rels_name_for(part: &str) -> String {
    match part.rfind('/') {
        Some(pos) => format!("{}/_rels/{}.rels", &part[..pos], &part[pos + 1..]),
        None => format!("_rels/{part}.rels"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_package() -> DocxPackage {
        DocxPackage {
            entries: vec![
                (
                    CONTENT_TYPES_PART.to_string(),
                    br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#.to_vec(),
                ),
                (
                    "word/document.xml".to_string(),
                    br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://x"><w:body/></w:document>"#.to_vec(),
                ),
                ("word/media/image1.png".to_string(), vec![1, 2, 3]),
            ],
        }
    }

    #[test]
    fn test_roundtrip_preserves_entries() {
        let package = minimal_package();
        let bytes = package.to_bytes().unwrap();
        let reopened = DocxPackage::from_bytes(&bytes).unwrap();
        let names: Vec<&str> = reopened.part_names().collect();
        assert_eq!(
            names,
            vec![CONTENT_TYPES_PART, "word/document.xml", "word/media/image1.png"]
        );
        assert_eq!(reopened.part("word/media/image1.png"), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_missing_document_part_rejected() {
        let mut package = minimal_package();
        package.entries.retain(|(n, _)| n != "word/document.xml");
        let bytes = package.to_bytes().unwrap();
        assert!(matches!(
            DocxPackage::from_bytes(&bytes),
            Err(Error::UnknownFormat)
        ));
    }

    #[test]
    fn test_set_part_replaces_and_appends() {
        let mut package = minimal_package();
        package.set_part("word/document.xml", b"<w:document/>".to_vec());
        assert_eq!(package.part("word/document.xml"), Some(&b"<w:document/>"[..]));
        package.set_part("word/header1.xml", b"<w:hdr/>".to_vec());
        assert!(package.has_part("word/header1.xml"));
    }

    #[test]
    fn test_header_footer_names_sorted() {
        let mut package = minimal_package();
        package.set_part("word/header2.xml", vec![]);
        package.set_part("word/footer1.xml", vec![]);
        package.set_part("word/header1.xml", vec![]);
        package.set_part("word/_rels/header1.xml.rels", vec![]);
        assert_eq!(
            package.header_footer_names(),
            vec!["word/footer1.xml", "word/header1.xml", "word/header2.xml"]
        );
    }

    #[test]
    fn test_add_media_continues_numbering() {
        let mut package = minimal_package();
        let name = package.add_media("png", &[9, 9]);
        assert_eq!(name, "word/media/image2.png");
        assert_eq!(package.part(&name), Some(&[9u8, 9][..]));
    }

    #[test]
    fn test_relationship_created_and_reused() {
        let mut package = minimal_package();
        let id = package
            .add_image_relationship("word/document.xml", "media/image2.png")
            .unwrap();
        assert_eq!(id, "rId1");
        let again = package
            .add_image_relationship("word/document.xml", "media/image2.png")
            .unwrap();
        assert_eq!(again, "rId1");
        let other = package
            .add_image_relationship("word/document.xml", "media/image3.png")
            .unwrap();
        assert_eq!(other, "rId2");
        assert!(package.has_part("word/_rels/document.xml.rels"));
    }

    #[test]
    fn test_content_type_default_added_once() {
        let mut package = minimal_package();
        package
            .ensure_content_type_default("png", "image/png")
            .unwrap();
        package
            .ensure_content_type_default("png", "image/png")
            .unwrap();
        let data = package.part(CONTENT_TYPES_PART).unwrap();
        let text = String::from_utf8_lossy(data);
        assert_eq!(text.matches("Extension=\"png\"").count(), 1);
    }

    #[test]
    fn test_rels_name_for() {
        assert_eq!(
            rels_name_for("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(rels_name_for("word/header2.xml"), "word/_rels/header2.xml.rels");
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        minimal_package().save(&path).unwrap();
        let reopened = DocxPackage::open(&path).unwrap();
        assert!(reopened.has_part("word/document.xml"));
    }
}
