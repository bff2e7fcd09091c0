//! Raw document access: recursive corpus walk, ZIP archives, XML text.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader as XmlReader;
use walkdir::{DirEntry, WalkDir};
use zip::ZipArchive;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Lists archive files under `root` (recursively, sorted by file name so a
/// run is reproducible), keeping names ending with `suffix`, skipping the
/// first `from` matches and returning at most `limit` (0 = unlimited).
pub fn corpus_files(root: &Path, suffix: &str, from: usize, limit: usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = entry.with_context(|| format!("could not walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.ends_with(suffix))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    let take = if limit == 0 { usize::MAX } else { limit };
    Ok(files.into_iter().skip(from).take(take).collect())
}

/// Reads every member of a ZIP archive and returns its extracted text, one
/// string per member. XML members are reduced to their character data.
pub fn read_archive(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("{}: could not read archive", path.display()))?;

    let mut docs = Vec::new();
    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .with_context(|| format!("{}: could not open member {}", path.display(), i))?;
        if member.is_dir() {
            continue;
        }
        let mut bytes = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut bytes)
            .with_context(|| format!("{}: error decompressing {}", path.display(), member.name()))?;
        docs.push(member_text(member.name(), &bytes)?);
    }
    Ok(docs)
}

fn is_xml_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".fb2")
}

fn member_text(name: &str, bytes: &[u8]) -> Result<String> {
    if is_xml_name(name) {
        xml_text(bytes).with_context(|| format!("{name}: could not parse xml"))
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Pulls the character data out of an XML document. Subtrees that carry no
/// prose (base64 attachments, metadata) are dropped.
fn xml_text(bytes: &[u8]) -> Result<String> {
    const BLOCKED: [&[u8]; 2] = [b"binary", b"description"];

    let mut reader = XmlReader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if skip_depth > 0 || BLOCKED.contains(&e.local_name().as_ref()) {
                    skip_depth += 1;
                }
            }
            Event::End(_) => {
                skip_depth = skip_depth.saturating_sub(1);
            }
            Event::Text(t) => {
                if skip_depth == 0 {
                    let piece = t.unescape()?;
                    if !piece.trim().is_empty() {
                        text.push_str(&piece);
                        text.push(' ');
                    }
                }
            }
            Event::CData(t) => {
                if skip_depth == 0 {
                    text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                    text.push(' ');
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zw = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in members {
            zw.start_file(*name, SimpleFileOptions::default()).unwrap();
            zw.write_all(body.as_bytes()).unwrap();
        }
        zw.finish().unwrap();
    }

    #[test]
    fn walk_is_sorted_and_windowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.zip", "a.zip", "sub/c.zip", "skip.txt", ".hidden.zip"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let all = corpus_files(dir.path(), ".zip", 0, 0).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.zip", "b.zip", "c.zip"]);

        let window = corpus_files(dir.path(), ".zip", 1, 1).unwrap();
        assert_eq!(window.len(), 1);
        assert!(window[0].ends_with("b.zip"));
    }

    #[test]
    fn archive_members_come_back_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.zip");
        make_zip(
            &path,
            &[
                ("one.txt", "первый документ"),
                (
                    "two.xml",
                    "<doc><description>мета</description>\
                     <p>второй</p><binary>QUJD</binary><p>документ</p></doc>",
                ),
            ],
        );

        let docs = read_archive(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], "первый документ");
        assert!(docs[1].contains("второй"));
        assert!(docs[1].contains("документ"));
        assert!(!docs[1].contains("мета"));
        assert!(!docs[1].contains("QUJD"));
    }
}
