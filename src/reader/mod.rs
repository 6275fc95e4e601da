//! The streaming, chunk-aware file reader: turns one or more files matching a glob
//! template into a sequence of whole entities, each handed off as a fresh [`Scanner`].

mod queue;

pub use queue::{seed_jobs, ReadJob, WorkQueue};

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use encoding_rs::Encoding;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::scanner::{tag_name, Scanner};

const DEFAULT_BUFFER_SIZE: usize = 131_072;

pub struct Reader {
    queue: Arc<WorkQueue>,
    root_pattern: Option<String>,
    buffer_size: usize,
    encoding: &'static Encoding,
    file: Option<File>,
    path: Option<PathBuf>,
    file_pos: u64,
    chunk_end: Option<u64>,
    root: Option<Scanner>,
}

impl Reader {
    pub fn new(queue: Arc<WorkQueue>, root_pattern: Option<String>, encoding: &'static Encoding) -> Self {
        Self {
            queue,
            root_pattern,
            buffer_size: DEFAULT_BUFFER_SIZE,
            encoding,
            file: None,
            path: None,
            file_pos: 0,
            chunk_end: None,
            root: None,
        }
    }

    #[cfg(test)]
    fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// The next whole entity, or `None` once every job (and the shared sentinel) is drained.
    pub fn next(&mut self) -> Result<Option<Scanner>> {
        loop {
            if self.file.is_none() && !self.open_next_job()? {
                return Ok(None);
            }

            if self.root_pattern.is_none() {
                let text = self.read_to_eof()?;
                self.close();
                if text.is_empty() {
                    continue;
                }
                return Ok(Some(Scanner::new(Document::new(Rc::from(text)))));
            }

            if self.root.is_none() {
                let buf = self.tag_aware_read(true)?;
                self.root = Some(Scanner::new(Document::new(Rc::from(buf))));
            }

            let mut found_root = false;
            loop {
                {
                    let root = self.root.as_mut().expect("root scanner seeded above");
                    root.tags(self.root_pattern.as_deref().expect("root pattern present"))?;
                    if root.find().is_some() {
                        found_root = true;
                        break;
                    }
                }
                let buf = self.tag_aware_read(true)?;
                if buf.is_empty() {
                    break;
                }
                self.extend_root(buf);
            }

            if !found_root {
                self.close();
                continue;
            }

            return Ok(Some(self.extract_entity()?));
        }
    }

    fn extend_root(&mut self, buf: String) {
        let root = self.root.as_mut().expect("root scanner seeded above");
        let combined: Rc<str> = Rc::from(format!("{}{}", root.text_for_extend(), buf));
        let new_end = combined.len();
        root.rebuffer(combined, new_end);
    }

    /// Extract the entity bounded by the root scanner's current open tag, pulling in
    /// further buffers (ignoring the chunk budget) until the balanced close is found or
    /// the file truly ends.
    fn extract_entity(&mut self) -> Result<Scanner> {
        let (open_tag, start) = {
            let root = self.root.as_ref().expect("root tag just found");
            (root.tag().expect("root tag just found").to_string(), root.pos())
        };
        let name = tag_name(&open_tag).to_string();
        let is_self_closing =
            open_tag.ends_with("/>") || open_tag.ends_with("?>") || open_tag.starts_with("<?");

        if is_self_closing {
            let bytes = Rc::clone(self.root.as_ref().unwrap().bytes_rc());
            return Ok(Scanner::new(Document::windowed(bytes, start, start)));
        }

        let close_name = match name.strip_prefix('/') {
            Some(rest) => rest.to_string(),
            None => format!("/{name}"),
        };
        let mut depth: i64 = 1;

        loop {
            let next = self.root.as_mut().unwrap().next_tag().map(str::to_string);
            match next {
                Some(tag) => {
                    let tname = tag_name(&tag);
                    if tname == close_name {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    } else if tname == name {
                        depth += 1;
                    }
                }
                None => {
                    let buf = self.tag_aware_read(false)?;
                    if buf.is_empty() {
                        break;
                    }
                    self.extend_root(buf);
                }
            }
        }

        let root = self.root.as_ref().unwrap();
        let content_end = match root.tag() {
            Some(close_tag) if tag_name(close_tag) == close_name => root.pos() - close_tag.len(),
            _ => root.end(),
        };
        let bytes = Rc::clone(root.bytes_rc());
        Ok(Scanner::new(Document::windowed(bytes, start, content_end)))
    }

    fn open_next_job(&mut self) -> Result<bool> {
        let job = match self.queue.pop() {
            Some(job) => job,
            None => return Ok(false),
        };
        let mut file =
            File::open(&job.path).map_err(|e| Error::IoOpen { path: job.path.clone(), source: e })?;
        if job.start > 0 {
            file.seek(SeekFrom::Start(job.start))
                .map_err(|e| Error::IoOpen { path: job.path.clone(), source: e })?;
        }
        self.file_pos = job.start;
        self.chunk_end = job.end;
        self.path = Some(job.path);
        self.file = Some(file);
        self.root = None;
        Ok(true)
    }

    fn close(&mut self) {
        self.file = None;
        self.root = None;
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<String> {
        let (text, _, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            return Err(Error::IoEncoding {
                path: self.path.clone().unwrap_or_default(),
                offset: self.file_pos,
                position: None,
            });
        }
        Ok(text.into_owned())
    }

    fn read_to_eof(&mut self) -> Result<String> {
        let path = self.path.clone().unwrap_or_default();
        let file = self.file.as_mut().expect("file open");
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| Error::IoRead { path: path.clone(), offset: self.file_pos, source: e })?;
        self.file_pos += bytes.len() as u64;
        self.decode(bytes)
    }

    /// Read up to `buffer_size` bytes, then one byte at a time until EOF, a `<` (pushed
    /// back, not consumed), a `>`, or a `\n` (both included) — so the slice never ends
    /// inside a tag. When `seeking_root` and the chunk budget is already spent, returns
    /// empty without touching the file; otherwise the chunk boundary is ignored so an
    /// already-started entity can always be finished.
    fn tag_aware_read(&mut self, seeking_root: bool) -> Result<String> {
        let mut want = self.buffer_size;
        if let Some(end) = self.chunk_end {
            let remaining = end.saturating_sub(self.file_pos);
            want = want.min(remaining as usize);
            if want == 0 {
                if seeking_root {
                    return Ok(String::new());
                }
                want = self.buffer_size;
            }
        }

        let path = self.path.clone().unwrap_or_default();
        let file = self.file.as_mut().expect("file open");

        let mut bytes = vec![0u8; want];
        let n = file
            .read(&mut bytes)
            .map_err(|e| Error::IoRead { path: path.clone(), offset: self.file_pos, source: e })?;
        bytes.truncate(n);
        self.file_pos += n as u64;

        let mut one = [0u8; 1];
        loop {
            let read = file
                .read(&mut one)
                .map_err(|e| Error::IoRead { path: path.clone(), offset: self.file_pos, source: e })?;
            if read == 0 {
                break;
            }
            match one[0] {
                b'<' => {
                    file.seek(SeekFrom::Current(-1))
                        .map_err(|e| Error::IoRead { path: path.clone(), offset: self.file_pos, source: e })?;
                    break;
                }
                b'>' | b'\n' => {
                    bytes.push(one[0]);
                    self.file_pos += 1;
                    break;
                }
                other => {
                    bytes.push(other);
                    self.file_pos += 1;
                }
            }
        }

        self.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn queue_for(contents: &str) -> (Arc<WorkQueue>, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let job = ReadJob { path: file.path().to_path_buf(), start: 0, end: None };
        (Arc::new(WorkQueue::new(vec![job])), file)
    }

    #[test]
    fn single_entity_whole_file_without_root() {
        let (queue, _tmp) = queue_for("<doc>hello</doc>");
        let mut reader = Reader::new(queue, None, encoding_rs::UTF_8);
        let entity = reader.next().unwrap().unwrap();
        assert_eq!(entity.text(), "<doc>hello</doc>");
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn splits_multiple_root_entities() {
        let xml = "<list><item>a</item><item>b</item></list>";
        let (queue, _tmp) = queue_for(xml);
        let mut reader = Reader::new(queue, Some("item".to_string()), encoding_rs::UTF_8);
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.text(), "a");
        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.text(), "b");
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn small_buffer_still_finds_entities_spanning_reads() {
        let xml = "<list><item>abcdefghij</item></list>";
        let (queue, _tmp) = queue_for(xml);
        let mut reader =
            Reader::new(queue, Some("item".to_string()), encoding_rs::UTF_8).with_buffer_size(4);
        let entity = reader.next().unwrap().unwrap();
        assert_eq!(entity.text(), "abcdefghij");
    }

    #[test]
    fn chunk_boundary_mid_entity_yields_no_duplicate_or_dropped_entity() {
        // "<list><item>A</item><item>B</item></list>", with a chunk boundary landing
        // inside the first entity's closing tag. The first job must finish that entity
        // (crossing the boundary) but then stop without picking up the second entity on
        // stale find/tag state; a second job starting at the boundary must still find it.
        let xml = "<list><item>A</item><item>B</item></list>";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        let jobs = vec![
            ReadJob { path: file.path().to_path_buf(), start: 0, end: Some(15) },
            ReadJob { path: file.path().to_path_buf(), start: 15, end: None },
        ];
        let queue = Arc::new(WorkQueue::new(jobs));
        let mut reader = Reader::new(queue, Some("item".to_string()), encoding_rs::UTF_8);

        let mut found = Vec::new();
        while let Some(entity) = reader.next().unwrap() {
            found.push(entity.text().to_string());
        }
        assert_eq!(found, vec!["A".to_string(), "B".to_string()]);
    }
}
