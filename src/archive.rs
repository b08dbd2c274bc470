//! Safe iteration over the gzip-compressed tar archive of documents.
//!
//! Each archive entry passes through [`gate_member`] before any bytes are
//! read: directories and unrecognized extensions are skipped, symbolic and
//! hard links are rejected outright (never followed), and members whose name
//! is already in the processed set are not re-read. The walk itself is
//! blocking I/O and runs on a dedicated thread, streaming gated members to
//! the async orchestrator over a bounded channel.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use parking_lot::Mutex;
use tar::Archive;
use tracing::{debug, warn};

use crate::types::IngestError;

/// Extension recognized as a document inside the archive.
pub const DOCUMENT_EXTENSION: &str = ".xml";

/// Classification of one archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    File,
    Directory,
    Symlink,
    Hardlink,
    Other,
}

impl From<tar::EntryType> for MemberKind {
    fn from(kind: tar::EntryType) -> Self {
        if kind.is_symlink() {
            MemberKind::Symlink
        } else if kind.is_hard_link() {
            MemberKind::Hardlink
        } else if kind.is_dir() {
            MemberKind::Directory
        } else if kind.is_file() {
            MemberKind::File
        } else {
            MemberKind::Other
        }
    }
}

/// Why the gate refused to open a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAFile,
    WrongExtension,
    Link,
    AlreadyProcessed,
}

/// Gate verdict for one archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Process,
    Skip(SkipReason),
}

/// Decides whether an archive member may be read.
///
/// The decision order matters: entry type first, then extension, then link
/// rejection (with a warning naming the member), then the processed set.
pub fn gate_member(name: &str, kind: MemberKind, processed: &HashSet<String>) -> GateDecision {
    match kind {
        MemberKind::Directory | MemberKind::Other => {
            return GateDecision::Skip(SkipReason::NotAFile);
        }
        MemberKind::File | MemberKind::Symlink | MemberKind::Hardlink => {}
    }
    if !name.ends_with(DOCUMENT_EXTENSION) {
        return GateDecision::Skip(SkipReason::WrongExtension);
    }
    if matches!(kind, MemberKind::Symlink | MemberKind::Hardlink) {
        warn!(member = name, "skipping symbolic or hard link inside archive");
        return GateDecision::Skip(SkipReason::Link);
    }
    if processed.contains(name) {
        return GateDecision::Skip(SkipReason::AlreadyProcessed);
    }
    GateDecision::Process
}

/// One gated archive member, fully read into memory.
#[derive(Debug, Clone)]
pub struct GatedMember {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One event produced by the archive walk.
#[derive(Debug)]
pub enum WalkEvent {
    /// A gated member ready for processing.
    Member(GatedMember),
    /// A member whose name is already in the processed set; its bytes were
    /// never read. Surfaced so re-runs can report how much they skipped.
    AlreadySeen(String),
    /// Container-level failure; the walk stops after sending this.
    Failed(IngestError),
}

/// Walks the archive, sending [`WalkEvent`]s down `tx` in archive order.
///
/// Runs on a blocking thread. Container-level read failures terminate the
/// walk; the gate handles everything per-member. The walk also stops as soon
/// as the receiver hangs up.
pub fn walk_archive(
    file: File,
    processed: Arc<Mutex<HashSet<String>>>,
    tx: flume::Sender<WalkEvent>,
) {
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(err) => {
            let _ = tx.send(WalkEvent::Failed(IngestError::Archive(format!(
                "cannot read archive: {err}"
            ))));
            return;
        }
    };

    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let _ = tx.send(WalkEvent::Failed(IngestError::Archive(format!(
                    "corrupt archive entry: {err}"
                ))));
                return;
            }
        };

        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let kind = MemberKind::from(entry.header().entry_type());
        let decision = {
            let guard = processed.lock();
            gate_member(&name, kind, &guard)
        };
        match decision {
            GateDecision::Skip(SkipReason::AlreadyProcessed) => {
                if tx.send(WalkEvent::AlreadySeen(name)).is_err() {
                    return;
                }
                continue;
            }
            GateDecision::Skip(reason) => {
                debug!(member = %name, ?reason, "gate skipped member");
                continue;
            }
            GateDecision::Process => {}
        }

        let mut bytes = Vec::new();
        if let Err(err) = entry.read_to_end(&mut bytes) {
            let _ = tx.send(WalkEvent::Failed(IngestError::Archive(format!(
                "cannot read member '{name}': {err}"
            ))));
            return;
        }
        if tx.send(WalkEvent::Member(GatedMember { name, bytes })).is_err() {
            return;
        }
    }
}

/// Joins an archive entry name onto `dest`, refusing anything that would
/// resolve outside of it (absolute paths, `..` components).
pub fn safe_join(dest: &Path, name: &Path) -> Result<PathBuf, IngestError> {
    let mut out = dest.to_path_buf();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(IngestError::UnsafePath {
                    name: name.to_string_lossy().into_owned(),
                    dest: dest.to_path_buf(),
                });
            }
        }
    }
    Ok(out)
}

/// Archive-to-disk variant: unpacks regular file members beneath `dest`.
///
/// Links are skipped with a warning and directory-traversal entries abort
/// with [`IngestError::UnsafePath`] before anything is written. Returns the
/// number of files written.
pub fn extract_archive_to_dir(archive_path: &Path, dest: &Path) -> Result<usize, IngestError> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive_path).map_err(|err| {
        IngestError::Archive(format!("cannot open '{}': {err}", archive_path.display()))
    })?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = archive
        .entries()
        .map_err(|err| IngestError::Archive(format!("cannot read archive: {err}")))?;

    let mut written = 0usize;
    for entry in entries {
        let mut entry =
            entry.map_err(|err| IngestError::Archive(format!("corrupt archive entry: {err}")))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let kind = MemberKind::from(entry.header().entry_type());

        if matches!(kind, MemberKind::Symlink | MemberKind::Hardlink) {
            warn!(member = %name, "skipping symbolic or hard link inside archive");
            continue;
        }
        let target = safe_join(dest, Path::new(&name))?;
        match kind {
            MemberKind::Directory => {
                std::fs::create_dir_all(&target)?;
            }
            MemberKind::File => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                std::io::copy(&mut entry, &mut out)?;
                written += 1;
            }
            _ => {}
        }
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, EntryType, Header};

    fn processed(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    pub(crate) fn build_archive(build: impl FnOnce(&mut Builder<GzEncoder<Vec<u8>>>)) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        build(&mut builder);
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip")
    }

    pub(crate) fn add_file(builder: &mut Builder<GzEncoder<Vec<u8>>>, name: &str, content: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, content)
            .expect("append file");
    }

    fn add_dir(builder: &mut Builder<GzEncoder<Vec<u8>>>, name: &str) {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        builder
            .append_data(&mut header, name, &[][..])
            .expect("append dir");
    }

    fn add_symlink(builder: &mut Builder<GzEncoder<Vec<u8>>>, name: &str, target: &str) {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        builder
            .append_link(&mut header, name, target)
            .expect("append symlink");
    }

    #[test]
    fn gate_skips_directories_regardless_of_name() {
        assert_eq!(
            gate_member("somedir.xml/", MemberKind::Directory, &HashSet::new()),
            GateDecision::Skip(SkipReason::NotAFile)
        );
    }

    #[test]
    fn gate_skips_wrong_extension_regardless_of_kind() {
        for kind in [MemberKind::File, MemberKind::Symlink, MemberKind::Hardlink] {
            assert_eq!(
                gate_member("notes.txt", kind, &HashSet::new()),
                GateDecision::Skip(SkipReason::WrongExtension)
            );
        }
    }

    #[test]
    fn gate_rejects_links_before_dedup() {
        let already = processed(&["link.xml"]);
        assert_eq!(
            gate_member("link.xml", MemberKind::Symlink, &already),
            GateDecision::Skip(SkipReason::Link)
        );
        assert_eq!(
            gate_member("link.xml", MemberKind::Hardlink, &already),
            GateDecision::Skip(SkipReason::Link)
        );
    }

    #[test]
    fn gate_skips_already_processed_names() {
        assert_eq!(
            gate_member("test.xml", MemberKind::File, &processed(&["test.xml"])),
            GateDecision::Skip(SkipReason::AlreadyProcessed)
        );
    }

    #[test]
    fn gate_opens_fresh_xml_files() {
        assert_eq!(
            gate_member("test.xml", MemberKind::File, &HashSet::new()),
            GateDecision::Process
        );
    }

    #[test]
    fn walker_yields_gated_members_and_reports_seen_names() {
        let bytes = build_archive(|builder| {
            add_dir(builder, "somedir/");
            add_file(builder, "a.xml", b"<article/>");
            add_file(builder, "ignore.txt", b"plain");
            add_symlink(builder, "link.xml", "a.xml");
            add_file(builder, "seen.xml", b"<article/>");
            add_file(builder, "b.xml", b"<article/>");
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.tar.gz");
        std::fs::write(&path, bytes).unwrap();

        let already = Arc::new(Mutex::new(processed(&["seen.xml"])));
        let (tx, rx) = flume::bounded(4);
        let file = File::open(&path).unwrap();
        let handle = std::thread::spawn(move || walk_archive(file, already, tx));

        let mut names = Vec::new();
        let mut seen = Vec::new();
        for event in rx.iter() {
            match event {
                WalkEvent::Member(member) => names.push(member.name),
                WalkEvent::AlreadySeen(name) => seen.push(name),
                WalkEvent::Failed(err) => panic!("unexpected container error: {err}"),
            }
        }
        handle.join().unwrap();
        assert_eq!(names, vec!["a.xml".to_string(), "b.xml".to_string()]);
        // Ignored directories, extensions, and links are silent; only the
        // dedup skip is reported.
        assert_eq!(seen, vec!["seen.xml".to_string()]);
    }

    #[test]
    fn walker_reports_corrupt_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.tar.gz");
        std::fs::write(&path, b"this is not a gzip stream").unwrap();

        let (tx, rx) = flume::bounded(4);
        let file = File::open(&path).unwrap();
        walk_archive(file, Arc::new(Mutex::new(HashSet::new())), tx);

        let first = rx.recv().expect("one event");
        assert!(matches!(first, WalkEvent::Failed(IngestError::Archive(_))));
    }

    #[test]
    fn safe_join_rejects_traversal_and_absolute_paths() {
        let dest = Path::new("/tmp/extracted");
        assert!(matches!(
            safe_join(dest, Path::new("../evil.xml")),
            Err(IngestError::UnsafePath { .. })
        ));
        assert!(matches!(
            safe_join(dest, Path::new("nested/../../evil.xml")),
            Err(IngestError::UnsafePath { .. })
        ));
        assert!(matches!(
            safe_join(dest, Path::new("/etc/passwd")),
            Err(IngestError::UnsafePath { .. })
        ));
        let joined = safe_join(dest, Path::new("sub/./doc.xml")).unwrap();
        assert_eq!(joined, Path::new("/tmp/extracted/sub/doc.xml"));
    }

    #[test]
    fn extract_to_dir_writes_regular_files_only() {
        let bytes = build_archive(|builder| {
            add_dir(builder, "batch/");
            add_file(builder, "batch/a.xml", b"<article/>");
            add_symlink(builder, "batch/link.xml", "a.xml");
        });
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("data.tar.gz");
        std::fs::write(&archive_path, bytes).unwrap();
        let dest = dir.path().join("extracted");

        let written = extract_archive_to_dir(&archive_path, &dest).unwrap();
        assert_eq!(written, 1);
        assert!(dest.join("batch/a.xml").is_file());
        assert!(!dest.join("batch/link.xml").exists());
    }
}
