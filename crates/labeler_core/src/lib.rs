use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Result type alias for labeling operations.
pub type Result<T> = std::result::Result<T, LabelError>;

/// Errors surfaced by queue construction, decoding, and labeling.
///
/// Startup errors (`InputFolder`, `OutputFolder`) are fatal; the rest leave
/// the session state unchanged so the caller can report and retry.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("cannot read input folder {}: {source}", .path.display())]
    InputFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot use output folder {}: {source}", .path.display())]
    OutputFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("destination already exists: {}", .path.display())]
    DestinationExists { path: PathBuf },

    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no image left to label")]
    QueueExhausted,
}

/// Category applied to the current image.
///
/// The tag becomes a file name prefix, so variants map to bare lowercase
/// strings with no separator characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Cat,
    Dog,
}

impl Label {
    /// Every category, in button order.
    pub const ALL: [Label; 2] = [Label::Cat, Label::Dog];

    /// Lowercase tag used as the output file name prefix.
    pub fn tag(self) -> &'static str {
        match self {
            Label::Cat => "cat",
            Label::Dog => "dog",
        }
    }

    /// Caption shown on the label button.
    pub fn caption(self) -> &'static str {
        match self {
            Label::Cat => "Cat",
            Label::Dog => "Dog",
        }
    }
}

/// Scan a folder for labelable images, sorted ascending by file name.
///
/// Only the top level is listed; subdirectories and non-JPEG files are
/// skipped. The ordering is lexicographic on the file name, so repeated scans
/// of the same directory contents yield the same queue.
pub fn scan_queue(input: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = input.as_ref();
    let meta = fs::metadata(root).map_err(|source| LabelError::InputFolder {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(LabelError::InputFolder {
            path: root.to_path_buf(),
            source: io::Error::other("not a directory"),
        });
    }

    let mut queue: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && is_labelable_image(path) {
            queue.push(path.to_path_buf());
        }
    }

    queue.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(queue)
}

fn is_labelable_image(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            matches!(ext.as_str(), "jpg" | "jpeg")
        }
        None => false,
    }
}

/// Raw RGBA pixels of a decoded image, ready for texture upload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decode an image file to RGBA8.
pub fn decode_rgba(path: impl AsRef<Path>) -> Result<DecodedImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| LabelError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

/// Fit an image into a viewport bound, preserving aspect ratio.
///
/// Width is capped at the bound first; if the resulting height still
/// overflows, the size is recomputed from the height bound instead. An image
/// already within both bounds is returned unchanged, never upscaled.
pub fn fit_display(natural: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (nw, nh) = natural;
    let (max_w, max_h) = bound;
    if nw == 0 || nh == 0 {
        return (nw, nh);
    }
    let aspect = nw as f64 / nh as f64;
    let candidate_w = nw.min(max_w);
    let candidate_h = (candidate_w as f64 / aspect).round() as u32;
    if candidate_h > max_h {
        ((max_h as f64 * aspect).round() as u32, max_h)
    } else {
        (candidate_w, candidate_h)
    }
}

/// One pass over a folder of unlabeled images.
///
/// Owns the ordered queue and the advancing cursor. The queue is fixed at
/// construction; all remaining state lives on the filesystem, so a restart
/// simply picks up whatever is still in the input folder.
#[derive(Debug)]
pub struct LabelSession {
    queue: Vec<PathBuf>,
    cursor: usize,
    output_dir: PathBuf,
}

impl LabelSession {
    /// Build the queue from `input_dir` and prepare `output_dir`.
    ///
    /// The output folder is created when missing. Fails with a path-naming
    /// error when either folder is unusable.
    pub fn new(input_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<Self> {
        let queue = scan_queue(&input_dir)?;
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).map_err(|source| LabelError::OutputFolder {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            queue,
            cursor: 0,
            output_dir,
        })
    }

    /// Path of the image the cursor points at, if any.
    pub fn current(&self) -> Option<&Path> {
        self.queue.get(self.cursor).map(|p| p.as_path())
    }

    /// Number of images still to label, including the current one.
    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// True once every queued image has been labeled.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Move the current image into the output folder as `<tag>.<name>` and
    /// advance the cursor.
    ///
    /// On failure the cursor stays put and the source file is untouched, so
    /// the same image is presented again. Returns the destination path.
    pub fn label_current(&mut self, label: Label) -> Result<PathBuf> {
        let source = self.queue.get(self.cursor).ok_or(LabelError::QueueExhausted)?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = self.output_dir.join(format!("{}.{}", label.tag(), name));
        move_labeled(source, &dest)?;
        tracing::info!("labeled {} as {}", source.display(), label.tag());
        self.cursor += 1;
        Ok(dest)
    }
}

/// Move a labeled file, refusing to overwrite an existing destination.
///
/// `fs::rename` fails across filesystems, so a copy-then-delete fallback
/// covers output folders on another volume.
fn move_labeled(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(LabelError::DestinationExists {
            path: dest.to_path_buf(),
        });
    }
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => match fs::copy(source, dest) {
            Ok(_) => {
                if let Err(e) = fs::remove_file(source) {
                    tracing::warn!("moved {} but could not remove it: {}", source.display(), e);
                }
                Ok(())
            }
            Err(_) => Err(LabelError::MoveFailed {
                from: source.to_path_buf(),
                to: dest.to_path_buf(),
                source: rename_err,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rstest::rstest;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn names(queue: &[PathBuf]) -> Vec<String> {
        queue
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn scan_queue_sorts_by_name_and_is_deterministic() -> Result<()> {
        let dir = tempdir()?;
        File::create(dir.path().join("c.jpg"))?;
        File::create(dir.path().join("a.jpg"))?;
        File::create(dir.path().join("b.jpg"))?;

        let first = scan_queue(dir.path())?;
        assert_eq!(names(&first), vec!["a.jpg", "b.jpg", "c.jpg"]);

        let second = scan_queue(dir.path())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn scan_queue_keeps_only_top_level_jpegs() -> Result<()> {
        let dir = tempdir()?;
        File::create(dir.path().join("a.jpg"))?;
        File::create(dir.path().join("b.JPG"))?;
        File::create(dir.path().join("c.jpeg"))?;
        File::create(dir.path().join("notes.txt"))?;
        File::create(dir.path().join("noext"))?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        File::create(nested.join("d.jpg"))?;

        let queue = scan_queue(dir.path())?;
        assert_eq!(names(&queue), vec!["a.jpg", "b.JPG", "c.jpeg"]);
        Ok(())
    }

    #[test]
    fn scan_queue_missing_folder_names_the_path() {
        let err = scan_queue("/no/such/folder").unwrap_err();
        match err {
            LabelError::InputFolder { path, .. } => {
                assert_eq!(path, PathBuf::from("/no/such/folder"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scan_queue_rejects_a_plain_file() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("plain.jpg");
        File::create(&file)?;
        assert!(matches!(
            scan_queue(&file),
            Err(LabelError::InputFolder { .. })
        ));
        Ok(())
    }

    #[rstest]
    #[case((4000, 2000), (1600, 1200), (1600, 800))]
    #[case((1000, 2000), (1600, 1200), (600, 1200))]
    #[case((800, 600), (1600, 1200), (800, 600))]
    #[case((1000, 1100), (1600, 1200), (1000, 1100))]
    #[case((1600, 1200), (1600, 1200), (1600, 1200))]
    fn fit_display_matches_reference(
        #[case] natural: (u32, u32),
        #[case] bound: (u32, u32),
        #[case] expected: (u32, u32),
    ) {
        assert_eq!(fit_display(natural, bound), expected);
    }

    #[rstest]
    #[case((8192, 8192))]
    #[case((123, 4567))]
    #[case((4567, 123))]
    #[case((1, 10000))]
    fn fit_display_never_exceeds_the_bound(#[case] natural: (u32, u32)) {
        let bound = (1536, 864);
        let (w, h) = fit_display(natural, bound);
        assert!(w <= bound.0, "width {w} over bound");
        assert!(h <= bound.1, "height {h} over bound");
    }

    fn session_with(
        files: &[&str],
    ) -> Result<(tempfile::TempDir, tempfile::TempDir, LabelSession)> {
        let input = tempdir()?;
        let output = tempdir()?;
        for f in files {
            fs::write(input.path().join(f), b"jpeg bytes")?;
        }
        let session = LabelSession::new(input.path(), output.path())?;
        Ok((input, output, session))
    }

    #[test]
    fn label_current_moves_file_and_advances() -> Result<()> {
        let (input, output, mut session) = session_with(&["a.jpg", "b.jpg"])?;
        assert_eq!(session.remaining(), 2);

        let dest = session.label_current(Label::Cat)?;
        assert_eq!(dest, output.path().join("cat.a.jpg"));
        assert!(dest.exists());
        assert!(!input.path().join("a.jpg").exists());
        assert_eq!(session.cursor(), 1);
        assert_eq!(session.remaining(), 1);
        assert_eq!(session.current(), Some(input.path().join("b.jpg").as_path()));
        Ok(())
    }

    #[test]
    fn labeling_the_last_image_finishes_the_session() -> Result<()> {
        let (_input, output, mut session) = session_with(&["only.jpg"])?;
        session.label_current(Label::Dog)?;
        assert!(session.is_finished());
        assert!(session.current().is_none());
        assert!(output.path().join("dog.only.jpg").exists());
        assert!(matches!(
            session.label_current(Label::Dog),
            Err(LabelError::QueueExhausted)
        ));
        Ok(())
    }

    #[test]
    fn destination_collision_is_surfaced_and_cursor_stays() -> Result<()> {
        let (input, output, mut session) = session_with(&["a.jpg"])?;
        fs::write(output.path().join("cat.a.jpg"), b"already here")?;

        let err = session.label_current(Label::Cat).unwrap_err();
        assert!(matches!(err, LabelError::DestinationExists { .. }));
        assert_eq!(session.cursor(), 0);
        assert!(input.path().join("a.jpg").exists());
        // The blocking file is untouched.
        assert_eq!(fs::read(output.path().join("cat.a.jpg"))?, b"already here");
        Ok(())
    }

    #[test]
    fn empty_folder_yields_a_finished_session() -> Result<()> {
        let (_input, _output, session) = session_with(&[])?;
        assert!(session.is_empty());
        assert!(session.is_finished());
        assert_eq!(session.remaining(), 0);
        Ok(())
    }

    #[test]
    fn session_creates_a_missing_output_folder() -> Result<()> {
        let input = tempdir()?;
        fs::write(input.path().join("a.jpg"), b"x")?;
        let output_root = tempdir()?;
        let output = output_root.path().join("labeled");

        let mut session = LabelSession::new(input.path(), &output)?;
        session.label_current(Label::Cat)?;
        assert!(output.join("cat.a.jpg").exists());
        Ok(())
    }

    #[test]
    fn decode_rgba_reports_undecodable_files() -> Result<()> {
        let dir = tempdir()?;
        let bogus = dir.path().join("bogus.jpg");
        fs::write(&bogus, b"not an image at all")?;
        assert!(matches!(decode_rgba(&bogus), Err(LabelError::Decode { .. })));
        Ok(())
    }

    #[test]
    fn decode_rgba_returns_pixel_dimensions() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("tiny.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255])).save(&path)?;

        let decoded = decode_rgba(&path)?;
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.rgba.len(), 3 * 2 * 4);
        Ok(())
    }
}
