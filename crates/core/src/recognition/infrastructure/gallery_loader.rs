//! Builds a [`Gallery`] from a directory of enrolment photos.
//!
//! Two layouts are accepted and may be mixed:
//!
//! ```text
//! gallery/
//!   alice.jpg            -> identity "alice"
//!   bob/                 -> identity "bob"
//!     front.png
//!     side.jpg
//! ```
//!
//! Files are visited in sorted order so the gallery is identical between
//! runs. Hidden files and unsupported extensions are ignored.
//!
//! Each photo goes through the face detector and only the largest face is
//! embedded, so enrolment embeddings are comparable with the tight crops
//! the pipeline takes from video. Photos without a face are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use crate::detection::domain::face_detector::FaceDetector;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::gallery::Gallery;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

pub fn load_gallery(
    dir: &Path,
    detector: &mut dyn FaceDetector,
    embedder: &dyn FaceEmbedder,
) -> Result<Gallery, Box<dyn std::error::Error>> {
    let mut gallery = Gallery::default();

    for (identity, path) in enrolment_images(dir)? {
        let frame = match read_rgb(&path) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping unreadable enrolment image {}: {e}", path.display());
                continue;
            }
        };
        let faces = detector
            .detect(&frame)
            .map_err(|e| format!("face detection on {} failed: {e}", path.display()))?;
        let Some(face) = largest_face(&frame, &faces) else {
            log::warn!("No face found in {}, skipping", path.display());
            continue;
        };
        match embedder.embed(&face) {
            Ok(Some(embedding)) => gallery.push(identity, embedding),
            Ok(None) => log::warn!("No face embedding for {}, skipping", path.display()),
            Err(e) => return Err(format!("embedding {} failed: {e}", path.display()).into()),
        }
    }

    log::info!(
        "Loaded gallery: {} identities, {} embeddings from {}",
        gallery.identities().len(),
        gallery.len(),
        dir.display()
    );
    Ok(gallery)
}

/// `(identity, image path)` pairs found under `dir`, sorted by path.
pub fn enrolment_images(dir: &Path) -> Result<Vec<(String, PathBuf)>, Box<dyn std::error::Error>> {
    let mut found = Vec::new();
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            let Some(identity) = file_name(&path) else {
                continue;
            };
            for inner in sorted_entries(&path)? {
                if is_image(&inner) {
                    found.push((identity.clone(), inner));
                }
            }
        } else if is_image(&path) {
            if let Some(identity) = path.file_stem().and_then(|s| s.to_str()) {
                found.push((identity.to_string(), path.clone()));
            }
        }
    }
    Ok(found)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| format!("cannot read {}: {e}", dir.display()))? {
        let path = entry?.path();
        if file_name(&path).is_some_and(|n| !n.starts_with('.')) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Crop of the largest box that still covers pixels once clamped to the frame.
fn largest_face(frame: &Frame, faces: &[BoundingBox]) -> Option<Frame> {
    faces
        .iter()
        .map(|bbox| bbox.clamp_to(frame.width(), frame.height()))
        .filter(|rect| !rect.is_empty())
        .max_by_key(|rect| u64::from(rect.width) * u64::from(rect.height))
        .map(|rect| frame.crop(&rect))
}

fn read_rgb(path: &Path) -> Result<Frame, image::ImageError> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height, 3, 0))
}
