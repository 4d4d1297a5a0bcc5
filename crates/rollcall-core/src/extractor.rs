//! Boundary between the core and whatever model turns a face image into a
//! vector.
//!
//! Images cross this boundary as 8-bit RGB. Frames captured in BGR (or any
//! other layout) must be converted by the caller before extraction.

use crate::types::Embedding;
use image::RgbImage;
use std::path::Path;

/// Outcome of running an [`Extractor`] on one image.
///
/// `NoFace` and `Failed` are both expected outcomes: callers skip the image
/// and move on. They are kept apart so logs can tell "nothing usable in the
/// frame" from "the model or decoder broke".
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Face(Embedding),
    NoFace,
    Failed(String),
}

impl Extraction {
    /// The embedding, if one was produced.
    pub fn into_embedding(self) -> Option<Embedding> {
        match self {
            Extraction::Face(embedding) => Some(embedding),
            Extraction::NoFace | Extraction::Failed(_) => None,
        }
    }
}

/// Produces a fixed-length embedding from an RGB image.
///
/// Implementations may be slow and hold mutable model state, so callers run
/// them outside any shared lock.
pub trait Extractor {
    fn extract(&mut self, image: &RgbImage) -> Extraction;

    /// Decode an image file and extract from it. Decode errors are reported
    /// as [`Extraction::Failed`].
    fn extract_file(&mut self, path: &Path) -> Extraction {
        match image::open(path) {
            Ok(img) => self.extract(&img.to_rgb8()),
            Err(e) => Extraction::Failed(format!("decode {}: {e}", path.display())),
        }
    }
}

impl<E: Extractor + ?Sized> Extractor for Box<E> {
    fn extract(&mut self, image: &RgbImage) -> Extraction {
        (**self).extract(image)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Test extractor: the top-left pixel's RGB channels become the vector.
    /// A black pixel means "no face".
    pub(crate) struct PixelExtractor {
        pub calls: usize,
    }

    impl PixelExtractor {
        pub(crate) fn new() -> Self {
            Self { calls: 0 }
        }
    }

    impl Extractor for PixelExtractor {
        fn extract(&mut self, image: &RgbImage) -> Extraction {
            self.calls += 1;
            let [r, g, b] = image.get_pixel(0, 0).0;
            if r == 0 && g == 0 && b == 0 {
                return Extraction::NoFace;
            }
            Extraction::Face(Embedding::new(vec![
                f32::from(r),
                f32::from(g),
                f32::from(b),
            ]))
        }
    }

    /// Write a 4x4 solid-color PNG.
    pub(crate) fn write_png(path: &Path, rgb: [u8; 3]) {
        RgbImage::from_pixel(4, 4, image::Rgb(rgb))
            .save(path)
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_extract_file_reads_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_0.png");
        write_png(&path, [10, 20, 30]);

        let mut ex = PixelExtractor::new();
        let got = ex.extract_file(&path).into_embedding().unwrap();
        assert_eq!(got.values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_extract_file_decode_error_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let mut ex = PixelExtractor::new();
        assert!(matches!(ex.extract_file(&path), Extraction::Failed(_)));
        assert_eq!(ex.calls, 0);
    }

    #[test]
    fn test_boxed_extractor_delegates() {
        let mut ex: Box<dyn Extractor> = Box::new(PixelExtractor::new());
        let img = RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]));
        assert_eq!(ex.extract(&img), Extraction::NoFace);
    }
}
