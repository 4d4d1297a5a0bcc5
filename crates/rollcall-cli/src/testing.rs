//! Fake extractors and photo fixtures for the CLI tests.

use crate::attendance::AttendanceLog;
use crate::engine::{spawn_engine, EngineTimeouts};
use crate::service::AttendanceService;
use image::RgbImage;
use rollcall_core::{Embedding, Extraction, Extractor, PhotoStore};
use std::path::Path;
use std::time::Duration;

/// The top-left pixel's RGB channels become the vector; black means no face.
pub struct PixelExtractor;

impl Extractor for PixelExtractor {
    fn extract(&mut self, image: &RgbImage) -> Extraction {
        let [r, g, b] = image.get_pixel(0, 0).0;
        if r == 0 && g == 0 && b == 0 {
            return Extraction::NoFace;
        }
        Extraction::Face(Embedding::new(vec![f32::from(r), f32::from(g), f32::from(b)]))
    }
}

/// Sleeps before answering, to exercise timeouts.
pub struct SlowExtractor(pub Duration);

impl Extractor for SlowExtractor {
    fn extract(&mut self, image: &RgbImage) -> Extraction {
        std::thread::sleep(self.0);
        PixelExtractor.extract(image)
    }
}

/// Create `<root>/<id>/img_N.png`, one solid-color photo per entry.
pub fn add_employee(root: &Path, id: &str, photos: &[[u8; 3]]) {
    let folder = root.join(id);
    std::fs::create_dir_all(&folder).unwrap();
    for (i, rgb) in photos.iter().enumerate() {
        RgbImage::from_pixel(4, 4, image::Rgb(*rgb))
            .save(folder.join(format!("img_{i}.png")))
            .unwrap();
    }
}

/// Service over `root` with pixel extractors and an in-memory log.
pub fn service(root: &Path) -> AttendanceService {
    service_with(root, PixelExtractor, PixelExtractor)
}

pub fn service_with<S, B>(root: &Path, scan: S, build: B) -> AttendanceService
where
    S: Extractor + Send + 'static,
    B: Extractor + Send + 'static,
{
    let timeouts = EngineTimeouts {
        extract: Duration::from_secs(5),
        rebuild: Duration::from_secs(5),
    };
    let (engine, _) = spawn_engine(scan, build, PhotoStore::new(root), timeouts).unwrap();
    let log = AttendanceLog::open_in_memory().unwrap();
    AttendanceService::new(engine, 0.75, "gate".into(), Some(log))
}
