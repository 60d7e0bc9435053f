//! Parallel dispatch and image output.
//!
//! A [`RenderContext`] owns the worker pool a render runs on; there is no
//! process-wide render state. A dispatch runs one task per pixel, each
//! writing only its own four bytes, and returns once every task finished.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rayon::prelude::*;

use crate::error::{RenderError, Result};
use crate::integrator::{Integrator, ShadingContext};

/// Largest dispatch a context accepts unless configured otherwise.
pub const DEFAULT_MAX_PIXELS: usize = 8192 * 8192;

/// Worker pool plus the dispatch capacity it was sized for.
pub struct RenderContext {
    pool: rayon::ThreadPool,
    max_pixels: usize,
}

impl RenderContext {
    /// Create a context with `threads` workers, or one per core.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("mbrt-worker-{}", i));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| RenderError::Context(e.to_string()))?;

        log::debug!("Render context: {} worker threads", pool.current_num_threads());
        Ok(Self {
            pool,
            max_pixels: DEFAULT_MAX_PIXELS,
        })
    }

    /// Cap the number of pixels a single dispatch may cover.
    pub fn with_max_pixels(mut self, max_pixels: usize) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn max_pixels(&self) -> usize {
        self.max_pixels
    }

    /// Shade every pixel of `ctx`'s resolution with `integrator`.
    ///
    /// Returns the image and the number of pixels where a primary ray hit
    /// geometry.
    pub fn dispatch(&self, integrator: &dyn Integrator, ctx: &ShadingContext) -> Result<(ImageBuffer, u64)> {
        let (width, height) = (ctx.width, ctx.height);
        let pixel_count = width as usize * height as usize;
        if pixel_count == 0 || pixel_count > self.max_pixels {
            return Err(RenderError::Resolution {
                width,
                height,
                capacity: self.max_pixels,
            });
        }

        log::info!(
            "Dispatching {} ({}x{}) on {} threads",
            integrator.name(),
            width,
            height,
            self.thread_count()
        );

        let mut image = ImageBuffer::new(width, height);
        let hit_pixels = self.pool.install(|| {
            image
                .pixels
                .par_chunks_exact_mut(4)
                .enumerate()
                .map(|(i, out)| {
                    let x = (i % width as usize) as u32;
                    let y = (i / width as usize) as u32;
                    let pixel = integrator.shade(x, y, ctx);
                    out.copy_from_slice(&pixel.rgba);
                    u64::from(pixel.hit)
                })
                .sum::<u64>()
        });

        Ok((image, hit_pixels))
    }
}

/// RGBA8 pixels, row 0 at the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Get the pixel at (x, y), counting rows from the bottom.
    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Bytes with rows reordered top to bottom, as image files store them.
    pub fn to_file_order(&self) -> Vec<u8> {
        let row = self.width as usize * 4;
        if row == 0 {
            return Vec::new();
        }
        self.pixels
            .chunks_exact(row)
            .rev()
            .flatten()
            .copied()
            .collect()
    }

    /// Write a PNG, creating the parent directory if needed.
    pub fn write_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let image = image::RgbaImage::from_raw(self.width, self.height, self.to_file_order()).ok_or_else(|| {
            RenderError::Build(format!(
                "{} bytes do not form a {}x{} image",
                self.pixels.len(),
                self.width,
                self.height
            ))
        })?;
        image.save(path)?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Summary of one finished render case.
#[derive(Debug, Clone)]
pub struct RenderStats {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub elapsed: Duration,
    pub hit_pixels: u64,
    pub output: Option<PathBuf>,
}

impl RenderStats {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::camera::Camera;
    use crate::engine::{build_geometry, build_scene, BuildQuality, FuncTable, GeometryBuildInput, SceneBuildInput};
    use crate::integrator::Pixel;
    use mbrt_core::procedural::unit_triangle;
    use mbrt_core::{FrameSrt, GeometryTable, SceneDescription};

    /// Writes each pixel's own coordinates so misplaced writes show up.
    struct Coordinates;

    impl Integrator for Coordinates {
        fn name(&self) -> &'static str {
            "coordinates"
        }

        fn shade(&self, x: u32, y: u32, _ctx: &ShadingContext) -> Pixel {
            Pixel {
                rgba: [x as u8, y as u8, 7, 255],
                hit: x == y,
            }
        }
    }

    fn with_context<R>(width: u32, height: u32, f: impl FnOnce(&ShadingContext) -> R) -> R {
        let mesh = unit_triangle().unwrap();
        let table = GeometryTable::build(&SceneDescription::one_instance_per_mesh(vec![mesh.clone()])).unwrap();
        let geometry = build_geometry(&GeometryBuildInput::for_mesh(&mesh), BuildQuality::PreferFastBuild).unwrap();
        let scene = build_scene(
            SceneBuildInput {
                geometries: vec![Arc::new(geometry)],
                instance_geometry: vec![0],
                frames: vec![FrameSrt::identity()],
                ..Default::default()
            },
            BuildQuality::PreferFastBuild,
        )
        .unwrap();
        let funcs = FuncTable::new(2, 1);
        let camera = Camera::new();

        f(&ShadingContext {
            scene: &scene,
            funcs: &funcs,
            geometry: &table,
            camera: &camera,
            width,
            height,
            ao_radius: 1.0,
        })
    }

    #[test]
    fn test_every_pixel_writes_its_own_bytes() {
        let render = RenderContext::new(Some(3)).unwrap();
        assert_eq!(render.thread_count(), 3);

        let (image, hits) = with_context(13, 7, |ctx| render.dispatch(&Coordinates, ctx).unwrap());
        assert_eq!(hits, 7);
        for y in 0..7 {
            for x in 0..13 {
                assert_eq!(image.get(x, y), [x as u8, y as u8, 7, 255]);
            }
        }
    }

    #[test]
    fn test_resolution_over_capacity_rejected() {
        let render = RenderContext::new(Some(1)).unwrap().with_max_pixels(100);

        let result = with_context(20, 10, |ctx| render.dispatch(&Coordinates, ctx));
        assert!(matches!(
            result,
            Err(RenderError::Resolution { width: 20, height: 10, capacity: 100 })
        ));
        assert!(with_context(0, 10, |ctx| render.dispatch(&Coordinates, ctx)).is_err());
        assert!(with_context(10, 10, |ctx| render.dispatch(&Coordinates, ctx)).is_ok());
    }

    #[test]
    fn test_file_order_flips_rows() {
        let mut image = ImageBuffer::new(2, 2);
        image.pixels[..4].copy_from_slice(&[1, 1, 1, 255]);

        let flipped = image.to_file_order();
        assert_eq!(&flipped[8..12], &[1, 1, 1, 255]);
        assert_eq!(&flipped[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_png_round_trip() {
        let mut image = ImageBuffer::new(3, 2);
        // Bottom-left pixel red
        image.pixels[..4].copy_from_slice(&[255, 0, 0, 255]);

        let path = std::env::temp_dir().join("mbrt_renderer_test").join("round_trip.png");
        image.write_png(&path).unwrap();

        let read = image::open(&path).unwrap().to_rgba8();
        assert_eq!(read.dimensions(), (3, 2));
        // Bottom row of the buffer is the last row of the file
        assert_eq!(read.get_pixel(0, 1).0, [255, 0, 0, 255]);
        assert_eq!(read.get_pixel(0, 0).0, [0, 0, 0, 0]);

        let _ = std::fs::remove_file(&path);
    }
}
